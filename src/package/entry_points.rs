//! Discovery and bookkeeping of a package's console entry points.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::runtime::{Runtime, write_atomic};

/// Names declared in the `[console_scripts]` section of an `entry_points.txt`.
pub fn parse_console_scripts(text: &str) -> Vec<String> {
    let mut in_section = false;
    let mut names = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_section = line[1..line.len() - 1].trim() == "console_scripts";
            continue;
        }
        if in_section && let Some((name, _)) = line.split_once('=') {
            let name = name.trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    names
}

/// Wheel file names use `_` where the project name may use `-` or `.`.
fn wheel_prefixes(name: &str, version: &str) -> Vec<String> {
    let mut prefixes = vec![format!("{}-{}-", name, version)];
    let normalized = name.replace(['-', '.'], "_");
    if normalized != name {
        prefixes.push(format!("{}-{}-", normalized, version));
    }
    prefixes
}

fn read_wheel<R: Runtime + ?Sized>(runtime: &R, wheel: &Path) -> Result<Option<Vec<String>>> {
    let mut buffer = Vec::new();
    runtime
        .open(wheel)?
        .read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read {}", wheel.display()))?;

    let mut archive = ZipArchive::new(std::io::Cursor::new(buffer))
        .with_context(|| format!("{} is not a valid wheel", wheel.display()))?;

    let Some(entry) = archive
        .file_names()
        .find(|n| n.ends_with(".dist-info/entry_points.txt"))
        .map(str::to_string)
    else {
        return Ok(None);
    };

    let mut text = String::new();
    archive
        .by_name(&entry)?
        .read_to_string(&mut text)
        .context("Failed to read entry_points.txt")?;
    Ok(Some(parse_console_scripts(&text)))
}

/// Entry points of the wheel built for `name==version` in `build_folder`, if any.
/// Unreadable wheels are reported and treated as declaring nothing.
#[tracing::instrument(skip(runtime))]
pub fn wheel_entry_points<R: Runtime + ?Sized>(
    runtime: &R,
    build_folder: &Path,
    name: &str,
    version: &str,
) -> Option<Vec<String>> {
    if !runtime.is_dir(build_folder) {
        return None;
    }
    let entries = match runtime.read_dir(build_folder) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Can't list {}: {}", build_folder.display(), e);
            return None;
        }
    };

    let prefixes = wheel_prefixes(name, version);
    for wheel in entries {
        let Some(file_name) = wheel.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.ends_with(".whl") || !prefixes.iter().any(|p| file_name.starts_with(p)) {
            continue;
        }
        debug!("Reading entry points from {}", wheel.display());
        match read_wheel(runtime, &wheel) {
            Ok(found) => return found,
            Err(e) => warn!("Can't read wheel {}: {:#}", wheel.display(), e),
        }
    }
    None
}

/// Read a JSON list of names. Missing or invalid files yield `None`.
pub fn load_list<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Option<Vec<String>> {
    if !runtime.exists(path) {
        return None;
    }
    let parsed = runtime
        .read_to_string(path)
        .and_then(|content| serde_json::from_str::<Vec<String>>(&content).map_err(Into::into));
    match parsed {
        Ok(list) => Some(list),
        Err(e) => {
            warn!("Ignoring invalid {}: {}", path.display(), e);
            None
        }
    }
}

pub fn save_list<R: Runtime + ?Sized>(runtime: &R, path: &Path, list: &[String]) -> Result<()> {
    let content = serde_json::to_string_pretty(list)?;
    write_atomic(runtime, path, content.as_bytes())
}

/// `<meta>/<name>/.entry-points.json`
pub fn entry_points_path(meta_folder: &Path) -> PathBuf {
    meta_folder.join(".entry-points.json")
}

/// `<meta>/<name>/.removed-entry-points.json`
pub fn removed_entry_points_path(meta_folder: &Path) -> PathBuf {
    meta_folder.join(".removed-entry-points.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_wheel(path: &Path, entry_points: Option<&str>) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        zip.start_file("foo/__init__.py", options).unwrap();
        zip.write_all(b"").unwrap();
        if let Some(text) = entry_points {
            zip.start_file("foo-1.0.dist-info/entry_points.txt", options)
                .unwrap();
            zip.write_all(text.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_parse_console_scripts() {
        let text = "\
[console_scripts]
foo = foo.cli:main
foo-admin=foo.admin:main

[gui_scripts]
foo-gui = foo.gui:main
";
        assert_eq!(parse_console_scripts(text), vec!["foo", "foo-admin"]);
        assert!(parse_console_scripts("[other]\nx = y\n").is_empty());
        assert!(parse_console_scripts("").is_empty());
    }

    #[test]
    fn test_wheel_entry_points() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        write_wheel(
            &dir.path().join("foo-1.0-py3-none-any.whl"),
            Some("[console_scripts]\nfoo = foo:main\nbar = foo:bar\n"),
        );
        write_wheel(&dir.path().join("six-1.16.0-py2.py3-none-any.whl"), None);

        assert_eq!(
            wheel_entry_points(&runtime, dir.path(), "foo", "1.0"),
            Some(vec!["bar".to_string(), "foo".to_string()])
        );
        assert_eq!(wheel_entry_points(&runtime, dir.path(), "foo", "2.0"), None);
        assert_eq!(
            wheel_entry_points(&runtime, dir.path(), "six", "1.16.0"),
            None
        );
    }

    #[test]
    fn test_wheel_name_normalization() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        write_wheel(
            &dir.path().join("foo_bar-1.0-py3-none-any.whl"),
            Some("[console_scripts]\nfoo-bar = foo_bar:main\n"),
        );
        assert_eq!(
            wheel_entry_points(&runtime, dir.path(), "foo-bar", "1.0"),
            Some(vec!["foo-bar".to_string()])
        );
    }

    #[test_log::test]
    fn test_corrupt_wheel_means_no_entry_points() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("foo-1.0-py3-none-any.whl"), "garbage").unwrap();
        assert_eq!(wheel_entry_points(&runtime, dir.path(), "foo", "1.0"), None);
        assert_eq!(
            wheel_entry_points(&runtime, &dir.path().join("missing"), "foo", "1.0"),
            None
        );
    }

    #[test]
    fn test_list_files() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let path = entry_points_path(dir.path());
        assert_eq!(load_list(&runtime, &path), None);

        save_list(&runtime, &path, &["foo".to_string(), "bar".to_string()]).unwrap();
        assert_eq!(
            load_list(&runtime, &path),
            Some(vec!["foo".to_string(), "bar".to_string()])
        );

        let removed = removed_entry_points_path(dir.path());
        std::fs::write(&removed, "{}").unwrap();
        assert_eq!(load_list(&runtime, &removed), None);
    }
}
