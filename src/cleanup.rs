//! Retention of older installs under `<meta>/<name>/`.
//!
//! Every non-dotfile entry is attributed to the longest matching name among the
//! package name, its entry points and its removed entry points (or to a
//! catch-all bucket). Within a bucket, entries are ordered newest first:
//!
//! - live buckets keep the 2 newest while the newest is younger than the
//!   cutoff, and only the newest after that;
//! - buckets of removed entry points keep their newest entry until it ages past
//!   the cutoff, then everything goes and the name is retired.
//!
//! Once every removed entry point is retired, `.removed-entry-points.json` goes too.

use anyhow::Result;
use log::debug;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::package::{load_list, removed_entry_points_path};
use crate::runtime::{Runtime, delete_path};

/// A file or folder directly under `<meta>/<name>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    /// Epoch seconds
    pub mtime: i64,
}

impl Entry {
    pub fn new(name: impl Into<String>, mtime: i64) -> Self {
        Self {
            name: name.into(),
            mtime,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    /// Entry names to delete
    pub delete: Vec<String>,
    /// All removed entry points are retired
    pub drop_removed_file: bool,
}

/// Longest candidate that `text` starts with.
pub fn find_prefix<'a>(prefixes: &'a [&'a str], text: &str) -> Option<&'a str> {
    prefixes
        .iter()
        .filter(|p| !p.is_empty() && text.starts_with(*p))
        .max_by_key(|p| p.len())
        .copied()
}

/// Decide what to delete, given the current entries of the package folder.
/// Entries named in `protected` are never deleted.
pub fn plan(
    package: &str,
    entry_points: &[String],
    removed: &[String],
    entries: &[Entry],
    cutoff: i64,
    protected: &[String],
) -> CleanupPlan {
    let mut prefixes: Vec<&str> = vec![package];
    prefixes.extend(entry_points.iter().map(String::as_str));
    prefixes.extend(removed.iter().map(String::as_str));

    let mut buckets: BTreeMap<Option<&str>, Vec<&Entry>> = BTreeMap::new();
    for prefix in &prefixes {
        buckets.entry(Some(*prefix)).or_default();
    }
    for entry in entries.iter().filter(|e| !e.name.starts_with('.')) {
        let bucket = find_prefix(&prefixes, &entry.name);
        buckets.entry(bucket).or_default().push(entry);
    }

    let is_removed = |bucket: Option<&str>| bucket.is_some_and(|b| removed.iter().any(|r| r == b));

    let mut result = CleanupPlan::default();
    let mut retired = 0;
    for (bucket, mut cleanable) in buckets {
        if cleanable.is_empty() {
            if is_removed(bucket) {
                retired += 1;
            }
            continue;
        }

        cleanable.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| b.name.cmp(&a.name)));
        let old_enough = cleanable[0].mtime <= cutoff;
        let keep = if !is_removed(bucket) {
            if old_enough { 1 } else { 2 }
        } else if old_enough {
            retired += 1;
            0
        } else {
            1
        };

        result.delete.extend(
            cleanable
                .iter()
                .skip(keep)
                .filter(|e| !protected.contains(&e.name))
                .map(|e| e.name.clone()),
        );
    }

    result.drop_removed_file = retired >= removed.len();
    result
}

fn epoch_secs(time: std::time::SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Apply retention to `meta_folder`, never touching `protected` paths.
#[tracing::instrument(skip(runtime, entry_points, protected))]
pub fn cleanup<R: Runtime + ?Sized>(
    runtime: &R,
    meta_folder: &Path,
    package: &str,
    entry_points: &[String],
    protected: &[PathBuf],
    cutoff: i64,
) -> Result<()> {
    if !runtime.is_dir(meta_folder) {
        return Ok(());
    }

    let removed_path = removed_entry_points_path(meta_folder);
    let removed = load_list(runtime, &removed_path).unwrap_or_default();

    let mut entries = Vec::new();
    for path in runtime.read_dir(meta_folder)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let mtime = runtime.modified(&path).map(epoch_secs).unwrap_or(0);
        entries.push(Entry::new(name, mtime));
    }

    let protected: Vec<String> = protected
        .iter()
        .filter(|p| p.parent() == Some(meta_folder))
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
        .collect();

    let plan = plan(package, entry_points, &removed, &entries, cutoff, &protected);
    for name in &plan.delete {
        let path = meta_folder.join(name);
        debug!("Cleaning up {}", path.display());
        delete_path(runtime, &path)?;
    }
    if plan.drop_removed_file && runtime.exists(&removed_path) {
        delete_path(runtime, &removed_path)?;
    }
    Ok(())
}
