use anyhow::{Result, bail};
use log::debug;
use std::path::{Path, PathBuf};

use super::{Packager, Packaging, render};
use crate::config::Key;
use crate::process::describe;
use crate::runtime::delete_path;

/// One self-contained `.pex` executable per entry point.
///
/// Artifacts are built under the work folder and moved into
/// `<meta>/<name>/<entry point>-<version>` once complete.
pub struct PexPackager;

impl PexPackager {
    fn build(pkg: &Packager<'_>, entry_point: &str, version: &str, dest: &Path) -> Result<()> {
        let args = vec![
            "-m".to_string(),
            "pex".to_string(),
            "-o".to_string(),
            dest.display().to_string(),
            "--no-index".to_string(),
            "-f".to_string(),
            pkg.build_folder.display().to_string(),
            "-c".to_string(),
            entry_point.to_string(),
            format!("{}=={}", pkg.name, version),
        ];
        let python = PathBuf::from(pkg.setting(Key::Python));
        debug!("Building {}", dest.display());
        let result = pkg.runner().run(&python, &args)?;
        if !result.succeeded() {
            bail!(
                "{} failed: {}",
                describe(&python, &args),
                result.error_message()
            );
        }
        Ok(())
    }
}

impl Packaging for PexPackager {
    fn name(&self) -> &'static str {
        "pex"
    }

    fn effective_package(
        &self,
        pkg: &Packager<'_>,
        template: &str,
        version: &str,
        output: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        for entry_point in pkg.required_entry_points()? {
            let dest = output.join(render(template, &pkg.meta_folder(), &entry_point, version));
            delete_path(pkg.runtime(), &dest)?;
            Self::build(pkg, &entry_point, version, &dest)?;
            result.push(dest);
        }
        Ok(result)
    }

    fn effective_install(&self, pkg: &mut Packager<'_>, version: &str) -> Result<Vec<PathBuf>> {
        let dist = pkg.dist_folder.clone();
        let packaged = pkg.package(Some(version), &dist)?;

        let runtime = pkg.runtime();
        let meta_folder = pkg.meta_folder();
        let mut installed = Vec::new();
        for path in packaged {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let target = meta_folder.join(file_name);
            delete_path(runtime, &target)?;
            runtime.rename(&path, &target)?;
            installed.push(target);
        }

        pkg.perform_delivery(version, "{meta}/{name}-{version}")?;
        Ok(installed)
    }
}
