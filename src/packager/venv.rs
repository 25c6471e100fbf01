use anyhow::{Result, anyhow, bail};
use std::path::{Path, PathBuf};

use super::{Packager, Packaging, render};
use crate::config::Key;
use crate::package::{MetaRole, VersionMeta};
use crate::process::describe;
use crate::runtime::delete_path;

/// A virtual environment per installed version.
///
/// Virtual environments are not relocatable, so they are created in place at
/// `<meta>/<name>/<name>-<version>` and the entry points are delivered from
/// their `bin/` folder.
pub struct VenvPackager;

fn run(pkg: &Packager<'_>, program: &Path, args: Vec<String>) -> Result<()> {
    let result = pkg.runner().run(program, &args)?;
    if !result.succeeded() {
        bail!(
            "{} failed: {}",
            describe(program, &args),
            result.error_message()
        );
    }
    Ok(())
}

/// Rebuilding a venv destroys it first, so the current record can no longer
/// claim `version` as installed until the rebuild succeeds.
fn forget_current(pkg: &Packager<'_>, version: &str, folder: &Path) -> Result<()> {
    let path = MetaRole::Current.path(&pkg.ctx().settings, &pkg.name);
    if !folder.starts_with(pkg.meta_folder()) || !pkg.runtime().exists(&path) {
        return Ok(());
    }
    let mut current = VersionMeta::load(pkg.runtime(), &pkg.name, &path);
    if current.version != version {
        return Ok(());
    }
    current.invalidate(format!("reinstall of {} did not complete", folder.display()));
    current.save(pkg.runtime(), &path)
}

impl Packaging for VenvPackager {
    fn name(&self) -> &'static str {
        "venv"
    }

    fn effective_package(
        &self,
        pkg: &Packager<'_>,
        template: &str,
        version: &str,
        output: &Path,
    ) -> Result<Vec<PathBuf>> {
        let python = pkg.setting(Key::Python);
        let python = pkg
            .runner()
            .which(&python)
            .ok_or_else(|| anyhow!("Can't create virtualenv with python '{}': not available", python))?;

        let folder = output.join(render(template, &pkg.meta_folder(), &pkg.name, version));
        if pkg.runtime().exists(&folder) {
            forget_current(pkg, version, &folder)?;
            delete_path(pkg.runtime(), &folder)?;
        }
        run(
            pkg,
            &python,
            vec![
                "-m".to_string(),
                "venv".to_string(),
                folder.display().to_string(),
            ],
        )?;

        run(
            pkg,
            &folder.join("bin").join("pip"),
            vec![
                "install".to_string(),
                "-i".to_string(),
                pkg.ctx().settings.index(),
                "-f".to_string(),
                pkg.build_folder.display().to_string(),
                format!("{}=={}", pkg.name, version),
            ],
        )?;
        Ok(vec![folder])
    }

    fn effective_install(&self, pkg: &mut Packager<'_>, version: &str) -> Result<Vec<PathBuf>> {
        let meta_folder = pkg.meta_folder();
        let installed = pkg.package(Some(version), &meta_folder)?;
        for folder in &installed {
            let template = folder.join("bin").join("{name}");
            pkg.perform_delivery(version, &template.display().to_string())?;
        }
        Ok(installed)
    }
}
