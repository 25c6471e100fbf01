use anyhow::{Context as _, Result};
use std::path::Path;

use crate::packager::{Packager, PackagerRegistry, Services};

/// Build artifacts for the project in `folder` into `dist`, without installing them.
#[tracing::instrument(skip(services, packagers))]
pub fn package(
    services: Services<'_>,
    packagers: &PackagerRegistry,
    name: &str,
    folder: &Path,
    dist: &Path,
) -> Result<()> {
    let folder = std::path::absolute(folder)
        .with_context(|| format!("Invalid project folder {}", folder.display()))?;
    let dist = std::path::absolute(dist)
        .with_context(|| format!("Invalid dist folder {}", dist.display()))?;

    let mut pkg = Packager::for_package(services, packagers, name)?;
    pkg.source_folder = Some(folder);
    for path in pkg.package(None, &dist)? {
        let verb = if services.ctx.dryrun { "Would package" } else { "Packaged" };
        println!("{} {}", verb, path.display());
    }
    Ok(())
}
