use anyhow::Result;

use crate::packager::{PackagerRegistry, Packager, Services};

/// Install (or upgrade) each named package.
#[tracing::instrument(skip(services, packagers))]
pub async fn install(
    services: Services<'_>,
    packagers: &PackagerRegistry,
    names: &[String],
    force: bool,
) -> Result<()> {
    for name in names {
        let mut pkg = Packager::for_package(services, packagers, name)?;
        let report = pkg.install(force).await?;
        println!("{}", report);
    }
    Ok(())
}
