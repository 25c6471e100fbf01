use anyhow::Result;

use crate::packager::{Packager, PackagerRegistry, Services};

#[tracing::instrument(skip(services, packagers))]
pub async fn uninstall(
    services: Services<'_>,
    packagers: &PackagerRegistry,
    names: &[String],
) -> Result<()> {
    for name in names {
        let mut pkg = Packager::for_package(services, packagers, name)?;
        println!("{}", pkg.uninstall().await?);
    }
    Ok(())
}
