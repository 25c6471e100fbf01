use anyhow::Result;
use log::{debug, info};
use std::time::Duration;

use crate::config::SELF_NAME;
use crate::delivery::last_check_path;
use crate::lock::InstallLock;
use crate::package::now_epoch;
use crate::packager::{Packager, PackagerRegistry, Services};

/// Background upgrade triggered by wrapper scripts.
///
/// Checks at most once per `version_check_delay`, and never competes with an
/// install already in progress.
#[tracing::instrument(skip(services, packagers))]
pub async fn auto_upgrade(
    services: Services<'_>,
    packagers: &PackagerRegistry,
    name: &str,
) -> Result<()> {
    let runtime = services.runtime;
    let settings = &services.ctx.settings;
    let stamp = last_check_path(services.ctx, name);

    let delay = Duration::from_secs(settings.version_check_delay());
    let recent = runtime
        .modified(&stamp)
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age < delay);
    if recent {
        info!("Skipping auto-upgrade, checked recently");
        return Ok(());
    }

    let mut pkg = Packager::for_package(services, packagers, name)?;
    if InstallLock::is_held(runtime, &pkg.lock_path()) {
        info!("Lock file present, another installation is in progress");
        return Ok(());
    }

    if let Some(parent) = stamp.parent()
        && !runtime.is_dir(parent)
    {
        runtime.create_dir_all(parent)?;
    }
    runtime.write(&stamp, now_epoch().to_string().as_bytes())?;

    let report = pkg.internal_install(false, name == SELF_NAME).await?;
    debug!("Auto-upgrade of {}: {:?}", name, report.outcome);
    info!("{}", report);
    Ok(())
}
