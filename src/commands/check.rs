use anyhow::Result;

use super::installed_packages;
use crate::packager::{Packager, PackagerRegistry, Services};

/// One line comparing what is installed with what the channel wants.
pub fn status_line(pkg: &Packager<'_>, verbose: bool, index: &str) -> String {
    if !pkg.desired.valid() {
        return pkg.desired.representation(verbose, None, index);
    }
    if !pkg.current.valid() {
        return pkg
            .desired
            .representation(verbose, Some("is not installed"), index);
    }
    if pkg.current.version != pkg.desired.version {
        let note = format!("can be upgraded to {}", pkg.desired.version);
        return pkg.current.representation(verbose, Some(&note), index);
    }
    pkg.current
        .representation(verbose, Some("is up-to-date"), index)
}

/// Print the status of each named package, or of every installed package.
#[tracing::instrument(skip(services, packagers))]
pub async fn check(
    services: Services<'_>,
    packagers: &PackagerRegistry,
    names: &[String],
    verbose: bool,
) -> Result<()> {
    let names = if names.is_empty() {
        installed_packages(services)?
    } else {
        names.to_vec()
    };
    if names.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    let index = services.ctx.settings.index();
    for name in &names {
        let mut pkg = Packager::for_package(services, packagers, name)?;
        pkg.refresh_current();
        pkg.refresh_desired().await;
        println!("{}", status_line(&pkg, verbose, &index));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::Fixture;
    use crate::package::{MetaRole, VersionMeta};
    use crate::packager::test_support::FixedIndex;
    use tempfile::tempdir;

    const INDEX: &str = "https://pypi.org/simple";

    #[tokio::test]
    async fn test_status_lines() {
        let dir = tempdir().unwrap();
        let fixture = Fixture::new(dir.path(), FixedIndex(vec![("foo", "2.0"), ("bar", "1.0")]));
        let services = fixture.services();
        let packagers = PackagerRegistry::new();

        let mut installed = VersionMeta::new("foo");
        installed.set_version("1.0", INDEX, "latest");
        installed
            .save(
                &fixture.runtime,
                &MetaRole::Current.path(&fixture.ctx.settings, "foo"),
            )
            .unwrap();

        let mut foo = Packager::for_package(services, &packagers, "foo").unwrap();
        foo.refresh_current();
        foo.refresh_desired().await;
        assert_eq!(
            status_line(&foo, false, INDEX),
            "foo 1.0 can be upgraded to 2.0"
        );

        let mut bar = Packager::for_package(services, &packagers, "bar").unwrap();
        bar.refresh_current();
        bar.refresh_desired().await;
        assert_eq!(status_line(&bar, false, INDEX), "bar 1.0 is not installed");

        let mut baz = Packager::for_package(services, &packagers, "baz").unwrap();
        baz.refresh_current();
        baz.refresh_desired().await;
        assert_eq!(
            status_line(&baz, false, INDEX),
            "baz: can't find baz on https://pypi.org/simple"
        );
    }

    #[tokio::test]
    async fn test_up_to_date() {
        let dir = tempdir().unwrap();
        let fixture = Fixture::new(dir.path(), FixedIndex(vec![("foo", "1.0")]));
        let packagers = PackagerRegistry::new();

        let mut installed = VersionMeta::new("foo");
        installed.set_version("1.0", INDEX, "latest");
        installed
            .save(
                &fixture.runtime,
                &MetaRole::Current.path(&fixture.ctx.settings, "foo"),
            )
            .unwrap();

        let mut foo = Packager::for_package(fixture.services(), &packagers, "foo").unwrap();
        foo.refresh_current();
        foo.refresh_desired().await;
        assert_eq!(status_line(&foo, false, INDEX), "foo 1.0 is up-to-date");

        check(fixture.services(), &packagers, &[], false).await.unwrap();
    }
}
