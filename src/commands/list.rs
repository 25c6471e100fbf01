use anyhow::Result;
use log::debug;

use crate::package::{MetaRole, VersionMeta};
use crate::packager::Services;

/// Names of packages with a `.current.json`, sorted.
pub fn installed_packages(services: Services<'_>) -> Result<Vec<String>> {
    let runtime = services.runtime;
    let settings = &services.ctx.settings;
    if !runtime.is_dir(&settings.meta) {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = runtime
        .read_dir(&settings.meta)?
        .into_iter()
        .filter(|path| runtime.is_dir(path))
        .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(String::from))
        .filter(|name| !name.starts_with('.'))
        .filter(|name| runtime.exists(&MetaRole::Current.path(settings, name)))
        .collect();
    names.sort();
    Ok(names)
}

/// List installed packages with how they were installed.
#[tracing::instrument(skip(services))]
pub fn list(services: Services<'_>) -> Result<()> {
    let settings = &services.ctx.settings;
    debug!("Listing packages from {}", settings.meta.display());

    let names = installed_packages(services)?;
    if names.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    let index = settings.index();
    for name in names {
        let meta = VersionMeta::load(
            services.runtime,
            &name,
            &MetaRole::Current.path(settings, &name),
        );
        println!("{}", meta.representation(true, None, &index));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::Fixture;
    use crate::packager::test_support::FixedIndex;
    use tempfile::tempdir;

    #[test]
    fn test_installed_packages() {
        let dir = tempdir().unwrap();
        let fixture = Fixture::new(dir.path(), FixedIndex(vec![]));
        let settings = &fixture.ctx.settings;

        assert!(installed_packages(fixture.services()).unwrap().is_empty());

        for name in ["zed", "foo"] {
            let mut meta = VersionMeta::new(name);
            meta.set_version("1.0", "https://pypi.org/simple", "latest");
            meta.save(&fixture.runtime, &MetaRole::Current.path(settings, name))
                .unwrap();
        }
        // Only a cached latest version: not installed
        std::fs::create_dir_all(settings.meta_folder("bar")).unwrap();
        std::fs::write(MetaRole::Latest.path(settings, "bar"), "{}").unwrap();
        std::fs::write(settings.meta.join("config.json"), "{}").unwrap();

        assert_eq!(
            installed_packages(fixture.services()).unwrap(),
            vec!["foo", "zed"]
        );
        list(fixture.services()).unwrap();
    }
}
