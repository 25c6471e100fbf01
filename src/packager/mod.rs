//! Packager session and install orchestration.
//!
//! A [`Packager`] holds everything known about one package during a run: its
//! current, latest and desired versions, its entry points, and the strategy
//! ([`Packaging`]) used to build and install it. [`Packager::install`] drives
//! the lifecycle under the package lock:
//!
//! 1. resolve the desired version from the channel policy
//! 2. compare with what is currently installed
//! 3. build and deliver through the strategy when they differ
//! 4. retire entry points that went away, clean up older installs
//! 5. persist the new current record

mod pex;
mod venv;

use anyhow::{Context as _, Result, anyhow, bail};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cleanup;
use crate::config::{Context, Key, LATEST_CHANNEL, SELF_NAME};
use crate::delivery::{DeliveryRegistry, DeliveryRequest, uninstall_existing};
use crate::index::IndexClient;
use crate::lock::{InstallLock, LockContention};
use crate::package::{
    MetaRole, MetaSource, PackagerInfo, VersionMeta, entry_points_path, load_list, now_epoch,
    removed_entry_points_path, save_list, wheel_entry_points,
};
use crate::process::{ProcessRunner, describe};
use crate::runtime::{Runtime, delete_path};

pub use pex::PexPackager;
pub use venv::VenvPackager;

/// Collaborators shared by every packager of a run.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub ctx: &'a Context,
    pub runtime: &'a dyn Runtime,
    pub runner: &'a dyn ProcessRunner,
    pub index: &'a dyn IndexClient,
    pub deliveries: &'a DeliveryRegistry,
}

/// How a package is built and installed.
pub trait Packaging: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce artifacts into `output` from the wheels in the build folder.
    /// `template` names each artifact from `{name}` and `{version}`.
    fn effective_package(
        &self,
        pkg: &Packager<'_>,
        template: &str,
        version: &str,
        output: &Path,
    ) -> Result<Vec<PathBuf>>;

    /// Install `version` and deliver its entry points.
    /// Returns the installed paths under `<meta>/<name>/`.
    fn effective_install(&self, pkg: &mut Packager<'_>, version: &str) -> Result<Vec<PathBuf>>;
}

type Factory = fn() -> Arc<dyn Packaging>;

/// Packaging strategies by identifier.
pub struct PackagerRegistry {
    factories: BTreeMap<&'static str, Factory>,
}

impl PackagerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding `pex` and `venv`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("pex", || Arc::new(PexPackager));
        registry.register("venv", || Arc::new(VenvPackager));
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: Factory) {
        self.factories.insert(name, factory);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Packaging>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| anyhow!("Unknown packager '{}'", name))
    }

    /// Strategy configured for `package`.
    pub fn resolve(&self, ctx: &Context, package: &str) -> Result<Arc<dyn Packaging>> {
        let definition = ctx.settings.resolved_value(Key::Packager, Some(package));
        self.get(&definition.value)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for PackagerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    UpToDate,
    Installed,
    Upgraded,
    Bootstrapped,
}

/// Terminal state of an install, with the line to show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub outcome: InstallOutcome,
    pub message: String,
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Replace `{meta}`, `{name}` and `{version}` in a naming template.
pub fn render(template: &str, meta: &Path, name: &str, version: &str) -> String {
    template
        .replace("{meta}", &meta.display().to_string())
        .replace("{name}", name)
        .replace("{version}", version)
}

pub struct Packager<'a> {
    pub name: String,
    services: Services<'a>,
    strategy: Arc<dyn Packaging>,
    entry_points: Option<Vec<String>>,

    pub current: VersionMeta,
    pub latest: VersionMeta,
    pub desired: VersionMeta,

    pub dist_folder: PathBuf,
    pub build_folder: PathBuf,
    pub source_folder: Option<PathBuf>,
}

impl fmt::Debug for Packager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.strategy.name(), self.name)
    }
}

impl<'a> Packager<'a> {
    pub fn new(services: Services<'a>, strategy: Arc<dyn Packaging>, name: &str) -> Self {
        let meta_folder = services.ctx.settings.meta_folder(name);
        let dist_folder = meta_folder.join(".work");
        let build_folder = dist_folder.join("build");
        Self {
            name: name.to_string(),
            services,
            strategy,
            entry_points: None,
            current: VersionMeta::new(name),
            latest: VersionMeta::new(name),
            desired: VersionMeta::new(name),
            dist_folder,
            build_folder,
            source_folder: None,
        }
    }

    /// Packager for `name` using the strategy configured for it.
    pub fn for_package(
        services: Services<'a>,
        registry: &PackagerRegistry,
        name: &str,
    ) -> Result<Self> {
        let strategy = registry.resolve(services.ctx, name)?;
        Ok(Self::new(services, strategy, name))
    }

    pub fn ctx(&self) -> &'a Context {
        self.services.ctx
    }

    pub fn runtime(&self) -> &'a dyn Runtime {
        self.services.runtime
    }

    pub fn runner(&self) -> &'a dyn ProcessRunner {
        self.services.runner
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// `<meta>/<name>`
    pub fn meta_folder(&self) -> PathBuf {
        self.ctx().settings.meta_folder(&self.name)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.meta_folder().join(".work.lock")
    }

    /// Configured value of `key` for this package.
    pub fn setting(&self, key: Key) -> String {
        self.ctx().settings.resolved_value(key, Some(&self.name)).value
    }

    fn index(&self) -> String {
        self.ctx().settings.index()
    }

    /// Entry points from the last build, if any.
    /// With nothing known yet, a dry run assumes a single entry point named after the package.
    pub fn entry_points(&self) -> Vec<String> {
        if let Some(cached) = &self.entry_points {
            return cached.clone();
        }
        let path = entry_points_path(&self.meta_folder());
        match load_list(self.runtime(), &path) {
            Some(list) => list,
            None if self.ctx().dryrun => vec![self.name.clone()],
            None => Vec::new(),
        }
    }

    pub fn required_entry_points(&self) -> Result<Vec<String>> {
        let entry_points = self.entry_points();
        if entry_points.is_empty() {
            bail!(
                "'{}' is not a CLI, it has no console_scripts entry points",
                self.name
            );
        }
        Ok(entry_points)
    }

    fn refresh_entry_points(&mut self, version: &str) -> Result<()> {
        if self.ctx().dryrun {
            return Ok(());
        }
        let found = wheel_entry_points(self.runtime(), &self.build_folder, &self.name, version)
            .unwrap_or_default();
        debug!("Entry points of {} {}: {:?}", self.name, version, found);
        save_list(
            self.runtime(),
            &entry_points_path(&self.meta_folder()),
            &found,
        )?;
        self.entry_points = Some(found);
        Ok(())
    }

    pub fn refresh_current(&mut self) {
        let path = MetaRole::Current.path(&self.ctx().settings, &self.name);
        self.current = VersionMeta::load(self.runtime(), &self.name, &path);
        if !self.current.valid() {
            self.current.invalidate("is not installed");
        }
    }

    pub async fn refresh_latest(&mut self) {
        let settings = &self.ctx().settings;
        let path = MetaRole::Latest.path(settings, &self.name);
        self.latest = VersionMeta::load(self.runtime(), &self.name, &path);
        if self.latest.still_valid(settings.version_check_delay()) {
            debug!("Using cached latest version of {}", self.name);
            return;
        }

        let index = self.index();
        match self.services.index.latest_version(&index, &self.name).await {
            Ok(Some(version)) => {
                self.latest.set_version(&version, &index, LATEST_CHANNEL);
                if let Err(e) = self.latest.save(self.runtime(), &path) {
                    warn!("Could not cache latest version of {}: {:#}", self.name, e);
                }
            }
            Ok(None) => self
                .latest
                .invalidate(format!("can't find {} on {}", self.name, index)),
            Err(e) => self.latest.invalidate(format!(
                "can't determine latest version from {}: {:#}",
                index, e
            )),
        }
    }

    pub async fn refresh_desired(&mut self) {
        let settings = &self.ctx().settings;
        let channel = self.setting(Key::Channel);
        let mut desired = VersionMeta::new(&self.name);

        if let Some(pin) = settings.channel_pin(&channel, &self.name) {
            desired.set_version(&pin.value, &pin.source, &channel);
        } else if channel == LATEST_CHANNEL {
            self.refresh_latest().await;
            desired = desired.merged(&[MetaSource::Meta(&self.latest)]);
        } else {
            desired.invalidate(format!("can't determine {} version", channel));
        }

        let live = PackagerInfo::resolve(settings, &self.name);
        self.desired = desired.merged(&[MetaSource::Packager(live)]);
    }

    fn run_tool(&self, program: &Path, args: &[String]) -> Result<String> {
        let result = self
            .runner()
            .run(program, args)
            .with_context(|| format!("Failed to run {}", describe(program, args)))?;
        if !result.succeeded() {
            bail!("{}", result.error_message());
        }
        Ok(result.stdout)
    }

    /// Run `pip wheel` for `version` (or the source folder) into an emptied build folder.
    pub fn pip_wheel(&self, version: &str) -> Result<()> {
        let runtime = self.runtime();
        delete_path(runtime, &self.build_folder)?;
        runtime.create_dir_all(&self.build_folder)?;
        let requirement = match &self.source_folder {
            Some(folder) => folder.display().to_string(),
            None => format!("{}=={}", self.name, version),
        };
        let args = vec![
            "-m".to_string(),
            "pip".to_string(),
            "wheel".to_string(),
            "-i".to_string(),
            self.index(),
            "--wheel-dir".to_string(),
            self.build_folder.display().to_string(),
            requirement,
        ];
        self.run_tool(Path::new(&self.setting(Key::Python)), &args)?;
        Ok(())
    }

    fn source_version(&self) -> Result<String> {
        let folder = self
            .source_folder
            .as_ref()
            .ok_or_else(|| anyhow!("Need either source_folder or version in order to package"))?;
        let setup_py = folder.join("setup.py");
        if !self.runtime().exists(&setup_py) {
            bail!("No setup.py in {}", folder.display());
        }

        let args = vec![setup_py.display().to_string(), "--version".to_string()];
        let output = self
            .runner()
            .run(Path::new(&self.setting(Key::Python)), &args)
            .ok()
            .filter(|r| r.succeeded())
            .and_then(|r| {
                r.stdout
                    .lines()
                    .map(str::trim)
                    .rfind(|l| !l.is_empty())
                    .map(String::from)
            });
        output.ok_or_else(|| anyhow!("Could not determine version from {}", setup_py.display()))
    }

    /// Build artifacts for `version` (or for the source folder's version) into `output`.
    #[tracing::instrument(skip(self), fields(package = %self.name))]
    pub fn package(&mut self, version: Option<&str>, output: &Path) -> Result<Vec<PathBuf>> {
        let version = match version {
            Some(version) => version.to_string(),
            None => self.source_version()?,
        };

        self.pip_wheel(&version)?;
        self.refresh_entry_points(&version)?;

        let runtime = self.runtime();
        if !runtime.is_dir(output) {
            runtime.create_dir_all(output)?;
        }
        let template = if self.source_folder.is_some() {
            "{name}"
        } else {
            "{name}-{version}"
        };
        let strategy = self.strategy.clone();
        strategy.effective_package(self, template, &version, output)
    }

    /// Deliver every entry point, with `template` naming the delivered source.
    pub fn perform_delivery(&self, version: &str, template: &str) -> Result<()> {
        let ctx = self.ctx();
        let runtime = self.runtime();
        let delivery = self.services.deliveries.resolve(ctx, &self.name)?;
        let current_exists =
            runtime.exists(&MetaRole::Current.path(&ctx.settings, &self.name));
        let meta_folder = self.meta_folder();

        for entry_point in self.required_entry_points()? {
            let target = ctx.settings.delivered_path(&entry_point);
            if self.name != SELF_NAME && !current_exists {
                uninstall_existing(runtime, &target)?;
            }
            let source = PathBuf::from(render(template, &meta_folder, &entry_point, version));
            delivery.install(
                runtime,
                ctx,
                &DeliveryRequest {
                    package: &self.name,
                    target: &target,
                    source: &source,
                },
            )?;
        }
        Ok(())
    }

    /// Apply retention to older installs, sparing `protected`.
    pub fn cleanup(&self, protected: &[PathBuf]) -> Result<()> {
        let cutoff = now_epoch() - self.ctx().settings.install_timeout() as i64;
        cleanup::cleanup(
            self.runtime(),
            &self.meta_folder(),
            &self.name,
            &self.entry_points(),
            protected,
            cutoff,
        )
    }

    /// Install the desired version, explaining lock contention in user terms.
    pub async fn install(&mut self, force: bool) -> Result<InstallReport> {
        match self.internal_install(force, false).await {
            Ok(report) => Ok(report),
            Err(e) => match e.downcast_ref::<LockContention>() {
                Some(contention) => {
                    let holder = contention
                        .holder
                        .map(|pid| format!(" (pid {})", pid))
                        .unwrap_or_default();
                    Err(anyhow!(
                        "{} is currently being installed by another process{}. If that is incorrect, please delete {}",
                        self.name,
                        holder,
                        contention.path.display()
                    ))
                }
                None => Err(e),
            },
        }
    }

    #[tracing::instrument(skip(self), fields(package = %self.name))]
    pub async fn internal_install(&mut self, force: bool, bootstrap: bool) -> Result<InstallReport> {
        let runtime = self.runtime();
        let intent = if bootstrap { "bootstrap" } else { "install" };
        let timeout = Duration::from_secs(self.ctx().settings.install_timeout());
        let holder = format!("{} {} {}", SELF_NAME, intent, self.name);
        let _lock = InstallLock::acquire(
            runtime,
            &self.lock_path(),
            &holder,
            timeout,
            self.ctx().dryrun,
        )
        .await?;

        self.refresh_desired().await;
        if !self.desired.valid() {
            bail!(
                "Can't {} {}: {}",
                intent,
                self.name,
                self.desired.problem.as_deref().unwrap_or("no version")
            );
        }

        self.refresh_current();
        let index = self.index();
        if !force && self.current.equivalent(&self.desired) {
            if !bootstrap {
                self.cleanup(&[])?;
            }
            return Ok(InstallReport {
                outcome: InstallOutcome::UpToDate,
                message: self
                    .desired
                    .representation(true, Some("is already installed"), &index),
            });
        }

        if bootstrap {
            debug!("Bootstrapping {} with {}", SELF_NAME, self.strategy.name());
        }
        let was_installed = self.current.valid();
        let previous: BTreeSet<String> = self.entry_points().into_iter().collect();

        let version = self.desired.version.clone();
        let strategy = self.strategy.clone();
        let installed = strategy.effective_install(self, &version)?;

        let current: BTreeSet<String> = self.entry_points().into_iter().collect();
        let removed: Vec<&String> = previous.difference(&current).collect();
        let removed_path = removed_entry_points_path(&self.meta_folder());
        let known: BTreeSet<String> = load_list(runtime, &removed_path)
            .unwrap_or_default()
            .into_iter()
            .collect();
        // Entry points exported again are live, not removed.
        let mut all: BTreeSet<String> = known.difference(&current).cloned().collect();
        all.extend(removed.iter().map(|name| name.to_string()));
        if all != known {
            let list: Vec<String> = all.iter().cloned().collect();
            save_list(runtime, &removed_path, &list)?;
        }
        if !removed.is_empty() {
            for name in &all {
                delete_path(runtime, &self.ctx().settings.delivered_path(name))?;
            }
        }

        self.cleanup(&installed)?;

        let live = PackagerInfo::resolve(&self.ctx().settings, &self.name);
        self.current = self
            .current
            .merged(&[MetaSource::Meta(&self.desired), MetaSource::Packager(live)]);
        self.current.save(
            runtime,
            &MetaRole::Current.path(&self.ctx().settings, &self.name),
        )?;

        let (outcome, verb, done) = match (bootstrap, was_installed) {
            (true, _) => (InstallOutcome::Bootstrapped, "bootstrap", "Bootstrapped"),
            (false, true) => (InstallOutcome::Upgraded, "upgrade", "Upgraded"),
            (false, false) => (InstallOutcome::Installed, "install", "Installed"),
        };
        let lead = if self.ctx().dryrun {
            format!("Would {}", verb)
        } else {
            done.to_string()
        };
        let message = format!("{} {}", lead, self.desired.representation(true, None, &index));
        info!("{}", message);
        Ok(InstallReport { outcome, message })
    }

    /// Remove delivered entry points and everything under `<meta>/<name>`.
    pub async fn uninstall(&mut self) -> Result<String> {
        let runtime = self.runtime();
        let timeout = Duration::from_secs(self.ctx().settings.install_timeout());
        let current_path = MetaRole::Current.path(&self.ctx().settings, &self.name);
        if !runtime.exists(&current_path) {
            bail!("{} was not installed with {}", self.name, SELF_NAME);
        }

        let holder = format!("{} uninstall {}", SELF_NAME, self.name);
        let _lock = InstallLock::acquire(
            runtime,
            &self.lock_path(),
            &holder,
            timeout,
            self.ctx().dryrun,
        )
        .await?;

        for entry_point in self.entry_points() {
            delete_path(runtime, &self.ctx().settings.delivered_path(&entry_point))?;
        }
        delete_path(runtime, &self.meta_folder())?;

        Ok(if self.ctx().dryrun {
            format!("Would uninstall {}", self.name)
        } else {
            format!("Uninstalled {}", self.name)
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::process::RunResult;
    use std::sync::Mutex;

    /// Index client answering from a fixed table.
    pub struct FixedIndex(pub Vec<(&'static str, &'static str)>);

    #[async_trait::async_trait]
    impl IndexClient for FixedIndex {
        async fn latest_version(&self, _index: &str, name: &str) -> Result<Option<String>> {
            Ok(self
                .0
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.to_string()))
        }
    }

    /// Process runner recording invocations and answering with a canned result.
    #[derive(Default)]
    pub struct RecordingRunner {
        pub calls: Mutex<Vec<String>>,
        pub fail_with: Option<String>,
    }

    impl RecordingRunner {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProcessRunner for RecordingRunner {
        fn run(&self, program: &Path, args: &[String]) -> Result<RunResult> {
            self.calls.lock().unwrap().push(describe(program, args));
            Ok(match &self.fail_with {
                Some(stderr) => RunResult::failure(1, stderr.clone()),
                None => RunResult::success(""),
            })
        }

        fn which(&self, program: &str) -> Option<PathBuf> {
            Some(PathBuf::from("/usr/bin").join(program))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{FixedIndex, RecordingRunner};
    use super::*;
    use crate::config::{ConfigFile, Overrides, Settings};
    use crate::index::MockIndexClient;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    fn context(base: &Path, file: ConfigFile) -> Context {
        Context::new(Settings::with_file(base, file), false, "/usr/local/bin/tooldrop")
    }

    #[test]
    fn test_render() {
        assert_eq!(
            render("{meta}/{name}-{version}", Path::new("/b/.tooldrop/foo"), "foo-cli", "1.0"),
            "/b/.tooldrop/foo/foo-cli-1.0"
        );
        assert_eq!(render("{name}", Path::new("/m"), "foo", "1.0"), "foo");
    }

    #[test]
    fn test_registry() {
        let registry = PackagerRegistry::new();
        assert_eq!(registry.names(), vec!["pex", "venv"]);
        assert_eq!(registry.get("pex").unwrap().name(), "pex");
        let err = registry.get("conda").err().unwrap();
        assert_eq!(err.to_string(), "Unknown packager 'conda'");
    }

    #[tokio::test]
    async fn test_refresh_desired_from_pin() {
        let dir = tempdir().unwrap();
        let file: ConfigFile = serde_json::from_str(
            r#"{"channel": "stable", "channels": {"stable": {"foo": "2.0"}}}"#,
        )
        .unwrap();
        let ctx = context(dir.path(), file);
        let runtime = RealRuntime;
        let runner = RecordingRunner::default();
        let mut index = MockIndexClient::new();
        index.expect_latest_version().never();
        let deliveries = DeliveryRegistry::new();
        let services = Services {
            ctx: &ctx,
            runtime: &runtime,
            runner: &runner,
            index: &index,
            deliveries: &deliveries,
        };

        let mut pkg = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();
        pkg.refresh_desired().await;
        assert_eq!(pkg.desired.version, "2.0");
        assert_eq!(pkg.desired.channel, "stable");
        assert!(pkg.desired.source.ends_with("channels.stable.foo"));
        assert_eq!(pkg.desired.packager, "venv");

        // Other packages on the same channel have no pin
        let mut other = Packager::for_package(services, &PackagerRegistry::new(), "bar").unwrap();
        other.refresh_desired().await;
        assert_eq!(
            other.desired.problem.as_deref(),
            Some("can't determine stable version")
        );
    }

    #[tokio::test]
    async fn test_refresh_latest_uses_cache() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), ConfigFile::default());
        let runtime = RealRuntime;
        let runner = RecordingRunner::default();
        let mut index = MockIndexClient::new();
        index
            .expect_latest_version()
            .times(1)
            .returning(|_, _| Ok(Some("1.0".to_string())));
        let deliveries = DeliveryRegistry::new();
        let services = Services {
            ctx: &ctx,
            runtime: &runtime,
            runner: &runner,
            index: &index,
            deliveries: &deliveries,
        };

        let mut pkg = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();
        pkg.refresh_latest().await;
        assert_eq!(pkg.latest.version, "1.0");
        assert!(MetaRole::Latest.path(&ctx.settings, "foo").exists());

        // Second query within the check delay is answered from .latest.json
        let mut again = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();
        again.refresh_latest().await;
        assert_eq!(again.latest.version, "1.0");
    }

    #[tokio::test]
    async fn test_refresh_latest_problems() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), ConfigFile::default());
        let runtime = RealRuntime;
        let runner = RecordingRunner::default();
        let mut index = MockIndexClient::new();
        index.expect_latest_version().returning(|_, name| {
            if name == "missing" {
                Ok(None)
            } else {
                Err(anyhow!("connection refused"))
            }
        });
        let deliveries = DeliveryRegistry::new();
        let services = Services {
            ctx: &ctx,
            runtime: &runtime,
            runner: &runner,
            index: &index,
            deliveries: &deliveries,
        };
        let registry = PackagerRegistry::new();

        let mut pkg = Packager::for_package(services, &registry, "missing").unwrap();
        pkg.refresh_desired().await;
        assert_eq!(
            pkg.desired.problem.as_deref(),
            Some("can't find missing on https://pypi.org/simple")
        );

        let mut pkg = Packager::for_package(services, &registry, "foo").unwrap();
        pkg.refresh_latest().await;
        assert_eq!(
            pkg.latest.problem.as_deref(),
            Some("can't determine latest version from https://pypi.org/simple: connection refused")
        );
        assert!(!MetaRole::Latest.path(&ctx.settings, "foo").exists());
    }

    #[tokio::test]
    async fn test_install_fails_on_invalid_desired() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), ConfigFile::default());
        let runtime = RealRuntime;
        let runner = RecordingRunner::default();
        let index = FixedIndex(vec![]);
        let deliveries = DeliveryRegistry::new();
        let services = Services {
            ctx: &ctx,
            runtime: &runtime,
            runner: &runner,
            index: &index,
            deliveries: &deliveries,
        };

        let mut pkg = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();
        let err = pkg.install(false).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't install foo: can't find foo on https://pypi.org/simple"
        );
        assert!(runner.calls().is_empty());
        assert!(!pkg.lock_path().exists());
    }

    #[tokio::test]
    async fn test_install_reports_lock_contention() {
        let dir = tempdir().unwrap();
        let file: ConfigFile = serde_json::from_str(r#"{"install_timeout": 0}"#).unwrap();
        let ctx = context(dir.path(), file);
        let runtime = RealRuntime;
        let runner = RecordingRunner::default();
        let index = FixedIndex(vec![("foo", "1.0")]);
        let deliveries = DeliveryRegistry::new();
        let services = Services {
            ctx: &ctx,
            runtime: &runtime,
            runner: &runner,
            index: &index,
            deliveries: &deliveries,
        };

        let mut pkg = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();
        let lock_path = pkg.lock_path();
        std::fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
        std::fs::write(&lock_path, format!("{}\nother\n", std::process::id())).unwrap();

        let err = pkg.install(false).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "foo is currently being installed by another process (pid {}). If that is incorrect, please delete {}",
                std::process::id(),
                lock_path.display()
            )
        );
        assert!(lock_path.exists());
    }

    #[test]
    fn test_required_entry_points() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), ConfigFile::default());
        let runtime = RealRuntime;
        let runner = RecordingRunner::default();
        let index = FixedIndex(vec![]);
        let deliveries = DeliveryRegistry::new();
        let services = Services {
            ctx: &ctx,
            runtime: &runtime,
            runner: &runner,
            index: &index,
            deliveries: &deliveries,
        };
        let pkg = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();

        let err = pkg.required_entry_points().unwrap_err();
        assert_eq!(
            err.to_string(),
            "'foo' is not a CLI, it has no console_scripts entry points"
        );

        let mut dry = ctx.clone();
        dry.dryrun = true;
        let services = Services { ctx: &dry, ..services };
        let pkg = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();
        assert_eq!(pkg.required_entry_points().unwrap(), vec!["foo"]);
    }

    #[test]
    fn test_package_from_source_folder() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), ConfigFile::default());
        let runtime = RealRuntime;
        let runner = RecordingRunner::default();
        let index = FixedIndex(vec![]);
        let deliveries = DeliveryRegistry::new();
        let services = Services {
            ctx: &ctx,
            runtime: &runtime,
            runner: &runner,
            index: &index,
            deliveries: &deliveries,
        };
        let mut pkg = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();

        let err = pkg.package(None, dir.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Need either source_folder or version in order to package"
        );

        let source = dir.path().join("src");
        std::fs::create_dir_all(&source).unwrap();
        pkg.source_folder = Some(source.clone());
        let err = pkg.package(None, dir.path()).unwrap_err();
        assert_eq!(err.to_string(), format!("No setup.py in {}", source.display()));

        // setup.py present, but the version query prints nothing
        std::fs::write(source.join("setup.py"), "").unwrap();
        let err = pkg.package(None, dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("Could not determine version from"));
    }

    #[test]
    fn test_pip_failure_reports_stderr() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), ConfigFile::default());
        let ctx = Context {
            settings: ctx.settings.with_overrides(Overrides {
                packager: Some("pex".into()),
                ..Default::default()
            }),
            ..ctx
        };
        let runtime = RealRuntime;
        let runner = RecordingRunner {
            fail_with: Some("ERROR: No matching distribution found for foo==9.9".into()),
            ..Default::default()
        };
        let index = FixedIndex(vec![]);
        let deliveries = DeliveryRegistry::new();
        let services = Services {
            ctx: &ctx,
            runtime: &runtime,
            runner: &runner,
            index: &index,
            deliveries: &deliveries,
        };
        let mut pkg = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();
        let err = pkg.package(Some("9.9"), dir.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ERROR: No matching distribution found for foo==9.9"
        );
        assert!(runner.calls()[0].contains("-m pip wheel"));
    }

    #[test]
    fn test_pip_wheel_starts_from_empty_build_folder() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), ConfigFile::default());
        let runtime = RealRuntime;
        let runner = RecordingRunner::default();
        let index = FixedIndex(vec![]);
        let deliveries = DeliveryRegistry::new();
        let services = Services {
            ctx: &ctx,
            runtime: &runtime,
            runner: &runner,
            index: &index,
            deliveries: &deliveries,
        };
        let pkg = Packager::for_package(services, &PackagerRegistry::new(), "foo").unwrap();
        std::fs::create_dir_all(&pkg.build_folder).unwrap();
        let old_wheel = pkg.build_folder.join("foo-1.0-py3-none-any.whl");
        std::fs::write(&old_wheel, "old").unwrap();

        pkg.pip_wheel("2.0").unwrap();
        assert!(pkg.build_folder.is_dir());
        assert!(!old_wheel.exists());
        assert!(runner.calls()[0].ends_with("foo==2.0"));
    }
}
