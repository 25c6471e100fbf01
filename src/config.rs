//! Layered settings: built-in defaults, `<meta>/config.json`, then command line flags.

use anyhow::{Context as _, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

pub const SELF_NAME: &str = "tooldrop";
pub const BASE_ENV: &str = "TOOLDROP_BASE";
pub const META_FOLDER: &str = ".tooldrop";
pub const LATEST_CHANNEL: &str = "latest";

pub const DEFAULT_INDEX: &str = "https://pypi.org/simple";
pub const DEFAULT_PACKAGER: &str = "venv";
pub const DEFAULT_DELIVERY: &str = "symlink";
pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_INSTALL_TIMEOUT: u64 = 1800;
pub const DEFAULT_VERSION_CHECK_DELAY: u64 = 600;

/// Version of this tool, stamped into every saved record.
pub fn tool_version() -> &'static str {
    env!("TOOLDROP_VERSION")
}

/// Settings that can be resolved per package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Index,
    Channel,
    Packager,
    Delivery,
    Python,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Key::Index => "index",
            Key::Channel => "channel",
            Key::Packager => "packager",
            Key::Delivery => "delivery",
            Key::Python => "python",
        };
        write!(f, "{}", name)
    }
}

/// A resolved value and the layer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub value: String,
    pub source: String,
}

impl Definition {
    fn new(value: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.value, self.source)
    }
}

/// Values given on the command line. These win over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub index: Option<String>,
    pub channel: Option<String>,
    pub packager: Option<String>,
    pub delivery: Option<String>,
    pub python: Option<String>,
}

impl Overrides {
    fn get(&self, key: Key) -> Option<&String> {
        match key {
            Key::Index => self.index.as_ref(),
            Key::Channel => self.channel.as_ref(),
            Key::Packager => self.packager.as_ref(),
            Key::Delivery => self.delivery.as_ref(),
            Key::Python => self.python.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageSettings {
    pub channel: Option<String>,
    pub packager: Option<String>,
    pub delivery: Option<String>,
    pub python: Option<String>,
}

/// Shape of `<meta>/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub index: Option<String>,
    pub channel: Option<String>,
    pub packager: Option<String>,
    pub delivery: Option<String>,
    pub python: Option<String>,
    pub install_timeout: Option<u64>,
    pub version_check_delay: Option<u64>,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageSettings>,
    /// `channels.<channel>.<package>` pins a version
    #[serde(default)]
    pub channels: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigFile {
    fn global(&self, key: Key) -> Option<&String> {
        match key {
            Key::Index => self.index.as_ref(),
            Key::Channel => self.channel.as_ref(),
            Key::Packager => self.packager.as_ref(),
            Key::Delivery => self.delivery.as_ref(),
            Key::Python => self.python.as_ref(),
        }
    }

    fn for_package(&self, key: Key, package: &str) -> Option<&String> {
        let settings = self.packages.get(package)?;
        match key {
            Key::Index => None,
            Key::Channel => settings.channel.as_ref(),
            Key::Packager => settings.packager.as_ref(),
            Key::Delivery => settings.delivery.as_ref(),
            Key::Python => settings.python.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base: PathBuf,
    pub meta: PathBuf,
    config_path: PathBuf,
    file: ConfigFile,
    cli: Overrides,
}

impl Settings {
    /// Determine the base folder and read `<base>/.tooldrop/config.json` if present.
    #[tracing::instrument(skip(runtime, cli))]
    pub fn load(runtime: &dyn Runtime, base: Option<PathBuf>, cli: Overrides) -> Result<Self> {
        let base = match base {
            Some(base) => base,
            None => default_base(runtime)?,
        };
        let meta = base.join(META_FOLDER);
        let config_path = meta.join("config.json");

        let file = if runtime.exists(&config_path) {
            debug!("Reading settings from {}", config_path.display());
            let content = runtime.read_to_string(&config_path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?
        } else {
            ConfigFile::default()
        };

        Ok(Self {
            base,
            meta,
            config_path,
            file,
            cli,
        })
    }

    /// Settings rooted at `base` with the given file contents and no CLI overrides.
    pub fn with_file(base: impl Into<PathBuf>, file: ConfigFile) -> Self {
        let base = base.into();
        let meta = base.join(META_FOLDER);
        Self {
            config_path: meta.join("config.json"),
            base,
            meta,
            file,
            cli: Overrides::default(),
        }
    }

    pub fn with_overrides(mut self, cli: Overrides) -> Self {
        self.cli = cli;
        self
    }

    /// Resolve `key`, optionally for a given package, reporting which layer it came from.
    pub fn resolved_value(&self, key: Key, package: Option<&str>) -> Definition {
        if let Some(value) = self.cli.get(key) {
            return Definition::new(value, format!("--{}", key));
        }
        if let Some(package) = package
            && let Some(value) = self.file.for_package(key, package)
        {
            return Definition::new(
                value,
                format!("{}: packages.{}.{}", self.config_path.display(), package, key),
            );
        }
        if let Some(value) = self.file.global(key) {
            return Definition::new(value, format!("{}: {}", self.config_path.display(), key));
        }
        let default = match key {
            Key::Index => DEFAULT_INDEX,
            Key::Channel => LATEST_CHANNEL,
            Key::Packager => DEFAULT_PACKAGER,
            Key::Delivery => DEFAULT_DELIVERY,
            Key::Python => DEFAULT_PYTHON,
        };
        Definition::new(default, "default")
    }

    pub fn index(&self) -> String {
        self.resolved_value(Key::Index, None).value
    }

    /// Version pinned via `channels.<channel>.<package>`, if any.
    pub fn channel_pin(&self, channel: &str, package: &str) -> Option<Definition> {
        let value = self.file.channels.get(channel)?.get(package)?;
        if value.is_empty() {
            return None;
        }
        Some(Definition::new(
            value,
            format!(
                "{}: channels.{}.{}",
                self.config_path.display(),
                channel,
                package
            ),
        ))
    }

    /// Seconds after which a half-finished install no longer blocks cleanup or locking.
    pub fn install_timeout(&self) -> u64 {
        self.file.install_timeout.unwrap_or(DEFAULT_INSTALL_TIMEOUT)
    }

    /// Seconds during which a resolved latest version is trusted without asking the index.
    pub fn version_check_delay(&self) -> u64 {
        self.file
            .version_check_delay
            .unwrap_or(DEFAULT_VERSION_CHECK_DELAY)
    }

    /// `<meta>/<package>`
    pub fn meta_folder(&self, package: &str) -> PathBuf {
        self.meta.join(package)
    }

    /// `<base>/<entry point>`
    pub fn delivered_path(&self, entry_point: &str) -> PathBuf {
        self.base.join(entry_point)
    }
}

fn default_base(runtime: &dyn Runtime) -> Result<PathBuf> {
    if let Ok(base) = runtime.env_var(BASE_ENV)
        && !base.is_empty()
    {
        return Ok(PathBuf::from(base));
    }
    match runtime.home_dir() {
        Some(home) => Ok(home.join(".local").join("bin")),
        None => bail!("Could not determine home directory, please use --base"),
    }
}

/// Explicit execution context threaded through every operation.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub dryrun: bool,
    /// Path to this tool's executable, referenced by generated wrappers.
    pub program: PathBuf,
}

impl Context {
    pub fn new(settings: Settings, dryrun: bool, program: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            dryrun,
            program: program.into(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.settings.base
    }
}
