use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{Key, Settings, tool_version};
use crate::runtime::{Runtime, write_atomic};

/// Seconds since the epoch.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Which persisted record a [`VersionMeta`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaRole {
    Current,
    Latest,
}

impl MetaRole {
    pub fn file_name(self) -> &'static str {
        match self {
            MetaRole::Current => ".current.json",
            MetaRole::Latest => ".latest.json",
        }
    }

    /// `<meta>/<name>/.<role>.json`
    pub fn path(self, settings: &Settings, name: &str) -> PathBuf {
        settings.meta_folder(name).join(self.file_name())
    }
}

/// A resolved version of a package, plus where it came from and how it was installed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct VersionMeta {
    #[serde(skip)]
    pub name: String,
    #[serde(skip)]
    pub problem: Option<String>,

    pub version: String,
    /// Channel through which the version was determined
    pub channel: String,
    /// Index URL or config definition the version came from
    pub source: String,

    pub packager: String,
    pub delivery: String,
    pub python: String,

    /// Version of tooldrop that wrote this record
    pub tooldrop: String,
    /// Epoch seconds when the version was determined
    pub timestamp: i64,
}

/// The live packager/delivery/python identifiers for a package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackagerInfo {
    pub packager: String,
    pub delivery: String,
    pub python: String,
}

impl PackagerInfo {
    pub fn resolve(settings: &Settings, name: &str) -> Self {
        Self {
            packager: settings.resolved_value(Key::Packager, Some(name)).value,
            delivery: settings.resolved_value(Key::Delivery, Some(name)).value,
            python: settings.resolved_value(Key::Python, Some(name)).value,
        }
    }
}

/// One input to [`VersionMeta::merged`].
#[derive(Debug, Clone)]
pub enum MetaSource<'a> {
    Meta(&'a VersionMeta),
    Packager(PackagerInfo),
}

fn overwrite_non_empty(field: &mut String, value: &str) {
    if !value.is_empty() {
        *field = value.to_string();
    }
}

impl VersionMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn valid(&self) -> bool {
        !self.version.is_empty() && self.problem.is_none()
    }

    /// Same version installed the same way. Channel, source and delivery do not matter.
    pub fn equivalent(&self, other: &VersionMeta) -> bool {
        self.version == other.version && self.packager == other.packager
    }

    /// Valid and determined less than `delay` seconds before `now`.
    /// Records without a timestamp stay valid as long as they are valid.
    pub fn still_valid_at(&self, now: i64, delay: u64) -> bool {
        if !self.valid() || self.timestamp == 0 {
            return self.valid();
        }
        now - self.timestamp < delay as i64
    }

    pub fn still_valid(&self, delay: u64) -> bool {
        self.still_valid_at(now_epoch(), delay)
    }

    pub fn set_version(&mut self, version: &str, source: &str, channel: &str) {
        self.version = version.to_string();
        self.source = source.to_string();
        self.channel = channel.to_string();
        self.problem = None;
        self.tooldrop = tool_version().to_string();
        self.timestamp = now_epoch();
    }

    pub fn invalidate(&mut self, problem: impl Into<String>) {
        self.problem = Some(problem.into());
        self.version.clear();
    }

    /// Apply `sources` in order on top of a copy of `self`.
    ///
    /// A [`MetaSource::Meta`] always carries over problem, version, channel,
    /// source and timestamp, but only non-empty packager/delivery/python.
    /// A [`MetaSource::Packager`] overwrites packager/delivery/python where non-empty.
    pub fn merged(&self, sources: &[MetaSource<'_>]) -> VersionMeta {
        let mut result = self.clone();
        for source in sources {
            match source {
                MetaSource::Meta(other) => {
                    result.problem = other.problem.clone();
                    result.version = other.version.clone();
                    result.channel = other.channel.clone();
                    result.source = other.source.clone();
                    result.timestamp = other.timestamp;
                    overwrite_non_empty(&mut result.packager, &other.packager);
                    overwrite_non_empty(&mut result.delivery, &other.delivery);
                    overwrite_non_empty(&mut result.python, &other.python);
                }
                MetaSource::Packager(info) => {
                    overwrite_non_empty(&mut result.packager, &info.packager);
                    overwrite_non_empty(&mut result.delivery, &info.delivery);
                    overwrite_non_empty(&mut result.python, &info.python);
                    result.tooldrop = tool_version().to_string();
                }
            }
        }
        result
    }

    /// Human readable form, e.g. `foo 1.0 (as venv symlink, channel: latest)`.
    /// `index` is the configured index: a source equal to it is not worth showing.
    pub fn representation(&self, verbose: bool, note: Option<&str>, index: &str) -> String {
        let lead = match &self.problem {
            Some(problem) => format!("{}: {}", self.name, problem),
            None if !self.version.is_empty() => format!("{} {}", self.name, self.version),
            None => format!("{}: no version", self.name),
        };

        let mut notice = String::new();
        if verbose {
            let mut parts = Vec::new();
            if self.problem.is_none()
                && !self.version.is_empty()
                && (!self.packager.is_empty() || !self.delivery.is_empty())
            {
                let mut info = "as".to_string();
                for value in [&self.packager, &self.delivery] {
                    if !value.is_empty() {
                        info.push(' ');
                        info.push_str(value);
                    }
                }
                parts.push(info);
            }
            if !self.channel.is_empty() {
                parts.push(format!("channel: {}", self.channel));
            }
            if !parts.is_empty() && !self.source.is_empty() && self.source != index {
                parts.push(format!("source: {}", self.source));
            }
            if !parts.is_empty() {
                notice = format!(" ({})", parts.join(", "));
            }
        }
        if let Some(note) = note {
            notice = format!(" {}{}", note, notice);
        }

        format!("{}{}", lead, notice)
    }

    /// Load a persisted record. A missing or unreadable file yields an empty record.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime + ?Sized>(runtime: &R, name: &str, path: &Path) -> VersionMeta {
        if !runtime.exists(path) {
            return VersionMeta::new(name);
        }
        let parsed = runtime
            .read_to_string(path)
            .and_then(|content| serde_json::from_str::<VersionMeta>(&content).map_err(Into::into));
        match parsed {
            Ok(mut meta) => {
                meta.name = name.to_string();
                meta
            }
            Err(e) => {
                warn!("Ignoring invalid {}: {}", path.display(), e);
                VersionMeta::new(name)
            }
        }
    }

    pub fn save<R: Runtime + ?Sized>(&self, runtime: &R, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(runtime, path, content.as_bytes())
            .with_context(|| format!("Failed to save metadata for {}", self.name))
    }
}
