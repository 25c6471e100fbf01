//! Delivery methods: how an entry point is exposed in the shared bin folder.
//!
//! Each method is registered under an identifier (`symlink`, `wrap`, `copy`)
//! in a [`DeliveryRegistry`] and selected per package through settings.

mod copy;
mod symlink;
mod wrap;

use anyhow::{Result, anyhow, bail};
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Context, Key, SELF_NAME};
use crate::runtime::{Runtime, delete_path};

pub use copy::CopyDelivery;
pub use symlink::SymlinkDelivery;
pub use wrap::{WRAPPER_MARKER, WrapDelivery, is_wrapper, last_check_path, wrapper_script};

/// One entry point to expose: `target` in the bin folder, backed by `source`.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryRequest<'a> {
    pub package: &'a str,
    pub target: &'a Path,
    pub source: &'a Path,
}

pub trait Delivery: Send + Sync {
    /// Identifier used in settings, also the verb used in messages.
    fn name(&self) -> &'static str;

    /// Put the entry point in place. `target` is known to be free and `source` to exist.
    fn place(&self, runtime: &dyn Runtime, ctx: &Context, req: &DeliveryRequest<'_>) -> Result<()>;

    /// Replace whatever is at `target` with a delivery of `source`.
    #[tracing::instrument(skip(self, runtime, ctx))]
    fn install(&self, runtime: &dyn Runtime, ctx: &Context, req: &DeliveryRequest<'_>) -> Result<()> {
        delete_path(runtime, req.target)?;

        if ctx.dryrun {
            info!(
                "Would {} {} -> {}",
                self.name(),
                req.target.display(),
                req.source.display()
            );
            return Ok(());
        }

        if !runtime.exists(req.source) {
            bail!(
                "Can't {} {}: {} does not exist",
                self.name(),
                req.target.display(),
                req.source.display()
            );
        }

        self.place(runtime, ctx, req).map_err(|e| {
            anyhow!(
                "Failed to {} {}: {:#}",
                self.name(),
                req.target.display(),
                e
            )
        })?;
        debug!(
            "Delivered {} -> {} ({})",
            req.target.display(),
            req.source.display(),
            self.name()
        );
        Ok(())
    }
}

/// Delivery methods by identifier.
pub struct DeliveryRegistry {
    methods: BTreeMap<&'static str, Arc<dyn Delivery>>,
}

impl DeliveryRegistry {
    pub fn empty() -> Self {
        Self {
            methods: BTreeMap::new(),
        }
    }

    /// Registry holding `symlink`, `wrap` and `copy`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SymlinkDelivery));
        registry.register(Arc::new(WrapDelivery));
        registry.register(Arc::new(CopyDelivery));
        registry
    }

    /// Register a method. A method with the same name is replaced.
    pub fn register(&mut self, method: Arc<dyn Delivery>) {
        self.methods.insert(method.name(), method);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Delivery>> {
        self.methods
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown delivery method '{}'", name))
    }

    /// Method configured for `package`.
    pub fn resolve(&self, ctx: &Context, package: &str) -> Result<Arc<dyn Delivery>> {
        let definition = ctx.settings.resolved_value(Key::Delivery, Some(package));
        self.get(&definition.value)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.methods.keys().copied().collect()
    }
}

impl Default for DeliveryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Make room for a delivery at `target`.
///
/// Symlinks and our own wrappers are removed. Anything else was put there by
/// someone else and is left alone with an error.
pub fn uninstall_existing(runtime: &dyn Runtime, target: &Path) -> Result<()> {
    if runtime.is_symlink(target) || (runtime.exists(target) && is_wrapper(runtime, target)) {
        return delete_path(runtime, target);
    }
    if runtime.exists(target) {
        bail!(
            "{} exists and was not installed by {}, please remove it first",
            target.display(),
            SELF_NAME
        );
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{ConfigFile, Context, Settings};
    use std::path::Path;

    pub fn context(base: &Path, dryrun: bool) -> Context {
        Context::new(
            Settings::with_file(base, ConfigFile::default()),
            dryrun,
            "/usr/local/bin/tooldrop",
        )
    }
}
