use anyhow::Result;
use std::path::{Path, PathBuf};

use super::{Delivery, DeliveryRequest};
use crate::config::Context;
use crate::runtime::{Runtime, is_path_under, relative_symlink_path};

/// Deliver via a symlink, relative when the source lives next to the target.
pub struct SymlinkDelivery;

/// What the link at `target` should point to.
pub(crate) fn link_destination(target: &Path, source: &Path) -> PathBuf {
    if target.is_absolute()
        && source.is_absolute()
        && let Some(parent) = target.parent()
        && is_path_under(source, parent)
        && let Some(relative) = relative_symlink_path(target, source)
    {
        return relative;
    }
    source.to_path_buf()
}

impl Delivery for SymlinkDelivery {
    fn name(&self) -> &'static str {
        "symlink"
    }

    fn place(&self, runtime: &dyn Runtime, _ctx: &Context, req: &DeliveryRequest<'_>) -> Result<()> {
        runtime.symlink(&link_destination(req.target, req.source), req.target)
    }
}
