use anyhow::Result;

use super::{Delivery, DeliveryRequest};
use crate::config::Context;
use crate::runtime::Runtime;

/// Deliver a plain executable copy of the source.
pub struct CopyDelivery;

impl Delivery for CopyDelivery {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn place(&self, runtime: &dyn Runtime, _ctx: &Context, req: &DeliveryRequest<'_>) -> Result<()> {
        runtime.copy(req.source, req.target)?;
        runtime.set_permissions(req.target, 0o755)
    }
}
