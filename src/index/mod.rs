//! Queries against a package index for the latest published version.

mod pypi;

use anyhow::Result;
use async_trait::async_trait;

pub use pypi::{PypiClient, api_url};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Latest version of `name` published on `index`.
    /// `Ok(None)` means the index does not know the package.
    async fn latest_version(&self, index: &str, name: &str) -> Result<Option<String>>;
}
