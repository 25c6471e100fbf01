use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use super::IndexClient;
use crate::http::{HttpClient, NonRetryableError};

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    version: String,
}

#[derive(Debug, Deserialize)]
struct Project {
    info: ProjectInfo,
}

/// Base of the JSON API for a `simple` index URL.
///
/// `https://pypi.org/simple/` becomes `https://pypi.org`.
pub fn api_url(index: &str) -> &str {
    let trimmed = index.trim_end_matches('/');
    trimmed.strip_suffix("/simple").unwrap_or(trimmed)
}

/// Index client speaking the PyPI JSON API.
pub struct PypiClient {
    http: HttpClient,
}

impl PypiClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IndexClient for PypiClient {
    #[tracing::instrument(skip(self))]
    async fn latest_version(&self, index: &str, name: &str) -> Result<Option<String>> {
        let url = format!("{}/pypi/{}/json", api_url(index), name);
        debug!("Querying {} for latest version of {}", url, name);

        match self.http.get_json::<Project>(&url).await {
            Ok(project) if project.info.version.is_empty() => Ok(None),
            Ok(project) => Ok(Some(project.info.version)),
            Err(e) if matches!(
                e.downcast_ref::<NonRetryableError>(),
                Some(NonRetryableError::NotFound(_))
            ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
