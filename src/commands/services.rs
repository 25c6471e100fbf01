//! Construction of the collaborators commands run against.

use anyhow::Result;
use reqwest::Client;

use crate::config::{SELF_NAME, tool_version};
use crate::http::HttpClient;
use crate::index::PypiClient;

/// HTTP client identifying itself as this tool.
pub fn build_http_client() -> Result<HttpClient> {
    let client = Client::builder()
        .user_agent(format!("{}/{}", SELF_NAME, tool_version()))
        .build()?;
    Ok(HttpClient::new(client))
}

pub fn build_index_client() -> Result<PypiClient> {
    Ok(PypiClient::new(build_http_client()?))
}
