//! HTTP client with built-in retry logic and error handling.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable};

/// HTTP client with built-in retry logic for index queries.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Performs a GET request and deserializes the JSON response.
    /// Transient errors are retried; 4xx responses fail immediately with a [`NonRetryableError`].
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET JSON from {}...", url);

        self.with_retry("GET JSON", || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .context("Failed to send request")?;

            let response = response.error_for_status().map_err(check_retryable)?;

            response
                .json::<T>()
                .await
                .context("Failed to parse JSON response")
        })
        .await
    }

    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.downcast_ref::<NonRetryableError>().is_some() {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                            operation_name,
                            attempt,
                            MAX_RETRIES,
                            e,
                            self.retry_delay.as_millis()
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_client() -> HttpClient {
        HttpClient::new(Client::new()).with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/foo/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"info": {"version": "1.0"}}"#)
            .create_async()
            .await;

        let result: serde_json::Value = fast_client()
            .get_json(&format!("{}/pypi/foo/json", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result["info"]["version"], "1.0");
    }

    #[tokio::test]
    async fn test_get_json_not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/foo/json")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let result: Result<serde_json::Value> = fast_client()
            .get_json(&format!("{}/pypi/foo/json", server.url()))
            .await;

        mock.assert_async().await;
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<NonRetryableError>().is_some());
    }

    #[tokio::test]
    async fn test_get_json_server_error_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/foo/json")
            .with_status(502)
            .expect(MAX_RETRIES)
            .create_async()
            .await;

        let result: Result<serde_json::Value> = fast_client()
            .get_json(&format!("{}/pypi/foo/json", server.url()))
            .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_errors() {
        let client = fast_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = client
            .with_retry("test", || {
                let count = counter.clone();
                async move {
                    if count.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err::<&str, _>(anyhow::anyhow!("connection reset"))
                    } else {
                        Ok("1.0")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "1.0");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_attempts() {
        let client = fast_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = client
            .with_retry("test", || {
                let count = counter.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("connection timeout"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES);
    }
}
