//! Classification of index request failures into retryable and final ones.

use reqwest::StatusCode;

/// Maximum number of attempts for an index request.
pub const MAX_RETRIES: usize = 3;

/// Default delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Errors that will not go away by asking again.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 429
    RateLimited(String),
    /// HTTP 401
    AuthenticationFailed(String),
    /// HTTP 404: the index has no such project
    NotFound(String),
    /// HTTP 403
    Forbidden(String),
    /// Other 4xx
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::RateLimited(msg) => {
                write!(f, "Index is rate limiting requests: {}", msg)
            }
            NonRetryableError::AuthenticationFailed(msg) => {
                write!(f, "Index rejected credentials: {}", msg)
            }
            NonRetryableError::NotFound(msg) => write!(f, "Not found: {}", msg),
            NonRetryableError::Forbidden(msg) => write!(f, "Access forbidden: {}", msg),
            NonRetryableError::ClientError(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Returns Ok(()) when `error` is worth retrying.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        // Connection errors, timeouts
        return Ok(());
    };
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "index".to_string());

    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(url)),
        StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(url)),
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimited(url)),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(url)),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} from {}",
            s.as_u16(),
            url
        ))),
        _ => Ok(()),
    }
}

/// Maps an `error_for_status()` failure to an anyhow error, typed as
/// [`NonRetryableError`] when retrying is pointless.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}
