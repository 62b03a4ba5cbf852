//! HTTP plumbing shared by the adapters
//!
//! Wraps `reqwest` with the error classification the retry controller relies
//! on: timeouts, refused connections, 429 and 5xx are [`Error::Network`];
//! other non-success statuses are rejections.

use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use crate::error::{Error, Result};

/// Build an HTTP client with the given request timeout
pub fn http_client(timeout_ms: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Node responses that mean "try again later"
pub fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    [
        "busy",
        "rate limit",
        "too many requests",
        "timeout",
        "timed out",
        "temporarily unavailable",
        "try again",
        "no_connection",
        "not_enough_effective_connection",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

/// Map a non-success HTTP status to an engine error
pub fn status_error(status: StatusCode, body: &str) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::Network(format!("HTTP {}: {}", status, body))
    } else if is_transient_message(body) {
        Error::rejected_transient(format!("HTTP {}: {}", status, body))
    } else {
        Error::rejected(format!("HTTP {}: {}", status, body))
    }
}

/// Pass successful responses through, turn everything else into an error
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_messages() {
        assert!(is_transient_message("SERVER_BUSY"));
        assert!(is_transient_message("Rate limit exceeded"));
        assert!(!is_transient_message("insufficient funds for gas * price + value"));
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            Error::Network(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            Error::Network(_)
        ));

        let err = status_error(StatusCode::BAD_REQUEST, "bad-txns-inputs-missingorspent");
        assert!(!err.is_retryable());
    }
}
