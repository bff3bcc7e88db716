//! Errors raised while delivering a notification to its sink.
//!
//! These stay inside the delivery worker. They are logged and retried, never
//! returned to whoever issued the workflow command.

use thiserror::Error;

/// Why a sink could not take a notification.
///
/// [`RateLimited`](DeliveryError::RateLimited) carries the wait the endpoint
/// asked for and the worker honours it instead of its own backoff. The other
/// variants are retried with exponential backoff until `max_attempts`.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The receiving endpoint answered HTTP 429.
    /// `retry_after_ms` comes from the `Retry-After` header (seconds), 1000 if absent.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The endpoint answered with any other non-success status.
    /// `message` is the response body, or "unknown error" if it could not be read.
    #[error("delivery rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never got an HTTP answer (DNS, refused connection, timeout)
    /// or the client could not be built.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = DeliveryError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn rejected_display() {
        let err = DeliveryError::Rejected {
            status: 503,
            message: "maintenance".into(),
        };
        assert_eq!(err.to_string(), "delivery rejected (status 503): maintenance");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeliveryError>();
    }
}
