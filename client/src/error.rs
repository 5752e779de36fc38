//! Error taxonomy for outbound requests.
//!
//! Every failure path in this crate resolves to exactly one [`ClientError`]
//! variant; nothing is swallowed or downgraded to a log line.

use crate::deadline::DeadlineError;
use std::time::Duration;
use tether_types::TimeoutPolicy;
use thiserror::Error;

/// A retryable failure recorded during the attempt loop.
///
/// Carried inside [`ClientError::Exhausted`] so the caller can see what the
/// final attempt died of.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("server error {status}: {status_text}")]
    Status { status: u16, status_text: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// The deadline guard won the race against the operation.
    ///
    /// Always recoverable: the caller may retry at a higher layer or surface
    /// the failure to the user.
    #[error("request exceeded its {}ms deadline", limit.as_millis())]
    Timeout { limit: Duration },

    /// Terminal HTTP status (client error or other non-retryable answer).
    /// Never retried internally.
    #[error("request failed with status {status}: {status_text}")]
    Failed { status: u16, status_text: String },

    /// Retryable failures (5xx, transport, timeout) consumed the whole
    /// attempt budget.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: AttemptFailure },

    /// No endpoint registered under this service name. Raised at client
    /// construction, before any network activity.
    #[error("no endpoint registered for service {name:?}")]
    UnknownService { name: String },

    /// JSON encoding of a request body or decoding of a declared-JSON
    /// response body failed.
    #[error("JSON body error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A header the caller supplied cannot be put on the wire.
    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },

    /// Request dispatch failed outside the retry classification (for example
    /// while reading a successful response's body).
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

impl DeadlineError for ClientError {
    fn deadline_exceeded(policy: TimeoutPolicy) -> Self {
        ClientError::Timeout {
            limit: policy.duration(),
        }
    }

    fn is_timeout(&self) -> bool {
        match self {
            ClientError::Timeout { .. } => true,
            ClientError::Transport(error) => error.is_timeout(),
            ClientError::Exhausted {
                last: AttemptFailure::Transport(error),
                ..
            } => error.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AttemptFailure, ClientError};
    use crate::deadline::DeadlineError;
    use std::time::Duration;

    #[test]
    fn timeout_variant_classifies_as_timeout() {
        let error = ClientError::Timeout {
            limit: Duration::from_millis(50),
        };
        assert!(error.is_timeout());
    }

    #[test]
    fn terminal_status_does_not_classify_as_timeout() {
        let error = ClientError::Failed {
            status: 404,
            status_text: "Not Found".to_string(),
        };
        assert!(!error.is_timeout());
    }

    #[test]
    fn exhausted_on_server_error_does_not_classify_as_timeout() {
        let error = ClientError::Exhausted {
            attempts: 3,
            last: AttemptFailure::Status {
                status: 503,
                status_text: "Service Unavailable".to_string(),
            },
        };
        assert!(!error.is_timeout());
    }

    #[test]
    fn display_includes_deadline_millis() {
        let error = ClientError::Timeout {
            limit: Duration::from_millis(30_000),
        };
        assert!(error.to_string().contains("30000ms"));
    }
}
