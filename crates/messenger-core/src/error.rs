use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::StreamState;

/// Broad error category used for retry decisions and consumer-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network or HTTP-level failure. Retried by a running stream.
    Transport,
    /// Throttled by the backend.
    RateLimited,
    /// Session is no longer authorized.
    Auth,
    /// Response body had an unexpected or malformed shape. Retried by a running stream.
    Parse,
    /// Handshake or discovery failed before streaming began. Fatal.
    Initialization,
    /// Invalid input or configuration.
    Config,
    /// Invariant break inside the client.
    Internal,
}

/// Stable error payload recorded by streams and paginators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct MessengerError {
    /// High-level error category.
    pub category: ErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl MessengerError {
    /// Construct a new error.
    pub fn new(
        category: ErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a response-shape error.
    pub fn parse(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Parse, code, message)
    }

    /// Re-tag an error raised during the handshake as fatal.
    ///
    /// The original category is kept in the message so the cause stays visible.
    pub fn initialization(stage: &str, source: MessengerError) -> Self {
        Self::new(
            ErrorCategory::Initialization,
            format!("{stage}_failed"),
            format!("{stage}: {source}"),
        )
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: StreamState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while stream is in state {current:?}"),
        )
    }
}

/// Failure reported by a request port.
///
/// `Cancelled` is a signal rather than a failure and is never recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The cancellation token fired before or during the call.
    #[error("request cancelled")]
    Cancelled,
    /// The backend answered with a non-success HTTP status.
    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },
    /// Connection, TLS or body read failure.
    #[error("network failure: {0}")]
    Network(String),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<TransportError> for MessengerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => {
                MessengerError::new(ErrorCategory::Internal, "cancelled", err.to_string())
            }
            TransportError::Status { status } => MessengerError::new(
                classify_http_status(status),
                "http_status",
                err.to_string(),
            ),
            TransportError::Network(_) => {
                MessengerError::new(ErrorCategory::Transport, "network_error", err.to_string())
            }
        }
    }
}

/// Map HTTP status codes to error categories.
pub fn classify_http_status(status: u16) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::Auth,
        408 | 429 => ErrorCategory::RateLimited,
        400..=499 => ErrorCategory::Config,
        500..=599 => ErrorCategory::Transport,
        _ => ErrorCategory::Internal,
    }
}
