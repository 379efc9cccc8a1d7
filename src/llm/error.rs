//! Decision-function failures

use std::fmt;
use thiserror::Error;

/// A failed model call. The orchestrator treats every kind as a system
/// error; the kind only shapes logs.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    Network,
    /// Request or decision exceeded its time bound
    Timeout,
    RateLimit,
    ServerError,
    Auth,
    InvalidRequest,
    /// Reply could not be decoded
    Unknown,
}

impl LlmErrorKind {
    /// Transient failures a client could try again later
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::ServerError
        )
    }
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate limited",
            Self::ServerError => "server error",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid request",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Timeout, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP status with the provider's error message
    pub fn from_status(status: u16, message: &str) -> Self {
        let kind = match status {
            401 | 403 => LlmErrorKind::Auth,
            429 => LlmErrorKind::RateLimit,
            400 | 404 | 422 => LlmErrorKind::InvalidRequest,
            408 => LlmErrorKind::Timeout,
            500..=599 => LlmErrorKind::ServerError,
            _ => LlmErrorKind::Unknown,
        };
        Self::new(kind, format!("HTTP {status}: {message}"))
    }
}
