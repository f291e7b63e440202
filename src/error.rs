//! Error types.
//!
//! - `AppError`: command-level failure carrying the process exit code
//!   (2 = configuration/IO, 4 = terminal/runtime).
//! - `SourceError`: why a single upstream fetch failed. It never crosses the
//!   fetch boundary; `data::SourceClient` turns it into a warning and an
//!   empty series.

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failure of one upstream source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// Connection, TLS or timeout failure. Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status. Retryable (the upstreams are flaky, not strict).
    #[error("HTTP status {0}")]
    Status(u16),

    /// Payload could not be decoded (JSON, spreadsheet, text encoding).
    #[error("decode error: {0}")]
    Decode(String),

    /// Payload decoded but lacks the expected columns/fields.
    #[error("schema error: {0}")]
    Schema(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transport(_) | SourceError::Status(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SourceError::Status(status.as_u16()),
            None => SourceError::Transport(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_retryable() {
        assert!(SourceError::Transport("timed out".into()).is_retryable());
        assert!(SourceError::Status(503).is_retryable());
        assert!(!SourceError::Decode("bad json".into()).is_retryable());
        assert!(!SourceError::Schema("missing column".into()).is_retryable());
    }

    #[test]
    fn app_error_displays_message_only() {
        let err = AppError::new(2, "Missing config file.");
        assert_eq!(err.to_string(), "Missing config file.");
        assert_eq!(err.exit_code(), 2);
    }
}
