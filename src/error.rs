//! Error types
//!
//! Closed error-kind taxonomy used for retry classification (spec §7) plus
//! the structural errors raised while ingesting a recording.

use thiserror::Error;

/// The closed set of runtime error kinds the retry/strategy layer reasons
/// about. Classification from a raw error message is done by
/// [`ErrorKind::classify`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    #[error("network error")]
    Network,
    #[error("selector error")]
    Selector,
    #[error("timeout error")]
    Timeout,
    #[error("http 403")]
    Http403,
    #[error("http 500")]
    Http500,
    #[error("other error")]
    Other,
}

impl ErrorKind {
    /// Classify an error by message substring, per spec §7.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            ErrorKind::Timeout
        } else if lower.contains("selector") || lower.contains("element") || lower.contains("not found") {
            ErrorKind::Selector
        } else if lower.contains("network") || lower.contains("connection") {
            ErrorKind::Network
        } else if lower.contains("403") {
            ErrorKind::Http403
        } else if lower.contains("500") {
            ErrorKind::Http500
        } else {
            ErrorKind::Other
        }
    }

    /// True when the message carries one of the non-retryable markers,
    /// independent of error kind (spec §4.7/§7).
    pub fn is_non_retryable_message(message: &str) -> bool {
        let lower = message.to_lowercase();
        lower.contains("not found") || lower.contains("invalid") || lower.contains("forbidden")
    }
}

/// Top-level error type for the automation core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid recording: {0}")]
    InvalidRecording(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("selector error: {0}")]
    Selector(String),

    #[error("timeout after {timeout_ms}ms: {context}")]
    Timeout { timeout_ms: u64, context: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::InvalidRecording(format!("json error: {}", err))
    }
}

/// A command failure carries the logical command name alongside the
/// classified kind (spec §7: "Every error carries the logical command that
/// failed").
#[derive(Debug, Clone)]
pub struct CommandError {
    pub command: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl CommandError {
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = ErrorKind::classify(&message);
        Self {
            command: command.into(),
            kind,
            message,
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed ({:?}): {}", self.command, self.kind, self.message)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_timeout() {
        assert_eq!(ErrorKind::classify("operation timed out"), ErrorKind::Timeout);
    }

    #[test]
    fn classifies_selector() {
        assert_eq!(ErrorKind::classify("element not found: #foo"), ErrorKind::Selector);
    }

    #[test]
    fn classifies_network() {
        assert_eq!(ErrorKind::classify("network connection reset"), ErrorKind::Network);
    }

    #[test]
    fn classifies_http_kinds() {
        assert_eq!(ErrorKind::classify("received 403 forbidden"), ErrorKind::Http403);
        assert_eq!(ErrorKind::classify("upstream 500 error"), ErrorKind::Http500);
    }

    #[test]
    fn classifies_other_as_fallback() {
        assert_eq!(ErrorKind::classify("something weird happened"), ErrorKind::Other);
    }

    #[test]
    fn non_retryable_markers() {
        assert!(ErrorKind::is_non_retryable_message("element not found"));
        assert!(ErrorKind::is_non_retryable_message("invalid selector syntax"));
        assert!(ErrorKind::is_non_retryable_message("request forbidden"));
        assert!(!ErrorKind::is_non_retryable_message("connection reset"));
    }
}
