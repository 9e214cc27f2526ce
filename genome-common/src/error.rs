//! Error types for the Agent Genome Watcher.

use thiserror::Error;

/// Result type alias using the genome error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the discourse pipeline.
///
/// Most pipeline failures are recovered locally (rule-based fallback,
/// schema defaults, swallowed cache writes); this type is what crosses the
/// classification-backend boundary before that recovery happens.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Classification backend unreachable (connect, DNS, reset)
    #[error("External service error: {0}")]
    External(String),

    /// Classification backend answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Backend response could not be interpreted
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether retrying the same call might succeed.
    ///
    /// Rate limits and server-side statuses are; other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::External(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::WithContext { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(Error::External("connection reset".into()).is_retryable());
        assert!(Error::Http { status: 503, message: "overloaded".into() }.is_retryable());
        assert!(Error::Http { status: 429, message: "slow down".into() }.is_retryable());
        assert!(!Error::Http { status: 401, message: "bad key".into() }.is_retryable());
        assert!(!Error::Http { status: 400, message: "bad request".into() }.is_retryable());
        assert!(!Error::Malformed("no json".into()).is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::Timeout.with_context("classifying post p1");
        assert!(matches!(err, Error::WithContext { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "classifying post p1: Operation timed out");
    }

    #[test]
    fn test_result_ext_context() {
        let parsed: std::result::Result<serde_json::Value, serde_json::Error> =
            serde_json::from_str("{not json");
        let err = parsed.context("parsing backend body").unwrap_err();
        assert!(err.to_string().starts_with("parsing backend body: JSON error"));
    }
}
