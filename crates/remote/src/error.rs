//! Remote Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A remote client error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error code the table API uses when a single row was requested but zero
/// (or more than one) rows matched.
pub const NO_ROWS: &str = "PGRST116";
/// Error code for unique/primary key violations.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ErrorKind {
    /// The remote service answered with an error, carried verbatim.
    #[display("remote error [{code}]: {message}")]
    Remote { code: String, message: String },
    /// Connection-level failure (DNS, TLS, timeouts, ...).
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The remote answered with something we could not make sense of.
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// Object key is empty, contains NUL bytes or escapes the bucket root.
    #[display("invalid object key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    #[display("object not found: {_0}")]
    ObjectNotFound(#[error(not(source))] String),
    /// Upload without `upsert` hit an existing object.
    #[display("object already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// A user-tier operation needs a signed-in session.
    #[display("no active session")]
    Unauthenticated,
    /// The client implementation cannot express the requested query.
    #[display("unsupported: {_0}")]
    Unsupported(#[error(not(source))] String),
}

impl ErrorKind {
    /// Shorthand for constructing a [`Remote`](Self::Remote) error.
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote { code: code.into(), message: message.into() }
    }

    /// The provider's error code, if the remote answered with one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Remote { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns `true` for the in-band "no rows" signal of single-row queries.
    pub fn is_no_rows(&self) -> bool {
        self.code() == Some(NO_ROWS)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rows_detection() {
        assert!(ErrorKind::remote(NO_ROWS, "no rows").is_no_rows());
        assert!(!ErrorKind::remote(UNIQUE_VIOLATION, "duplicate key").is_no_rows());
        assert!(!ErrorKind::Network("reset".to_string()).is_no_rows());
    }

    #[test]
    fn test_display_carries_code_and_message() {
        let kind = ErrorKind::remote("42501", "permission denied for table sites");
        assert_eq!(kind.to_string(), "remote error [42501]: permission denied for table sites");
    }
}
