//! Facade Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use sitenav_remote::error::{Error as RemoteError, ErrorKind as RemoteErrorKind};

/// A facade error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for facade operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ErrorKind {
    /// A remote client failed; the remote error is kept verbatim.
    #[display("remote error: {_0}")]
    Remote(RemoteErrorKind),
    /// A single record was requested and none matched.
    #[display("{_0} not found")]
    NotFound(#[error(not(source))] String),
    /// Another user already has this email address.
    #[display("email already used by another user: {_0}")]
    EmailTaken(#[error(not(source))] String),
    #[display("user not found: {_0}")]
    UserNotFound(#[error(not(source))] String),
    /// A record could not be converted to or from its remote shape.
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] String),
    /// A multi-step operation failed after `completed` steps were applied.
    /// Nothing is rolled back.
    #[display("{operation} failed after {completed} applied step(s)")]
    PartialFailure { operation: &'static str, completed: usize },
}

impl ErrorKind {
    /// Convert a remote client error into a facade error, preserving the
    /// remote crate's `Exn` frame as a child in its own error tree.
    #[track_caller]
    pub fn remote(err: RemoteError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Remote(inner))
    }

    /// The remote error code, if the failure came from the remote with one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Remote(kind) => kind.code(),
            _ => None,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(kind) => kind.is_retryable(),
            _ => false,
        }
    }
}

/// Wrap a failure of step `completed + 1` of a multi-step operation.
///
/// A failure of the very first step changed nothing and is returned as is.
#[track_caller]
pub(crate) fn partial(err: Error, operation: &'static str, completed: usize) -> Error {
    match completed {
        0 => err,
        _ => err.raise(ErrorKind::PartialFailure { operation, completed }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_is_kept_verbatim() {
        let remote = exn::Exn::from(RemoteErrorKind::remote("23505", "duplicate key"));
        let err = ErrorKind::remote(remote);
        assert_eq!(err.code(), Some("23505"));
        assert_eq!((*err).to_string(), "remote error: remote error [23505]: duplicate key");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_network_failures_are_retryable() {
        let err = ErrorKind::remote(exn::Exn::from(RemoteErrorKind::Network("reset".to_string())));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_partial_only_after_progress() {
        let first = partial(exn::Exn::from(ErrorKind::NotFound("x".to_string())), "op", 0);
        assert!(matches!(&*first, ErrorKind::NotFound(_)));
        let later = partial(exn::Exn::from(ErrorKind::NotFound("x".to_string())), "op", 2);
        assert_eq!(*later, ErrorKind::PartialFailure { operation: "op", completed: 2 });
    }
}
