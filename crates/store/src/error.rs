//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use sitenav_db::error::{Error as DbError, ErrorKind as DbErrorKind};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Each wraps the facade error that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ErrorKind {
    /// Refreshing a snapshot failed; the previous snapshot is still served.
    #[display("failed to load data: {_0}")]
    Load(DbErrorKind),
    /// A write-through change failed; the snapshot was not touched.
    #[display("failed to save changes: {_0}")]
    Write(DbErrorKind),
    #[display("authentication failed: {_0}")]
    Auth(DbErrorKind),
}

impl ErrorKind {
    #[track_caller]
    pub(crate) fn load(err: DbError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Load(inner))
    }

    #[track_caller]
    pub(crate) fn write(err: DbError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Write(inner))
    }

    #[track_caller]
    pub(crate) fn auth(err: DbError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Auth(inner))
    }

    /// The facade error underneath.
    pub fn source_kind(&self) -> &DbErrorKind {
        match self {
            Self::Load(kind) | Self::Write(kind) | Self::Auth(kind) => kind,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        self.source_kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitenav_remote::error::ErrorKind as RemoteErrorKind;

    #[test]
    fn test_wraps_facade_error() {
        let remote = exn::Exn::from(RemoteErrorKind::Network("reset".to_string()));
        let err = ErrorKind::load(DbErrorKind::remote(remote));
        assert!(err.is_retryable());
        assert!(matches!(err.source_kind(), DbErrorKind::Remote(RemoteErrorKind::Network(_))));
        assert!((*err).to_string().starts_with("failed to load data: remote error"));
    }
}
