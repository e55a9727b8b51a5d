//! Error taxonomy of the query layer.

use crate::encoding::KeyError;
use crate::store::{Capability, OpenError, StoreError};
use std::fmt;

/// Error returned by scans, aggregation and the query facade.
///
/// Record-level decode failures never appear here: a corrupt record is
/// skipped and the scan goes on.
#[derive(Debug)]
pub enum QueryError {
    /// A caller-supplied parameter violates a precondition. Detected before
    /// any I/O.
    InvalidArgument(String),
    /// The store does not support the requested operation.
    Unsupported(Capability),
    /// The store failed; no partial result is returned.
    Store(StoreError),
    /// The store could not be opened.
    Open(OpenError),
}

impl QueryError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Unsupported(cap) => write!(f, "operation requires {cap}, which the store lacks"),
            Self::Store(e) => write!(f, "{e}"),
            Self::Open(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Open(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unsupported(cap) => Self::Unsupported(cap),
            other => Self::Store(other),
        }
    }
}

impl From<OpenError> for QueryError {
    fn from(err: OpenError) -> Self {
        Self::Open(err)
    }
}

impl From<KeyError> for QueryError {
    fn from(err: KeyError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
