//! Store errors

use crate::ids::SuiteId;
use crate::kind::ArtifactKind;
use thiserror::Error;

/// Errors raised by an [`ArtifactStore`](crate::ArtifactStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Content was not a JSON object
    #[error("artifact content must be a JSON object, found {found}")]
    NotAnObject {
        /// JSON type that was supplied
        found: &'static str,
    },

    /// Key kind and target table disagree
    #[error("key of kind {key} cannot be stored in table {table}")]
    KindMismatch {
        /// Kind implied by the key
        key: ArtifactKind,
        /// Table the caller addressed
        table: ArtifactKind,
    },

    /// Version numbers start at 1
    #[error("invalid version {0}: versions start at 1")]
    InvalidVersion(u32),

    /// Suite row does not exist
    #[error("suite not found: {0}")]
    SuiteNotFound(SuiteId),

    /// Content could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is unreachable or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether repeating the operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// A failed read or write against persistent state
///
/// Carries the operation name so callers can surface which step failed.
#[derive(Debug, Error)]
#[error("persistence failure during {operation}: {source}")]
pub struct PersistenceFailure {
    /// Operation that failed, e.g. `insert test_cases`
    pub operation: String,
    /// Underlying cause
    #[source]
    pub source: StoreError,
}

impl PersistenceFailure {
    /// Wrap a store error with the failing operation
    #[must_use]
    pub fn new(operation: impl Into<String>, source: StoreError) -> Self {
        Self {
            operation: operation.into(),
            source,
        }
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_retryable() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(!StoreError::InvalidVersion(0).is_retryable());
    }

    #[test]
    fn persistence_failure_names_operation() {
        let err = PersistenceFailure::new("insert requirements", StoreError::Unavailable("io".into()));
        assert_eq!(
            err.to_string(),
            "persistence failure during insert requirements: store unavailable: io"
        );
    }
}
