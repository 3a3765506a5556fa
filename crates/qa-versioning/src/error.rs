//! Versioning errors

use qa_artifact::{StoreError, SuiteId};
use thiserror::Error;

/// A version could not be cut
///
/// Dependent writes must be skipped when this is returned; nothing may be
/// written under a guessed version number.
#[derive(Debug, Error)]
pub enum VersioningFailure {
    /// Suite row does not exist
    #[error("suite not found: {0}")]
    SuiteNotFound(SuiteId),

    /// Suite state could not be read
    #[error("failed to read state of suite {suite}: {source}")]
    StateRead {
        /// Suite id
        suite: SuiteId,
        /// Underlying cause
        #[source]
        source: StoreError,
    },

    /// Suite state could not be written
    #[error("failed to write state of suite {suite}: {source}")]
    StateWrite {
        /// Suite id
        suite: SuiteId,
        /// Underlying cause
        #[source]
        source: StoreError,
    },

    /// Requested source version does not exist
    #[error("unknown source version {requested} (latest is {latest})")]
    UnknownSourceVersion {
        /// Version asked for
        requested: u32,
        /// Latest existing version
        latest: u32,
    },

    /// Other writers kept winning the compare-and-swap
    #[error("version counter of suite {suite} contended after {attempts} attempts")]
    Contention {
        /// Suite id
        suite: SuiteId,
        /// Attempts made
        attempts: u32,
    },
}

impl VersioningFailure {
    /// Whether a later retry may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Contention { .. } => true,
            Self::StateRead { source, .. } | Self::StateWrite { source, .. } => {
                source.is_retryable()
            }
            Self::SuiteNotFound(_) | Self::UnknownSourceVersion { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let contention = VersioningFailure::Contention {
            suite: SuiteId::new("s"),
            attempts: 3,
        };
        assert!(contention.is_retryable());
        assert!(!VersioningFailure::UnknownSourceVersion {
            requested: 9,
            latest: 2
        }
        .is_retryable());
        assert!(VersioningFailure::StateWrite {
            suite: SuiteId::new("s"),
            source: StoreError::Unavailable("timeout".into()),
        }
        .is_retryable());
    }
}
