//! Generation errors
//!
//! Every user-visible failure carries a short machine tag ([`ErrorKind`]) and
//! a one-line description. Raw backtraces never reach the conversation.

use qa_artifact::PersistenceFailure;
use qa_versioning::VersioningFailure;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure of the opaque text generation call
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("model endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Response had no text content
    #[error("empty completion")]
    Empty,

    /// Client misconfiguration (missing key, bad URL)
    #[error("client configuration error: {0}")]
    Config(String),
}

/// Errors raised while generating or persisting an artifact
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Required upstream artifact or document is missing
    #[error("{0}")]
    NoInputData(String),

    /// The model returned unparsable or malformed content
    #[error("invalid generation output: {0}")]
    InvalidOutput(String),

    /// A version could not be cut; nothing was written
    #[error(transparent)]
    Versioning(#[from] VersioningFailure),

    /// Writing or reading the primary artifact failed
    #[error(transparent)]
    Store(#[from] PersistenceFailure),

    /// The generation call failed
    #[error("generation call failed: {0}")]
    Client(#[from] ClientError),
}

/// Short machine-readable error tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// [`GenerationError::NoInputData`]
    NoInputData,
    /// [`GenerationError::InvalidOutput`]
    InvalidGenerationOutput,
    /// [`GenerationError::Versioning`]
    VersioningFailure,
    /// [`GenerationError::Store`]
    PersistenceFailure,
    /// [`GenerationError::Client`]
    GenerationCallFailed,
}

impl ErrorKind {
    /// Tag text
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoInputData => "no_input_data",
            Self::InvalidGenerationOutput => "invalid_generation_output",
            Self::VersioningFailure => "versioning_failure",
            Self::PersistenceFailure => "persistence_failure",
            Self::GenerationCallFailed => "generation_call_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GenerationError {
    /// Build a missing-input error
    #[must_use]
    pub fn no_input(message: impl Into<String>) -> Self {
        Self::NoInputData(message.into())
    }

    /// Build an invalid-output error
    #[must_use]
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Machine tag of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoInputData(_) => ErrorKind::NoInputData,
            Self::InvalidOutput(_) => ErrorKind::InvalidGenerationOutput,
            Self::Versioning(_) => ErrorKind::VersioningFailure,
            Self::Store(_) => ErrorKind::PersistenceFailure,
            Self::Client(_) => ErrorKind::GenerationCallFailed,
        }
    }

    /// Whether the user has to act before retrying makes sense
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::NoInputData(_))
    }

    /// `kind: description`, safe to show in the conversation
    #[must_use]
    pub fn user_message(&self) -> String {
        let mut text = self.to_string();
        if let Some(first_line) = text.lines().next() {
            text = first_line.to_string();
        }
        const MAX: usize = 300;
        if text.chars().count() > MAX {
            text = text.chars().take(MAX).collect::<String>() + "...";
        }
        format!("{}: {}", self.kind(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_artifact::SuiteId;

    #[test]
    fn kinds_map_to_tags() {
        assert_eq!(
            GenerationError::no_input("No .txt docs in suite").kind().as_str(),
            "no_input_data"
        );
        assert_eq!(
            GenerationError::invalid_output("expected array").kind().as_str(),
            "invalid_generation_output"
        );
        let versioning = GenerationError::from(VersioningFailure::SuiteNotFound(SuiteId::new("x")));
        assert_eq!(versioning.kind(), ErrorKind::VersioningFailure);
    }

    #[test]
    fn user_message_is_single_line_and_tagged() {
        let err = GenerationError::invalid_output("bad json\n  at line 3\n  trace...");
        assert_eq!(
            err.user_message(),
            "invalid_generation_output: invalid generation output: bad json"
        );
    }

    #[test]
    fn user_message_is_bounded() {
        let err = GenerationError::no_input("x".repeat(1000));
        assert!(err.user_message().len() < 350);
    }
}
