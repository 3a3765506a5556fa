//! Error types for the workflow coordinator

use crate::roles::Role;
use qa_artifact::PersistenceFailure;
use qa_generation::{ErrorKind, GenerationError};

/// Main coordinator error type
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// A role tried to pass control along an edge it does not have
    #[error("illegal hand-off from {from} to {to}")]
    IllegalHandoff {
        /// Role handing off
        from: Role,
        /// Requested target
        to: Role,
    },

    /// Role name not recognized
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// Persisted coordinator state could not be (de)serialized
    #[error("coordinator state error: {0}")]
    State(#[from] serde_json::Error),

    /// The run used up its turn budget
    #[error("turn limit of {0} reached")]
    TurnLimit(u32),

    /// A tool failed inside a role turn
    #[error(transparent)]
    Tool(#[from] GenerationError),

    /// Suite store failed while loading or saving coordinator state
    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoordinatorError {
    /// Short machine tag for turn events
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::IllegalHandoff { .. } => "illegal_handoff",
            Self::UnknownRole(_) => "unknown_role",
            Self::State(_) => "state_error",
            Self::TurnLimit(_) => "turn_limit",
            Self::Tool(e) => e.kind().as_str(),
            Self::Persistence(_) => "persistence_failure",
            Self::Config(_) => "config_error",
        }
    }

    /// Tool error kind, if a tool failed
    #[must_use]
    pub fn tool_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Tool(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Check if the user has to act before the halted role can retry
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::Tool(e) if e.requires_human())
    }

    /// One-line message safe to show in the conversation
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Tool(e) => e.user_message(),
            other => format!("{}: {}", other.tag(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_errors_keep_their_kind() {
        let err = CoordinatorError::from(GenerationError::no_input("No .txt docs in suite."));
        assert_eq!(err.tag(), "no_input_data");
        assert_eq!(err.tool_kind(), Some(ErrorKind::NoInputData));
        assert!(err.requires_human());
        assert_eq!(err.user_message(), "no_input_data: No .txt docs in suite.");
    }

    #[test]
    fn coordinator_errors_are_tagged() {
        let err = CoordinatorError::TurnLimit(32);
        assert_eq!(err.user_message(), "turn_limit: turn limit of 32 reached");
        assert!(!err.requires_human());
    }
}
