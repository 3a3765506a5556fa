//! Tagged results of a role turn

use crate::roles::Role;
use chrono::{DateTime, Utc};
use qa_artifact::SuiteId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-distinguishable tag of a question put to the human
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Extract requirements first, or write test cases straight from documents?
    QualityConfirmation,
    /// Requirements are stored; proceed to test cases?
    RequirementsFeedback,
    /// Which testing focus (unit, integration, system)?
    TestingTypeChoice,
    /// Preview shown; proceed with generation?
    SampleConfirmation,
    /// No requirements stored; generate a sample?
    RequirementsSampleOffer,
    /// No test cases stored; generate a sample?
    TestcasesSampleOffer,
}

impl QuestionKind {
    /// Tag text
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QualityConfirmation => "quality_confirmation",
            Self::RequirementsFeedback => "requirements_feedback",
            Self::TestingTypeChoice => "testing_type_choice",
            Self::SampleConfirmation => "sample_confirmation",
            Self::RequirementsSampleOffer => "requirements_sample_offer",
            Self::TestcasesSampleOffer => "testcases_sample_offer",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a role turn asks the coordinator to do next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Hand control to `next`
    Continue {
        /// Role to act next
        next: Role,
    },
    /// Ask the human and halt; the next inbound message answers it
    AskUser {
        /// Question tag
        question: QuestionKind,
        /// Question text
        message: String,
    },
    /// Stop the run
    Terminate,
}

impl TurnOutcome {
    /// Continue with `next`
    #[inline]
    #[must_use]
    pub fn handoff(next: Role) -> Self {
        Self::Continue { next }
    }

    /// Ask the human
    #[inline]
    #[must_use]
    pub fn ask(question: QuestionKind, message: impl Into<String>) -> Self {
        Self::AskUser {
            question,
            message: message.into(),
        }
    }

    /// Whether this outcome ends the run
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Continue { .. })
    }

    /// Next role, if control stays with the coordinator
    #[inline]
    #[must_use]
    pub fn next_role(&self) -> Option<Role> {
        match self {
            Self::Continue { next } => Some(*next),
            _ => None,
        }
    }
}

/// One role turn, as streamed to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEvent {
    /// Suite the run belongs to
    pub suite_id: SuiteId,
    /// 1-based turn number within the run
    pub turn: u32,
    /// Role that acted
    pub role: Role,
    /// Text produced by the turn
    pub content: String,
    /// Control decision
    pub outcome: TurnOutcome,
    /// Error tag when the turn failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the turn finished
    pub timestamp: DateTime<Utc>,
}

impl TurnEvent {
    /// Whether this is the last event of the run
    #[inline]
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.outcome.is_terminal()
    }
}
