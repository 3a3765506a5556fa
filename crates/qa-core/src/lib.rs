//! QA workflow coordinator
//!
//! Turns free-text messages into role turns over a suite: fetch documents,
//! check gaps, extract requirements, design, checklist and write test cases.
//!
//! # Core Concepts
//!
//! - **Role**: one stage of the workflow with a fixed set of hand-off targets
//! - **TurnOutcome**: tagged result of a turn (`Continue`, `AskUser`, `Terminate`)
//! - **WorkflowState**: persisted per suite so multi-turn flows resume
//!
//! # Architecture
//!
//! ```text
//! message ─► IntentClassifier ─► WorkflowState::route ─► first role
//!                                                          │
//!            ┌──────────── Continue(next) ◄── role turn ◄──┘
//!            │                                   │
//!            └──► next role ...        AskUser / Terminate ─► save state, idle
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use qa_core::prelude::*;
//!
//! let coordinator = WorkflowCoordinator::new(env, WorkflowConfig::default());
//! let mut turns = coordinator.run("Extract requirements from spec.txt", "suite-1");
//! while let Some(event) = turns.next().await {
//!     println!("[{}] {}", event.role, event.content);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod intent;
pub mod outcome;
pub mod roles;
pub mod state;
pub mod toolbox;

pub use config::{DocumentsConfig, PipelineConfig, WorkflowConfig};
pub use coordinator::WorkflowCoordinator;
pub use error::CoordinatorError;
pub use http::{router, ApiState, DEFAULT_SUITE};
pub use intent::{GenerationRequest, Intent, IntentClassifier, KeywordIntentClassifier, Topic};
pub use outcome::{QuestionKind, TurnEvent, TurnOutcome};
pub use roles::{validate_handoff, Role};
pub use state::{Inbox, PendingQuestion, PlannerStep, Stage, TranscriptEntry, WorkflowState};
pub use toolbox::{Toolbox, DIRECT_CASES_PER_DOC};

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{PipelineConfig, WorkflowConfig};
    pub use crate::coordinator::WorkflowCoordinator;
    pub use crate::error::CoordinatorError;
    pub use crate::outcome::{QuestionKind, TurnEvent, TurnOutcome};
    pub use crate::roles::Role;
    pub use crate::state::WorkflowState;
    pub use qa_artifact::SuiteId;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
