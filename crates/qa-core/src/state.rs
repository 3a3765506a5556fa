//! Persisted coordinator state
//!
//! [`WorkflowState`] is saved as the suite's opaque `agent_state` at the end
//! of every run and loaded at the start of the next one, so a multi-turn flow
//! resumes where it stopped instead of restarting from fetch.
//!
//! # Architecture
//!
//! ```text
//! inbound message ──classify──► Intent ──route──► first role of the run
//!                                                  │
//! planner turns ◄── next_planner_step(state) ◄─────┘
//! ```

use crate::intent::{GenerationRequest, Intent, Topic};
use crate::outcome::QuestionKind;
use crate::roles::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress of the suite through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing done yet (or new documents requested)
    #[default]
    New,
    /// Documents fetched into the suite
    Fetched,
    /// Gap analysis ran and found nothing blocking
    GapsChecked,
    /// Preview accepted; extraction is next
    Confirmed,
    /// User chose test cases straight from documents
    DirectApproved,
    /// Requirements stored; waiting for feedback
    Extracted,
    /// User asked to continue after extraction
    ExtractionApproved,
    /// Test design stored
    Designed,
    /// Viewpoints stored
    ViewpointsReady,
    /// Test cases written or edited
    Written,
}

/// Question the coordinator is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuestion {
    /// Question tag
    pub kind: QuestionKind,
    /// Role that asked
    pub asked_by: Role,
    /// Question text
    pub message: String,
}

/// Message left for the planner by routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbox {
    /// Answer a question about stored artifacts
    Question {
        /// Topic
        topic: Topic,
        /// Question text
        text: String,
    },
    /// The user declined to go on
    Declined,
}

/// One transcript line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// `user` or a role name
    pub speaker: String,
    /// Text
    pub content: String,
    /// When it was said
    pub at: DateTime<Utc>,
}

/// What the planner does on its turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerStep {
    /// Answer a question from stored artifacts, then stop
    Answer(Topic, String),
    /// Stop with a short message
    Stop(String),
    /// Pass control to another role
    Handoff(Role),
    /// Run gap analysis on the fetched documents
    CheckGaps,
    /// Ask whether to extract requirements before writing cases
    AskQuality,
    /// Preview the documents and ask for confirmation
    Preview,
    /// Ask which testing focus to use
    AskTestingType,
    /// Report what the writer did, then stop
    Summarize,
}

/// Coordinator state for one suite
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowState {
    /// Pipeline progress
    pub stage: Stage,
    /// Accumulated generation parameters
    pub request: GenerationRequest,
    /// Question awaiting an answer
    pub pending: Option<PendingQuestion>,
    /// Role whose last turn failed; an affirmative reply retries it
    pub halted: Option<Role>,
    /// Edit instruction awaiting the writer
    pub edit: Option<String>,
    /// Message for the planner's next turn
    pub inbox: Option<Inbox>,
    /// Summary of the writer's last result
    pub last_summary: Option<String>,
    /// Recent conversation, oldest first
    pub transcript: Vec<TranscriptEntry>,
}

impl WorkflowState {
    /// Fresh state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transcript line, keeping at most `limit` lines
    pub fn remember(&mut self, speaker: impl Into<String>, content: impl Into<String>, limit: usize) {
        self.transcript.push(TranscriptEntry {
            speaker: speaker.into(),
            content: content.into(),
            at: Utc::now(),
        });
        if self.transcript.len() > limit {
            let excess = self.transcript.len() - limit;
            self.transcript.drain(..excess);
        }
    }

    /// Apply an inbound intent and pick the role that acts first
    ///
    /// Edit requests go straight to the writer whatever the stage. An
    /// affirmative reply with nothing pending hands back to a halted role.
    pub fn route(&mut self, intent: Intent) -> Role {
        let pending = self.pending.take();
        self.inbox = None;
        match intent {
            Intent::Edit { instruction } => {
                self.edit = Some(instruction);
                self.halted = None;
                Role::Writer
            }
            Intent::Question { topic, text } => {
                self.pending = pending;
                self.inbox = Some(Inbox::Question { topic, text });
                Role::Planner
            }
            Intent::Generate(request) => {
                self.halted = None;
                self.edit = None;
                self.merge_request(request);
                Role::Planner
            }
            reply @ (Intent::Affirm | Intent::Continue | Intent::Decline) => match pending {
                Some(question) => {
                    self.answer(question.kind, &reply);
                    Role::Planner
                }
                None => match (reply, self.halted.take()) {
                    (Intent::Decline, _) => {
                        self.inbox = Some(Inbox::Declined);
                        Role::Planner
                    }
                    (_, Some(role)) => role,
                    (_, None) => Role::Planner,
                },
            },
        }
    }

    fn merge_request(&mut self, request: GenerationRequest) {
        if !request.doc_names.is_empty() {
            self.request = GenerationRequest::default();
            self.request.doc_names = request.doc_names;
            self.stage = Stage::New;
            self.last_summary = None;
        }
        if request.testing_type.is_some() {
            self.request.testing_type = request.testing_type;
        }
        if request.req_code.is_some() {
            self.request.req_code = request.req_code;
        }
        self.request.direct |= request.direct;
    }

    fn answer(&mut self, kind: QuestionKind, reply: &Intent) {
        let proceed = !matches!(reply, Intent::Decline);
        if !proceed {
            self.inbox = Some(Inbox::Declined);
            return;
        }
        match kind {
            QuestionKind::QualityConfirmation => {
                if matches!(reply, Intent::Continue) {
                    self.stage = Stage::DirectApproved;
                } else {
                    self.request.direct = false;
                }
            }
            QuestionKind::SampleConfirmation => self.stage = Stage::Confirmed,
            QuestionKind::RequirementsFeedback => self.stage = Stage::ExtractionApproved,
            QuestionKind::RequirementsSampleOffer | QuestionKind::TestcasesSampleOffer => {
                if self.stage == Stage::Written {
                    self.stage = Stage::GapsChecked;
                }
            }
            // A bare "yes" does not name a focus; the planner asks again
            QuestionKind::TestingTypeChoice => {}
        }
    }

    /// Decide the planner's next step from the current state
    #[must_use]
    pub fn next_planner_step(&self) -> PlannerStep {
        match &self.inbox {
            Some(Inbox::Declined) => {
                return PlannerStep::Stop(
                    "Okay, stopping here. Send a new request when you are ready.".to_string(),
                )
            }
            Some(Inbox::Question { topic, text }) => return PlannerStep::Answer(*topic, text.clone()),
            None => {}
        }
        match self.stage {
            Stage::New if !self.request.doc_names.is_empty() => PlannerStep::Handoff(Role::Fetcher),
            Stage::New | Stage::Fetched => PlannerStep::CheckGaps,
            Stage::GapsChecked if self.request.direct => PlannerStep::AskQuality,
            Stage::GapsChecked => PlannerStep::Preview,
            Stage::Confirmed => PlannerStep::Handoff(Role::Extractor),
            Stage::DirectApproved | Stage::ViewpointsReady => PlannerStep::Handoff(Role::Writer),
            Stage::Extracted | Stage::ExtractionApproved => {
                if self.request.req_code.is_some() {
                    PlannerStep::Handoff(Role::Writer)
                } else if self.request.testing_type.is_some() {
                    PlannerStep::Handoff(Role::Designer)
                } else {
                    PlannerStep::AskTestingType
                }
            }
            Stage::Designed => PlannerStep::Handoff(Role::Checklist),
            Stage::Written => PlannerStep::Summarize,
        }
    }
}
