//! Workflow coordinator
//!
//! Runs one role per turn and streams a [`TurnEvent`] for each. A run starts
//! from the suite's persisted [`WorkflowState`], routes the inbound message
//! to the first role, then follows the tagged outcomes until one of them is
//! terminal.
//!
//! # Run lifecycle
//!
//! 1. Suite status becomes `chatting`; persisted state is loaded
//! 2. The message is classified and routed
//! 3. Roles act until a turn asks the user, terminates, emits the
//!    termination token, fails, or the turn budget runs out
//! 4. State is saved and the status returns to `idle` before the final
//!    event is yielded
//!
//! Status, state and audit writes are best-effort: failures are logged and
//! the run carries on.

use crate::config::WorkflowConfig;
use crate::error::CoordinatorError;
use crate::intent::{IntentClassifier, KeywordIntentClassifier, Topic};
use crate::outcome::{QuestionKind, TurnEvent, TurnOutcome};
use crate::roles::{validate_handoff, Role};
use crate::state::{PendingQuestion, PlannerStep, Stage, WorkflowState};
use crate::toolbox::Toolbox;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use qa_artifact::{PersistenceFailure, SuiteId};
use qa_generation::{Answer, BatchReport, EditReport, GenerationEnv, GenerationError, PreviewMode};
use qa_versioning::{AuditEvent, EventSink, SuiteStatus, SuiteStore};
use std::sync::Arc;

/// Text and control decision of one role turn
#[derive(Debug, Clone, PartialEq, Eq)]
struct Turn {
    content: String,
    outcome: TurnOutcome,
}

impl Turn {
    fn new(content: impl Into<String>, outcome: TurnOutcome) -> Self {
        Self {
            content: content.into(),
            outcome,
        }
    }

    fn handoff(content: impl Into<String>, next: Role) -> Self {
        Self::new(content, TurnOutcome::handoff(next))
    }

    fn ask(question: QuestionKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(message.clone(), TurnOutcome::ask(question, message))
    }

    fn terminate(content: impl Into<String>) -> Self {
        Self::new(content, TurnOutcome::Terminate)
    }
}

/// Drives roles over a suite and streams their turns
#[derive(Clone)]
pub struct WorkflowCoordinator {
    tools: Toolbox,
    suites: Arc<dyn SuiteStore>,
    events: Arc<dyn EventSink>,
    classifier: Arc<dyn IntentClassifier>,
    config: WorkflowConfig,
}

impl std::fmt::Debug for WorkflowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowCoordinator")
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkflowCoordinator {
    /// Create a coordinator over `env`, using its suite store and event sink
    #[must_use]
    pub fn new(env: GenerationEnv, config: WorkflowConfig) -> Self {
        let suites = env.versions().suites().clone();
        let events = env.versions().events().clone();
        Self {
            tools: Toolbox::new(env),
            suites,
            events,
            classifier: Arc::new(KeywordIntentClassifier::new()),
            config,
        }
    }

    /// Replace the inbound message classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Coordinator settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Persisted state of a suite; a suite without state starts fresh
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Persistence`] if the suite store fails and
    /// [`CoordinatorError::State`] if the stored blob does not parse
    pub async fn load_state(&self, suite_id: &SuiteId) -> Result<WorkflowState, CoordinatorError> {
        let suite = self
            .suites
            .load(suite_id)
            .await
            .map_err(|e| PersistenceFailure::new("load agent state", e))?;
        match suite.and_then(|s| s.state.agent_state) {
            Some(blob) => Ok(serde_json::from_value(blob)?),
            None => Ok(WorkflowState::default()),
        }
    }

    /// Persist the state of a suite
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Persistence`] if the suite store fails
    pub async fn save_state(&self, suite_id: &SuiteId, state: &WorkflowState) -> Result<(), CoordinatorError> {
        let blob = serde_json::to_value(state)?;
        self.suites
            .write_agent_state(suite_id, Some(blob))
            .await
            .map_err(|e| PersistenceFailure::new("save agent state", e))?;
        Ok(())
    }

    /// Handle one inbound message and stream the resulting role turns
    ///
    /// The stream ends after the first terminal event and stays ended if
    /// polled again. By the time that event is yielded the state is saved and
    /// the suite is idle again.
    pub fn run(&self, task: impl Into<String>, suite_id: impl Into<SuiteId>) -> BoxStream<'static, TurnEvent> {
        let run = Run {
            coordinator: self.clone(),
            suite_id: suite_id.into(),
            task: Some(task.into()),
            state: WorkflowState::default(),
            next: Role::Planner,
            turn: 0,
            finished: false,
        };
        stream::unfold(run, |mut run| async move {
            if run.finished {
                return None;
            }
            if let Some(task) = run.task.take() {
                run.start(task).await;
            }
            let event = run.step().await;
            if event.is_final() {
                run.finish().await;
            }
            Some((event, run))
        })
        .fuse()
        .boxed()
    }

    async fn set_status(&self, suite_id: &SuiteId, status: SuiteStatus) {
        if let Err(e) = self.suites.set_status(suite_id, status).await {
            tracing::warn!("Could not set {} to {}: {}", suite_id, status, e);
        }
    }

    async fn record(&self, suite_id: &SuiteId, event: AuditEvent) {
        if let Err(e) = self.events.record(suite_id, event).await {
            tracing::warn!("Audit event dropped for {}: {}", suite_id, e);
        }
    }
}

/// One in-flight run
struct Run {
    coordinator: WorkflowCoordinator,
    suite_id: SuiteId,
    task: Option<String>,
    state: WorkflowState,
    next: Role,
    turn: u32,
    finished: bool,
}

impl Run {
    fn tools(&self) -> &Toolbox {
        &self.coordinator.tools
    }

    fn config(&self) -> &WorkflowConfig {
        &self.coordinator.config
    }

    async fn start(&mut self, task: String) {
        let coordinator = &self.coordinator;
        coordinator.set_status(&self.suite_id, SuiteStatus::Chatting).await;
        self.state = match coordinator.load_state(&self.suite_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Starting {} from fresh state: {}", self.suite_id, e);
                WorkflowState::default()
            }
        };
        let intent = self.coordinator.classifier.classify(&task);
        self.next = self.state.route(intent.clone());
        tracing::info!("Run on {} starts at {} ({:?})", self.suite_id, self.next, intent);
        let limit = self.config().transcript_limit;
        self.state.remember("user", task, limit);
    }

    async fn finish(&mut self) {
        self.finished = true;
        if let Err(e) = self.coordinator.save_state(&self.suite_id, &self.state).await {
            tracing::warn!("Coordinator state for {} not saved: {}", self.suite_id, e);
        }
        self.coordinator.set_status(&self.suite_id, SuiteStatus::Idle).await;
    }

    async fn step(&mut self) -> TurnEvent {
        let role = self.next;
        self.turn += 1;

        let max_turns = self.config().max_turns_per_run;
        let (turn, error) = if self.turn > max_turns {
            self.state.halted = Some(role);
            let err = CoordinatorError::TurnLimit(max_turns);
            tracing::warn!("Run on {} stopped before {}: {}", self.suite_id, role, err);
            (Turn::terminate(err.user_message()), Some(err.tag().to_string()))
        } else {
            match self.play(role).await {
                Ok(turn) => self.check(role, turn),
                Err(err) => {
                    tracing::error!("{} failed on {}: {}", role, self.suite_id, err);
                    self.state.halted = Some(role);
                    (Turn::terminate(err.user_message()), Some(err.tag().to_string()))
                }
            }
        };

        match &turn.outcome {
            TurnOutcome::Continue { next } => {
                tracing::info!("Hand-off {} -> {} on {}", role, next, self.suite_id);
                self.next = *next;
            }
            TurnOutcome::AskUser { question, message } => {
                self.state.pending = Some(PendingQuestion {
                    kind: *question,
                    asked_by: role,
                    message: message.clone(),
                });
                self.coordinator
                    .record(
                        &self.suite_id,
                        AuditEvent::AskUser {
                            question: question.as_str().to_string(),
                            message: message.clone(),
                        },
                    )
                    .await;
            }
            TurnOutcome::Terminate => {}
        }

        let limit = self.config().transcript_limit;
        self.state.remember(role.as_str(), turn.content.clone(), limit);
        self.coordinator
            .record(
                &self.suite_id,
                AuditEvent::Turn {
                    role: role.as_str().to_string(),
                    content: turn.content.clone(),
                },
            )
            .await;

        TurnEvent {
            suite_id: self.suite_id.clone(),
            turn: self.turn,
            role,
            content: turn.content,
            outcome: turn.outcome,
            error,
            timestamp: Utc::now(),
        }
    }

    /// Apply the termination token and the hand-off edges to a finished turn
    fn check(&self, role: Role, turn: Turn) -> (Turn, Option<String>) {
        let token = self.config().termination_token.as_str();
        if !turn.outcome.is_terminal() && !token.is_empty() && turn.content.contains(token) {
            return (Turn::terminate(turn.content), None);
        }
        if let Some(next) = turn.outcome.next_role() {
            if let Err(err) = validate_handoff(role, next) {
                tracing::error!("{} on {}", err, self.suite_id);
                return (Turn::terminate(err.user_message()), Some(err.tag().to_string()));
            }
        }
        (turn, None)
    }

    async fn play(&mut self, role: Role) -> Result<Turn, CoordinatorError> {
        match role {
            Role::Planner => self.plan().await,
            Role::Fetcher => self.fetch().await,
            Role::Extractor => self.extract().await,
            Role::Designer => self.design().await,
            Role::Checklist => self.checklist().await,
            Role::Writer => self.write().await,
        }
    }

    async fn plan(&mut self) -> Result<Turn, CoordinatorError> {
        let step = self.state.next_planner_step();
        tracing::debug!("Planner step on {}: {:?}", self.suite_id, step);
        match step {
            PlannerStep::Answer(topic, question) => {
                self.state.inbox = None;
                match self.tools().answer(&self.suite_id, topic, &question).await? {
                    Answer::Answered(text) => Ok(Turn::terminate(text)),
                    Answer::NothingStored => Ok(match topic {
                        Topic::Requirements => Turn::ask(
                            QuestionKind::RequirementsSampleOffer,
                            "No requirements are stored for this suite yet. Generate a sample now?",
                        ),
                        Topic::Testcases => Turn::ask(
                            QuestionKind::TestcasesSampleOffer,
                            "No test cases are stored for this suite yet. Generate a sample now?",
                        ),
                    }),
                }
            }
            PlannerStep::Stop(message) => {
                self.state.inbox = None;
                Ok(Turn::terminate(message))
            }
            PlannerStep::Handoff(next) => Ok(Turn::handoff(format!("Handing off to {next}."), next)),
            PlannerStep::CheckGaps => self.check_gaps().await,
            PlannerStep::AskQuality => Ok(Turn::ask(
                QuestionKind::QualityConfirmation,
                "Extract requirements first for better quality? Reply yes to extract requirements, \
                 or CONTINUE to write test cases straight from the documents.",
            )),
            PlannerStep::Preview => {
                let preview = self.tools().preview(&self.suite_id, PreviewMode::Requirements).await?;
                Ok(Turn::ask(
                    QuestionKind::SampleConfirmation,
                    format!("{}\n\nProceed with generation?", preview.trim()),
                ))
            }
            PlannerStep::AskTestingType => Ok(Turn::ask(
                QuestionKind::TestingTypeChoice,
                "Please choose a testing focus: Unit testing, Integration testing, or System testing.",
            )),
            PlannerStep::Summarize => Ok(Turn::terminate(
                self.state
                    .last_summary
                    .clone()
                    .unwrap_or_else(|| "Nothing to report yet.".to_string()),
            )),
        }
    }

    async fn check_gaps(&mut self) -> Result<Turn, CoordinatorError> {
        let testing_type = self.state.request.testing_type.clone();
        let report = self
            .tools()
            .identify_gaps(&self.suite_id, testing_type.as_deref())
            .await?;
        if report.documents == 0 {
            return Ok(Turn::terminate(report.render()));
        }
        self.state.stage = Stage::GapsChecked;
        if report.blocks() {
            return Ok(Turn::terminate(report.render()));
        }
        if report.testing_type_needed && testing_type.is_none() && !self.state.request.direct {
            return Ok(Turn::ask(QuestionKind::TestingTypeChoice, report.render()));
        }
        Ok(Turn::handoff(report.render(), Role::Planner))
    }

    async fn fetch(&mut self) -> Result<Turn, CoordinatorError> {
        let names = self.state.request.doc_names.clone();
        let report = self.tools().fetch(&self.suite_id, &names).await?;
        self.state.stage = Stage::Fetched;
        let listed = |names: &[String]| {
            if names.is_empty() {
                "none".to_string()
            } else {
                names.join(", ")
            }
        };
        Ok(Turn::handoff(
            format!("Stored: {}. Missing: {}.", listed(&report.stored), listed(&report.missing)),
            Role::Planner,
        ))
    }

    async fn extract(&mut self) -> Result<Turn, CoordinatorError> {
        let (version, count) = self.tools().extract(&self.suite_id).await?;
        self.state.stage = Stage::Extracted;
        Ok(Turn::ask(
            QuestionKind::RequirementsFeedback,
            format!("Requirements extracted ({count}) at v{version}. Proceed to generate test cases now?"),
        ))
    }

    async fn design(&mut self) -> Result<Turn, CoordinatorError> {
        let testing_type = self
            .state
            .request
            .testing_type
            .clone()
            .ok_or_else(|| GenerationError::no_input("Choose a testing focus before test design."))?;
        let (version, flows) = self.tools().design(&self.suite_id, &testing_type).await?;
        self.state.stage = Stage::Designed;
        Ok(Turn::handoff(
            format!("Test design for {testing_type} testing stored at v{version} ({flows} flows)."),
            Role::Checklist,
        ))
    }

    async fn checklist(&mut self) -> Result<Turn, CoordinatorError> {
        let (version, count) = self.tools().viewpoints(&self.suite_id).await?;
        self.state.stage = Stage::ViewpointsReady;
        Ok(Turn::handoff(
            format!("Viewpoints stored at v{version} ({count})."),
            Role::Planner,
        ))
    }

    async fn write(&mut self) -> Result<Turn, CoordinatorError> {
        let summary = if let Some(instruction) = self.state.edit.clone() {
            let report = self.tools().edit(&self.suite_id, &instruction).await?;
            self.state.edit = None;
            edit_summary(&report)
        } else if self.state.stage == Stage::DirectApproved {
            self.tools().direct_testcases(&self.suite_id).await?
        } else if let Some(code) = self.state.request.req_code.clone() {
            let (version, cases) = self.tools().testcases_for(&self.suite_id, &code).await?;
            format!("Generated {cases} test cases for {code} at v{version}.")
        } else {
            batch_summary(&self.tools().testcases_all(&self.suite_id).await?)
        };
        self.state.stage = Stage::Written;
        self.state.last_summary = Some(summary.clone());
        Ok(Turn::handoff(summary, Role::Planner))
    }
}

fn edit_summary(report: &EditReport) -> String {
    let mut text = match report.version {
        Some(version) => format!("Edited test cases for {} requirement(s) at v{version}.", report.edited_count()),
        None => "No test cases changed.".to_string(),
    };
    if !report.not_found.is_empty() {
        text.push_str(&format!(" Not found: {}.", report.not_found.join(", ")));
    }
    if !report.summary.trim().is_empty() {
        text.push(' ');
        text.push_str(report.summary.trim());
    }
    text
}

fn batch_summary(report: &BatchReport) -> String {
    let mut text = format!(
        "Generated test cases for {} requirement(s) at v{}; {} failed.",
        report.generated, report.version, report.failed
    );
    for failure in &report.errors {
        text.push_str(&format!("\n- {}: {} ({})", failure.req_id, failure.error, failure.kind));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Intent, MockIntentClassifier};
    use qa_generation::{BatchFailure, EditedRequirement, ErrorKind};
    use qa_test_utils::{ScriptedGenerator, TestStores};

    #[test]
    fn batch_summary_lists_failures() {
        let report = BatchReport {
            version: 4,
            generated: 4,
            failed: 1,
            results: Vec::new(),
            errors: vec![BatchFailure {
                req_id: "REQ-3".into(),
                kind: ErrorKind::InvalidGenerationOutput,
                error: "not JSON".into(),
            }],
        };
        let text = batch_summary(&report);
        assert!(text.starts_with("Generated test cases for 4 requirement(s) at v4; 1 failed."));
        assert!(text.contains("REQ-3: not JSON"));
    }

    #[test]
    fn edit_summary_without_changes() {
        let report = EditReport {
            version: None,
            edited: Vec::<EditedRequirement>::new(),
            unchanged: vec!["REQ-1".into()],
            not_found: vec!["REQ-9".into()],
            summary: "nothing to do".into(),
        };
        assert_eq!(edit_summary(&report), "No test cases changed. Not found: REQ-9. nothing to do");
    }

    #[tokio::test]
    async fn classifier_picks_the_first_role() {
        let stores = TestStores::new();
        let mut classifier = MockIntentClassifier::new();
        classifier
            .expect_classify()
            .times(1)
            .returning(|_| Intent::Edit {
                instruction: "add a negative case".into(),
            });
        let coordinator = WorkflowCoordinator::new(
            stores.env(Arc::new(ScriptedGenerator::new())),
            WorkflowConfig::default(),
        )
        .with_classifier(Arc::new(classifier));

        let events: Vec<TurnEvent> = coordinator.run("anything", stores.suite.clone()).collect().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].role, Role::Writer);
        assert_eq!(events[0].error.as_deref(), Some("no_input_data"));
    }

    #[tokio::test]
    async fn stream_ends_after_the_terminal_event() {
        let stores = TestStores::new();
        let coordinator = WorkflowCoordinator::new(
            stores.env(Arc::new(ScriptedGenerator::new())),
            WorkflowConfig::default(),
        );
        let mut turns = coordinator.run("start", stores.suite.clone());
        let only = turns.next().await.unwrap();
        assert!(only.is_final());
        assert!(turns.next().await.is_none());
        assert!(turns.next().await.is_none());
    }
}
