//! `AssessmentFlow`: the phase state machine.
//!
//! Owns the phase list and session state, forwards submissions to the
//! conversation gateway, scores them against the phase rubric, and decides
//! whether the user may move on.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationGateway, ThreadHandle};
use crate::error::{ConfigError, FlowError, LlmError};
use crate::llm::Role;

use super::phase::PhaseDefinition;
use super::scoring::{build_scoring_instructions, extract_score};
use super::state::{RecordUpdate, SKIPPED_MARKER, SessionState};

/// What happens when a phase that has not been passed is submitted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResubmissionPolicy {
    /// The new text replaces the stored input and feedback.
    #[default]
    ReplaceUnpassed,
    /// The first stored input is reused and new text is ignored.
    KeepFirst,
}

/// Tunables for a flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSettings {
    pub temperature: f32,
    pub scoring_temperature: f32,
    pub resubmission: ResubmissionPolicy,
    pub completion_message: String,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            scoring_temperature: 0.2,
            resubmission: ResubmissionPolicy::default(),
            completion_message: "You've reached the end! I hope you learned something!"
                .to_string(),
        }
    }
}

/// How a submit or skip resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PhaseStatus {
    Passed,
    Skipped,
    /// Not an error: the user should revise and resubmit.
    BelowThreshold { score: u32, minimum: u32 },
}

/// Result of one submit or skip action.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub phase: String,
    #[serde(flatten)]
    pub status: PhaseStatus,
    pub ai_response: String,
    pub ai_score: Option<u32>,
    pub current_phase_index: usize,
    pub complete: bool,
}

impl SubmitOutcome {
    pub fn passed(&self) -> bool {
        !matches!(self.status, PhaseStatus::BelowThreshold { .. })
    }
}

/// Drives one user session through the ordered phases.
pub struct AssessmentFlow {
    phases: Vec<PhaseDefinition>,
    gateway: Arc<dyn ConversationGateway>,
    thread: ThreadHandle,
    settings: FlowSettings,
    state: SessionState,
}

impl AssessmentFlow {
    pub fn new(
        phases: Vec<PhaseDefinition>,
        gateway: Arc<dyn ConversationGateway>,
        thread: ThreadHandle,
        settings: FlowSettings,
    ) -> Result<Self, ConfigError> {
        if phases.is_empty() {
            return Err(ConfigError::NoPhases);
        }
        Ok(Self {
            phases,
            gateway,
            thread,
            settings,
            state: SessionState::new(),
        })
    }

    pub fn phases(&self) -> &[PhaseDefinition] {
        &self.phases
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub fn thread(&self) -> &ThreadHandle {
        &self.thread
    }

    pub fn current_phase_index(&self) -> usize {
        self.state.current_phase_index()
    }

    fn last_index(&self) -> usize {
        self.phases.len() - 1
    }

    /// The final phase has been reached and passed.
    pub fn is_complete(&self) -> bool {
        let last = self.last_index();
        if self.state.current_phase_index() != last {
            return false;
        }
        self.state
            .record(&self.phases[last].name)
            .is_some_and(|r| r.passed && r.ai_response.is_some())
    }

    /// Submit an answer for phase `index`.
    ///
    /// Nothing is recorded unless every gateway call succeeds, so a failed
    /// call can simply be retried. Messages appended during a failed submit
    /// are rolled back off the thread.
    pub async fn submit(&mut self, index: usize, text: &str) -> Result<SubmitOutcome, FlowError> {
        let phase = self.open_phase(index)?.clone();
        let input = self.input_for(&phase, text);

        let checkpoint = self.gateway.checkpoint(&self.thread).await?;
        let (ai_response, ai_result, ai_score, status) = match self.converse(&phase, &input).await {
            Ok(reply) => reply,
            Err(e) => {
                if let Err(undo) = self.gateway.rollback(&self.thread, checkpoint).await {
                    tracing::warn!(phase = %phase.name, "Thread rollback failed: {}", undo);
                }
                return Err(FlowError::Gateway(e));
            }
        };

        let passed = status == PhaseStatus::Passed;
        self.state.commit(
            &phase.name,
            RecordUpdate {
                user_input: input,
                ai_response: ai_response.clone(),
                ai_result,
                ai_score,
                passed,
                skipped: false,
            },
        );

        match status {
            PhaseStatus::BelowThreshold { score, minimum } => {
                tracing::info!(phase = %phase.name, score, minimum, "Submission below threshold");
            }
            _ => {
                let next = self.state.advance(self.last_index());
                tracing::info!(phase = %phase.name, score = ?ai_score, next, "Phase passed");
            }
        }

        Ok(self.outcome(&phase.name, status, ai_response, ai_score))
    }

    /// Feedback run, then the scoring run for scored phases.
    async fn converse(
        &self,
        phase: &PhaseDefinition,
        input: &str,
    ) -> Result<(String, Option<String>, Option<u32>, PhaseStatus), LlmError> {
        if !phase.instructions_text.trim().is_empty() {
            self.gateway
                .append_message(&self.thread, Role::System, &phase.instructions_text)
                .await?;
        }
        self.gateway
            .append_message(&self.thread, Role::User, input)
            .await?;
        let ai_response = self
            .gateway
            .run(&self.thread, self.settings.temperature)
            .await
            .inspect_err(|e| tracing::warn!(phase = %phase.name, "Feedback run failed: {}", e))?;

        let Some(rule) = &phase.scoring else {
            return Ok((ai_response, None, None, PhaseStatus::Passed));
        };

        let request = build_scoring_instructions(&rule.rubric);
        self.gateway
            .append_message(&self.thread, Role::System, &request)
            .await?;
        let result = self
            .gateway
            .run(&self.thread, self.settings.scoring_temperature)
            .await
            .inspect_err(|e| tracing::warn!(phase = %phase.name, "Scoring run failed: {}", e))?;
        tracing::debug!(phase = %phase.name, result = %result, "Scoring reply");

        let score = extract_score(&result);
        let status = if score >= rule.minimum_score {
            PhaseStatus::Passed
        } else {
            PhaseStatus::BelowThreshold {
                score,
                minimum: rule.minimum_score,
            }
        };
        Ok((ai_response, Some(result), Some(score), status))
    }

    /// Skip phase `index` without scoring. No gateway call is made.
    pub fn skip(&mut self, index: usize, text: &str) -> Result<SubmitOutcome, FlowError> {
        let phase = self.open_phase(index)?.clone();
        if !phase.allow_skip {
            return Err(FlowError::SkipNotAllowed { phase: phase.name });
        }
        let input = self.input_for(&phase, text);
        self.state.commit(
            &phase.name,
            RecordUpdate {
                user_input: input,
                ai_response: SKIPPED_MARKER.to_string(),
                ai_result: None,
                ai_score: None,
                passed: true,
                skipped: true,
            },
        );
        let next = self.state.advance(self.last_index());
        tracing::info!(phase = %phase.name, next, "Phase skipped");

        let ai_score = self.state.record(&phase.name).and_then(|r| r.ai_score);
        Ok(self.outcome(&phase.name, PhaseStatus::Skipped, SKIPPED_MARKER.to_string(), ai_score))
    }

    /// The phase at `index`, if it can currently accept a submit or skip.
    fn open_phase(&self, index: usize) -> Result<&PhaseDefinition, FlowError> {
        let phase = self
            .phases
            .get(index)
            .ok_or(FlowError::UnknownPhase { index })?;
        let current = self.state.current_phase_index();
        if index > current {
            return Err(FlowError::PhaseNotReached { index, current });
        }
        if self.state.is_passed(&phase.name) {
            return Err(FlowError::PhaseLocked {
                phase: phase.name.clone(),
            });
        }
        Ok(phase)
    }

    fn input_for(&self, phase: &PhaseDefinition, text: &str) -> String {
        match (self.settings.resubmission, self.state.stored_input(&phase.name)) {
            (ResubmissionPolicy::KeepFirst, Some(stored)) => stored.to_string(),
            _ => text.to_string(),
        }
    }

    fn outcome(
        &mut self,
        phase: &str,
        status: PhaseStatus,
        ai_response: String,
        ai_score: Option<u32>,
    ) -> SubmitOutcome {
        let complete = self.is_complete();
        if complete && self.state.mark_completed() {
            tracing::info!("Assessment complete");
        }
        SubmitOutcome {
            phase: phase.to_string(),
            status,
            ai_response,
            ai_score,
            current_phase_index: self.state.current_phase_index(),
            complete,
        }
    }
}
