//! Transcript rendering: what a front end should show for the current state.
//!
//! Rendering only reads the session, so repeated renders never call the
//! gateway or change any record.

use serde::Serialize;

use super::flow::AssessmentFlow;

/// Display state of one visited phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseView {
    pub index: usize,
    pub name: String,
    pub prompt_text: String,
    /// Every visited phase is shown; the transcript is cumulative.
    pub show_input: bool,
    /// Passed phases are read-only.
    pub locked: bool,
    /// Submit (and skip, if allowed) controls are offered.
    pub show_controls: bool,
    pub allow_skip: bool,
    /// Stored answer, else the phase's initial value, else empty.
    pub input_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<String>,
    /// Raw scoring reply, only in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_result: Option<String>,
    pub skipped: bool,
}

/// Everything needed to draw the assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptView {
    pub current_phase_index: usize,
    pub total_phases: usize,
    pub complete: bool,
    pub phases: Vec<PhaseView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_message: Option<String>,
}

impl AssessmentFlow {
    /// Render phases `0..=current_phase_index`.
    pub fn render(&self, debug: bool) -> TranscriptView {
        let state = self.state();
        let current = state.current_phase_index();
        let complete = self.is_complete();

        let phases = self.phases()[..=current]
            .iter()
            .enumerate()
            .map(|(index, phase)| {
                let record = state.record(&phase.name);
                let locked = record.is_some_and(|r| r.passed);
                let input_value = record
                    .map(|r| r.user_input.clone())
                    .or_else(|| phase.initial_value.clone())
                    .unwrap_or_default();
                PhaseView {
                    index,
                    name: phase.name.clone(),
                    prompt_text: phase.prompt_text.clone(),
                    show_input: true,
                    locked,
                    show_controls: !locked && !complete,
                    allow_skip: phase.allow_skip,
                    input_value,
                    ai_feedback: record.and_then(|r| r.ai_response.clone()),
                    scoring_result: if debug {
                        record.and_then(|r| r.ai_result.clone())
                    } else {
                        None
                    },
                    skipped: record.is_some_and(|r| r.skipped),
                }
            })
            .collect();

        TranscriptView {
            current_phase_index: current,
            total_phases: self.phases().len(),
            complete,
            phases,
            completion_message: complete.then(|| self.settings().completion_message.clone()),
        }
    }
}
