//! Phase store: per-session record of every visited phase.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Feedback text stored for a skipped phase.
pub const SKIPPED_MARKER: &str = "This phase was skipped.";

/// Outcome of the user's interaction with one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub user_input: String,
    /// Feedback from the assistant, or `SKIPPED_MARKER`.
    pub ai_response: Option<String>,
    /// Raw scoring reply.
    pub ai_result: Option<String>,
    pub ai_score: Option<u32>,
    pub passed: bool,
    pub skipped: bool,
    /// Number of submit/skip actions that reached this phase.
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl PhaseRecord {
    fn new(user_input: &str) -> Self {
        Self {
            user_input: user_input.to_string(),
            ai_response: None,
            ai_result: None,
            ai_score: None,
            passed: false,
            skipped: false,
            attempts: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Mutable session state for one user.
///
/// Records are keyed by phase name and never removed. Once a record is
/// `passed` it is never written again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    current_phase_index: usize,
    records: HashMap<String, PhaseRecord>,
    completed_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_phase_index(&self) -> usize {
        self.current_phase_index
    }

    pub fn record(&self, phase: &str) -> Option<&PhaseRecord> {
        self.records.get(phase)
    }

    pub fn is_passed(&self, phase: &str) -> bool {
        self.records.get(phase).is_some_and(|r| r.passed)
    }

    /// When the final phase was completed, if it has been.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Input already stored for a phase.
    pub fn stored_input(&self, phase: &str) -> Option<&str> {
        self.records.get(phase).map(|r| r.user_input.as_str())
    }

    /// Write the outcome of a submission or skip.
    ///
    /// Returns `false` and changes nothing if the phase is already passed.
    pub(crate) fn commit(&mut self, phase: &str, update: RecordUpdate) -> bool {
        if self.is_passed(phase) {
            return false;
        }
        let record = self
            .records
            .entry(phase.to_string())
            .or_insert_with(|| PhaseRecord::new(&update.user_input));
        record.user_input = update.user_input;
        record.ai_response = Some(update.ai_response);
        if update.ai_result.is_some() {
            record.ai_result = update.ai_result;
            record.ai_score = update.ai_score;
        }
        record.passed = update.passed;
        record.skipped = update.skipped;
        record.attempts += 1;
        record.updated_at = Utc::now();
        true
    }

    /// Move to the next phase, never past `last_index`.
    pub(crate) fn advance(&mut self, last_index: usize) -> usize {
        self.current_phase_index = (self.current_phase_index + 1).min(last_index);
        self.current_phase_index
    }

    /// Stamp completion. Only the first call has any effect.
    pub(crate) fn mark_completed(&mut self) -> bool {
        if self.completed_at.is_some() {
            return false;
        }
        self.completed_at = Some(Utc::now());
        true
    }
}

/// Values produced by one successful submit/skip.
#[derive(Debug, Clone)]
pub(crate) struct RecordUpdate {
    pub user_input: String,
    pub ai_response: String,
    pub ai_result: Option<String>,
    pub ai_score: Option<u32>,
    pub passed: bool,
    pub skipped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(input: &str, passed: bool) -> RecordUpdate {
        RecordUpdate {
            user_input: input.to_string(),
            ai_response: "feedback".to_string(),
            ai_result: Some(r#"{"total": 1}"#.to_string()),
            ai_score: Some(1),
            passed,
            skipped: false,
        }
    }

    #[test]
    fn default_state() {
        let state = SessionState::new();
        assert_eq!(state.current_phase_index(), 0);
        assert!(state.record("anything").is_none());
        assert!(state.completed_at().is_none());
    }

    #[test]
    fn commit_creates_record_lazily() {
        let mut state = SessionState::new();
        assert!(state.commit("first_draft", update("draft", false)));
        let record = state.record("first_draft").unwrap();
        assert_eq!(record.user_input, "draft");
        assert_eq!(record.ai_score, Some(1));
        assert_eq!(record.attempts, 1);
        assert!(!record.passed);
    }

    #[test]
    fn passed_record_is_never_rewritten() {
        let mut state = SessionState::new();
        assert!(state.commit("org_name", update("Acme", true)));
        let before = state.record("org_name").cloned().unwrap();

        assert!(!state.commit("org_name", update("Other", false)));
        assert_eq!(state.record("org_name"), Some(&before));
        assert!(state.is_passed("org_name"));
    }

    #[test]
    fn skip_update_keeps_prior_score() {
        let mut state = SessionState::new();
        state.commit("first_draft", update("draft", false));
        state.commit(
            "first_draft",
            RecordUpdate {
                user_input: "draft".to_string(),
                ai_response: SKIPPED_MARKER.to_string(),
                ai_result: None,
                ai_score: None,
                passed: true,
                skipped: true,
            },
        );
        let record = state.record("first_draft").unwrap();
        assert!(record.passed);
        assert!(record.skipped);
        assert_eq!(record.ai_score, Some(1));
        assert_eq!(record.ai_response.as_deref(), Some(SKIPPED_MARKER));
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn advance_clamps_to_last_index() {
        let mut state = SessionState::new();
        assert_eq!(state.advance(2), 1);
        assert_eq!(state.advance(2), 2);
        assert_eq!(state.advance(2), 2);
    }

    #[test]
    fn completion_is_stamped_once() {
        let mut state = SessionState::new();
        assert!(state.mark_completed());
        let first = state.completed_at();
        assert!(!state.mark_completed());
        assert_eq!(state.completed_at(), first);
    }

    #[test]
    fn state_serde_roundtrip() {
        let mut state = SessionState::new();
        state.commit("org_name", update("Acme", true));
        state.advance(2);

        let json = serde_json::to_string(&state).unwrap();
        let parsed: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.current_phase_index(), 1);
        assert_eq!(parsed.record("org_name"), state.record("org_name"));
    }
}
