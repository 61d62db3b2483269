//! Phase definitions: the immutable, validated description of each step.
//!
//! Behavioral fields live on `PhaseDefinition` and are all the state machine
//! ever sees. Widget details live on `PhasePresentation` and are consumed only
//! by front ends.

use serde::{Deserialize, Serialize};

/// Rubric and pass threshold for a scored phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRule {
    /// Faculty-authored criteria, passed to the assistant verbatim.
    pub rubric: String,
    /// A submission passes when its total is at least this value.
    pub minimum_score: u32,
}

/// One step of the assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub name: String,
    pub prompt_text: String,
    /// Sent to the conversation as system guidance before the user's answer.
    pub instructions_text: String,
    pub initial_value: Option<String>,
    /// `None` for unscored phases.
    pub scoring: Option<ScoringRule>,
    pub allow_skip: bool,
}

impl PhaseDefinition {
    /// An unscored phase.
    pub fn unscored(name: &str, prompt: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            prompt_text: prompt.to_string(),
            instructions_text: instructions.to_string(),
            initial_value: None,
            scoring: None,
            allow_skip: false,
        }
    }

    /// A scored phase with the given rubric and threshold.
    pub fn scored(
        name: &str,
        prompt: &str,
        instructions: &str,
        rubric: &str,
        minimum_score: u32,
    ) -> Self {
        Self {
            scoring: Some(ScoringRule {
                rubric: rubric.to_string(),
                minimum_score,
            }),
            ..Self::unscored(name, prompt, instructions)
        }
    }

    pub fn with_skip(mut self) -> Self {
        self.allow_skip = true;
        self
    }

    pub fn with_initial_value(mut self, value: &str) -> Self {
        self.initial_value = Some(value.to_string());
        self
    }

    pub fn is_scored(&self) -> bool {
        self.scoring.is_some()
    }
}

/// Input widget used to collect a phase's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    TextInput,
    TextArea,
}

/// Presentation-only settings for a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePresentation {
    pub kind: InputKind,
    pub label: String,
    pub button_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Default for PhasePresentation {
    fn default() -> Self {
        Self {
            kind: InputKind::default(),
            label: String::new(),
            button_label: "Submit".to_string(),
            height: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scored_constructor_sets_rule() {
        let phase = PhaseDefinition::scored("first_draft", "Write it", "Give feedback", "1. Intro", 2);
        assert!(phase.is_scored());
        assert_eq!(phase.scoring.as_ref().unwrap().minimum_score, 2);
        assert!(!phase.allow_skip);
    }

    #[test]
    fn builders_set_optional_fields() {
        let phase = PhaseDefinition::unscored("org_name", "Name?", "Greet them")
            .with_skip()
            .with_initial_value("Acme");
        assert!(!phase.is_scored());
        assert!(phase.allow_skip);
        assert_eq!(phase.initial_value.as_deref(), Some("Acme"));
    }

    #[test]
    fn input_kind_serde() {
        let kind: InputKind = serde_json::from_str("\"text_area\"").unwrap();
        assert_eq!(kind, InputKind::TextArea);
        assert_eq!(serde_json::to_string(&InputKind::TextInput).unwrap(), "\"text_input\"");
    }
}
