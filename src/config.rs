//! Configuration types.
//!
//! An assessment is described by a JSON file:
//!
//! ```json
//! {
//!   "title": "Writing Your Grant Proposal Introduction",
//!   "intro": "In this interactive writing assessment...",
//!   "completion_message": "You've reached the end!",
//!   "scoring_debug_mode": true,
//!   "resubmission": "replace_unpassed",
//!   "assistant": {
//!     "name": "Grant Reviewer",
//!     "instructions": "You are a grant reviewer...",
//!     "model": "gpt-4-turbo"
//!   },
//!   "phases": [
//!     { "name": "org_name", "kind": "text_input", "label": "Organization?",
//!       "instructions": "Greet the user." },
//!     { "name": "first_draft", "kind": "text_area", "label": "First draft",
//!       "instructions": "Give feedback.", "scored": true,
//!       "rubric": "1. Organization Introduction ...", "minimum_score": 2,
//!       "allow_skip": true }
//!   ]
//! }
//! ```
//!
//! Phases are an array so that declaration order is the phase order.
//! Unknown keys are rejected, so a misspelled `scored` flag cannot quietly
//! turn a scored phase into an unscored one.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::assessment::{
    AssessmentFlow, FlowSettings, InputKind, PhaseDefinition, PhasePresentation,
    ResubmissionPolicy, ScoringRule, SessionRegistry,
};
use crate::conversation::{AssistantIdentity, ConversationGateway, ThreadId, ThreadedGateway};
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmProvider};

fn default_completion_message() -> String {
    FlowSettings::default().completion_message
}

fn default_button_label() -> String {
    "Submit".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_scoring_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_model() -> String {
    "gpt-4-turbo".to_string()
}

fn default_max_sessions() -> usize {
    100
}

/// Top-level assessment file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssessmentConfig {
    pub title: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub how_it_works: Option<String>,
    #[serde(default = "default_completion_message")]
    pub completion_message: String,
    /// Show raw scoring replies alongside feedback.
    #[serde(default)]
    pub scoring_debug_mode: bool,
    #[serde(default)]
    pub resubmission: ResubmissionPolicy,
    /// Concurrent sessions the HTTP server keeps open.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    pub assistant: AssistantConfig,
    pub phases: Vec<PhaseConfig>,
}

/// The assistant persona and its run settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantConfig {
    pub name: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_scoring_temperature")]
    pub scoring_temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Reuse an existing assistant identity.
    #[serde(default)]
    pub assistant_id: Option<String>,
    /// Resume an existing conversation thread (terminal session only).
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// One phase as written in the file, mixing behavior and presentation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseConfig {
    pub name: String,
    #[serde(default)]
    pub kind: InputKind,
    #[serde(default, alias = "prompt_text")]
    pub label: String,
    #[serde(default = "default_button_label")]
    pub button_label: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default, alias = "instructions_text")]
    pub instructions: String,
    #[serde(default, alias = "initial_value")]
    pub value: Option<String>,
    #[serde(default, alias = "is_scored", alias = "scored_phase")]
    pub scored: bool,
    #[serde(default)]
    pub rubric: Option<String>,
    #[serde(default)]
    pub minimum_score: Option<u32>,
    #[serde(default)]
    pub allow_skip: bool,
}

impl AssessmentConfig {
    /// Read and parse an assessment file. Call `validate` before use.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check the file and split it into behavior and presentation lists.
    ///
    /// A scored phase must carry a non-blank rubric and a minimum score.
    pub fn validate(&self) -> Result<(Vec<PhaseDefinition>, Vec<PhasePresentation>), ConfigError> {
        if self.phases.is_empty() {
            return Err(ConfigError::NoPhases);
        }
        for (key, value) in [
            ("assistant.temperature", self.assistant.temperature),
            ("assistant.scoring_temperature", self.assistant.scoring_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{value} is outside 0.0..=2.0"),
                });
            }
        }

        if self.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_sessions".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut definitions = Vec::with_capacity(self.phases.len());
        let mut presentations = Vec::with_capacity(self.phases.len());

        for phase in &self.phases {
            if phase.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "phases.name".to_string(),
                    message: "phase name is empty".to_string(),
                });
            }
            if !seen.insert(phase.name.as_str()) {
                return Err(ConfigError::DuplicatePhase {
                    phase: phase.name.clone(),
                });
            }

            let scoring = if phase.scored {
                let rubric = phase
                    .rubric
                    .as_deref()
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingRubric {
                        phase: phase.name.clone(),
                    })?;
                let minimum_score =
                    phase
                        .minimum_score
                        .ok_or_else(|| ConfigError::MissingMinimumScore {
                            phase: phase.name.clone(),
                        })?;
                Some(ScoringRule {
                    rubric: rubric.to_string(),
                    minimum_score,
                })
            } else {
                if phase.rubric.is_some() {
                    tracing::warn!(phase = %phase.name, "Rubric ignored on unscored phase");
                }
                None
            };

            definitions.push(PhaseDefinition {
                name: phase.name.clone(),
                prompt_text: phase.label.clone(),
                instructions_text: phase.instructions.clone(),
                initial_value: phase.value.clone().filter(|v| !v.is_empty()),
                scoring,
                allow_skip: phase.allow_skip,
            });
            presentations.push(PhasePresentation {
                kind: phase.kind,
                label: phase.label.clone(),
                button_label: phase.button_label.clone(),
                height: phase.height,
            });
        }

        Ok((definitions, presentations))
    }

    /// Create-or-reuse the assistant identity and wrap `llm` in a gateway.
    fn build_gateway(&self, llm: Arc<dyn LlmProvider>) -> Arc<ThreadedGateway> {
        let identity = AssistantIdentity::create_or_reuse(
            self.assistant.assistant_id.as_deref(),
            &self.assistant.name,
            &self.assistant.instructions,
        );
        tracing::info!(assistant = %identity.assistant_id, "Assistant ready: {}", identity.name);
        Arc::new(ThreadedGateway::new(llm, identity, self.assistant.max_tokens))
    }

    /// Validate the file, set up the assistant and its configured thread, and
    /// build a single ready-to-run flow plus the presentation list.
    pub async fn build_flow(
        &self,
        llm: Arc<dyn LlmProvider>,
    ) -> crate::error::Result<(AssessmentFlow, Vec<PhasePresentation>)> {
        let (phases, presentation) = self.validate()?;
        let gateway = self.build_gateway(llm);
        let thread = gateway
            .create_or_resume(self.assistant.thread_id.clone().map(ThreadId))
            .await?;
        tracing::info!(thread = %thread.thread_id, resumed = thread.resumed, "Conversation thread ready");
        let flow = AssessmentFlow::new(phases, gateway, thread, self.flow_settings())?;
        Ok((flow, presentation))
    }

    /// Validate the file and build a registry that opens one flow per
    /// session, each on a fresh thread.
    pub fn build_sessions(
        &self,
        llm: Arc<dyn LlmProvider>,
    ) -> crate::error::Result<(SessionRegistry, Vec<PhasePresentation>)> {
        let (phases, presentation) = self.validate()?;
        if let Some(thread_id) = &self.assistant.thread_id {
            tracing::warn!(thread = %thread_id, "assistant.thread_id is ignored when serving sessions");
        }
        let gateway = self.build_gateway(llm);
        let sessions =
            SessionRegistry::new(phases, gateway, self.flow_settings(), self.max_sessions)?;
        Ok((sessions, presentation))
    }

    /// Flow tunables taken from this file.
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            temperature: self.assistant.temperature,
            scoring_temperature: self.assistant.scoring_temperature,
            resubmission: self.resubmission,
            completion_message: self.completion_message.clone(),
        }
    }
}

/// Settings read from the environment by the binary.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub config_path: String,
    pub model: Option<String>,
    pub http_port: Option<u16>,
}

impl EnvSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("RUBRIC_TUTOR_BACKEND") {
            Some(name) => LlmBackend::from_name(&name).ok_or_else(|| ConfigError::InvalidValue {
                key: "RUBRIC_TUTOR_BACKEND".to_string(),
                message: format!("unknown backend '{name}' (expected openai or anthropic)"),
            })?,
            None => LlmBackend::default(),
        };
        let key_var = backend.api_key_var();
        let api_key = lookup(key_var)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;
        let http_port = match lookup("RUBRIC_TUTOR_HTTP_PORT") {
            Some(raw) => Some(raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "RUBRIC_TUTOR_HTTP_PORT".to_string(),
                message: e.to_string(),
            })?),
            None => None,
        };
        Ok(Self {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            config_path: lookup("RUBRIC_TUTOR_CONFIG")
                .unwrap_or_else(|| "./assessment.json".to_string()),
            model: lookup("RUBRIC_TUTOR_MODEL").filter(|m| !m.is_empty()),
            http_port,
        })
    }
}
