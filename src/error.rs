//! Error types for Rubric Tutor.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
///
/// These are raised while loading and validating the assessment file and are
/// shown to the user as hard errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Scored phase {phase} has no rubric")]
    MissingRubric { phase: String },

    #[error("Scored phase {phase} has no minimum_score")]
    MissingMinimumScore { phase: String },

    #[error("Phase {phase} is defined more than once")]
    DuplicatePhase { phase: String },

    #[error("Assessment defines no phases")]
    NoPhases,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider and conversation gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Conversation thread {thread_id} does not exist")]
    UnknownThread { thread_id: String },
}

/// Errors raised by the phase state machine for a single submit/skip action.
///
/// None of these leave a partially written phase record behind.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("No phase at index {index}")]
    UnknownPhase { index: usize },

    #[error("Phase {index} has not been reached yet (current phase is {current})")]
    PhaseNotReached { index: usize, current: usize },

    #[error("Phase {phase} has already been passed and is locked")]
    PhaseLocked { phase: String },

    #[error("Phase {phase} cannot be skipped")]
    SkipNotAllowed { phase: String },

    #[error("Conversation service failed: {0}")]
    Gateway(#[from] LlmError),
}

/// Errors from opening or looking up a user session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {id} not found")]
    NotFound { id: Uuid },

    #[error("Maximum concurrent sessions ({max}) reached")]
    LimitReached { max: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversation service failed: {0}")]
    Gateway(#[from] LlmError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
