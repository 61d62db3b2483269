//! Rubric Tutor: rubric-gated, AI-tutored writing assessments.

pub mod assessment;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
