//! The conversation service contract the assessment depends on.
//!
//! Modeled on hosted assistant APIs: an assistant identity, threads that
//! accumulate role-tagged messages, and runs that execute the assistant
//! against a thread's history and yield a single completed reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LlmError;
use crate::llm::Role;

/// Identifier of a conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    /// A fresh random thread id.
    pub fn generate() -> Self {
        Self(format!("thread_{}", Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The assistant persona every run executes as.
///
/// Created once per process and handed to the gateway's constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantIdentity {
    pub assistant_id: String,
    pub name: String,
    pub instructions: String,
}

impl AssistantIdentity {
    /// Reuse `assistant_id` when configured, otherwise mint a new one.
    pub fn create_or_reuse(
        assistant_id: Option<&str>,
        name: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        let assistant_id = match assistant_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("asst_{}", Uuid::new_v4().simple()),
        };
        Self {
            assistant_id,
            name: name.into(),
            instructions: instructions.into(),
        }
    }
}

/// Handle to a live thread, returned by `create_or_resume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadHandle {
    pub thread_id: ThreadId,
    pub assistant_id: String,
    /// True when an existing thread was picked up rather than created.
    pub resumed: bool,
}

/// Conversation service used by the phase state machine.
///
/// `run` returns only after the whole reply is assembled; callers never see
/// partial output.
#[async_trait]
pub trait ConversationGateway: Send + Sync {
    /// Resume `thread_id` if given, otherwise start a new thread.
    async fn create_or_resume(&self, thread_id: Option<ThreadId>) -> Result<ThreadHandle, LlmError>;

    /// Append a message to the thread without running the assistant.
    async fn append_message(
        &self,
        thread: &ThreadHandle,
        role: Role,
        text: &str,
    ) -> Result<(), LlmError>;

    /// Run the assistant over the thread's history at `temperature` and
    /// return its reply. The reply is appended to the thread.
    async fn run(&self, thread: &ThreadHandle, temperature: f32) -> Result<String, LlmError>;

    /// Current length of the thread, for a later `rollback`.
    async fn checkpoint(&self, thread: &ThreadHandle) -> Result<usize, LlmError>;

    /// Drop every message added after `checkpoint` was taken.
    async fn rollback(&self, thread: &ThreadHandle, checkpoint: usize) -> Result<(), LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_reuses_configured_id() {
        let identity = AssistantIdentity::create_or_reuse(Some("asst_123"), "Reviewer", "Be fair.");
        assert_eq!(identity.assistant_id, "asst_123");
        assert_eq!(identity.name, "Reviewer");
    }

    #[test]
    fn identity_mints_id_when_absent_or_blank() {
        let a = AssistantIdentity::create_or_reuse(None, "Reviewer", "");
        let b = AssistantIdentity::create_or_reuse(Some("   "), "Reviewer", "");
        assert!(a.assistant_id.starts_with("asst_"));
        assert!(b.assistant_id.starts_with("asst_"));
        assert_ne!(a.assistant_id, b.assistant_id);
    }

    #[test]
    fn generated_thread_ids_are_unique() {
        let a = ThreadId::generate();
        let b = ThreadId::generate();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("thread_"));
    }
}
