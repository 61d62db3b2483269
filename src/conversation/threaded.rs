//! `ConversationGateway` backed by in-process threads over any `LlmProvider`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, Role};

use super::gateway::{AssistantIdentity, ConversationGateway, ThreadHandle, ThreadId};

/// Keeps thread histories in memory and replays them on every run.
pub struct ThreadedGateway {
    llm: Arc<dyn LlmProvider>,
    identity: AssistantIdentity,
    max_tokens: u32,
    threads: RwLock<HashMap<ThreadId, Vec<ChatMessage>>>,
}

fn unknown_thread(thread: &ThreadHandle) -> LlmError {
    LlmError::UnknownThread {
        thread_id: thread.thread_id.to_string(),
    }
}

impl ThreadedGateway {
    pub fn new(llm: Arc<dyn LlmProvider>, identity: AssistantIdentity, max_tokens: u32) -> Self {
        Self {
            llm,
            identity,
            max_tokens,
            threads: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub(crate) async fn history(&self, thread_id: &ThreadId) -> Option<Vec<ChatMessage>> {
        self.threads.read().await.get(thread_id).cloned()
    }

    fn build_messages(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !self.identity.instructions.trim().is_empty() {
            messages.push(ChatMessage::system(&self.identity.instructions));
        }
        messages.extend(history.iter().cloned());
        messages
    }
}

#[async_trait]
impl ConversationGateway for ThreadedGateway {
    async fn create_or_resume(&self, thread_id: Option<ThreadId>) -> Result<ThreadHandle, LlmError> {
        let mut threads = self.threads.write().await;
        let (thread_id, resumed) = match thread_id {
            Some(id) => {
                let resumed = threads.contains_key(&id);
                threads.entry(id.clone()).or_default();
                (id, resumed)
            }
            None => {
                let id = ThreadId::generate();
                threads.insert(id.clone(), Vec::new());
                (id, false)
            }
        };
        if !resumed {
            tracing::debug!(thread = %thread_id, assistant = %self.identity.assistant_id, "Created conversation thread");
        }
        Ok(ThreadHandle {
            thread_id,
            assistant_id: self.identity.assistant_id.clone(),
            resumed,
        })
    }

    async fn append_message(
        &self,
        thread: &ThreadHandle,
        role: Role,
        text: &str,
    ) -> Result<(), LlmError> {
        let mut threads = self.threads.write().await;
        let messages = threads
            .get_mut(&thread.thread_id)
            .ok_or_else(|| unknown_thread(thread))?;
        messages.push(ChatMessage::new(role, text));
        Ok(())
    }

    async fn run(&self, thread: &ThreadHandle, temperature: f32) -> Result<String, LlmError> {
        let messages = {
            let threads = self.threads.read().await;
            let history = threads
                .get(&thread.thread_id)
                .ok_or_else(|| unknown_thread(thread))?;
            self.build_messages(history)
        };

        tracing::debug!(
            thread = %thread.thread_id,
            messages = messages.len(),
            temperature,
            "Starting run"
        );

        let request = CompletionRequest::new(messages)
            .with_max_tokens(self.max_tokens)
            .with_temperature(temperature);
        let response = self.llm.complete(request).await?;

        let mut threads = self.threads.write().await;
        if let Some(history) = threads.get_mut(&thread.thread_id) {
            history.push(ChatMessage::assistant(&response.content));
        }

        tracing::debug!(
            thread = %thread.thread_id,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Run finished"
        );
        Ok(response.content)
    }

    async fn checkpoint(&self, thread: &ThreadHandle) -> Result<usize, LlmError> {
        let threads = self.threads.read().await;
        threads
            .get(&thread.thread_id)
            .map(Vec::len)
            .ok_or_else(|| unknown_thread(thread))
    }

    async fn rollback(&self, thread: &ThreadHandle, checkpoint: usize) -> Result<(), LlmError> {
        let mut threads = self.threads.write().await;
        let messages = threads
            .get_mut(&thread.thread_id)
            .ok_or_else(|| unknown_thread(thread))?;
        let dropped = messages.len().saturating_sub(checkpoint);
        messages.truncate(checkpoint);
        tracing::debug!(thread = %thread.thread_id, dropped, "Rolled back thread");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::CompletionResponse;

    /// Records every request and answers with a fixed reply.
    struct EchoLlm {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmProvider for EchoLlm {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    fn gateway(reply: &str) -> (Arc<EchoLlm>, ThreadedGateway) {
        let llm = Arc::new(EchoLlm {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let identity = AssistantIdentity::create_or_reuse(Some("asst_test"), "Grant Reviewer", "Be tough but fair.");
        let gw = ThreadedGateway::new(llm.clone(), identity, 1000);
        (llm, gw)
    }

    #[tokio::test]
    async fn run_replays_history_after_assistant_instructions() {
        let (llm, gw) = gateway("Looks good.");
        let thread = gw.create_or_resume(None).await.unwrap();
        assert!(!thread.resumed);
        assert_eq!(thread.assistant_id, "asst_test");

        gw.append_message(&thread, Role::System, "Give feedback.").await.unwrap();
        gw.append_message(&thread, Role::User, "My draft").await.unwrap();
        let reply = gw.run(&thread, 1.0).await.unwrap();
        assert_eq!(reply, "Looks good.");

        let seen = llm.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.temperature, Some(1.0));
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.messages[0], ChatMessage::system("Be tough but fair."));
        assert_eq!(request.messages[1], ChatMessage::system("Give feedback."));
        assert_eq!(request.messages[2], ChatMessage::user("My draft"));
        drop(seen);

        let history = gw.history(&thread.thread_id).await.unwrap();
        assert_eq!(history.last(), Some(&ChatMessage::assistant("Looks good.")));
    }

    #[tokio::test]
    async fn rollback_drops_messages_after_checkpoint() {
        let (_llm, gw) = gateway("Return JSON?");
        let thread = gw.create_or_resume(None).await.unwrap();
        gw.append_message(&thread, Role::User, "Acme").await.unwrap();
        let mark = gw.checkpoint(&thread).await.unwrap();
        assert_eq!(mark, 1);

        gw.append_message(&thread, Role::System, "Score this.").await.unwrap();
        gw.run(&thread, 0.2).await.unwrap();
        assert_eq!(gw.checkpoint(&thread).await.unwrap(), 3);

        gw.rollback(&thread, mark).await.unwrap();
        let history = gw.history(&thread.thread_id).await.unwrap();
        assert_eq!(history, vec![ChatMessage::user("Acme")]);
    }

    #[tokio::test]
    async fn threads_do_not_share_history() {
        let (llm, gw) = gateway("ok");
        let alice = gw.create_or_resume(None).await.unwrap();
        let bob = gw.create_or_resume(None).await.unwrap();
        assert_ne!(alice.thread_id, bob.thread_id);

        gw.append_message(&alice, Role::User, "Alice's Org").await.unwrap();
        gw.append_message(&bob, Role::User, "Bob's Org").await.unwrap();
        gw.run(&bob, 1.0).await.unwrap();

        let seen = llm.seen.lock().unwrap();
        assert!(!seen[0].messages.contains(&ChatMessage::user("Alice's Org")));
    }

    #[tokio::test]
    async fn resume_keeps_existing_history() {
        let (_llm, gw) = gateway("ok");
        let first = gw.create_or_resume(None).await.unwrap();
        gw.append_message(&first, Role::User, "hello").await.unwrap();

        let again = gw.create_or_resume(Some(first.thread_id.clone())).await.unwrap();
        assert!(again.resumed);
        assert_eq!(gw.history(&again.thread_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resume_unknown_id_creates_it() {
        let (_llm, gw) = gateway("ok");
        let id = ThreadId("thread_configured".to_string());
        let handle = gw.create_or_resume(Some(id.clone())).await.unwrap();
        assert!(!handle.resumed);
        assert_eq!(handle.thread_id, id);
        assert!(gw.history(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_thread_is_an_error() {
        let (_llm, gw) = gateway("ok");
        let handle = ThreadHandle {
            thread_id: ThreadId("missing".to_string()),
            assistant_id: "asst_test".to_string(),
            resumed: false,
        };
        let err = gw.append_message(&handle, Role::User, "hi").await.unwrap_err();
        assert!(matches!(err, LlmError::UnknownThread { .. }));
        let err = gw.run(&handle, 1.0).await.unwrap_err();
        assert!(matches!(err, LlmError::UnknownThread { .. }));
        assert!(gw.checkpoint(&handle).await.is_err());
        assert!(gw.rollback(&handle, 0).await.is_err());
    }
}
