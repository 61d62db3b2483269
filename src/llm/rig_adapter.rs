//! Bridges rig-core completion models to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::message::AssistantContent;
use rig::completion::{CompletionModel, Message};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Wraps any rig `CompletionModel` as an `LlmProvider`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// A conversation split the way rig's request builder wants it.
struct RigConversation {
    preamble: String,
    history: Vec<Message>,
    prompt: Message,
}

/// Leading system messages become the preamble. Later system messages are
/// mid-conversation directions and go out as user turns in thread order.
fn to_rig_conversation(messages: Vec<ChatMessage>) -> Result<RigConversation, LlmError> {
    let mut preamble = Vec::new();
    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::System if turns.is_empty() => preamble.push(message.content),
            Role::System | Role::User => turns.push(Message::user(message.content)),
            Role::Assistant => turns.push(Message::assistant(message.content)),
        }
    }
    let prompt = turns.pop().ok_or_else(|| LlmError::RequestFailed {
        provider: "rig".to_string(),
        reason: "conversation has no user or assistant turns".to_string(),
    })?;
    Ok(RigConversation {
        preamble: preamble.join("\n\n"),
        history: turns,
        prompt,
    })
}

/// Concatenate the text parts of a reply, ignoring tool calls and reasoning.
fn reply_text<'a>(parts: impl IntoIterator<Item = &'a AssistantContent>) -> String {
    parts
        .into_iter()
        .filter_map(|part| match part {
            AssistantContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let conversation = to_rig_conversation(request.messages)?;

        let mut builder = self
            .model
            .completion_request(conversation.prompt)
            .messages(conversation.history);
        if !conversation.preamble.is_empty() {
            builder = builder.preamble(conversation.preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content = reply_text(response.choice.iter()).trim().to_string();
        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "reply contained no text".to_string(),
            });
        }
        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
    }
}
