//! Conversation gateway: threads, messages, and runs against the assistant.

pub mod gateway;
pub mod threaded;

pub use gateway::{AssistantIdentity, ConversationGateway, ThreadHandle, ThreadId};
pub use threaded::ThreadedGateway;
