//! Completion endpoint client.
//!
//! The engine treats the model as unreliable by contract: every failure mode
//! (transport error, timeout, non-success status, malformed body, empty
//! choices) collapses to `None` so callers have exactly one degraded path.

mod openai_compat;

pub use openai_compat::OpenAiCompatClient;

use crate::types::ChatMessage;
use async_trait::async_trait;

/// A chat-completion backend. `None` means "no usable reply" for any reason;
/// implementations log the cause themselves.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Option<String>;
}
