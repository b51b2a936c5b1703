use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============= Persona Types =============

/// A pre-authored conversational identity with a base system instruction.
///
/// Personas are loaded once at startup and are immutable afterwards; see
/// [`crate::persona::PersonaRegistry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    #[serde(rename = "basePrompt")]
    pub base_prompt: String,
    pub description: String,
}

// ============= Channel Types =============

/// Marks a channel as eligible for automated replies, optionally bound to
/// one persona. One binding per channel (unique on `channel_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveChannelBinding {
    pub channel_id: String,
    pub guild_id: String,
    pub persona_id: Option<String>,
}

// ============= Message Types =============

/// One persisted conversation turn. Append-only; assistant turns store the
/// raw, unprocessed model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub external_message_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author_user_id: Option<String>,
    /// Display name of the author at the time of the message. `None` for
    /// assistant turns.
    pub author_display_name: Option<String>,
    pub persona_id: Option<String>,
    pub content: String,
    pub is_from_assistant: bool,
    pub created_at: DateTime<Utc>,
}

/// Role tag on a prompt entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One entry of the ordered prompt sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ============= Memory Types =============

/// Addressing context of a memory fact.
///
/// Each component may be `None`; the four documented addressing modes
/// (fully-scoped, persona-global, user-global, fully-global) are the
/// meaningful combinations. Scopes compare exactly, `None` included:
/// storage must never treat `None` as a wildcard on write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryScope {
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub persona_id: Option<String>,
}

impl MemoryScope {
    pub fn new(
        channel_id: Option<String>,
        user_id: Option<String>,
        persona_id: Option<String>,
    ) -> Self {
        Self {
            channel_id,
            user_id,
            persona_id,
        }
    }

    /// Scope covering a single conversation: channel + user + persona.
    pub fn interaction(channel_id: &str, user_id: &str, persona_id: &str) -> Self {
        Self {
            channel_id: Some(channel_id.to_string()),
            user_id: Some(user_id.to_string()),
            persona_id: Some(persona_id.to_string()),
        }
    }
}

/// A durable key/value note scoped to some combination of channel, user and
/// persona. Exactly one row may exist per `(scope, fact_key)`; upserts are
/// last-write-wins on the value and preserve the original creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFact {
    pub scope: MemoryScope,
    pub fact_key: String,
    pub fact_value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============= User Types =============

/// A chat-platform user as observed by the engine. Upserted on first
/// observed message; the display name is refreshed when it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub display_name: String,
}

// ============= Inbound Types =============

/// An inbound platform message as handed to the orchestrator by the gateway.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub external_message_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author_user_id: String,
    pub author_display_name: String,
    pub author_is_bot: bool,
    pub content: String,
    /// The channel is a direct-message channel with the bot.
    pub is_direct_message: bool,
    /// The bot was explicitly mentioned in the message.
    pub mentions_bot: bool,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Persona error: {0}")]
    Persona(String),

    #[error("Outbound error: {0}")]
    Outbound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
