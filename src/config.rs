use crate::types::{AppError, Result};
use serde::Deserialize;
use std::env;

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub completion: CompletionConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    /// OpenAI-compatible chat-completions endpoint URL.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Request timeout in seconds. A timeout is a normal failure, not a
    /// distinct code path.
    pub timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the libsql database file, or `:memory:` for an ephemeral
    /// store.
    pub database_path: String,
    /// Path to the persona definition file (JSON, persona id -> definition).
    pub personas_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Messages loaded for the reply-context window.
    pub history_window: usize,
    /// Messages reloaded for the memory-extraction window.
    pub extraction_window: usize,
    /// Outbound channel message-size cap in characters.
    pub segment_limit: usize,
    /// Persona answering direct messages with no channel binding.
    pub default_dm_persona: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            completion: CompletionConfig {
                endpoint: env::var("CHAT_ENDPOINT")
                    .map_err(|_| AppError::Config("CHAT_ENDPOINT is not set".to_string()))?,
                model: env::var("CHAT_MODEL")
                    .map_err(|_| AppError::Config("CHAT_MODEL is not set".to_string()))?,
                api_key: env::var("CHAT_API_KEY").ok(),
                timeout_secs: parse_env("CHAT_TIMEOUT_SECS", 30)?,
                temperature: parse_env("CHAT_TEMPERATURE", 0.7)?,
            },
            storage: StorageConfig {
                database_path: env::var("DATABASE_PATH")
                    .unwrap_or_else(|_| "data/mnemos.db".to_string()),
                personas_path: env::var("PERSONAS_PATH")
                    .unwrap_or_else(|_| "config/personas.json".to_string()),
            },
            engine: EngineConfig {
                history_window: parse_env("HISTORY_WINDOW", 25)?,
                extraction_window: parse_env("EXTRACTION_WINDOW", 25)?,
                segment_limit: parse_env("SEGMENT_LIMIT", 2000)?,
                default_dm_persona: env::var("DEFAULT_DM_PERSONA")
                    .unwrap_or_else(|_| "default_dm_npc".to_string()),
            },
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_window: 25,
            extraction_window: 25,
            segment_limit: 2000,
            default_dm_persona: "default_dm_npc".to_string(),
        }
    }
}
