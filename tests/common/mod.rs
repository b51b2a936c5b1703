pub mod mocks;

use mnemos::engine::ChatEngine;
use mnemos::persona::PersonaRegistry;
use mnemos::types::IncomingMessage;
use mocks::{MemoryStore, MockCompletionClient, RecordingOutbound};
use std::io::Write;
use std::sync::Arc;

pub const PERSONAS_JSON: &str = r#"{
    "astronomer": {
        "name": "Vega",
        "basePrompt": "You are Vega, a friendly astronomer.",
        "description": "Stargazer"
    },
    "default_dm_npc": {
        "name": "Echo",
        "basePrompt": "You are Echo, a helpful companion.",
        "description": "DM default"
    }
}"#;

pub fn sample_registry() -> Arc<PersonaRegistry> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(PERSONAS_JSON.as_bytes()).unwrap();
    Arc::new(PersonaRegistry::load(file.path()).unwrap())
}

pub struct TestHarness {
    pub engine: ChatEngine,
    pub storage: Arc<MemoryStore>,
    pub completion: Arc<MockCompletionClient>,
    pub outbound: Arc<RecordingOutbound>,
}

impl TestHarness {
    /// Engine wired to in-memory doubles, already past the readiness gate.
    pub async fn ready() -> Self {
        let harness = Self::cold();
        harness.engine.initialize().await.unwrap();
        harness
    }

    /// Same wiring, but without hydration: the readiness gate stays closed.
    pub fn cold() -> Self {
        Self::with_config(mnemos::config::EngineConfig::default())
    }

    pub fn with_config(config: mnemos::config::EngineConfig) -> Self {
        let storage = Arc::new(MemoryStore::new());
        let completion = Arc::new(MockCompletionClient::new());
        let outbound = Arc::new(RecordingOutbound::new());

        let engine = ChatEngine::new(
            storage.clone(),
            completion.clone(),
            outbound.clone(),
            sample_registry(),
            config,
        );

        Self {
            engine,
            storage,
            completion,
            outbound,
        }
    }
}

pub fn incoming(channel_id: &str, content: &str) -> IncomingMessage {
    IncomingMessage {
        external_message_id: format!("msg-{}", uuid::Uuid::new_v4()),
        channel_id: channel_id.to_string(),
        guild_id: Some("g1".to_string()),
        author_user_id: "u1".to_string(),
        author_display_name: "Ada".to_string(),
        author_is_bot: false,
        content: content.to_string(),
        is_direct_message: false,
        mentions_bot: false,
    }
}
