//! Standalone bootstrap: wires the engine to a local stdin/stdout channel so
//! it can be exercised without a platform gateway.

use clap::Parser;
use mnemos::config::Config;
use mnemos::engine::ChatEngine;
use mnemos::llm::OpenAiCompatClient;
use mnemos::outbound::OutboundChannel;
use mnemos::persona::PersonaRegistry;
use mnemos::storage::LibsqlStore;
use mnemos::types::{AppError, IncomingMessage, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mnemos-server", about = "Conversational context & memory engine")]
struct Args {
    /// Database path override.
    #[arg(long)]
    database: Option<String>,

    /// Persona definition file override.
    #[arg(long)]
    personas: Option<String>,

    /// Persona answering the local session.
    #[arg(long)]
    persona: Option<String>,
}

/// Local outbound channel: replies land on stdout.
struct ConsoleOutbound;

#[async_trait::async_trait]
impl OutboundChannel for ConsoleOutbound {
    async fn send_typing_indicator(&self, _channel_id: &str) {}

    async fn send_segment(&self, _channel_id: &str, text: &str) -> Result<String> {
        println!("<<< {}", text);
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(database) = args.database {
        config.storage.database_path = database;
    }
    if let Some(personas) = args.personas {
        config.storage.personas_path = personas;
    }

    if let Some(parent) = std::path::Path::new(&config.storage.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Config(format!("Cannot create data directory: {}", e)))?;
        }
    }

    let storage = Arc::new(LibsqlStore::new_local(&config.storage.database_path).await?);
    tracing::info!(path = %config.storage.database_path, "Storage ready");

    let personas = Arc::new(PersonaRegistry::load(&config.storage.personas_path)?);
    personas.sync_to_storage(storage.as_ref()).await?;
    tracing::info!(count = personas.len(), "Personas loaded");

    let completion = Arc::new(OpenAiCompatClient::new(&config.completion)?);

    let session_persona = args
        .persona
        .unwrap_or_else(|| config.engine.default_dm_persona.clone());
    if !personas.contains(&session_persona) {
        return Err(AppError::Persona(format!(
            "Unknown persona: {}",
            session_persona
        )));
    }

    let engine = ChatEngine::new(
        storage,
        completion,
        Arc::new(ConsoleOutbound),
        personas,
        config.engine.clone(),
    );
    engine.initialize().await?;
    engine
        .activate_channel("local", "local", Some(&session_persona))
        .await?;

    tracing::info!(persona = %session_persona, "Ready. Type a message, Ctrl-D to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut counter = 0u64;
    while let Ok(Some(line)) = lines.next_line().await {
        let content = line.trim().to_string();
        if content.is_empty() {
            continue;
        }
        counter += 1;

        engine
            .handle_incoming_message(IncomingMessage {
                external_message_id: format!("local-{}", counter),
                channel_id: "local".to_string(),
                guild_id: None,
                author_user_id: "local-user".to_string(),
                author_display_name: whoami(),
                author_is_bot: false,
                content,
                is_direct_message: false,
                mentions_bot: false,
            })
            .await;
    }

    tracing::info!("Session closed");
    Ok(())
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "You".to_string())
}
