//! The orchestrating entry points: channel activation commands and the
//! per-message reply flow.
//!
//! Per inbound message: eligibility gate, persist the user turn, assemble
//! context, one completion call, post-process and send segments, persist the
//! raw assistant turn, then spawn memory extraction without awaiting it.

use crate::channels::ActivationCache;
use crate::config::EngineConfig;
use crate::context::ContextAssembler;
use crate::extraction::MemoryExtractor;
use crate::llm::CompletionClient;
use crate::outbound::OutboundChannel;
use crate::persona::PersonaRegistry;
use crate::postprocess;
use crate::storage::StorageGateway;
use crate::types::{
    ActiveChannelBinding, AppError, IncomingMessage, MessageRecord, Result,
};
use chrono::Utc;
use std::sync::Arc;

const APOLOGY_MESSAGE: &str =
    "Sorry, I can't come up with a sensible reply right now. Please try again later.";
const SEND_FAILURE_NOTICE: &str =
    "Sorry, I couldn't deliver the rest of my reply.";

pub struct ChatEngine {
    storage: Arc<dyn StorageGateway>,
    completion: Arc<dyn CompletionClient>,
    outbound: Arc<dyn OutboundChannel>,
    personas: Arc<PersonaRegistry>,
    activation: Arc<ActivationCache>,
    assembler: ContextAssembler,
    extractor: Arc<MemoryExtractor>,
    config: EngineConfig,
}

impl ChatEngine {
    pub fn new(
        storage: Arc<dyn StorageGateway>,
        completion: Arc<dyn CompletionClient>,
        outbound: Arc<dyn OutboundChannel>,
        personas: Arc<PersonaRegistry>,
        config: EngineConfig,
    ) -> Self {
        let assembler =
            ContextAssembler::new(storage.clone(), personas.clone(), config.history_window);
        let extractor = Arc::new(MemoryExtractor::new(
            storage.clone(),
            completion.clone(),
            config.extraction_window,
        ));

        Self {
            storage,
            completion,
            outbound,
            personas,
            activation: Arc::new(ActivationCache::new()),
            assembler,
            extractor,
            config,
        }
    }

    /// Hydrate the activation cache and open the readiness gate. Call once at
    /// startup, after the persona registry has loaded.
    pub async fn initialize(&self) -> Result<()> {
        self.activation.hydrate(self.storage.as_ref()).await?;
        self.activation.mark_ready();
        Ok(())
    }

    pub fn activation(&self) -> &ActivationCache {
        &self.activation
    }

    // ============== Command Entry Points ==============

    /// Bind a channel to a persona. Errors surface so the command layer can
    /// tell the user the activation did not take effect.
    pub async fn activate_channel(
        &self,
        channel_id: &str,
        guild_id: &str,
        persona_id: Option<&str>,
    ) -> Result<()> {
        if let Some(id) = persona_id {
            if !self.personas.contains(id) {
                return Err(AppError::Persona(format!("Unknown persona: {}", id)));
            }
        }

        let binding = ActiveChannelBinding {
            channel_id: channel_id.to_string(),
            guild_id: guild_id.to_string(),
            persona_id: persona_id.map(str::to_string),
        };
        self.activation
            .activate(self.storage.as_ref(), binding)
            .await?;

        tracing::info!(channel_id, persona_id = ?persona_id, "Channel activated");
        Ok(())
    }

    /// Unbind a channel. Returns `true` when a binding existed.
    pub async fn deactivate_channel(&self, channel_id: &str) -> Result<bool> {
        let existed = self
            .activation
            .deactivate(self.storage.as_ref(), channel_id)
            .await?;
        tracing::info!(channel_id, existed, "Channel deactivated");
        Ok(existed)
    }

    // ============== Message Flow ==============

    /// Process one inbound platform message end to end. All failures past the
    /// eligibility gate degrade internally; nothing propagates to the caller.
    pub async fn handle_incoming_message(&self, message: IncomingMessage) {
        if message.author_is_bot {
            return;
        }

        if !self.activation.is_ready() {
            tracing::debug!(
                channel_id = %message.channel_id,
                "Not ready yet, ignoring message"
            );
            return;
        }

        let binding = self.activation.lookup(&message.channel_id);

        // Eligible when the channel is bound, or it is a DM. A bare mention
        // in an unbound channel is noted but not answered.
        let persona_id: Option<String> = match &binding {
            Some(binding) => binding.persona_id.clone(),
            None if message.is_direct_message => {
                Some(self.config.default_dm_persona.clone())
            }
            None if message.mentions_bot => {
                tracing::debug!(
                    channel_id = %message.channel_id,
                    "Mentioned in an inactive channel, not replying"
                );
                return;
            }
            None => return,
        };

        self.persist_user_turn(&message, persona_id.as_deref()).await;

        self.outbound
            .send_typing_indicator(&message.channel_id)
            .await;

        let prompt = self
            .assembler
            .build(
                &message.channel_id,
                &message.author_user_id,
                persona_id.as_deref(),
                &message.content,
            )
            .await;

        let raw_reply = self.completion.complete(&prompt).await;

        let cleaned = raw_reply
            .as_deref()
            .map(postprocess::extract_final_answer)
            .map(|answer| postprocess::clean(&answer))
            .unwrap_or_default();

        let first_handle = if cleaned.is_empty() {
            tracing::warn!(
                channel_id = %message.channel_id,
                "No usable reply after cleaning, sending apology"
            );
            self.send_segments(&message.channel_id, &[APOLOGY_MESSAGE.to_string()])
                .await
        } else {
            let segments = postprocess::segment(&cleaned, self.config.segment_limit);
            self.send_segments(&message.channel_id, &segments).await
        };

        // The raw, unprocessed reply goes into history, never the segments.
        if let Some(raw) = &raw_reply {
            self.persist_assistant_turn(&message, persona_id.as_deref(), raw, first_handle)
                .await;
        }

        // Extraction runs detached; the reply path never waits on it.
        let extractor = self.extractor.clone();
        let channel_id = message.channel_id.clone();
        let user_id = message.author_user_id.clone();
        tokio::spawn(async move {
            extractor
                .run(&channel_id, &user_id, persona_id.as_deref(), raw_reply.as_deref())
                .await;
        });
    }

    /// Register the author and append their message to history. Best-effort:
    /// a failure here only makes the upcoming prompt poorer.
    async fn persist_user_turn(&self, message: &IncomingMessage, persona_id: Option<&str>) {
        if let Err(e) = self
            .storage
            .find_or_create_user(&message.author_user_id, &message.author_display_name)
            .await
        {
            tracing::warn!("Failed to register user: {}", e);
        }

        let record = MessageRecord {
            external_message_id: message.external_message_id.clone(),
            channel_id: message.channel_id.clone(),
            guild_id: message.guild_id.clone(),
            author_user_id: Some(message.author_user_id.clone()),
            author_display_name: Some(message.author_display_name.clone()),
            persona_id: persona_id.map(str::to_string),
            content: message.content.clone(),
            is_from_assistant: false,
            created_at: Utc::now(),
        };
        if let Err(e) = self.storage.append_message(&record).await {
            tracing::warn!("Failed to store user message: {}", e);
        }
    }

    async fn persist_assistant_turn(
        &self,
        message: &IncomingMessage,
        persona_id: Option<&str>,
        raw_reply: &str,
        first_handle: Option<String>,
    ) {
        let record = MessageRecord {
            external_message_id: first_handle
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            channel_id: message.channel_id.clone(),
            guild_id: message.guild_id.clone(),
            author_user_id: None,
            author_display_name: None,
            persona_id: persona_id.map(str::to_string),
            content: raw_reply.to_string(),
            is_from_assistant: true,
            created_at: Utc::now(),
        };
        if let Err(e) = self.storage.append_message(&record).await {
            tracing::warn!("Failed to store assistant reply: {}", e);
        }
    }

    /// Send segments strictly in order. A failed segment aborts the rest and
    /// triggers a best-effort notice. Returns the handle of the first
    /// delivered segment.
    async fn send_segments(&self, channel_id: &str, segments: &[String]) -> Option<String> {
        let mut first_handle = None;

        for (idx, segment_text) in segments.iter().enumerate() {
            match self.outbound.send_segment(channel_id, segment_text).await {
                Ok(handle) => {
                    if first_handle.is_none() {
                        first_handle = Some(handle);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        channel_id,
                        segment = idx + 1,
                        total = segments.len(),
                        "Segment send failed, aborting remainder: {}",
                        e
                    );
                    if self
                        .outbound
                        .send_segment(channel_id, SEND_FAILURE_NOTICE)
                        .await
                        .is_err()
                    {
                        tracing::error!(channel_id, "Failed to send delivery notice");
                    }
                    break;
                }
            }
        }

        first_handle
    }
}
