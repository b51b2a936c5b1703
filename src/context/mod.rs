//! Prompt assembly for the reply path.
//!
//! The entry order is a contract the model is sensitive to: persona
//! instruction, then persisted memory, then chronological history, then the
//! current message. Assembly never fails outright; a storage error drops the
//! affected section and the prompt degrades to persona + current message.

use crate::persona::PersonaRegistry;
use crate::storage::StorageGateway;
use crate::types::{ChatMessage, MemoryFact, MemoryScope};
use std::sync::Arc;

/// Instruction used when a bound persona id no longer resolves.
const FALLBACK_INSTRUCTION: &str =
    "You are a helpful conversational assistant. Reply naturally and concisely.";

const MEMORY_PREAMBLE: &str =
    "Persisted context follows: durable facts previously learned about this \
     conversation. Use them naturally when relevant; do not recite them.";

pub struct ContextAssembler {
    storage: Arc<dyn StorageGateway>,
    personas: Arc<PersonaRegistry>,
    history_window: usize,
}

impl ContextAssembler {
    pub fn new(
        storage: Arc<dyn StorageGateway>,
        personas: Arc<PersonaRegistry>,
        history_window: usize,
    ) -> Self {
        Self {
            storage,
            personas,
            history_window,
        }
    }

    /// Build the ordered prompt for one inbound message. Read-only; tolerates
    /// empty memory and empty history (new channel).
    pub async fn build(
        &self,
        channel_id: &str,
        user_id: &str,
        persona_id: Option<&str>,
        current_message_text: &str,
    ) -> Vec<ChatMessage> {
        let mut prompt = Vec::new();

        // 1. Persona instruction, degrading to the generic fallback.
        let instruction = persona_id
            .and_then(|id| self.personas.get(id))
            .map(|p| p.base_prompt.clone())
            .unwrap_or_else(|| {
                tracing::warn!(persona_id = ?persona_id, "Persona not found, using fallback");
                FALLBACK_INSTRUCTION.to_string()
            });
        prompt.push(ChatMessage::system(instruction));

        // 2. Persisted memory facts for this addressing context.
        let scope = MemoryScope::new(
            Some(channel_id.to_string()),
            Some(user_id.to_string()),
            persona_id.map(str::to_string),
        );
        match self.storage.find_memory_facts(&scope).await {
            Ok(facts) if !facts.is_empty() => {
                prompt.push(ChatMessage::system(MEMORY_PREAMBLE));
                for fact in &facts {
                    prompt.push(ChatMessage::system(render_fact(fact)));
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Memory lookup failed, continuing without facts: {}", e);
            }
        }

        // 3. Recent history, oldest first. Remember the freshest display name
        //    seen for the current author while walking it.
        let mut current_author_name: Option<String> = None;
        match self
            .storage
            .load_recent_messages(channel_id, self.history_window)
            .await
        {
            Ok(records) => {
                for record in &records {
                    if record.is_from_assistant {
                        prompt.push(ChatMessage::assistant(record.content.clone()));
                        continue;
                    }

                    let name = display_name(
                        record.author_display_name.as_deref(),
                        record.author_user_id.as_deref(),
                    );
                    if record.author_user_id.as_deref() == Some(user_id)
                        && record.author_display_name.is_some()
                    {
                        current_author_name = record.author_display_name.clone();
                    }
                    prompt.push(ChatMessage::user(format!("{}: {}", name, record.content)));
                }
            }
            Err(e) => {
                tracing::warn!("History lookup failed, continuing without history: {}", e);
            }
        }

        // 4. The current message, last.
        let name =
            current_author_name.unwrap_or_else(|| format!("User_{}", user_id));
        prompt.push(ChatMessage::user(format!(
            "{}: {}",
            name, current_message_text
        )));

        prompt
    }
}

/// One fact as a single-key JSON object; a fact that fails to serialize falls
/// back to plain `key: value` rather than aborting assembly.
fn render_fact(fact: &MemoryFact) -> String {
    let mut object = serde_json::Map::new();
    object.insert(
        fact.fact_key.clone(),
        serde_json::Value::String(fact.fact_value.clone()),
    );

    match serde_json::to_string(&serde_json::Value::Object(object)) {
        Ok(rendered) => rendered,
        Err(_) => format!("{}: {}", fact.fact_key, fact.fact_value),
    }
}

fn display_name(author_display_name: Option<&str>, author_user_id: Option<&str>) -> String {
    match (author_display_name, author_user_id) {
        (Some(name), _) => name.to_string(),
        (None, Some(id)) => format!("User_{}", id),
        (None, None) => "User".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn fact_renders_as_single_key_json() {
        let fact = MemoryFact {
            scope: MemoryScope::default(),
            fact_key: "Interest".to_string(),
            fact_value: "astronomy".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(render_fact(&fact), r#"{"Interest":"astronomy"}"#);
    }

    #[test]
    fn display_name_falls_back_to_placeholder() {
        assert_eq!(display_name(Some("Ada"), Some("u1")), "Ada");
        assert_eq!(display_name(None, Some("u1")), "User_u1");
        assert_eq!(display_name(None, None), "User");
    }
}
