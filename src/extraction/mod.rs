//! Memory extraction pipeline.
//!
//! After each exchange a second completion call mines durable facts from the
//! recent conversation. The pipeline is best-effort end to end: it runs after
//! the reply has already been delivered, and nothing in here is allowed to
//! propagate an error past [`MemoryExtractor::run`].

use crate::llm::CompletionClient;
use crate::storage::StorageGateway;
use crate::types::{ChatMessage, MemoryScope};
use serde_json::Value;
use std::sync::Arc;

const EXTRACTION_INSTRUCTION: &str = "You are a memory extraction module. Review the \
conversation below and identify new durable facts worth remembering long-term about the user \
or the conversation (preferences, personal details, decisions, ongoing topics). Respond with \
ONLY a single JSON object mapping a short fact category to a fact value, for example \
{\"Favorite color\": \"blue\"}. Do not include greetings, meta-commentary, questions, or \
trivia that is not worth remembering. If there is nothing new worth remembering, respond \
with exactly {}.";

pub struct MemoryExtractor {
    storage: Arc<dyn StorageGateway>,
    completion: Arc<dyn CompletionClient>,
    extraction_window: usize,
}

impl MemoryExtractor {
    pub fn new(
        storage: Arc<dyn StorageGateway>,
        completion: Arc<dyn CompletionClient>,
        extraction_window: usize,
    ) -> Self {
        Self {
            storage,
            completion,
            extraction_window,
        }
    }

    /// Mine facts from the just-completed exchange and upsert them scoped to
    /// `(channel, user, persona)`. Every failure mode logs and returns.
    pub async fn run(
        &self,
        channel_id: &str,
        user_id: &str,
        persona_id: Option<&str>,
        raw_assistant_reply: Option<&str>,
    ) {
        let raw_reply = match raw_assistant_reply {
            Some(raw) => raw,
            None => {
                tracing::debug!(channel_id, "No assistant reply, nothing to extract");
                return;
            }
        };

        let prompt = match self.build_prompt(channel_id, raw_reply).await {
            Some(prompt) => prompt,
            None => return,
        };

        let response = match self.completion.complete(&prompt).await {
            Some(response) => response,
            None => {
                tracing::warn!(channel_id, "Extraction completion call failed");
                return;
            }
        };

        let facts = match parse_fact_object(&response) {
            Some(facts) => facts,
            None => return,
        };
        if facts.is_empty() {
            tracing::debug!(channel_id, "Extraction produced no new facts");
            return;
        }

        let scope = MemoryScope::new(
            Some(channel_id.to_string()),
            Some(user_id.to_string()),
            persona_id.map(str::to_string),
        );

        // Each upsert is independent; one failing must not abort the rest.
        let mut stored = 0usize;
        for (key, value) in &facts {
            let value = match fact_value_string(value) {
                Some(value) => value,
                None => continue,
            };
            match self.storage.upsert_memory_fact(&scope, key, &value).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    tracing::warn!(channel_id, fact_key = %key, "Failed to store fact: {}", e);
                }
            }
        }
        tracing::info!(channel_id, stored, "Memory extraction finished");
    }

    /// Extraction instruction plus an independently reloaded history window,
    /// with the freshest assistant turn replaced by the raw reply text.
    async fn build_prompt(&self, channel_id: &str, raw_reply: &str) -> Option<Vec<ChatMessage>> {
        let records = match self
            .storage
            .load_recent_messages(channel_id, self.extraction_window)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(channel_id, "Extraction history reload failed: {}", e);
                return None;
            }
        };

        let last_assistant = records.iter().rposition(|r| r.is_from_assistant);

        let mut prompt = vec![ChatMessage::system(EXTRACTION_INSTRUCTION)];
        for (idx, record) in records.iter().enumerate() {
            if record.is_from_assistant {
                let content = if Some(idx) == last_assistant {
                    raw_reply.to_string()
                } else {
                    record.content.clone()
                };
                prompt.push(ChatMessage::assistant(content));
            } else {
                let name = record
                    .author_display_name
                    .clone()
                    .or_else(|| record.author_user_id.as_ref().map(|id| format!("User_{}", id)))
                    .unwrap_or_else(|| "User".to_string());
                prompt.push(ChatMessage::user(format!("{}: {}", name, record.content)));
            }
        }

        // History may be empty if the reply-path writes have not landed yet;
        // the raw exchange itself is still worth mining.
        if last_assistant.is_none() {
            prompt.push(ChatMessage::assistant(raw_reply.to_string()));
        }

        Some(prompt)
    }
}

/// Defensive parse of the extraction response: try the substring between the
/// first `{` and the last `}`, falling back to the full trimmed text. Only an
/// object counts; anything else is a no-op.
pub fn parse_fact_object(response: &str) -> Option<serde_json::Map<String, Value>> {
    let trimmed = response.trim();

    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(open), Some(close)) if open < close => &trimmed[open..=close],
        _ => trimmed,
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            tracing::debug!("Extraction returned a non-object JSON value: {}", other);
            None
        }
        Err(e) => {
            tracing::warn!("Unparseable extraction response: {}", e);
            None
        }
    }
}

/// Stringify a fact value; `null` means the model had nothing for that key.
fn fact_value_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_embedded_in_chatter() {
        let facts =
            parse_fact_object("Sure! {\"Interest\":\"astronomy\"} Hope that helps").unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts["Interest"], Value::String("astronomy".to_string()));
    }

    #[test]
    fn parses_bare_object() {
        let facts = parse_fact_object("{\"Hometown\": \"Brno\", \"Pets\": \"two cats\"}").unwrap();
        assert_eq!(facts.len(), 2);
    }

    #[test]
    fn empty_object_is_empty_map() {
        assert!(parse_fact_object("{}").unwrap().is_empty());
        assert!(parse_fact_object("  {} ").unwrap().is_empty());
    }

    #[test]
    fn garbage_and_non_objects_are_rejected() {
        assert!(parse_fact_object("no json here").is_none());
        assert!(parse_fact_object("[1, 2, 3]").is_none());
        assert!(parse_fact_object("{broken").is_none());
        assert!(parse_fact_object("").is_none());
    }

    #[test]
    fn non_string_values_are_stringified() {
        assert_eq!(fact_value_string(&Value::Bool(true)), Some("true".to_string()));
        assert_eq!(
            fact_value_string(&Value::Number(7.into())),
            Some("7".to_string())
        );
        assert_eq!(fact_value_string(&Value::Null), None);
    }
}
