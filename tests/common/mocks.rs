//! Hand-rolled doubles for the engine's three external collaborators.

use async_trait::async_trait;
use chrono::Utc;
use mnemos::outbound::OutboundChannel;
use mnemos::storage::StorageGateway;
use mnemos::types::{
    ActiveChannelBinding, AppError, ChatMessage, MemoryFact, MemoryScope, MessageRecord, Persona,
    Result, User,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

// ============= Storage Double =============

#[derive(Default)]
pub struct MemoryStore {
    pub channels: Mutex<HashMap<String, ActiveChannelBinding>>,
    pub users: Mutex<HashMap<String, User>>,
    pub messages: Mutex<Vec<MessageRecord>>,
    pub facts: Mutex<HashMap<(MemoryScope, String), MemoryFact>>,
    /// When set, every mutation fails with a storage error.
    pub fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    fn check_writes(&self) -> Result<()> {
        if *self.fail_writes.lock() {
            Err(AppError::Storage("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn assistant_messages(&self) -> Vec<MessageRecord> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.is_from_assistant)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StorageGateway for MemoryStore {
    async fn find_active_channels(&self) -> Result<Vec<ActiveChannelBinding>> {
        Ok(self.channels.lock().values().cloned().collect())
    }

    async fn upsert_active_channel(&self, binding: &ActiveChannelBinding) -> Result<()> {
        self.check_writes()?;
        self.channels
            .lock()
            .insert(binding.channel_id.clone(), binding.clone());
        Ok(())
    }

    async fn delete_active_channel(&self, channel_id: &str) -> Result<bool> {
        self.check_writes()?;
        Ok(self.channels.lock().remove(channel_id).is_some())
    }

    async fn find_or_create_user(&self, user_id: &str, display_name: &str) -> Result<User> {
        self.check_writes()?;
        let user = User {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
        };
        self.users.lock().insert(user_id.to_string(), user.clone());
        Ok(user)
    }

    async fn count_users(&self) -> Result<i64> {
        Ok(self.users.lock().len() as i64)
    }

    async fn append_message(&self, record: &MessageRecord) -> Result<()> {
        self.check_writes()?;
        self.messages.lock().push(record.clone());
        Ok(())
    }

    async fn load_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let messages = self.messages.lock();
        let mut recent: Vec<MessageRecord> = messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        if recent.len() > limit {
            recent = recent.split_off(recent.len() - limit);
        }
        Ok(recent)
    }

    async fn upsert_memory_fact(&self, scope: &MemoryScope, key: &str, value: &str) -> Result<()> {
        self.check_writes()?;
        let mut facts = self.facts.lock();
        let now = Utc::now();
        facts
            .entry((scope.clone(), key.to_string()))
            .and_modify(|fact| {
                fact.fact_value = value.to_string();
                fact.updated_at = now;
            })
            .or_insert_with(|| MemoryFact {
                scope: scope.clone(),
                fact_key: key.to_string(),
                fact_value: value.to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn find_memory_facts(&self, scope: &MemoryScope) -> Result<Vec<MemoryFact>> {
        let facts = self.facts.lock();
        let mut matched: Vec<MemoryFact> = facts
            .values()
            .filter(|fact| scope_applies(&fact.scope, scope))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matched.truncate(20);
        Ok(matched)
    }

    async fn delete_memory_fact(&self, scope: &MemoryScope, key: &str) -> Result<bool> {
        self.check_writes()?;
        Ok(self
            .facts
            .lock()
            .remove(&(scope.clone(), key.to_string()))
            .is_some())
    }

    async fn upsert_persona(&self, _persona: &Persona) -> Result<()> {
        self.check_writes()
    }

    async fn list_personas(&self) -> Result<Vec<Persona>> {
        Ok(Vec::new())
    }
}

/// Same scope union the real store queries with.
fn scope_applies(fact: &MemoryScope, query: &MemoryScope) -> bool {
    let fully_scoped = fact == query;
    let user_global = fact.user_id == query.user_id
        && fact.channel_id.is_none()
        && fact.persona_id.is_none();
    let persona_global = fact.persona_id == query.persona_id
        && fact.channel_id.is_none()
        && fact.user_id.is_none();
    let cross_channel_persona = fact.user_id == query.user_id
        && fact.persona_id == query.persona_id
        && fact.channel_id.is_some();
    let cross_channel = fact.user_id == query.user_id
        && fact.persona_id.is_none()
        && fact.channel_id.is_some();

    fully_scoped || user_global || persona_global || cross_channel_persona || cross_channel
}

// ============= Completion Double =============

#[derive(Default)]
pub struct MockCompletionClient {
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    queue: Mutex<VecDeque<Option<String>>>,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next `complete` call. An exhausted queue
    /// yields `None` (endpoint failure).
    pub fn push_response(&self, response: Option<&str>) {
        self.queue.lock().push_back(response.map(str::to_string));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl mnemos::llm::CompletionClient for MockCompletionClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Option<String> {
        self.calls.lock().push(messages.to_vec());
        self.queue.lock().pop_front().flatten()
    }
}

// ============= Outbound Double =============

#[derive(Default)]
pub struct RecordingOutbound {
    pub sent: Mutex<Vec<(String, String)>>,
    pub typing: Mutex<Vec<String>>,
    fail_from: Mutex<Option<usize>>,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send once `n` segments have been delivered.
    pub fn fail_after(&self, n: usize) {
        *self.fail_from.lock() = Some(n);
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl OutboundChannel for RecordingOutbound {
    async fn send_typing_indicator(&self, channel_id: &str) {
        self.typing.lock().push(channel_id.to_string());
    }

    async fn send_segment(&self, channel_id: &str, text: &str) -> Result<String> {
        let mut sent = self.sent.lock();
        if let Some(n) = *self.fail_from.lock() {
            if sent.len() >= n {
                return Err(AppError::Outbound("injected send failure".to_string()));
            }
        }
        sent.push((channel_id.to_string(), text.to_string()));
        Ok(format!("handle-{}", sent.len()))
    }
}
