//! Storage abstraction for the engine's durable state.
//!
//! The engine only ever talks to [`StorageGateway`]; the shipped backend is
//! [`LibsqlStore`] (local SQLite file or in-memory). External processes such
//! as a dashboard consume the same contract.
//!
//! # Example
//!
//! ```rust,ignore
//! use mnemos::storage::{LibsqlStore, StorageGateway};
//!
//! let store = LibsqlStore::new_memory().await?;
//! let bindings = store.find_active_channels().await?;
//! ```

mod libsql;

pub use libsql::LibsqlStore;

use crate::types::{ActiveChannelBinding, MemoryFact, MemoryScope, MessageRecord, Result, User};
use async_trait::async_trait;

/// Async CRUD contract over the engine's durable state: users, message
/// history, memory facts, active channel bindings and synced personas.
///
/// Failure policy is part of the contract: `append_message` is best-effort
/// for callers (the engine logs and continues), while binding mutations must
/// surface errors so the caller can report that the change did not take
/// effect.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    // ============== Active Channel Operations ==============

    /// All current channel bindings, used to hydrate the activation cache.
    async fn find_active_channels(&self) -> Result<Vec<ActiveChannelBinding>>;

    /// Insert or update the binding for `binding.channel_id`.
    async fn upsert_active_channel(&self, binding: &ActiveChannelBinding) -> Result<()>;

    /// Remove the binding for a channel. Returns `true` when a binding
    /// existed.
    async fn delete_active_channel(&self, channel_id: &str) -> Result<bool>;

    // ============== User Operations ==============

    /// Fetch a user, creating the record on first sight. Refreshes the
    /// stored display name when it changed.
    async fn find_or_create_user(&self, user_id: &str, display_name: &str) -> Result<User>;

    /// Total number of known users.
    async fn count_users(&self) -> Result<i64>;

    // ============== Message History Operations ==============

    /// Append one conversation turn. History is append-only.
    async fn append_message(&self, record: &MessageRecord) -> Result<()>;

    /// Up to `limit` most recent messages for a channel, returned in
    /// chronological (oldest-first) order.
    async fn load_recent_messages(&self, channel_id: &str, limit: usize)
        -> Result<Vec<MessageRecord>>;

    // ============== Memory Fact Operations ==============

    /// Insert or update a fact under the exact scope. Last write wins on the
    /// value; the original creation time is preserved.
    async fn upsert_memory_fact(&self, scope: &MemoryScope, key: &str, value: &str) -> Result<()>;

    /// Facts applicable to an addressing context, as the union of the
    /// documented scope combinations (fully-scoped, user-global,
    /// persona-global, and the user+persona cross-channel forms). The read
    /// union is deliberately broader than the fully-scoped write.
    async fn find_memory_facts(&self, scope: &MemoryScope) -> Result<Vec<MemoryFact>>;

    /// Delete a fact under the exact scope. Returns `true` when a fact
    /// existed.
    async fn delete_memory_fact(&self, scope: &MemoryScope, key: &str) -> Result<bool>;

    // ============== Persona Operations ==============

    /// Upsert one persona definition (startup reconciliation from the
    /// registry; never deletes).
    async fn upsert_persona(&self, persona: &crate::types::Persona) -> Result<()>;

    /// All personas currently synced into storage.
    async fn list_personas(&self) -> Result<Vec<crate::types::Persona>>;
}
