//! Active-channel cache.
//!
//! Channel bindings gate every inbound message, so lookups must be
//! synchronous and cheap. Storage stays authoritative: the cache is hydrated
//! from it at startup and every mutation writes storage first, updating the
//! cache only after the write succeeded. A mutation that fails in storage
//! leaves the cache untouched.

use crate::storage::StorageGateway;
use crate::types::{ActiveChannelBinding, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct ActivationCache {
    bindings: RwLock<HashMap<String, ActiveChannelBinding>>,
    ready: AtomicBool,
}

impl ActivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with the bindings currently in storage.
    pub async fn hydrate(&self, storage: &dyn StorageGateway) -> Result<()> {
        let loaded = storage.find_active_channels().await?;
        let count = loaded.len();

        let mut bindings = self.bindings.write();
        bindings.clear();
        for binding in loaded {
            bindings.insert(binding.channel_id.clone(), binding);
        }
        drop(bindings);

        tracing::info!(count, "Hydrated active channel cache");
        Ok(())
    }

    /// Until this flips, inbound messages are ignored rather than answered
    /// from a possibly-empty cache.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn lookup(&self, channel_id: &str) -> Option<ActiveChannelBinding> {
        self.bindings.read().get(channel_id).cloned()
    }

    /// Bind a channel (storage first, then cache). Re-activating an already
    /// active channel updates its persona binding.
    pub async fn activate(
        &self,
        storage: &dyn StorageGateway,
        binding: ActiveChannelBinding,
    ) -> Result<()> {
        storage.upsert_active_channel(&binding).await?;
        self.bindings
            .write()
            .insert(binding.channel_id.clone(), binding);
        Ok(())
    }

    /// Unbind a channel (storage first, then cache). Returns `true` when a
    /// binding existed in storage.
    pub async fn deactivate(&self, storage: &dyn StorageGateway, channel_id: &str) -> Result<bool> {
        let existed = storage.delete_active_channel(channel_id).await?;
        self.bindings.write().remove(channel_id);
        Ok(existed)
    }
}
