//! Outbound channel contract.
//!
//! The gateway process implements this over the actual chat platform; the
//! engine only depends on the contract. Segment sends return the platform's
//! message handle so callers can reference the delivered message.

use crate::types::Result;
use async_trait::async_trait;

#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Best-effort presence signal while a reply is being produced.
    /// Implementations swallow their own failures.
    async fn send_typing_indicator(&self, channel_id: &str);

    /// Deliver one reply segment. Segments of a multi-part reply are sent
    /// strictly one after another; a failure here aborts the remainder.
    async fn send_segment(&self, channel_id: &str, text: &str) -> Result<String>;
}
