//! # Mnemos
//!
//! Conversational context & memory engine for persona-driven chat bots.
//!
//! For each inbound message the engine merges static persona configuration,
//! long-term key/value memory and short-term message history into a bounded
//! prompt, calls a completion endpoint,
//! post-processes the reply into channel-safe segments, and then runs a
//! detached best-effort extraction pass that writes new memory facts without
//! ever blocking the reply path.
//!
//! The chat-platform gateway, the completion HTTP endpoint and the durable
//! store are external collaborators reached through the [`outbound`],
//! [`llm`] and [`storage`] contracts.

pub mod channels;
pub mod config;
pub mod context;
pub mod engine;
pub mod extraction;
pub mod llm;
pub mod outbound;
pub mod persona;
pub mod postprocess;
pub mod storage;
pub mod types;

pub use channels::ActivationCache;
pub use config::Config;
pub use engine::ChatEngine;
pub use persona::PersonaRegistry;
pub use types::{AppError, Result};
