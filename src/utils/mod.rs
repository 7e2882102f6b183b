//! # Utilities Module
//!
//! Cross-cutting helpers that don't belong in domain-specific modules.
//!
//! - `progress`: progress blackboard, heartbeat thread and interruption flag
//! - `text`: line-oriented input helpers shared by the format adapters

pub mod progress;
pub mod text;

pub use progress::{HeartbeatConfig, HeartbeatHandle, LoadProgress, Phase};
