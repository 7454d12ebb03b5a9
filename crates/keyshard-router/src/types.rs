//! Common types for the router module
//!
//! Centralizes constants shared by the command table and the proxy.

use serde::{Deserialize, Serialize};

pub use keyshard_core::ShardName;

/// Logical key owning the shared queue
pub const QUEUE_KEY: &str = "queue";

/// Commands starting with this prefix are routed by their `{tag}`
pub const TAG_PREFIX: &str = "tag_";

/// Timeout forwarded with blocking pops when none is given (block forever)
pub const NO_TIMEOUT: u64 = 0;

/// Argument position that carries the routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPosition {
    First,
    Second,
}

impl KeyPosition {
    /// Zero-based index into the argument list
    pub fn index(self) -> usize {
        match self {
            KeyPosition::First => 0,
            KeyPosition::Second => 1,
        }
    }
}

impl std::fmt::Display for KeyPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPosition::First => write!(f, "first"),
            KeyPosition::Second => write!(f, "second"),
        }
    }
}
