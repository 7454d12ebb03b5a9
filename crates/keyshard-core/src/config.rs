//! Configuration module for the sharding proxy

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::shard::ShardDescriptor;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid shard entry '{entry}': {reason}")]
    InvalidShardEntry { entry: String, reason: String },

    #[error("server's name config must be unique: {0}")]
    DuplicateShard(String),

    #[error("Shard name cannot be empty")]
    EmptyShardName,

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Shards in routing order. Reordering changes the owner of most keys.
    pub shards: Vec<ShardDescriptor>,

    /// Name reported to each shard with CLIENT SETNAME
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Connect timeout per shard connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Idle connections kept per shard
    #[serde(default = "default_max_idle")]
    pub max_idle_per_shard: usize,
}

fn default_client_name() -> String {
    format!("keyshard-{}", uuid::Uuid::new_v4())
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_max_idle() -> usize {
    8
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            shards: vec![],
            client_name: default_client_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_idle_per_shard: default_max_idle(),
        }
    }
}

impl ProxyConfig {
    /// Create a configuration over the given shards
    pub fn new(shards: Vec<ShardDescriptor>) -> Self {
        Self {
            shards,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// - `KEYSHARD_SHARDS`: comma separated shard entries, see [`parse_shard_list`]
    /// - `KEYSHARD_CLIENT_NAME`
    /// - `KEYSHARD_CONNECT_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ProxyConfig::default();

        if let Ok(shards) = std::env::var("KEYSHARD_SHARDS") {
            config.shards = parse_shard_list(&shards)?;
        }

        if let Ok(name) = std::env::var("KEYSHARD_CLIENT_NAME") {
            if !name.trim().is_empty() {
                config.client_name = name.trim().to_string();
            }
        }

        if let Ok(timeout) = std::env::var("KEYSHARD_CONNECT_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                config.connect_timeout_ms = timeout;
            }
        }

        debug!(shards = config.shards.len(), "Loaded configuration from environment");
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Shard names in routing order
    pub fn shard_names(&self) -> Vec<String> {
        self.shards.iter().map(|s| s.name.clone()).collect()
    }

    /// Reject empty or duplicate shard names.
    ///
    /// An empty shard list is accepted here; lookups against it fail later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for shard in &self.shards {
            if shard.name.is_empty() {
                return Err(ConfigError::EmptyShardName);
            }
            if !seen.insert(shard.name.as_str()) {
                return Err(ConfigError::DuplicateShard(shard.name.clone()));
            }
        }
        Ok(())
    }
}

/// Parse a comma separated list of shard entries, keeping their order.
///
/// Blank entries are skipped, so trailing commas are harmless.
pub fn parse_shard_list(list: &str) -> Result<Vec<ShardDescriptor>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse::<ShardDescriptor>)
        .collect()
}
