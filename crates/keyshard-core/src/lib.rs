//! Keyshard Core - Shared configuration for the proxy and its backends
//!
//! This crate provides the shard descriptors and proxy configuration
//! consumed by keyshard-router and keyshard-resp.

pub mod config;
pub mod shard;

pub use config::{parse_shard_list, ConfigError, ProxyConfig};
pub use shard::{ShardDescriptor, ShardName, DEFAULT_PORT};
