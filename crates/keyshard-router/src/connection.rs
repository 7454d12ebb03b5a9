//! Shard connection seams
//!
//! The router never speaks a wire protocol. It needs exactly two things
//! from the outside:
//!
//! - `ShardConnection`: run one command on one shard
//! - `ConnectionFactory`: turn a shard descriptor into a connection

use async_trait::async_trait;
use keyshard_core::ShardDescriptor;
use keyshard_types::{BackendResult, Value};
use std::sync::Arc;

/// Executes commands against one shard.
///
/// Implementations must tolerate concurrent calls, either by pooling or by
/// serializing internally; the proxy shares one handle across all callers.
#[async_trait]
pub trait ShardConnection: Send + Sync {
    /// Run `command` with `args` and return the reply
    async fn execute(&self, command: &str, args: &[Value]) -> BackendResult<Value>;
}

/// Builds one connection handle per shard
pub trait ConnectionFactory {
    fn connect(&self, shard: &ShardDescriptor) -> BackendResult<Arc<dyn ShardConnection>>;
}

