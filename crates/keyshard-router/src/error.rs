//! Error types for the router module

use keyshard_types::BackendError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fanout::ShardFailure;
use crate::types::KeyPosition;

/// Router error types
///
/// Everything except `Backend` and `FanOut` is raised before any shard
/// connection is contacted.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two shards share a name
    #[error("server's name config must be unique: {0}")]
    DuplicateShard(String),

    /// A key lookup was attempted with no shards configured
    #[error("No shards configured; cannot resolve a key")]
    NoShards,

    /// The routing key argument is absent
    #[error("method '{command}' requires a key param as the {position} argument")]
    MissingKey { command: String, position: KeyPosition },

    /// The routing key argument is present but not a string
    #[error("method '{command}' requires a key param as the {position} argument (got {found})")]
    WrongKeyType {
        command: String,
        position: KeyPosition,
        found: &'static str,
    },

    /// A tag command without a `{tag}` in its key
    #[error("method '{command}' requires tag key params as its arguments")]
    MissingTag { command: String },

    /// A non-routing argument has the wrong shape
    #[error("method '{command}': {reason}")]
    InvalidArgument { command: String, reason: String },

    /// The command is not in the routing table
    #[error("method '{command}' cannot be sharded")]
    Unsupported { command: String },

    /// A blocking pop was given anything but a single string key
    #[error("method '{command}': the key must be a single string; multiple keys cannot be sharded")]
    MultipleKeys { command: String },

    /// Failure reported by the shard connection, passed through as is
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// One or more shards failed during a fan-out command
    #[error(
        "method '{command}' failed on {} of {} shards: {}",
        .failures.len(),
        .contacted,
        describe_failures(.failures)
    )]
    FanOut {
        command: String,
        contacted: usize,
        failures: Vec<ShardFailure>,
    },
}

/// Coarse classification of a [`RouterError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad shard set (duplicates, no shards)
    Configuration,
    /// Routing key missing, mistyped, or missing its tag
    RoutingKey,
    /// Other argument malformed
    InvalidArgument,
    /// Command outside the routing table
    Unsupported,
    /// Multi-key blocking command
    SingleKeyViolation,
    /// Connectivity or protocol failure on one shard
    Backend,
    /// Failures collected from a fan-out command
    FanOut,
}

impl RouterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::InvalidConfig(_) | RouterError::DuplicateShard(_) | RouterError::NoShards => {
                ErrorKind::Configuration
            }
            RouterError::MissingKey { .. }
            | RouterError::WrongKeyType { .. }
            | RouterError::MissingTag { .. } => ErrorKind::RoutingKey,
            RouterError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            RouterError::Unsupported { .. } => ErrorKind::Unsupported,
            RouterError::MultipleKeys { .. } => ErrorKind::SingleKeyViolation,
            RouterError::Backend(_) => ErrorKind::Backend,
            RouterError::FanOut { .. } => ErrorKind::FanOut,
        }
    }

    /// True for errors raised locally, before any shard was contacted
    pub fn is_usage_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Backend | ErrorKind::FanOut)
    }
}

fn describe_failures(failures: &[ShardFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
