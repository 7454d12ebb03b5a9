//! Static command routing table

use serde::{Deserialize, Serialize};

use crate::error::RouterError;
use crate::types::TAG_PREFIX;

/// How results from every shard are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// Concatenate list replies in shard order
    Concat,
    /// Drop the replies; succeed only if every shard did
    Discard,
}

/// How a command finds its shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandCategory {
    /// Routing key is the first argument
    Direct,
    /// Routing key is the `{tag}` of the first argument (or of its first element)
    Tag,
    /// Routing key is the second argument
    FieldIndexed,
    /// Always routed by the shared queue key
    FixedKey,
    /// Sent to every shard
    FanOut(Aggregation),
    /// Blocking pop on exactly one string key
    BlockingPop,
}

impl std::fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandCategory::Direct => write!(f, "direct"),
            CommandCategory::Tag => write!(f, "tag"),
            CommandCategory::FieldIndexed => write!(f, "field-indexed"),
            CommandCategory::FixedKey => write!(f, "fixed-key"),
            CommandCategory::FanOut(_) => write!(f, "fan-out"),
            CommandCategory::BlockingPop => write!(f, "blocking-pop"),
        }
    }
}

/// One row of the routing table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Name callers invoke
    pub name: &'static str,
    pub category: CommandCategory,
    /// Name forwarded to the shard connection
    pub backend: &'static str,
}

const fn direct(name: &'static str) -> CommandSpec {
    CommandSpec {
        name,
        category: CommandCategory::Direct,
        backend: name,
    }
}

const fn renamed(name: &'static str, category: CommandCategory, backend: &'static str) -> CommandSpec {
    CommandSpec { name, category, backend }
}

/// Every routable command except the `tag_` family
pub static COMMAND_TABLE: &[CommandSpec] = &[
    // strings and keys
    direct("get"),
    direct("set"),
    direct("getset"),
    direct("setnx"),
    direct("setex"),
    direct("incr"),
    direct("decr"),
    direct("exists"),
    direct("delete"),
    direct("get_type"),
    direct("type"),
    direct("rename"),
    direct("expire"),
    direct("ttl"),
    // lists
    direct("push"),
    direct("llen"),
    direct("lrange"),
    direct("ltrim"),
    direct("lpush"),
    direct("lpop"),
    direct("lindex"),
    direct("pop"),
    direct("lset"),
    direct("lrem"),
    direct("rpush"),
    direct("rpop"),
    // sets
    direct("sadd"),
    direct("srem"),
    direct("scard"),
    direct("sismember"),
    direct("smembers"),
    // sorted sets
    direct("zadd"),
    direct("zrem"),
    direct("zincr"),
    direct("zrank"),
    direct("zrange"),
    direct("zrevrange"),
    direct("zrangebyscore"),
    direct("zremrangebyrank"),
    direct("zremrangebyscore"),
    direct("zcard"),
    direct("zscore"),
    direct("zcount"),
    // hashes
    direct("hget"),
    direct("hset"),
    direct("hdel"),
    direct("hincrby"),
    direct("hlen"),
    direct("hkeys"),
    direct("hvals"),
    direct("hgetall"),
    direct("hexists"),
    direct("hmget"),
    direct("hmset"),
    // pub/sub
    direct("publish"),
    // routed by the second argument
    renamed("hget_in", CommandCategory::FieldIndexed, "hget"),
    renamed("hset_in", CommandCategory::FieldIndexed, "hset"),
    // shared queue
    renamed("rpush_in", CommandCategory::FixedKey, "rpush"),
    renamed("blpop_in", CommandCategory::FixedKey, "blpop"),
    // single-key blocking pops
    renamed("blpop", CommandCategory::BlockingPop, "blpop"),
    renamed("brpop", CommandCategory::BlockingPop, "brpop"),
    // every shard
    renamed("keys", CommandCategory::FanOut(Aggregation::Concat), "keys"),
    renamed("flushdb", CommandCategory::FanOut(Aggregation::Discard), "flushdb"),
];

/// Result of classifying a command name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub category: CommandCategory,
    /// Name forwarded to the shard connection
    pub backend: &'a str,
}

/// Table row for `command`, if any
pub fn lookup(command: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.iter().find(|spec| spec.name == command)
}

/// Classify a command name.
///
/// The table wins over the tag prefix. A bare `tag_` names no backend
/// command and is unsupported.
pub fn classify(command: &str) -> Result<Route<'_>, RouterError> {
    if let Some(spec) = lookup(command) {
        return Ok(Route {
            category: spec.category,
            backend: spec.backend,
        });
    }

    match command.strip_prefix(TAG_PREFIX) {
        Some(backend) if !backend.is_empty() => Ok(Route {
            category: CommandCategory::Tag,
            backend,
        }),
        _ => Err(RouterError::Unsupported {
            command: command.to_string(),
        }),
    }
}
