//! Keyshard Router - Client-side Sharding Module
//!
//! Routes key-value commands to one of several independent stores.
//!
//! # Architecture
//!
//! ```text
//! invoke("get", ["user{42}:name"])
//!     │
//!     ▼
//! ┌─────────────────────────┐
//! │     Command table       │  Decides: which category, which backend name
//! │   (How is it routed?)   │
//! └───────────┬─────────────┘
//!             │
//!             ▼
//! ┌─────────────────────────┐
//! │    ShardDirectory       │  sha1(routing key) mod N
//! │   (Which shard?)        │
//! └───────────┬─────────────┘
//!             │
//!             ▼
//! ┌─────────────────────────┐
//! │    ShardConnection      │  Provided by the caller (e.g. keyshard-resp)
//! └─────────────────────────┘
//! ```
//!
//! # Command categories
//!
//! - **Direct**: routed by the first argument
//! - **Tag** (`tag_*`): routed by the `{tag}` of the first argument
//! - **FieldIndexed** (`hget_in`, `hset_in`): routed by the second argument
//! - **FixedKey** (`rpush_in`, `blpop_in`): routed by the logical key `"queue"`
//! - **BlockingPop** (`blpop`, `brpop`): one string key only
//! - **FanOut** (`keys`, `flushdb`): every shard, in order
//!
//! # Example
//!
//! ```rust,ignore
//! use keyshard_router::{ShardedProxy, RecordingFactory};
//!
//! let proxy = ShardedProxy::new(&config.shards, &factory)?;
//!
//! proxy.set("user{42}:name", "alice").await?;
//! let cart = proxy.invoke("tag_get", &["cart{42}".into()]).await?;
//! ```

// Core modules
mod error;
mod types;
mod directory;
mod key;

// Command table and argument shapes
mod command;

// Connections
mod connection;
mod recording;

// Proxy
mod fanout;
mod proxy;

// Re-exports: Error types
pub use error::{ErrorKind, RouterError};

// Re-exports: Core types
pub use types::{KeyPosition, ShardName, NO_TIMEOUT, QUEUE_KEY, TAG_PREFIX};

// Re-exports: Key mapping
pub use directory::ShardDirectory;
pub use key::{extract_routing_key, find_tag, has_tag};

// Re-exports: Commands
pub use command::{
    classify, lookup, Aggregation, BlockingPopArgs, CommandCategory, CommandSpec, FanOutArgs,
    FieldArgs, KeyedArgs, PopTimeout, QueueArgs, Route, TaggedArgs, COMMAND_TABLE,
};

// Re-exports: Connections
pub use connection::{ConnectionFactory, ShardConnection};
pub use recording::{RecordedCall, RecordingConnection, RecordingFactory};

// Re-exports: Proxy
pub use fanout::{FanOutReport, ShardFailure};
pub use proxy::ShardedProxy;
