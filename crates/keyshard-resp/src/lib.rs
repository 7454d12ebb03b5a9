//! Keyshard RESP - Default shard connections
//!
//! Implements the router's `ShardConnection` and `ConnectionFactory` over
//! RESP2 on TCP, with a small idle pool per shard.
//!
//! ```rust,ignore
//! use keyshard_resp::RespConnectionFactory;
//! use keyshard_router::ShardedProxy;
//!
//! let factory = RespConnectionFactory::from_config(&config);
//! let proxy = ShardedProxy::new(&config.shards, &factory)?;
//! ```

mod codec;
mod connection;

pub use codec::{encode_command, RespStream, MAX_BULK_LEN, MAX_LINE_LEN};
pub use connection::{wire_verb, ClientOptions, RespConnection, RespConnectionFactory};
