//! Command classification
//!
//! This module contains the static routing table and the argument shapes:
//!
//! - `table`: command name -> category + backend command name
//! - `args`: one argument shape per category, validated before routing
//!
//! # Classification
//!
//! ```text
//! command name
//!     │
//!     ▼
//! in COMMAND_TABLE? ──Yes──► Direct / FieldIndexed / FixedKey / FanOut / BlockingPop
//!     │
//!     No
//!     ▼
//! starts with "tag_"? ──Yes──► Tag (backend name = name without the prefix)
//!     │
//!     No
//!     ▼
//! Unsupported
//! ```

mod args;
mod table;

pub use args::{
    BlockingPopArgs, FanOutArgs, FieldArgs, KeyedArgs, PopTimeout, QueueArgs, TaggedArgs,
};
pub use table::{classify, lookup, Aggregation, CommandCategory, CommandSpec, Route, COMMAND_TABLE};
