//! In-memory shard connection that records every call
//!
//! Used by the test suites, and handy for anyone testing code that sits on
//! top of the proxy. Replies come from, in order:
//!
//! 1. a one-shot queue per command (`with_reply` / `with_failure`)
//! 2. a sticky reply per command (`with_default_reply`)
//! 3. `"<shard>:<command>"`, which tells a test which shard answered

use async_trait::async_trait;
use keyshard_core::ShardDescriptor;
use keyshard_types::{BackendError, BackendResult, Value};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::connection::{ConnectionFactory, ShardConnection};
use crate::types::ShardName;

/// A call seen by a [`RecordingConnection`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub command: String,
    pub args: Vec<Value>,
}

impl RecordedCall {
    pub fn new(command: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// Scripted in-memory shard
#[derive(Debug)]
pub struct RecordingConnection {
    shard: ShardName,
    calls: Mutex<Vec<RecordedCall>>,
    queued: Mutex<HashMap<String, VecDeque<BackendResult<Value>>>>,
    sticky: Mutex<HashMap<String, Value>>,
}

impl RecordingConnection {
    pub fn new(shard: impl Into<ShardName>) -> Self {
        Self {
            shard: shard.into(),
            calls: Mutex::new(Vec::new()),
            queued: Mutex::new(HashMap::new()),
            sticky: Mutex::new(HashMap::new()),
        }
    }

    /// Reply once to the next `command`
    pub fn with_reply(self, command: &str, reply: impl Into<Value>) -> Self {
        self.push_reply(command, Ok(reply.into()));
        self
    }

    /// Fail the next `command`
    pub fn with_failure(self, command: &str, error: BackendError) -> Self {
        self.push_reply(command, Err(error));
        self
    }

    /// Reply to every `command` not covered by a queued reply
    pub fn with_default_reply(self, command: &str, reply: impl Into<Value>) -> Self {
        self.sticky.lock().insert(command.to_string(), reply.into());
        self
    }

    /// Queue a reply on a shared handle
    pub fn push_reply(&self, command: &str, reply: BackendResult<Value>) {
        self.queued
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn shard(&self) -> &str {
        &self.shard
    }

    /// Every call so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Forget recorded calls; scripted replies are kept
    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    fn reply_for(&self, command: &str) -> BackendResult<Value> {
        if let Some(reply) = self.queued.lock().get_mut(command).and_then(VecDeque::pop_front) {
            return reply;
        }
        if let Some(reply) = self.sticky.lock().get(command) {
            return Ok(reply.clone());
        }
        Ok(Value::Str(format!("{}:{}", self.shard, command)))
    }
}

#[async_trait]
impl ShardConnection for RecordingConnection {
    async fn execute(&self, command: &str, args: &[Value]) -> BackendResult<Value> {
        self.calls.lock().push(RecordedCall::new(command, args.to_vec()));
        self.reply_for(command)
    }
}

/// Factory handing out [`RecordingConnection`]s and keeping a handle to each
#[derive(Debug, Default)]
pub struct RecordingFactory {
    connections: Mutex<Vec<Arc<RecordingConnection>>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections created so far, in creation order
    pub fn connections(&self) -> Vec<Arc<RecordingConnection>> {
        self.connections.lock().clone()
    }

    /// Number of times `connect` was called
    pub fn connect_count(&self) -> usize {
        self.connections.lock().len()
    }
}

impl ConnectionFactory for RecordingFactory {
    fn connect(&self, shard: &ShardDescriptor) -> BackendResult<Arc<dyn ShardConnection>> {
        let connection = Arc::new(RecordingConnection::new(shard.name.clone()));
        self.connections.lock().push(Arc::clone(&connection));
        Ok(connection)
    }
}
