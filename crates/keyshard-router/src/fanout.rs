//! Fan-out results
//!
//! Fan-out commands visit every shard in directory order, one at a time,
//! and never stop early. Each shard's outcome is kept so the caller sees
//! every failure, not just the first.

use keyshard_types::{BackendError, BackendResult};
use std::fmt;

use crate::error::RouterError;
use crate::types::ShardName;

/// One shard's failure during a fan-out
#[derive(Debug)]
pub struct ShardFailure {
    pub shard: ShardName,
    pub error: BackendError,
}

impl ShardFailure {
    pub fn new(shard: impl Into<ShardName>, error: BackendError) -> Self {
        Self {
            shard: shard.into(),
            error,
        }
    }
}

impl fmt::Display for ShardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.shard, self.error)
    }
}

/// Per-shard outcomes of a fan-out command, in shard order
#[derive(Debug)]
pub struct FanOutReport<T> {
    pub command: String,
    pub results: Vec<(ShardName, BackendResult<T>)>,
}

impl<T> FanOutReport<T> {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, shard: impl Into<ShardName>, result: BackendResult<T>) {
        self.results.push((shard.into(), result));
    }

    /// Number of shards contacted
    pub fn contacted(&self) -> usize {
        self.results.len()
    }

    /// True if every shard succeeded
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|(_, result)| result.is_ok())
    }

    /// Successful shards and their values
    pub fn successes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.results
            .iter()
            .filter_map(|(shard, result)| result.as_ref().ok().map(|value| (shard.as_str(), value)))
    }

    /// Names of the shards that failed
    pub fn failed_shards(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, result)| result.is_err())
            .map(|(shard, _)| shard.as_str())
            .collect()
    }

    /// Convert each successful value, turning conversion errors into shard failures
    pub fn and_then<U>(self, mut f: impl FnMut(T) -> BackendResult<U>) -> FanOutReport<U> {
        FanOutReport {
            command: self.command,
            results: self
                .results
                .into_iter()
                .map(|(shard, result)| (shard, result.and_then(&mut f)))
                .collect(),
        }
    }

    /// All values in shard order, or every failure at once
    pub fn into_result(self) -> Result<Vec<(ShardName, T)>, RouterError> {
        let contacted = self.results.len();
        let mut values = Vec::with_capacity(contacted);
        let mut failures = Vec::new();

        for (shard, result) in self.results {
            match result {
                Ok(value) => values.push((shard, value)),
                Err(error) => failures.push(ShardFailure { shard, error }),
            }
        }

        if failures.is_empty() {
            Ok(values)
        } else {
            Err(RouterError::FanOut {
                command: self.command,
                contacted,
                failures,
            })
        }
    }
}
