//! Shard Directory
//!
//! Maps a key to one of N shard names with `sha1(key)[..8] mod N`.
//! Same key, same shard list, same answer.
//!
//! The mapping is a plain modulus, not a hash ring: adding or removing a
//! shard moves most keys to a different owner.

use sha1::{Digest, Sha1};
use std::collections::HashSet;
use tracing::trace;

use crate::error::RouterError;
use crate::types::ShardName;

/// Ordered, immutable list of shard names
#[derive(Debug, Clone)]
pub struct ShardDirectory {
    /// Order determines the hash-to-index mapping. Never reorder.
    names: Vec<ShardName>,
}

impl ShardDirectory {
    /// Create a directory, rejecting duplicate names.
    ///
    /// An empty directory is allowed; every lookup on it fails.
    pub fn new(names: Vec<ShardName>) -> Result<Self, RouterError> {
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.is_empty() {
                return Err(RouterError::InvalidConfig("shard name cannot be empty".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(RouterError::DuplicateShard(name.clone()));
            }
        }
        Ok(Self { names })
    }

    /// Number of shards
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Shard names in routing order
    pub fn names(&self) -> &[ShardName] {
        &self.names
    }

    /// Most significant 64 bits of the SHA-1 digest of `key`.
    ///
    /// Equal to the first 16 hex characters of the digest read as an integer.
    /// SHA-1 is used for its spread only; it is not a security boundary.
    pub fn hash_key(key: &[u8]) -> u64 {
        let digest = Sha1::digest(key);
        u64::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3],
            digest[4], digest[5], digest[6], digest[7],
        ])
    }

    /// Index of the shard owning `key`, or `None` when the directory is empty
    pub fn index_of(&self, key: &str) -> Option<usize> {
        if self.names.is_empty() {
            return None;
        }
        let hash = Self::hash_key(key.as_bytes());
        let index = (hash % self.names.len() as u64) as usize;
        trace!(key = %key, hash = %hash, index, "Shard directory lookup");
        Some(index)
    }

    /// Name of the shard owning `key`
    pub fn resolve(&self, key: &str) -> Result<&str, RouterError> {
        self.index_of(key)
            .map(|index| self.names[index].as_str())
            .ok_or(RouterError::NoShards)
    }
}
