//! Shard descriptors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Name of a shard, unique within one proxy
pub type ShardName = String;

/// Default port of a key-value store instance
pub const DEFAULT_PORT: u16 = 6379;

/// Everything needed to open a connection to one shard
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    /// Shard name, used as the routing target
    pub name: ShardName,

    /// Host name or IP address
    pub host: String,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logical database index
    #[serde(default)]
    pub db: u32,

    /// Password sent with AUTH on connect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ShardDescriptor {
    pub fn new(name: impl Into<ShardName>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            db: 0,
            password: None,
        }
    }

    /// Select a database index
    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    /// Set the AUTH password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Keep the password out of logs.
impl fmt::Debug for ShardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardDescriptor")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Parses `name=host:port[/db]`, with an optional `:password@` before the host.
///
/// ```text
/// r1=localhost:6379
/// r2=10.0.0.2:6380/3
/// r3=:s3cret@cache.internal:6379/0
/// ```
impl FromStr for ShardDescriptor {
    type Err = ConfigError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidShardEntry {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (name, target) = entry.split_once('=').ok_or_else(|| invalid("expected name=host:port"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyShardName);
        }

        let target = target.trim();
        let (password, target) = match target.strip_prefix(':') {
            Some(rest) => {
                let (password, host_part) = rest
                    .rsplit_once('@')
                    .ok_or_else(|| invalid("password must be followed by @host"))?;
                (Some(password.to_string()), host_part)
            }
            None => (None, target),
        };

        let (address, db) = match target.split_once('/') {
            Some((address, db)) => {
                let db = db.parse::<u32>().map_err(|_| invalid("db must be a non-negative integer"))?;
                (address, db)
            }
            None => (target, 0),
        };

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid("port must be 0-65535"))?;
                (host, port)
            }
            None => (address, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }

        Ok(Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            db,
            password,
        })
    }
}
