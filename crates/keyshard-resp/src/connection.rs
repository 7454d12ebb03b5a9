//! Pooled RESP connections, one pool per shard

use async_trait::async_trait;
use keyshard_core::{ProxyConfig, ShardDescriptor};
use keyshard_router::{ConnectionFactory, ShardConnection};
use keyshard_types::{BackendError, BackendResult, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::codec::RespStream;

/// Wire verb for a client method name
pub fn wire_verb(command: &str) -> String {
    match command {
        "delete" => "DEL".to_string(),
        "get_type" => "TYPE".to_string(),
        "zincr" => "ZINCRBY".to_string(),
        "push" => "RPUSH".to_string(),
        "pop" => "LPOP".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

/// Options shared by every shard's pool
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Sent with `CLIENT SETNAME`
    pub client_name: String,
    pub connect_timeout: Duration,
    /// Idle streams kept per shard; extra streams are closed
    pub max_idle: usize,
}

impl ClientOptions {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            client_name: config.client_name.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            max_idle: config.max_idle_per_shard,
        }
    }
}

/// Connection to one shard.
///
/// Streams are opened on demand. Each call checks out its own stream, so a
/// blocking pop never holds up other commands to the same shard.
#[derive(Debug)]
pub struct RespConnection {
    shard: ShardDescriptor,
    options: ClientOptions,
    idle: Mutex<Vec<RespStream<TcpStream>>>,
}

impl RespConnection {
    pub fn new(shard: ShardDescriptor, options: ClientOptions) -> Self {
        Self {
            shard,
            options,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn shard(&self) -> &ShardDescriptor {
        &self.shard
    }

    /// Number of idle streams in the pool
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    async fn checkout(&self) -> BackendResult<RespStream<TcpStream>> {
        let pooled = self.idle.lock().pop();
        match pooled {
            Some(stream) => Ok(stream),
            None => self.open().await,
        }
    }

    fn checkin(&self, stream: RespStream<TcpStream>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.options.max_idle {
            idle.push(stream);
        }
    }

    async fn open(&self) -> BackendResult<RespStream<TcpStream>> {
        let address = self.shard.address();
        let timeout = self.options.connect_timeout;

        let connect = async {
            let mut addrs = tokio::net::lookup_host(&address).await?;
            let resolved = addrs.next().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no addresses found for {}", address),
                )
            })?;
            TcpStream::connect(resolved).await
        };

        let tcp = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(e)) => {
                return Err(BackendError::Connection(format!(
                    "{} ({}): {}",
                    self.shard.name, address, e
                )))
            }
            Err(_) => return Err(BackendError::Timeout(timeout)),
        };
        tcp.set_nodelay(true)?;

        let mut stream = RespStream::new(tcp);
        self.handshake(&mut stream).await?;
        debug!(shard = %self.shard.name, address = %address, "Opened shard connection");
        Ok(stream)
    }

    async fn handshake(&self, stream: &mut RespStream<TcpStream>) -> BackendResult<()> {
        if let Some(password) = self.shard.password.as_deref().filter(|p| !p.is_empty()) {
            stream.call("AUTH", &[Value::from(password)]).await?;
        }
        if self.shard.db != 0 {
            stream.call("SELECT", &[Value::from(i64::from(self.shard.db))]).await?;
        }
        stream
            .call("CLIENT", &[Value::from("SETNAME"), Value::from(self.options.client_name.as_str())])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ShardConnection for RespConnection {
    async fn execute(&self, command: &str, args: &[Value]) -> BackendResult<Value> {
        let verb = wire_verb(command);
        let mut stream = self.checkout().await?;
        trace!(shard = %self.shard.name, verb = %verb, "Sending command");

        let result = stream.call(&verb, args).await;
        match &result {
            Ok(_) => self.checkin(stream),
            Err(e) if e.connection_reusable() => self.checkin(stream),
            Err(e) => debug!(shard = %self.shard.name, error = %e, "Dropping broken stream"),
        }
        result
    }
}

/// Builds a [`RespConnection`] per shard. No I/O happens until first use.
#[derive(Debug, Clone)]
pub struct RespConnectionFactory {
    options: ClientOptions,
}

impl RespConnectionFactory {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(ClientOptions::from_config(config))
    }
}

impl ConnectionFactory for RespConnectionFactory {
    fn connect(&self, shard: &ShardDescriptor) -> BackendResult<Arc<dyn ShardConnection>> {
        Ok(Arc::new(RespConnection::new(shard.clone(), self.options.clone())))
    }
}
