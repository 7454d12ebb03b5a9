//! Sharded Proxy
//!
//! Fronts N independent stores as one. Every command is routed by the
//! rules of its category:
//!
//! ```text
//! invoke(command, args)
//!        │
//!        ▼
//!   classify(command) ──unknown──► Unsupported
//!        │
//!        ├── Direct / Tag / FieldIndexed / FixedKey / BlockingPop
//!        │        │
//!        │        ▼
//!        │   routing key ──► extract {tag} ──► directory ──► one shard
//!        │
//!        └── FanOut ──► every shard, in directory order ──► aggregate
//! ```
//!
//! Argument problems are reported before any shard is contacted. Backend
//! errors from a single shard are returned unchanged.

use keyshard_core::ShardDescriptor;
use keyshard_types::{BackendError, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::command::{
    classify, Aggregation, BlockingPopArgs, CommandCategory, FanOutArgs, FieldArgs, KeyedArgs,
    QueueArgs, TaggedArgs,
};
use crate::connection::{ConnectionFactory, ShardConnection};
use crate::directory::ShardDirectory;
use crate::error::RouterError;
use crate::fanout::FanOutReport;
use crate::key::extract_routing_key;
use crate::types::ShardName;

/// The key an argument list is routed by, for every single-shard category
fn routing_key<'a>(
    command: &str,
    category: CommandCategory,
    args: &'a [Value],
) -> Result<&'a str, RouterError> {
    match category {
        CommandCategory::Direct => Ok(KeyedArgs::parse(command, args)?.key),
        CommandCategory::Tag => Ok(TaggedArgs::parse(command, args)?.tag_key),
        CommandCategory::FieldIndexed => Ok(FieldArgs::parse(command, args)?.key),
        CommandCategory::FixedKey => Ok(QueueArgs::parse(args).key()),
        CommandCategory::BlockingPop => Ok(BlockingPopArgs::parse(command, args)?.key),
        CommandCategory::FanOut(_) => Err(RouterError::InvalidArgument {
            command: command.to_string(),
            reason: "fan-out commands are not routed by a key".to_string(),
        }),
    }
}

/// Client-side sharding proxy
///
/// Immutable after construction; share it behind an `Arc` across tasks.
pub struct ShardedProxy {
    directory: ShardDirectory,
    /// Aligned with `directory.names()`
    connections: Vec<Arc<dyn ShardConnection>>,
}

impl fmt::Debug for ShardedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedProxy")
            .field("shards", &self.directory.names())
            .finish()
    }
}

impl ShardedProxy {
    /// Build a proxy over `shards`, one connection per descriptor.
    ///
    /// Shard names are checked before the factory is called, so a duplicate
    /// name never opens a connection.
    pub fn new(
        shards: &[ShardDescriptor],
        factory: &dyn ConnectionFactory,
    ) -> Result<Self, RouterError> {
        let names = shards.iter().map(|shard| shard.name.clone()).collect();
        let directory = ShardDirectory::new(names)?;

        let connections = shards
            .iter()
            .map(|shard| factory.connect(shard))
            .collect::<Result<Vec<_>, BackendError>>()?;

        info!(shards = ?directory.names(), "Sharded proxy ready");
        Ok(Self {
            directory,
            connections,
        })
    }

    /// Build a proxy over already-open connections, in routing order
    pub fn from_connections(
        connections: Vec<(ShardName, Arc<dyn ShardConnection>)>,
    ) -> Result<Self, RouterError> {
        let (names, connections): (Vec<_>, Vec<_>) = connections.into_iter().unzip();
        let directory = ShardDirectory::new(names)?;

        info!(shards = ?directory.names(), "Sharded proxy ready");
        Ok(Self {
            directory,
            connections,
        })
    }

    pub fn directory(&self) -> &ShardDirectory {
        &self.directory
    }

    pub fn shard_names(&self) -> &[ShardName] {
        self.directory.names()
    }

    pub fn shard_count(&self) -> usize {
        self.directory.len()
    }

    /// Name of the shard owning `key`, honouring `{tag}`s
    pub fn server_name(&self, key: &str) -> Result<&str, RouterError> {
        self.directory.resolve(extract_routing_key(key))
    }

    /// Connection of the shard owning `key`
    pub fn connection(&self, key: &str) -> Result<&Arc<dyn ShardConnection>, RouterError> {
        let index = self.index_for(key)?;
        Ok(&self.connections[index])
    }

    /// Shards `command` would contact, without contacting any.
    ///
    /// Runs the same validation as [`invoke`](Self::invoke).
    pub fn shards_for(&self, command: &str, args: &[Value]) -> Result<Vec<&str>, RouterError> {
        let route = classify(command)?;
        if let CommandCategory::FanOut(aggregation) = route.category {
            FanOutArgs::parse(command, aggregation, args)?;
            return Ok(self.shard_names().iter().map(String::as_str).collect());
        }
        let key = routing_key(command, route.category, args)?;
        Ok(vec![self.server_name(key)?])
    }

    /// Run `command` on the shard (or shards) it belongs to.
    pub async fn invoke(&self, command: &str, args: &[Value]) -> Result<Value, RouterError> {
        let route = classify(command)?;

        match route.category {
            CommandCategory::FanOut(aggregation) => {
                let fan_out = FanOutArgs::parse(command, aggregation, args)?;
                let report = self.fan_out(route.backend, fan_out.args).await;
                match aggregation {
                    Aggregation::Concat => Ok(Value::List(concat_lists(report)?)),
                    Aggregation::Discard => {
                        report.into_result()?;
                        Ok(Value::Nil)
                    }
                }
            }
            CommandCategory::BlockingPop => {
                let pop = BlockingPopArgs::parse(command, args)?;
                self.forward(pop.key, route.backend, &pop.forward_args()).await
            }
            category => {
                let key = routing_key(command, category, args)?;
                self.forward(key, route.backend, args).await
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Value, RouterError> {
        self.invoke("get", &[Value::from(key)]).await
    }

    pub async fn set(&self, key: &str, value: impl Into<Value>) -> Result<Value, RouterError> {
        self.invoke("set", &[Value::from(key), value.into()]).await
    }

    pub async fn delete(&self, key: &str) -> Result<Value, RouterError> {
        self.invoke("delete", &[Value::from(key)]).await
    }

    /// `HGET hash key` on the shard owning `key`
    pub async fn hget_in(&self, hash: &str, key: &str) -> Result<Value, RouterError> {
        self.invoke("hget_in", &[Value::from(hash), Value::from(key)]).await
    }

    /// `HSET hash key value` on the shard owning `key`
    pub async fn hset_in(
        &self,
        hash: &str,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Value, RouterError> {
        self.invoke("hset_in", &[Value::from(hash), Value::from(key), value.into()])
            .await
    }

    /// `RPUSH` on the shard owning the shared queue
    pub async fn rpush_in(&self, args: &[Value]) -> Result<Value, RouterError> {
        self.invoke("rpush_in", args).await
    }

    /// `BLPOP` on the shard owning the shared queue
    pub async fn blpop_in(&self, args: &[Value]) -> Result<Value, RouterError> {
        self.invoke("blpop_in", args).await
    }

    /// Blocking left pop on one key; `None` waits forever
    pub async fn blpop(&self, key: &str, timeout: Option<u64>) -> Result<Value, RouterError> {
        self.invoke("blpop", &pop_args(key, timeout)).await
    }

    /// Blocking right pop on one key; `None` waits forever
    pub async fn brpop(&self, key: &str, timeout: Option<u64>) -> Result<Value, RouterError> {
        self.invoke("brpop", &pop_args(key, timeout)).await
    }

    /// Keys matching `pattern` on every shard, per shard
    pub async fn keys_report(&self, pattern: &str) -> FanOutReport<Vec<Value>> {
        let report = self.fan_out("keys", &[Value::from(pattern)]).await;
        into_lists(report)
    }

    /// Keys matching `pattern` on every shard, concatenated in shard order
    pub async fn keys(&self, pattern: &str) -> Result<Vec<Value>, RouterError> {
        let report = self.fan_out("keys", &[Value::from(pattern)]).await;
        concat_lists(report)
    }

    /// Clear every shard, reporting each one's outcome
    pub async fn flushdb_report(&self) -> FanOutReport<Value> {
        self.fan_out("flushdb", &[]).await
    }

    /// Clear every shard. Later shards are still cleared when one fails.
    pub async fn flushdb(&self) -> Result<(), RouterError> {
        self.flushdb_report().await.into_result()?;
        Ok(())
    }

    fn index_for(&self, key: &str) -> Result<usize, RouterError> {
        self.directory
            .index_of(extract_routing_key(key))
            .ok_or(RouterError::NoShards)
    }

    async fn forward(&self, key: &str, backend: &str, args: &[Value]) -> Result<Value, RouterError> {
        let index = self.index_for(key)?;
        let shard = &self.directory.names()[index];
        debug!(command = %backend, key = %key, shard = %shard, "Forwarding command");

        Ok(self.connections[index].execute(backend, args).await?)
    }

    /// Sequential, best effort: every shard is tried even after a failure.
    async fn fan_out(&self, backend: &str, args: &[Value]) -> FanOutReport<Value> {
        let mut report = FanOutReport::new(backend);

        for (shard, connection) in self.directory.names().iter().zip(&self.connections) {
            debug!(command = %backend, shard = %shard, "Fan-out to shard");
            let result = connection.execute(backend, args).await;
            if let Err(error) = &result {
                warn!(command = %backend, shard = %shard, error = %error, "Shard failed during fan-out");
            }
            report.push(shard.clone(), result);
        }

        report
    }
}

fn pop_args(key: &str, timeout: Option<u64>) -> Vec<Value> {
    let mut args = vec![Value::from(key)];
    if let Some(timeout) = timeout {
        args.push(Value::from(timeout));
    }
    args
}

fn into_lists(report: FanOutReport<Value>) -> FanOutReport<Vec<Value>> {
    let command = report.command.clone();
    report.and_then(|reply| {
        reply.into_list().map_err(|other| {
            BackendError::Protocol(format!(
                "expected a list reply to '{}', got {}",
                command,
                other.type_name()
            ))
        })
    })
}

fn concat_lists(report: FanOutReport<Value>) -> Result<Vec<Value>, RouterError> {
    Ok(into_lists(report)
        .into_result()?
        .into_iter()
        .flat_map(|(_, keys)| keys)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::COMMAND_TABLE;
    use crate::recording::{RecordedCall, RecordingConnection, RecordingFactory};
    use std::time::Duration;

    fn servers() -> Vec<ShardDescriptor> {
        (1..=4)
            .map(|i| ShardDescriptor::new(format!("r{}", i), "localhost", i))
            .collect()
    }

    fn setup() -> (ShardedProxy, Vec<Arc<RecordingConnection>>) {
        let factory = RecordingFactory::new();
        let proxy = ShardedProxy::new(&servers(), &factory).unwrap();
        (proxy, factory.connections())
    }

    fn strs(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::from(*s)).collect()
    }

    fn total_calls(connections: &[Arc<RecordingConnection>]) -> usize {
        connections.iter().map(|c| c.call_count()).sum()
    }

    fn assert_untouched(connections: &[Arc<RecordingConnection>]) {
        assert_eq!(total_calls(connections), 0, "no shard should have been contacted");
    }

    #[test]
    fn test_duplicate_server_name() {
        let factory = RecordingFactory::new();
        let shards = vec![
            ShardDescriptor::new("r1", "localhost", 1),
            ShardDescriptor::new("r1", "example.com", 2),
        ];

        let err = ShardedProxy::new(&shards, &factory).unwrap_err();
        assert_eq!(err.to_string(), "server's name config must be unique: r1");
        assert_eq!(factory.connect_count(), 0);
    }

    #[test]
    fn test_directory_set_up_correctly() {
        let (proxy, connections) = setup();
        assert_eq!(proxy.shard_count(), 4);
        assert_eq!(proxy.shard_names(), &["r1", "r2", "r3", "r4"]);
        assert_eq!(connections.len(), 4);
    }

    #[test]
    fn test_key_hashing_respects_braces() {
        let (proxy, _) = setup();
        assert_eq!(
            proxy.server_name("asdl{key1}asdlkfj").unwrap(),
            proxy.server_name("key1").unwrap()
        );
        assert_eq!(
            proxy.server_name("a{x}b").unwrap(),
            proxy.server_name("c{x}d").unwrap()
        );
    }

    #[tokio::test]
    async fn test_get_server() {
        let (proxy, _) = setup();
        assert_eq!(proxy.server_name("test_key").unwrap(), "r1");

        let connection = proxy.connection("test_key").unwrap();
        assert_eq!(connection.execute("ping", &[]).await.unwrap(), Value::from("r1:ping"));
    }

    #[tokio::test]
    async fn test_wrapped_methods() {
        let (proxy, connections) = setup();
        let args = strs(&["test_key", "arg1", "arg2"]);

        let direct = COMMAND_TABLE
            .iter()
            .filter(|spec| spec.category == CommandCategory::Direct);
        for spec in direct {
            let result = proxy.invoke(spec.name, &args).await.unwrap();
            assert_eq!(result, Value::Str(format!("r1:{}", spec.name)));
            assert_eq!(connections[0].calls(), vec![RecordedCall::new(spec.name, args.clone())]);
            assert_eq!(total_calls(&connections), 1, "{} reached more than one shard", spec.name);

            connections[0].reset();
        }
    }

    #[tokio::test]
    async fn test_wrapped_get_without_key() {
        let (proxy, connections) = setup();
        let err = proxy.invoke("get", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "method 'get' requires a key param as the first argument");
        assert!(err.is_usage_error());
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_wrapped_get_nonstring_key() {
        let (proxy, connections) = setup();
        let args = vec![Value::Int(123), Value::from("arg1"), Value::from("arg2")];
        let err = proxy.invoke("get", &args).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("method 'get' requires a key param as the first argument"));
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_wrapped_tag_method() {
        let (proxy, connections) = setup();
        let args = strs(&["foo{test_key}bar", "arg0", "arg1"]);

        let result = proxy.invoke("tag_foobar", &args).await.unwrap();
        assert_eq!(result, Value::from("r1:foobar"));
        assert_eq!(connections[0].calls(), vec![RecordedCall::new("foobar", args)]);
        assert_eq!(total_calls(&connections), 1);
    }

    #[tokio::test]
    async fn test_tag_routes_like_its_tag() {
        let (proxy, connections) = setup();
        proxy.invoke("tag_get", &strs(&["foo{test}bar"])).await.unwrap();
        proxy.invoke("get", &strs(&["test"])).await.unwrap();

        assert_eq!(proxy.server_name("test").unwrap(), "r3");
        assert_eq!(connections[2].call_count(), 2);
        assert_eq!(total_calls(&connections), 2);
    }

    #[tokio::test]
    async fn test_wrapped_tag_method_without_key() {
        let (proxy, connections) = setup();
        let err = proxy.invoke("tag_foobar", &[]).await.unwrap_err();
        assert!(matches!(err, RouterError::MissingKey { .. }));
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_wrapped_tag_method_without_hash() {
        let (proxy, connections) = setup();
        let err = proxy
            .invoke("tag_foobar", &strs(&["test", "arg1", "arg2"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "method 'tag_foobar' requires tag key params as its arguments");
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_wrapped_tag_method_with_list_key() {
        let (proxy, connections) = setup();
        let args = vec![
            Value::from(vec!["foo{test_key}bar", "test_key"]),
            Value::from("arg0"),
            Value::from("arg1"),
        ];

        let result = proxy.invoke("tag_foobar", &args).await.unwrap();
        assert_eq!(result, Value::from("r1:foobar"));
        assert_eq!(connections[0].calls(), vec![RecordedCall::new("foobar", args)]);
    }

    #[tokio::test]
    async fn test_wrapped_tag_method_without_hash_in_list_key() {
        let (proxy, connections) = setup();
        let args = vec![Value::from(vec!["test1", "test2"]), Value::from("arg1")];
        let err = proxy.invoke("tag_foobar", &args).await.unwrap_err();
        assert!(matches!(err, RouterError::MissingTag { .. }));
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_tag_key_with_open_brace_only() {
        let (proxy, connections) = setup();
        let owner = proxy.server_name("foo{bar").unwrap().to_string();

        let result = proxy.invoke("tag_get", &strs(&["foo{bar"])).await.unwrap();
        assert_eq!(result, Value::Str(format!("{}:get", owner)));
        assert_eq!(proxy.shards_for("tag_get", &strs(&["foo{bar"])).unwrap(), vec![owner.as_str()]);

        let index = proxy.shard_names().iter().position(|name| *name == owner).unwrap();
        assert_eq!(connections[index].calls(), vec![RecordedCall::new("get", strs(&["foo{bar"]))]);
        assert_eq!(total_calls(&connections), 1);
    }

    #[tokio::test]
    async fn test_wrapped_hop_in_method() {
        let (proxy, connections) = setup();
        let args = strs(&["arg0", "test_key", "arg2"]);

        for (command, backend) in [("hget_in", "hget"), ("hset_in", "hset")] {
            let result = proxy.invoke(command, &args).await.unwrap();
            assert_eq!(result, Value::Str(format!("r1:{}", backend)));
            assert_eq!(connections[0].calls(), vec![RecordedCall::new(backend, args.clone())]);
            assert_eq!(total_calls(&connections), 1);
            connections[0].reset();
        }
    }

    #[tokio::test]
    async fn test_wrapped_hget_in_without_key() {
        let (proxy, connections) = setup();
        for args in [vec![], strs(&["foobar"])] {
            let err = proxy.invoke("hget_in", &args).await.unwrap_err();
            assert_eq!(err.to_string(), "method 'hget_in' requires a key param as the second argument");
        }
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_wrapped_hget_in_nonstring_key() {
        let (proxy, connections) = setup();
        let args = vec![Value::from("foobar"), Value::Int(123), Value::from("arg2")];
        let err = proxy.invoke("hget_in", &args).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("method 'hget_in' requires a key param as the second argument"));
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_wrapped_qop_in_method() {
        let (proxy, connections) = setup();
        assert_eq!(proxy.server_name("queue").unwrap(), "r4");

        for (command, backend) in [("rpush_in", "rpush"), ("blpop_in", "blpop")] {
            let result = proxy.invoke(command, &[]).await.unwrap();
            assert_eq!(result, Value::Str(format!("r4:{}", backend)));
            assert_eq!(connections[3].calls(), vec![RecordedCall::new(backend, vec![])]);
            assert_eq!(total_calls(&connections), 1);
            connections[3].reset();
        }
    }

    #[tokio::test]
    async fn test_fixed_key_ignores_arguments() {
        let (proxy, connections) = setup();
        proxy.rpush_in(&strs(&["test_key", "job-1"])).await.unwrap();
        proxy.rpush_in(&strs(&["key1", "job-2"])).await.unwrap();
        proxy.blpop_in(&strs(&["queue", "0"])).await.unwrap();

        assert_eq!(connections[3].call_count(), 3);
        assert_eq!(total_calls(&connections), 3);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let (proxy, connections) = setup();
        let err = proxy.invoke("unsupported_method", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "method 'unsupported_method' cannot be sharded");
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_brpop() {
        let (proxy, connections) = setup();
        let result = proxy.brpop("test_key", None).await.unwrap();
        assert_eq!(result, Value::from("r1:brpop"));
        assert_eq!(
            connections[0].calls(),
            vec![RecordedCall::new("brpop", vec![Value::from("test_key"), Value::Int(0)])]
        );
    }

    #[tokio::test]
    async fn test_blpop() {
        let (proxy, connections) = setup();
        let result = proxy.blpop("test_key", Some(5)).await.unwrap();
        assert_eq!(result, Value::from("r1:blpop"));
        assert_eq!(
            connections[0].calls(),
            vec![RecordedCall::new("blpop", vec![Value::from("test_key"), Value::Int(5)])]
        );
    }

    #[tokio::test]
    async fn test_blocking_pop_nonstring_key() {
        let (proxy, connections) = setup();
        for command in ["blpop", "brpop"] {
            let err = proxy.invoke(command, &[Value::Int(123)]).await.unwrap_err();
            assert!(matches!(err, RouterError::MultipleKeys { .. }));
            assert!(err.to_string().contains("multiple keys cannot be sharded"));

            let keys = vec![Value::from(vec!["a", "b"])];
            assert!(matches!(
                proxy.invoke(command, &keys).await,
                Err(RouterError::MultipleKeys { .. })
            ));
        }
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_keys() {
        let (proxy, connections) = setup();
        for connection in &connections {
            let keys: Vec<String> = (0..4).map(|i| format!("key_{}_{}", connection.shard(), i)).collect();
            connection.push_reply("keys", Ok(Value::from(keys)));
        }

        let result = proxy.keys("test_key").await.unwrap();
        let expected: Vec<Value> = ["r1", "r2", "r3", "r4"]
            .iter()
            .flat_map(|name| (0..4).map(move |i| Value::Str(format!("key_{}_{}", name, i))))
            .collect();
        assert_eq!(result, expected);

        for connection in &connections {
            assert_eq!(connection.calls(), vec![RecordedCall::new("keys", strs(&["test_key"]))]);
        }
    }

    #[tokio::test]
    async fn test_keys_through_invoke() {
        let (proxy, connections) = setup();
        for connection in &connections {
            connection.push_reply("keys", Ok(Value::from(vec![format!("{}:a", connection.shard())])));
        }

        let result = proxy.invoke("keys", &strs(&["*"])).await.unwrap();
        assert_eq!(result, Value::from(vec!["r1:a", "r2:a", "r3:a", "r4:a"]));
    }

    #[tokio::test]
    async fn test_fan_out_arguments_checked_before_contact() {
        let (proxy, connections) = setup();

        let err = proxy.invoke("keys", &[]).await.unwrap_err();
        assert!(matches!(err, RouterError::MissingKey { .. }));
        assert!(err.is_usage_error());

        let err = proxy.invoke("keys", &[Value::Int(1)]).await.unwrap_err();
        assert!(matches!(err, RouterError::WrongKeyType { .. }));

        let err = proxy.invoke("keys", &strs(&["a*", "b*"])).await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument { .. }));

        let err = proxy.invoke("flushdb", &strs(&["async"])).await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument { .. }));

        assert!(proxy.shards_for("keys", &[]).is_err());
        assert!(proxy.shards_for("flushdb", &strs(&["async"])).is_err());
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_flushdb_through_invoke() {
        let (proxy, connections) = setup();
        assert_eq!(proxy.invoke("flushdb", &[]).await.unwrap(), Value::Nil);
        assert_eq!(total_calls(&connections), 4);
    }

    #[tokio::test]
    async fn test_blocking_pop_fractional_timeout() {
        let (proxy, connections) = setup();
        let args = vec![Value::from("test_key"), Value::Float(0.5)];
        proxy.invoke("blpop", &args).await.unwrap();
        assert_eq!(connections[0].calls(), vec![RecordedCall::new("blpop", args)]);
    }

    #[tokio::test]
    async fn test_keys_non_list_reply_is_a_shard_failure() {
        let (proxy, connections) = setup();
        for (i, connection) in connections.iter().enumerate() {
            let reply = if i == 1 { Value::Int(7) } else { Value::List(vec![]) };
            connection.push_reply("keys", Ok(reply));
        }

        let report = proxy.keys_report("*").await;
        assert_eq!(report.contacted(), 4);
        assert_eq!(report.failed_shards(), vec!["r2"]);

        for connection in &connections {
            connection.push_reply("keys", Ok(Value::from("not a list")));
        }
        let err = proxy.keys("*").await.unwrap_err();
        assert!(matches!(err, RouterError::FanOut { ref failures, .. } if failures.len() == 4));
        assert!(err.to_string().contains("expected a list reply to 'keys', got string"));
    }

    #[tokio::test]
    async fn test_flush() {
        let (proxy, connections) = setup();
        proxy.flushdb().await.unwrap();
        for connection in &connections {
            assert_eq!(connection.calls(), vec![RecordedCall::new("flushdb", vec![])]);
        }
    }

    #[tokio::test]
    async fn test_flush_is_best_effort() {
        let (proxy, connections) = setup();
        connections[1].push_reply("flushdb", Err(BackendError::Connection("refused".into())));

        let err = proxy.flushdb().await.unwrap_err();
        match err {
            RouterError::FanOut { ref command, contacted, ref failures } => {
                assert_eq!(command, "flushdb");
                assert_eq!(contacted, 4);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].shard, "r2");
            }
            ref other => panic!("expected fan-out error, got {:?}", other),
        }

        // every shard was still tried
        for connection in &connections {
            assert_eq!(connection.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_flushdb_report() {
        let (proxy, connections) = setup();
        connections[0].push_reply("flushdb", Err(BackendError::Timeout(Duration::from_secs(1))));
        connections[3].push_reply("flushdb", Err(BackendError::Server("ERR busy".into())));

        let report = proxy.flushdb_report().await;
        assert!(!report.is_complete());
        assert_eq!(report.failed_shards(), vec!["r1", "r4"]);
        assert_eq!(report.successes().count(), 2);
    }

    #[tokio::test]
    async fn test_backend_error_passes_through() {
        let (proxy, connections) = setup();
        connections[0].push_reply("get", Err(BackendError::Timeout(Duration::from_millis(50))));

        let err = proxy.get("test_key").await.unwrap_err();
        assert!(matches!(err, RouterError::Backend(BackendError::Timeout(_))));
        assert!(!err.is_usage_error());

        // the next call is not affected
        assert_eq!(proxy.get("test_key").await.unwrap(), Value::from("r1:get"));
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let (proxy, connections) = setup();
        proxy.set("test_key", 42i64).await.unwrap();
        proxy.hset_in("h", "test_key", "v").await.unwrap();
        proxy.hget_in("h", "test_key").await.unwrap();
        proxy.delete("test_key").await.unwrap();

        assert_eq!(
            connections[0].calls(),
            vec![
                RecordedCall::new("set", vec![Value::from("test_key"), Value::Int(42)]),
                RecordedCall::new("hset", strs(&["h", "test_key", "v"])),
                RecordedCall::new("hget", strs(&["h", "test_key"])),
                RecordedCall::new("delete", strs(&["test_key"])),
            ]
        );
    }

    #[test]
    fn test_shards_for() {
        let (proxy, connections) = setup();
        assert_eq!(proxy.shards_for("get", &strs(&["test_key"])).unwrap(), vec!["r1"]);
        assert_eq!(proxy.shards_for("rpush_in", &[]).unwrap(), vec!["r4"]);
        assert_eq!(proxy.shards_for("tag_get", &strs(&["foo{test}bar"])).unwrap(), vec!["r3"]);
        assert_eq!(
            proxy.shards_for("keys", &strs(&["*"])).unwrap(),
            vec!["r1", "r2", "r3", "r4"]
        );
        assert!(proxy.shards_for("nope", &[]).is_err());
        assert_untouched(&connections);
    }

    #[tokio::test]
    async fn test_empty_proxy() {
        let factory = RecordingFactory::new();
        let proxy = ShardedProxy::new(&[], &factory).unwrap();

        assert!(matches!(proxy.get("key").await, Err(RouterError::NoShards)));
        assert!(matches!(proxy.server_name("key"), Err(RouterError::NoShards)));
        assert!(proxy.keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_connections() {
        let a = Arc::new(RecordingConnection::new("a").with_reply("get", "from-a"));
        let proxy = ShardedProxy::from_connections(vec![(
            "a".to_string(),
            Arc::clone(&a) as Arc<dyn ShardConnection>,
        )])
        .unwrap();

        assert_eq!(proxy.get("anything").await.unwrap(), Value::from("from-a"));
        assert_eq!(a.call_count(), 1);

        let b = Arc::new(RecordingConnection::new("b")) as Arc<dyn ShardConnection>;
        let duplicate = ShardedProxy::from_connections(vec![
            ("b".to_string(), Arc::clone(&b)),
            ("b".to_string(), b),
        ]);
        assert!(matches!(duplicate, Err(RouterError::DuplicateShard(_))));
    }

    #[test]
    fn test_proxy_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ShardedProxy>();
    }

    #[tokio::test]
    async fn test_concurrent_invocations() {
        let factory = RecordingFactory::new();
        let proxy = Arc::new(ShardedProxy::new(&servers(), &factory).unwrap());

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let proxy = Arc::clone(&proxy);
                tokio::spawn(async move {
                    let key = format!("key{}", i);
                    let shard = proxy.server_name(&key).unwrap().to_string();
                    let reply = proxy.get(&key).await.unwrap();
                    assert_eq!(reply, Value::Str(format!("{}:get", shard)));
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(total_calls(&factory.connections()), 32);
    }
}
