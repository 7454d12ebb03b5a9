//! Keyshard CLI - Run one command through the sharding proxy
//!
//! The binary loads a shard list, builds a proxy over RESP connections and
//! runs a single command, printing the reply as JSON. With `--route` it only
//! reports which shard(s) the command would reach.

use anyhow::Context;
use clap::Parser;
use keyshard_core::ProxyConfig;
use keyshard_router::ShardedProxy;
use keyshard_types::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Client-side sharding over independent key-value stores
#[derive(Parser, Debug)]
#[command(name = "keyshard")]
#[command(about = "Route key-value commands across independent store instances")]
pub struct Cli {
    /// JSON configuration file; defaults to KEYSHARD_* environment variables
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the owning shard(s) without contacting any
    #[arg(long)]
    pub route: bool,

    /// Command name, e.g. get, hget_in, tag_get, keys
    pub command: String,

    /// Command arguments, passed as strings
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    pub fn values(&self) -> Vec<Value> {
        self.args.iter().map(|arg| Value::from(arg.as_str())).collect()
    }
}

/// Load and validate the proxy configuration
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ProxyConfig> {
    let config = match path {
        Some(path) => ProxyConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ProxyConfig::from_env().context("failed to load config from the environment")?,
    };
    config.validate()?;

    info!(shards = ?config.shard_names(), "Configuration loaded");
    Ok(config)
}

/// Run the command described by `cli` and return what should be printed
pub async fn execute(proxy: &ShardedProxy, cli: &Cli) -> anyhow::Result<serde_json::Value> {
    let args = cli.values();

    if cli.route {
        let shards = proxy.shards_for(&cli.command, &args)?;
        debug!(command = %cli.command, shards = ?shards, "Resolved route");
        return Ok(serde_json::json!({
            "command": cli.command,
            "shards": shards,
        }));
    }

    let reply = proxy
        .invoke(&cli.command, &args)
        .await
        .with_context(|| format!("'{}' failed", cli.command))?;
    Ok(serde_json::to_value(&reply)?)
}
