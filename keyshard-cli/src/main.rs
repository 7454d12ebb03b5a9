//! Keyshard - Main entry point

use clap::Parser;
use keyshard_cli::{execute, load_config, Cli};
use keyshard_resp::RespConnectionFactory;
use keyshard_router::ShardedProxy;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the reply
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let factory = RespConnectionFactory::from_config(&config);
    let proxy = ShardedProxy::new(&config.shards, &factory)?;

    let output = execute(&proxy, &cli).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
