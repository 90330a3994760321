//! Ledger node binary
//!
//! Configuration comes from the TOML file named by `CHAIN_CONFIG` (optional)
//! with `CHAIN_*` environment overrides on top. Set `CHAIN_LOG_FORMAT=json`
//! for JSON logs.

use anyhow::Context;
use chain_ledger::{Config, HttpPeerTransport, Node, Wallet};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if std::env::var("CHAIN_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config() -> anyhow::Result<Config> {
    match std::env::var("CHAIN_CONFIG") {
        Ok(path) => {
            let mut config =
                Config::from_file(&path).with_context(|| format!("reading config {}", path))?;
            config.apply_env(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        Err(_) => Ok(Config::from_env()?),
    }
}

fn load_or_create_wallet(config: &Config) -> anyhow::Result<Wallet> {
    let key_file = Wallet::key_file(&config.data_dir, &config.node_id);
    if key_file.exists() {
        return Wallet::load(&config.data_dir, &config.node_id)
            .with_context(|| format!("loading wallet {}", key_file.display()));
    }

    let wallet = Wallet::create(config.node_id.clone());
    wallet
        .save(&config.data_dir)
        .with_context(|| format!("saving wallet {}", key_file.display()))?;
    tracing::info!(identity = %wallet.identity(), "Created new wallet");
    Ok(wallet)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting chain ledger node");

    let config = load_config()?;
    let wallet = load_or_create_wallet(&config)?;
    let transport = Arc::new(HttpPeerTransport::new(&config.peers)?);

    let sync = config.sync.clone();
    let node = Node::open(config, Some(wallet), transport)?;
    tracing::info!(node_id = %node.config().node_id, "Node opened successfully");

    if sync.enabled {
        let mut interval = tokio::time::interval(Duration::from_millis(sync.resolve_interval_ms));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match node.resolve().await {
                        Ok(true) => tracing::info!("Adopted longer peer chain"),
                        Ok(false) => {}
                        Err(e) => tracing::warn!("Background resolve failed: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    tracing::info!("Shutting down chain ledger node");
    node.shutdown().await?;
    Ok(())
}
