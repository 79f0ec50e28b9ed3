use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mixpool_core::CoordinatorConfig;
use mixpool_coordinator::Coordinator;
use mixpool_rpc::{BitcoindFeeEstimator, HttpRateProvider, NodeAuth, NodeConfig};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// mixpoold — Chaumian CoinJoin coordinator
#[derive(Parser)]
#[command(name = "mixpoold", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "mixpool.toml")]
    config: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    coordinator: CoordinatorConfig,
    node: NodeSettings,
    rates: RateSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct NodeSettings {
    rpc_url: String,
    cookie_file: Option<PathBuf>,
    rpc_user: Option<String>,
    rpc_pass: Option<String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8332".to_string(),
            cookie_file: None,
            rpc_user: None,
            rpc_pass: None,
        }
    }
}

impl NodeSettings {
    fn auth(&self) -> NodeAuth {
        if let Some(cookie) = &self.cookie_file {
            return NodeAuth::CookieFile(cookie.clone());
        }
        match (&self.rpc_user, &self.rpc_pass) {
            (Some(user), Some(pass)) => NodeAuth::UserPass {
                user: user.clone(),
                pass: pass.clone(),
            },
            _ => NodeAuth::None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RateSettings {
    url: String,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            url: "https://rates.mixpool.org/ticker".to_string(),
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<FileConfig> {
    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let node = NodeConfig {
        rpc_url: config.node.rpc_url.clone(),
        auth: config.node.auth(),
    };
    let fee_estimator =
        Arc::new(BitcoindFeeEstimator::new(&node).context("connecting to bitcoind")?);
    let rate_provider =
        Arc::new(HttpRateProvider::new(&config.rates.url).context("building rate client")?);
    let coordinator = Arc::new(Coordinator::new(
        config.coordinator,
        fee_estimator,
        rate_provider,
    )?);

    // The push transport is external; in the daemon the event stream
    // lands in the log.
    let mut events = coordinator.broadcaster().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    info!(phase = %event.new_phase, message = %event.message, "phase change")
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        }
    });

    coordinator.run(shutdown).await;
    Ok(())
}
