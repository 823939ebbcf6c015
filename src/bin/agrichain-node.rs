#![forbid(unsafe_code)]
//! AgriChain node: HTTP API, optional background miner and peer consensus

use agrichain::api::run_api_server;
use agrichain::config::{load_config, Config};
use agrichain::node::{Node, NodeState};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// API port (overrides network.api_port)
    #[arg(short, long)]
    port: Option<u16>,
    /// Peer to register at startup; repeatable
    #[arg(long = "peer")]
    peers: Vec<String>,
    /// Leading zero hex characters required of a proof
    #[arg(long)]
    difficulty: Option<usize>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.network.api_port = port;
        }
        if let Some(difficulty) = self.difficulty {
            config.miner.difficulty = difficulty;
        }
        config
            .network
            .bootstrap_peers
            .extend(self.peers.iter().cloned());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = load_config(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;

    let bind_ip: IpAddr = config
        .network
        .bind_address
        .parse()
        .map_err(|e| format!("invalid network.bind_address: {}", e))?;
    let addr = SocketAddr::new(bind_ip, config.network.api_port);

    let node = Arc::new(Node::from_config(&config));
    info!(
        node_id = %node.node_id(),
        difficulty = config.miner.difficulty,
        peers = node.peer_list().len(),
        "starting AgriChain node"
    );

    if !node.peer_list().is_empty() {
        node.set_state(NodeState::Syncing).await;
        let resolution = node.resolve_conflicts().await;
        if resolution.replaced {
            info!(length = resolution.length, "synced chain from peers");
        }
        for rejection in &resolution.rejected {
            warn!(peer = %rejection.peer, reason = %rejection.reason, "peer unavailable during startup sync");
        }
    }
    node.set_state(NodeState::Ready).await;

    if config.miner.auto_mine {
        let _auto_miner = node.spawn_auto_miner(config.miner.auto_mine_interval);
    }

    run_api_server(node, addr).await?;
    Ok(())
}
