//! votequorum -- one voting node.
//!
//! Crash-only design: every startup is a recovery. The node rebuilds its
//! state from peers (or its own snapshot) before it binds its listener or
//! registers, so it is never reachable while inconsistent.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use votequorum::cluster::directory::PeerDirectory;
use votequorum::cluster::transport::HttpPeerTransport;
use votequorum::node::NodeService;
use votequorum::persistence::{open_backend, Persister};
use votequorum::registry::{open_registry, ServiceRegistry};

/// Command-line arguments for a voting node.
#[derive(Parser, Debug)]
#[command(
    name = "votequorum",
    version,
    about = "Replicated voting node with quorum commit"
)]
struct Cli {
    /// Node identifier, e.g. `server1`. Overrides `node.id`.
    node_id: Option<String>,

    /// Path to the YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,

    /// Registry URL. Overrides `registry.url` and selects the HTTP registry.
    #[arg(short, long)]
    registry: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => votequorum::config::load_config(path)?,
        None => votequorum::config::Config::default(),
    };
    if let Some(id) = cli.node_id {
        config.node.id = id;
    }
    if let Some(url) = cli.registry {
        config.registry.backend = "http".to_string();
        config.registry.url = url;
    }

    votequorum::logging::init_tracing(&config.logging);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path);
    }

    let node_id = config.node.id.clone();
    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        votequorum::metrics::init_metrics();
        votequorum::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let peer_timeout = config.replication.peer_timeout();
    let registry = open_registry(&config.registry, peer_timeout)?;
    info!(
        "Registry backend '{}' initialized",
        config.registry.backend
    );

    let backend = open_backend(&config.persistence, &node_id)?;
    info!("Snapshot persistence at {}", backend.describe());

    let node = Arc::new(NodeService::new(
        node_id.clone(),
        Arc::new(PeerDirectory::new(node_id.clone(), registry.clone())),
        Arc::new(HttpPeerTransport::new(peer_timeout)?),
        Arc::new(Persister::new(backend)),
        &config.replication,
    ));

    // Crash-only startup: every startup IS recovery.
    info!("[{}] Crash-only startup: recovering state", node_id);
    let report = node.recover().await?;
    info!(
        "[{}] Ready with {} records ({:?})",
        node_id, report.log_len, report.source
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let local_addr = listener.local_addr()?;
    let advertise = if config.node.advertise_url.is_empty() {
        if local_addr.ip().is_unspecified() {
            warn!(
                "[{}] Bound to {}; set node.advertise_url so peers can reach this node",
                node_id, local_addr
            );
        }
        format!("http://{local_addr}")
    } else {
        config.node.advertise_url.clone()
    };

    if let Err(e) = registry.register(&node_id, &advertise).await {
        warn!("[{}] Initial registration failed, heartbeat will retry: {}", node_id, e);
    } else {
        info!("[{}] Registered as {}", node_id, advertise);
    }
    let heartbeat = tokio::spawn(heartbeat(
        registry.clone(),
        node_id.clone(),
        advertise,
        Duration::from_secs(config.registry.heartbeat_interval_secs.max(1)),
    ));

    let state = Arc::new(votequorum::AppState { node: node.clone() });
    let app = votequorum::server::app(state);
    info!("[{}] votequorum listening on {}", node_id, local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(votequorum::server::shutdown_signal())
        .await?;

    heartbeat.abort();
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(shutdown_timeout, registry.deregister(&node_id)).await {
        Ok(Ok(())) => info!("[{}] Deregistered", node_id),
        Ok(Err(e)) => warn!("[{}] Deregistration failed: {}", node_id, e),
        Err(_) => warn!("[{}] Deregistration timed out", node_id),
    }
    if let Err(e) = node.flush().await {
        warn!("[{}] Final snapshot failed: {:#}", node_id, e);
    }

    info!("[{}] votequorum shut down", node_id);
    Ok(())
}

/// Refresh this node's registration until aborted.
async fn heartbeat(
    registry: Arc<dyn ServiceRegistry>,
    node_id: String,
    endpoint: String,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = registry.register(&node_id, &endpoint).await {
            warn!("[{}] Heartbeat failed: {}", node_id, e);
        }
    }
}
