//! votequorum-registry -- name service for voting nodes.
//!
//! Nodes register under their id and refresh the registration on a
//! heartbeat. Registrations that are not refreshed within the TTL drop out
//! of the live set.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info};
use votequorum::config::LoggingConfig;
use votequorum::registry::memory::MemoryRegistry;

#[derive(Parser, Debug)]
#[command(
    name = "votequorum-registry",
    version,
    about = "Service registry for votequorum nodes"
)]
struct Cli {
    /// Bind address (host:port).
    #[arg(short, long, default_value = "127.0.0.1:9090")]
    bind: String,

    /// Seconds a registration stays live without a heartbeat. 0 disables
    /// expiry.
    #[arg(long, default_value_t = 15)]
    ttl_secs: u64,

    /// Log format: text or json.
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    votequorum::logging::init_tracing(&LoggingConfig {
        format: cli.log_format.clone(),
        ..LoggingConfig::default()
    });

    let registry = Arc::new(if cli.ttl_secs == 0 {
        MemoryRegistry::new()
    } else {
        MemoryRegistry::with_ttl(Duration::from_secs(cli.ttl_secs))
    });

    if cli.ttl_secs > 0 {
        let purging = registry.clone();
        let period = Duration::from_secs(cli.ttl_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let purged = purging.purge_expired();
                if purged > 0 {
                    info!("Purged {} expired registrations", purged);
                } else {
                    debug!("No expired registrations");
                }
            }
        });
    }

    let app = votequorum::registry::server::app(registry);
    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    info!(
        "Registry listening on {} (ttl {}s)",
        cli.bind, cli.ttl_secs
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(votequorum::server::shutdown_signal())
        .await?;

    info!("Registry shut down");
    Ok(())
}
