//! votequorum-client -- cast votes and read results with node failover.
//!
//! Exit codes: 0 committed / results printed, 2 duplicate vote, 3 quorum
//! not reached, 4 all nodes unreachable, 1 anything else.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use votequorum::client::{ClientError, ClientSession, HttpNodeApi, NodeApi};
use votequorum::config::{Config, LoggingConfig};
use votequorum::registry::http::HttpRegistry;
use votequorum::votes::CastOutcome;

#[derive(Parser)]
#[command(name = "votequorum-client", about = "votequorum command-line client")]
struct Cli {
    /// YAML configuration; `client.endpoints` and `registry.url` are used.
    #[arg(short, long)]
    config: Option<String>,

    /// Node endpoint to try, in order. Repeatable. Skips the registry.
    #[arg(short, long = "endpoint")]
    endpoints: Vec<String>,

    /// Registry URL used to discover nodes when no endpoint is given.
    #[arg(short, long)]
    registry: Option<String>,

    /// Per-call timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cast a vote
    Vote { voter_id: String, candidate: String },
    /// Print the tally from one node
    Results,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    votequorum::logging::init_tracing(&LoggingConfig {
        level: "warn".to_string(),
        ..LoggingConfig::default()
    });
    let rc = match run(cli).await {
        Ok(rc) => rc,
        Err(e) => {
            eprintln!("error: {e:#}");
            match e.downcast_ref::<ClientError>() {
                Some(ClientError::AllNodesUnreachable { .. }) => 4,
                _ => 1,
            }
        }
    };
    std::process::exit(rc);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = match &cli.config {
        Some(path) => votequorum::config::load_config(path)?,
        None => Config::default(),
    };
    let timeout =
        Duration::from_millis(cli.timeout_ms.unwrap_or(config.client.request_timeout_ms));
    let api: Arc<dyn NodeApi> = Arc::new(HttpNodeApi::new(timeout)?);

    let endpoints = if cli.endpoints.is_empty() {
        config.client.endpoints.clone()
    } else {
        cli.endpoints.clone()
    };
    let mut session = if endpoints.is_empty() {
        let url = cli.registry.unwrap_or(config.registry.url);
        let registry = HttpRegistry::new(&url, timeout)?;
        ClientSession::discover(api, &registry).await?
    } else {
        ClientSession::new(api, endpoints)?
    };

    match cli.command {
        Commands::Vote {
            voter_id,
            candidate,
        } => match session.cast_vote(&voter_id, &candidate).await? {
            CastOutcome::Committed { vote_id } => {
                println!("committed {vote_id}");
                Ok(0)
            }
            CastOutcome::DuplicateVote => {
                println!("duplicate vote: '{voter_id}' has already voted");
                Ok(2)
            }
            CastOutcome::QuorumNotReached => {
                println!("quorum not reached: vote was not recorded");
                Ok(3)
            }
        },
        Commands::Results => {
            let tally = session.get_results().await?;
            if tally.is_empty() {
                println!("no votes");
            }
            for (candidate, count) in &tally {
                println!("{candidate}\t{count}");
            }
            Ok(0)
        }
    }
}
