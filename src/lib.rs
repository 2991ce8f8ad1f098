//! votequorum -- replicated voting service.
//!
//! A small cluster of peer nodes each keep a full copy of the vote tally.
//! A vote sent to any node is applied there, replicated to the other live
//! nodes, and committed only once a majority holds it. Nodes locate each
//! other through a service registry and rebuild their state from peers
//! when they start.

use std::sync::Arc;

pub mod client;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod persistence;
pub mod registry;
pub mod server;
pub mod votes;

use crate::node::NodeService;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// The local voting node.
    pub node: Arc<NodeService>,
}
