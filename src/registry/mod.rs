//! Service registry capability.
//!
//! Nodes locate each other by name through a [`ServiceRegistry`].  The core
//! only consumes `resolve` and `list_active`; `register` and `deregister`
//! let a node advertise itself once it is ready and withdraw on shutdown.
//!
//! Implementations:
//! - [`fixed::FixedRegistry`]: static peer map from configuration.
//! - [`memory::MemoryRegistry`]: TTL-expiring in-process map, also the
//!   state behind the standalone registry server.
//! - [`http::HttpRegistry`]: client for the registry server.

pub mod fixed;
pub mod http;
pub mod memory;
pub mod server;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::RegistryConfig;

/// Errors returned by registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No live registration for the node.
    #[error("node '{node_id}' is not registered")]
    NotFound { node_id: String },

    /// The registry itself could not be reached or answered garbage.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Name lookup for cluster nodes.
pub trait ServiceRegistry: Send + Sync + 'static {
    /// Endpoint URL registered for `node_id`.
    fn resolve(
        &self,
        node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, RegistryError>> + Send + '_>>;

    /// Ids of all nodes with a live registration.
    fn list_active(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeSet<String>, RegistryError>> + Send + '_>>;

    /// Register or refresh `node_id` at `endpoint`.
    fn register(
        &self,
        node_id: &str,
        endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>>;

    /// Withdraw `node_id`.  Unknown ids are not an error.
    fn deregister(
        &self,
        node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>>;
}

// ── Wire types shared by the registry server and its HTTP client ────

/// `GET /nodes` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeList {
    pub nodes: BTreeSet<String>,
}

/// `GET /nodes/:id` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    pub node_id: String,
    pub endpoint: String,
}

/// `PUT /nodes/:id` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub endpoint: String,
}

/// Build the registry selected by `config.backend`.
pub fn open_registry(
    config: &RegistryConfig,
    request_timeout: Duration,
) -> anyhow::Result<Arc<dyn ServiceRegistry>> {
    let registry: Arc<dyn ServiceRegistry> = match config.backend.as_str() {
        "fixed" => Arc::new(fixed::FixedRegistry::new(config.peers.clone())),
        "http" => Arc::new(http::HttpRegistry::new(&config.url, request_timeout)?),
        other => anyhow::bail!("unknown registry backend '{other}'"),
    };
    Ok(registry)
}
