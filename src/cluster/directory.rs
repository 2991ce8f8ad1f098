//! Peer resolution through the service registry.
//!
//! Membership is looked up fresh on every call; nothing is cached between
//! operations because nodes come and go between votes.

use std::sync::Arc;
use tracing::debug;

use crate::registry::{RegistryError, ServiceRegistry};

/// A resolved peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub node_id: String,
    pub endpoint: String,
}

pub struct PeerDirectory {
    self_id: String,
    registry: Arc<dyn ServiceRegistry>,
}

impl PeerDirectory {
    pub fn new(self_id: impl Into<String>, registry: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            self_id: self_id.into(),
            registry,
        }
    }

    /// Current peers, ordered by node id, excluding this node.
    ///
    /// A node listed as active but gone by the time it is resolved is
    /// skipped. Failing to reach the registry at all is an error.
    pub async fn peers(&self) -> Result<Vec<Peer>, RegistryError> {
        let active = self.registry.list_active().await?;
        let mut peers = Vec::with_capacity(active.len());
        for node_id in active {
            if node_id == self.self_id {
                continue;
            }
            match self.registry.resolve(&node_id).await {
                Ok(endpoint) => peers.push(Peer { node_id, endpoint }),
                Err(RegistryError::NotFound { .. }) => {
                    debug!(node = %self.self_id, peer = %node_id, "Peer vanished before resolve");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(peers)
    }
}
