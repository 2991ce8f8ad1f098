//! Static registry backed by the `registry.peers` configuration map.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;

use super::{RegistryError, ServiceRegistry};

/// Every configured node is always listed; liveness is discovered only by
/// contacting it.
#[derive(Debug, Clone, Default)]
pub struct FixedRegistry {
    peers: BTreeMap<String, String>,
}

impl FixedRegistry {
    pub fn new(peers: BTreeMap<String, String>) -> Self {
        Self { peers }
    }
}

impl ServiceRegistry for FixedRegistry {
    fn resolve(
        &self,
        node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, RegistryError>> + Send + '_>> {
        let node_id = node_id.to_string();
        Box::pin(async move {
            self.peers
                .get(&node_id)
                .cloned()
                .ok_or(RegistryError::NotFound { node_id })
        })
    }

    fn list_active(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeSet<String>, RegistryError>> + Send + '_>> {
        Box::pin(async move { Ok(self.peers.keys().cloned().collect()) })
    }

    fn register(
        &self,
        _node_id: &str,
        _endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }

    fn deregister(
        &self,
        _node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }
}
