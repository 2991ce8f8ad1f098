//! In-memory registry with optional registration TTL.
//!
//! A registration that is not refreshed within the TTL stops being listed,
//! which is how a crashed node eventually drops out of the live set.
//! Uses `RwLock<BTreeMap>` for thread-safe access.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::{RegistryError, ServiceRegistry};

#[derive(Debug, Clone)]
struct Registration {
    endpoint: String,
    refreshed_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    ttl: Option<Duration>,
    entries: RwLock<BTreeMap<String, Registration>>,
}

impl MemoryRegistry {
    /// Registrations never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations expire `ttl` after their last refresh.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn is_live(&self, registration: &Registration, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(registration.refreshed_at) < ttl,
            None => true,
        }
    }

    /// Drop expired registrations.  Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().expect("rwlock poisoned");
        let before = entries.len();
        entries.retain(|_, r| match self.ttl {
            Some(ttl) => now.duration_since(r.refreshed_at) < ttl,
            None => true,
        });
        before - entries.len()
    }

    pub fn insert(&self, node_id: &str, endpoint: &str) {
        let mut entries = self.entries.write().expect("rwlock poisoned");
        entries.insert(
            node_id.to_string(),
            Registration {
                endpoint: endpoint.to_string(),
                refreshed_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, node_id: &str) -> bool {
        let mut entries = self.entries.write().expect("rwlock poisoned");
        entries.remove(node_id).is_some()
    }

    pub fn lookup(&self, node_id: &str) -> Option<String> {
        let now = Instant::now();
        let entries = self.entries.read().expect("rwlock poisoned");
        entries
            .get(node_id)
            .filter(|r| self.is_live(r, now))
            .map(|r| r.endpoint.clone())
    }

    pub fn live_ids(&self) -> BTreeSet<String> {
        let now = Instant::now();
        let entries = self.entries.read().expect("rwlock poisoned");
        entries
            .iter()
            .filter(|(_, r)| self.is_live(r, now))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl ServiceRegistry for MemoryRegistry {
    fn resolve(
        &self,
        node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, RegistryError>> + Send + '_>> {
        let node_id = node_id.to_string();
        Box::pin(async move {
            self.lookup(&node_id)
                .ok_or(RegistryError::NotFound { node_id })
        })
    }

    fn list_active(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeSet<String>, RegistryError>> + Send + '_>> {
        Box::pin(async move { Ok(self.live_ids()) })
    }

    fn register(
        &self,
        node_id: &str,
        endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>> {
        self.insert(node_id, endpoint);
        Box::pin(async move { Ok(()) })
    }

    fn deregister(
        &self,
        node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>> {
        self.remove(node_id);
        Box::pin(async move { Ok(()) })
    }
}
