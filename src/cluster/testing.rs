//! In-process fakes for protocol tests.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::directory::PeerDirectory;
use super::transport::{PeerTransport, TransportError};
use crate::config::{QuorumBasis, ReplicationConfig};
use crate::errors::VoteError;
use crate::node::NodeService;
use crate::persistence::memory::MemorySnapshotBackend;
use crate::persistence::Persister;
use crate::registry::memory::MemoryRegistry;
use crate::registry::{RegistryError, ServiceRegistry};
use crate::votes::{RejectReason, ReplicateReply, VoteRecord, VoteSnapshot};

/// How a scripted peer behaves. Endpoints without a script are down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Ack,
    Conflict,
    Down,
    Hang,
    NotReady,
}

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<BTreeMap<String, Behaviour>>,
    states: Mutex<BTreeMap<String, VoteSnapshot>>,
    replicate_calls: AtomicUsize,
    received: Mutex<Vec<(String, VoteRecord)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, endpoint: &str, behaviour: Behaviour) {
        self.scripts
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), behaviour);
    }

    /// Serve `snapshot` from `endpoint`; also scripts the endpoint as `Ack`
    /// unless it already has a script.
    pub fn set_state(&self, endpoint: &str, snapshot: VoteSnapshot) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_insert(Behaviour::Ack);
        self.states
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), snapshot);
    }

    pub fn replicate_calls(&self) -> usize {
        self.replicate_calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<(String, VoteRecord)> {
        self.received.lock().unwrap().clone()
    }

    fn behaviour(&self, endpoint: &str) -> Behaviour {
        self.scripts
            .lock()
            .unwrap()
            .get(endpoint)
            .copied()
            .unwrap_or(Behaviour::Down)
    }
}

impl PeerTransport for ScriptedTransport {
    fn replicate_vote(
        &self,
        endpoint: &str,
        record: &VoteRecord,
    ) -> Pin<Box<dyn Future<Output = Result<ReplicateReply, TransportError>> + Send + '_>> {
        self.replicate_calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap()
            .push((endpoint.to_string(), record.clone()));
        let behaviour = self.behaviour(endpoint);
        Box::pin(async move {
            match behaviour {
                Behaviour::Ack => Ok(ReplicateReply::Acked),
                Behaviour::Conflict => Ok(ReplicateReply::Rejected {
                    reason: RejectReason::DuplicateVote,
                }),
                Behaviour::Down => Err(TransportError::Unreachable("connection refused".into())),
                Behaviour::Hang => std::future::pending().await,
                Behaviour::NotReady => Err(TransportError::Rejected {
                    status: 503,
                    message: "NotReady".into(),
                }),
            }
        })
    }

    fn fetch_state(
        &self,
        endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<VoteSnapshot, TransportError>> + Send + '_>> {
        let behaviour = self.behaviour(endpoint);
        let state = self
            .states
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move {
            match behaviour {
                Behaviour::Ack | Behaviour::Conflict => Ok(state),
                Behaviour::Down => Err(TransportError::Unreachable("connection refused".into())),
                Behaviour::Hang => std::future::pending().await,
                Behaviour::NotReady => Err(TransportError::Rejected {
                    status: 503,
                    message: "NotReady".into(),
                }),
            }
        })
    }
}

/// Registry that is never reachable.
pub struct UnavailableRegistry;

impl ServiceRegistry for UnavailableRegistry {
    fn resolve(
        &self,
        _node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, RegistryError>> + Send + '_>> {
        Box::pin(async { Err(RegistryError::Unavailable("registry down".into())) })
    }

    fn list_active(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeSet<String>, RegistryError>> + Send + '_>> {
        Box::pin(async { Err(RegistryError::Unavailable("registry down".into())) })
    }

    fn register(
        &self,
        _node_id: &str,
        _endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>> {
        Box::pin(async { Err(RegistryError::Unavailable("registry down".into())) })
    }

    fn deregister(
        &self,
        _node_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send + '_>> {
        Box::pin(async { Err(RegistryError::Unavailable("registry down".into())) })
    }
}

/// Routes peer calls straight into other in-process nodes.
#[derive(Default)]
pub struct LocalTransport {
    nodes: RwLock<BTreeMap<String, Arc<NodeService>>>,
    down: RwLock<BTreeSet<String>>,
}

impl LocalTransport {
    /// The live node behind `endpoint`.
    pub fn target(&self, endpoint: &str) -> Result<Arc<NodeService>, TransportError> {
        if self.down.read().unwrap().contains(endpoint) {
            return Err(TransportError::Unreachable("connection refused".into()));
        }
        self.nodes
            .read()
            .unwrap()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable("no such node".into()))
    }
}

fn refused(e: VoteError) -> TransportError {
    TransportError::Rejected {
        status: e.status_code().as_u16(),
        message: e.code().to_string(),
    }
}

impl PeerTransport for LocalTransport {
    fn replicate_vote(
        &self,
        endpoint: &str,
        record: &VoteRecord,
    ) -> Pin<Box<dyn Future<Output = Result<ReplicateReply, TransportError>> + Send + '_>> {
        let target = self.target(endpoint);
        let record = record.clone();
        Box::pin(async move { target?.replicate_vote(record).await.map_err(refused) })
    }

    fn fetch_state(
        &self,
        endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<VoteSnapshot, TransportError>> + Send + '_>> {
        let target = self.target(endpoint);
        Box::pin(async move { target?.fetch_state().map_err(refused) })
    }
}

/// Several nodes wired through one registry and one [`LocalTransport`].
/// Each node keeps its snapshot backend across restarts.
pub struct Cluster {
    pub registry: Arc<MemoryRegistry>,
    pub transport: Arc<LocalTransport>,
    pub backends: BTreeMap<String, Arc<MemorySnapshotBackend>>,
    pub nodes: BTreeMap<String, Arc<NodeService>>,
}

impl Cluster {
    pub async fn start(ids: &[&str]) -> Self {
        let mut cluster = Cluster {
            registry: Arc::new(MemoryRegistry::new()),
            transport: Arc::new(LocalTransport::default()),
            backends: BTreeMap::new(),
            nodes: BTreeMap::new(),
        };
        for id in ids {
            cluster.boot(id).await;
        }
        cluster
    }

    pub fn endpoint(id: &str) -> String {
        format!("mem://{id}")
    }

    /// Start (or restart) `id`, reusing its durable backend.
    pub async fn boot(&mut self, id: &str) -> Arc<NodeService> {
        let backend = self
            .backends
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(MemorySnapshotBackend::new()))
            .clone();
        let node = Arc::new(NodeService::new(
            id,
            Arc::new(PeerDirectory::new(id, self.registry.clone())),
            self.transport.clone(),
            Arc::new(Persister::new(backend)),
            &ReplicationConfig {
                peer_timeout_ms: 200,
                quorum_basis: QuorumBasis::Contacted,
            },
        ));
        node.recover().await.unwrap();

        let endpoint = Self::endpoint(id);
        self.transport.down.write().unwrap().remove(&endpoint);
        self.transport
            .nodes
            .write()
            .unwrap()
            .insert(endpoint.clone(), node.clone());
        self.registry.insert(id, &endpoint);
        self.nodes.insert(id.to_string(), node.clone());
        node
    }

    /// Crash `id`: it stops answering but stays registered.
    pub fn crash(&mut self, id: &str) {
        self.transport
            .down
            .write()
            .unwrap()
            .insert(Self::endpoint(id));
        self.nodes.remove(id);
    }

    pub fn node(&self, id: &str) -> &Arc<NodeService> {
        &self.nodes[id]
    }
}
