//! Startup recovery: rebuild local state from the most complete reachable
//! peer, or from the local durable snapshot when no peer answers.

use anyhow::Context;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::directory::{Peer, PeerDirectory};
use super::transport::PeerTransport;
use crate::metrics::RECOVERY_TOTAL;
use crate::persistence::Persister;
use crate::votes::{VoteSnapshot, VoteStore};

/// Where recovered state came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySource {
    Peer { node_id: String },
    LocalSnapshot,
    Empty,
}

impl RecoverySource {
    fn label(&self) -> &'static str {
        match self {
            RecoverySource::Peer { .. } => "peer",
            RecoverySource::LocalSnapshot => "local",
            RecoverySource::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub source: RecoverySource,
    pub log_len: usize,
    /// Peers that returned a usable snapshot.
    pub donors: usize,
}

pub struct RecoveryManager {
    node_id: String,
    store: Arc<VoteStore>,
    directory: Arc<PeerDirectory>,
    transport: Arc<dyn PeerTransport>,
    persister: Arc<Persister>,
    peer_timeout: Duration,
}

impl RecoveryManager {
    pub fn new(
        node_id: impl Into<String>,
        store: Arc<VoteStore>,
        directory: Arc<PeerDirectory>,
        transport: Arc<dyn PeerTransport>,
        persister: Arc<Persister>,
        peer_timeout: Duration,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            store,
            directory,
            transport,
            persister,
            peer_timeout,
        }
    }

    /// Replace local state with the best available source and persist it.
    ///
    /// A reachable peer always wins over the local snapshot, even one with
    /// a shorter log. Among peers the longest log wins, then the lowest
    /// node id.
    pub async fn recover(&self) -> anyhow::Result<RecoveryReport> {
        let peers = match self.directory.peers().await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(
                    "[{}] Registry unavailable during recovery, treating as no peers: {}",
                    self.node_id, e
                );
                Vec::new()
            }
        };

        let candidates = self.collect_snapshots(&peers).await;
        let donors = candidates.len();

        let source = match pick_most_authoritative(candidates) {
            Some((peer, snapshot)) => {
                info!(
                    "[{}] Recovering from {} ({} records, {} donors)",
                    self.node_id,
                    peer.node_id,
                    snapshot.log_len(),
                    donors
                );
                self.store
                    .merge(snapshot)
                    .context("merging peer snapshot")?;
                RecoverySource::Peer {
                    node_id: peer.node_id,
                }
            }
            None => self.load_local().await?,
        };

        self.persister
            .persist(&self.store)
            .await
            .context("persisting recovered state")?;

        counter!(RECOVERY_TOTAL, "source" => source.label()).increment(1);
        let log_len = self.store.log_len();
        info!(
            "[{}] Recovery complete from {:?}: {} records",
            self.node_id, source, log_len
        );
        Ok(RecoveryReport {
            source,
            log_len,
            donors,
        })
    }

    /// Fetch every peer's state concurrently. Unreachable peers, refusals,
    /// and snapshots that fail validation are dropped.
    async fn collect_snapshots(&self, peers: &[Peer]) -> Vec<(Peer, VoteSnapshot)> {
        let mut tasks = JoinSet::new();
        for peer in peers {
            let transport = Arc::clone(&self.transport);
            let peer = peer.clone();
            let timeout = self.peer_timeout;
            tasks.spawn(async move {
                let result = tokio::time::timeout(timeout, transport.fetch_state(&peer.endpoint))
                    .await
                    .map_err(|_| format!("timed out after {timeout:?}"))
                    .and_then(|r| r.map_err(|e| e.to_string()));
                (peer, result)
            });
        }

        let mut snapshots = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((peer, result)) = joined else {
                continue;
            };
            match result {
                Ok(snapshot) => match snapshot.validate() {
                    Ok(()) => snapshots.push((peer, snapshot)),
                    Err(e) => warn!(
                        "[{}] Ignoring invalid state from {}: {}",
                        self.node_id, peer.node_id, e
                    ),
                },
                Err(e) => warn!(
                    "[{}] Could not fetch state from {}: {}",
                    self.node_id, peer.node_id, e
                ),
            }
        }
        snapshots
    }

    async fn load_local(&self) -> anyhow::Result<RecoverySource> {
        let backend = self.persister.backend();
        let loaded = backend
            .load()
            .await
            .with_context(|| format!("loading local snapshot from {}", backend.describe()))?;
        match loaded {
            Some(snapshot) => {
                info!(
                    "[{}] No reachable peers, restoring {} records from {}",
                    self.node_id,
                    snapshot.log_len(),
                    backend.describe()
                );
                self.store
                    .merge(snapshot)
                    .with_context(|| format!("local snapshot at {} is corrupt", backend.describe()))?;
                Ok(RecoverySource::LocalSnapshot)
            }
            None => {
                info!("[{}] No reachable peers and no local snapshot, starting empty", self.node_id);
                Ok(RecoverySource::Empty)
            }
        }
    }
}

/// Best candidate by log length; ties go to the lowest node id.
fn pick_most_authoritative(mut candidates: Vec<(Peer, VoteSnapshot)>) -> Option<(Peer, VoteSnapshot)> {
    candidates.sort_by(|a, b| a.0.node_id.cmp(&b.0.node_id));
    let mut best: Option<(Peer, VoteSnapshot)> = None;
    for candidate in candidates {
        let replace = match &best {
            None => true,
            Some((_, current)) => candidate.1.is_more_authoritative_than(current),
        };
        if replace {
            best = Some(candidate);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::testing::{Behaviour, ScriptedTransport, UnavailableRegistry};
    use crate::persistence::memory::MemorySnapshotBackend;
    use crate::registry::memory::MemoryRegistry;
    use crate::votes::{Ballot, VoteRecord};

    fn snapshot(votes: &[(&str, &str)]) -> VoteSnapshot {
        let log = votes
            .iter()
            .enumerate()
            .map(|(i, (voter, candidate))| {
                let ballot = Ballot::new(*voter, *candidate);
                VoteRecord {
                    vote_id: ballot.vote_id,
                    voter_id: ballot.voter_id,
                    candidate: ballot.candidate,
                    sequence: i as u64 + 1,
                }
            })
            .collect();
        VoteSnapshot::from_log(log)
    }

    struct Fixture {
        manager: RecoveryManager,
        store: Arc<VoteStore>,
        backend: Arc<MemorySnapshotBackend>,
    }

    fn fixture(
        transport: Arc<ScriptedTransport>,
        peers: &[&str],
        local: Option<VoteSnapshot>,
    ) -> Fixture {
        let registry = Arc::new(MemoryRegistry::new());
        registry.insert("server1", "mem://server1");
        for id in peers {
            registry.insert(id, &format!("mem://{id}"));
        }
        let backend = Arc::new(match local {
            Some(s) => MemorySnapshotBackend::with_snapshot(s),
            None => MemorySnapshotBackend::new(),
        });
        let store = Arc::new(VoteStore::new());
        let manager = RecoveryManager::new(
            "server1",
            store.clone(),
            Arc::new(PeerDirectory::new("server1", registry)),
            transport,
            Arc::new(Persister::new(backend.clone())),
            Duration::from_millis(100),
        );
        Fixture {
            manager,
            store,
            backend,
        }
    }

    #[tokio::test]
    async fn test_adopts_longest_peer_log() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_state("mem://server2", snapshot(&[("v1", "alice")]));
        transport.set_state(
            "mem://server3",
            snapshot(&[("v1", "alice"), ("v2", "bob"), ("v3", "alice")]),
        );
        let f = fixture(transport, &["server2", "server3"], None);

        let report = f.manager.recover().await.unwrap();
        assert_eq!(
            report.source,
            RecoverySource::Peer {
                node_id: "server3".to_string()
            }
        );
        assert_eq!(report.log_len, 3);
        assert_eq!(report.donors, 2);
        assert_eq!(f.store.tally().get("alice"), Some(&2));
        // Recovered state is persisted.
        assert_eq!(f.backend.current().unwrap().log_len(), 3);
    }

    #[tokio::test]
    async fn test_peer_state_overrides_local_snapshot() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_state("mem://server2", snapshot(&[("v9", "carol")]));
        let local = snapshot(&[("v1", "alice"), ("v2", "bob")]);
        let f = fixture(transport, &["server2"], Some(local));

        let report = f.manager.recover().await.unwrap();
        assert!(matches!(report.source, RecoverySource::Peer { .. }));
        assert_eq!(f.store.log_len(), 1);
        assert_eq!(f.store.tally().get("carol"), Some(&1));
        assert_eq!(f.store.tally().get("alice"), None);
    }

    #[tokio::test]
    async fn test_no_peers_loads_local_snapshot() {
        let transport = Arc::new(ScriptedTransport::new());
        let local = snapshot(&[("v1", "alice"), ("v2", "bob")]);
        let f = fixture(transport, &["server2"], Some(local));

        let report = f.manager.recover().await.unwrap();
        assert_eq!(report.source, RecoverySource::LocalSnapshot);
        assert_eq!(report.donors, 0);
        assert_eq!(f.store.log_len(), 2);
    }

    #[tokio::test]
    async fn test_no_peers_no_snapshot_starts_empty() {
        let f = fixture(Arc::new(ScriptedTransport::new()), &[], None);
        let report = f.manager.recover().await.unwrap();
        assert_eq!(report.source, RecoverySource::Empty);
        assert_eq!(f.store.log_len(), 0);
    }

    #[tokio::test]
    async fn test_unready_and_hanging_peers_are_skipped() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set("mem://server2", Behaviour::NotReady);
        transport.set("mem://server3", Behaviour::Hang);
        transport.set_state("mem://server4", snapshot(&[("v1", "alice")]));
        let f = fixture(transport, &["server2", "server3", "server4"], None);

        let report = f.manager.recover().await.unwrap();
        assert_eq!(
            report.source,
            RecoverySource::Peer {
                node_id: "server4".to_string()
            }
        );
        assert_eq!(report.donors, 1);
    }

    #[tokio::test]
    async fn test_invalid_peer_snapshot_is_ignored() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut bad = snapshot(&[("v1", "alice"), ("v2", "alice")]);
        bad.tally.insert("alice".to_string(), 7);
        transport.set_state("mem://server2", bad);
        transport.set_state("mem://server3", snapshot(&[("v1", "alice")]));
        let f = fixture(transport, &["server2", "server3"], None);

        let report = f.manager.recover().await.unwrap();
        assert_eq!(
            report.source,
            RecoverySource::Peer {
                node_id: "server3".to_string()
            }
        );
        assert_eq!(f.store.tally().get("alice"), Some(&1));
    }

    #[tokio::test]
    async fn test_corrupt_local_snapshot_fails_recovery() {
        let mut bad = snapshot(&[("v1", "alice")]);
        bad.voted_voters.insert("ghost".to_string());
        let f = fixture(Arc::new(ScriptedTransport::new()), &[], Some(bad));
        assert!(f.manager.recover().await.is_err());
    }

    #[tokio::test]
    async fn test_registry_outage_falls_back_to_local() {
        let backend = Arc::new(MemorySnapshotBackend::with_snapshot(snapshot(&[(
            "v1", "alice",
        )])));
        let store = Arc::new(VoteStore::new());
        let manager = RecoveryManager::new(
            "server1",
            store.clone(),
            Arc::new(PeerDirectory::new("server1", Arc::new(UnavailableRegistry))),
            Arc::new(ScriptedTransport::new()),
            Arc::new(Persister::new(backend)),
            Duration::from_millis(100),
        );
        let report = manager.recover().await.unwrap();
        assert_eq!(report.source, RecoverySource::LocalSnapshot);
        assert_eq!(store.log_len(), 1);
    }

    #[test]
    fn test_ties_go_to_lowest_node_id() {
        let peer = |id: &str| Peer {
            node_id: id.to_string(),
            endpoint: format!("mem://{id}"),
        };
        let picked = pick_most_authoritative(vec![
            (peer("server3"), snapshot(&[("v1", "alice")])),
            (peer("server2"), snapshot(&[("v2", "bob")])),
        ])
        .unwrap();
        assert_eq!(picked.0.node_id, "server2");
    }
}
