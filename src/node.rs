//! One voting node: its store, the coordinator it runs for client votes, the
//! handlers for peer calls, and startup recovery.
//!
//! A node starts not ready and refuses every vote operation until
//! [`NodeService::recover`] has completed.

use metrics::gauge;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::cluster::coordinator::{CastError, CommittedVote, ReplicationCoordinator};
use crate::cluster::directory::PeerDirectory;
use crate::cluster::recovery::{RecoveryManager, RecoveryReport};
use crate::cluster::transport::PeerTransport;
use crate::config::ReplicationConfig;
use crate::errors::VoteError;
use crate::metrics::LOG_LENGTH;
use crate::persistence::Persister;
use crate::votes::{Ballot, RejectReason, ReplicateReply, Tally, VoteRecord, VoteSnapshot, VoteStore};

pub struct NodeService {
    node_id: String,
    store: Arc<VoteStore>,
    coordinator: ReplicationCoordinator,
    recovery: RecoveryManager,
    persister: Arc<Persister>,
    ready: AtomicBool,
}

impl NodeService {
    pub fn new(
        node_id: impl Into<String>,
        directory: Arc<PeerDirectory>,
        transport: Arc<dyn PeerTransport>,
        persister: Arc<Persister>,
        replication: &ReplicationConfig,
    ) -> Self {
        let node_id = node_id.into();
        let store = Arc::new(VoteStore::new());
        let coordinator = ReplicationCoordinator::new(
            node_id.clone(),
            store.clone(),
            directory.clone(),
            transport.clone(),
            replication.peer_timeout(),
            replication.quorum_basis,
        );
        let recovery = RecoveryManager::new(
            node_id.clone(),
            store.clone(),
            directory,
            transport,
            persister.clone(),
            replication.peer_timeout(),
        );
        Self {
            node_id,
            store,
            coordinator,
            recovery,
            persister,
            ready: AtomicBool::new(false),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> Result<(), VoteError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(VoteError::NotReady)
        }
    }

    /// Crash-only startup: rebuild state, then start serving.
    pub async fn recover(&self) -> anyhow::Result<RecoveryReport> {
        let report = self.recovery.recover().await?;
        gauge!(LOG_LENGTH).set(self.store.log_len() as f64);
        self.ready.store(true, Ordering::SeqCst);
        Ok(report)
    }

    /// Coordinate a client vote.
    ///
    /// The protocol runs on its own task, so a client that disconnects
    /// mid-request does not leave a tentative apply behind.
    ///
    /// State is saved after a rollback as well as after a commit: a save
    /// made for another vote while this one was tentative may have
    /// captured it.
    pub async fn cast_vote(
        self: &Arc<Self>,
        voter_id: String,
        candidate: String,
    ) -> Result<CommittedVote, VoteError> {
        self.ensure_ready()?;
        let node = Arc::clone(self);
        let ballot = Ballot::new(voter_id, candidate);
        tokio::spawn(async move {
            match node.coordinator.cast_vote(ballot).await {
                Ok(committed) => {
                    node.persist_logged("commit").await;
                    Ok(committed)
                }
                Err(e @ CastError::Duplicate(_)) => Err(VoteError::from(e)),
                Err(e) => {
                    node.persist_logged("rollback").await;
                    Err(VoteError::from(e))
                }
            }
        })
        .await
        .map_err(|e| VoteError::InternalError(anyhow::anyhow!("vote task failed: {e}")))?
    }

    pub fn get_results(&self) -> Result<Tally, VoteError> {
        self.ensure_ready()?;
        Ok(self.store.tally())
    }

    /// Apply a vote coordinated by a peer.
    ///
    /// A record whose vote id is already in the log is acknowledged again;
    /// a different vote from the same voter is refused.
    pub async fn replicate_vote(&self, record: VoteRecord) -> Result<ReplicateReply, VoteError> {
        self.ensure_ready()?;
        match self.store.try_apply(&record.ballot()) {
            Ok(applied) => {
                debug!(
                    "[{}] Applied replicated vote {} as #{}",
                    self.node_id, applied.vote_id, applied.sequence
                );
                self.persist_logged("replicate").await;
                Ok(ReplicateReply::Acked)
            }
            Err(_) if self.store.contains_vote(&record.vote_id) => Ok(ReplicateReply::Acked),
            Err(dup) => {
                info!(
                    "[{}] Refused replicated vote {}: {}",
                    self.node_id, record.vote_id, dup
                );
                Ok(ReplicateReply::Rejected {
                    reason: RejectReason::DuplicateVote,
                })
            }
        }
    }

    /// Full state for a recovering peer.
    pub fn fetch_state(&self) -> Result<VoteSnapshot, VoteError> {
        self.ensure_ready()?;
        Ok(self.store.snapshot())
    }

    /// Persist the current state, logging instead of failing. The outcome
    /// already reported for the vote stands either way.
    async fn persist_logged(&self, reason: &str) {
        gauge!(LOG_LENGTH).set(self.store.log_len() as f64);
        if let Err(e) = self.persister.persist(&self.store).await {
            error!(
                "[{}] Failed to persist snapshot after {} to {}: {:#}",
                self.node_id,
                reason,
                self.persister.backend().describe(),
                e
            );
        }
    }

    /// Final save on shutdown.
    pub async fn flush(&self) -> anyhow::Result<()> {
        self.persister.persist(&self.store).await
    }
}
