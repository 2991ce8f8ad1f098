//! Coordinating a vote: apply locally, fan out to peers, then commit or roll
//! back on the count of acknowledgements.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::directory::{Peer, PeerDirectory};
use super::quorum::{PeerOutcome, QuorumDecision, ReplicationTally};
use super::transport::{PeerTransport, TransportError};
use crate::config::QuorumBasis;
use crate::metrics::{REPLICATION_REPLIES_TOTAL, VOTES_TOTAL};
use crate::registry::RegistryError;
use crate::votes::{Ballot, DuplicateVote, ReplicateReply, VoteRecord, VoteStore};

/// A vote that reached quorum and stays applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedVote {
    pub record: VoteRecord,
    /// Nodes holding the vote, coordinator included.
    pub votes: usize,
    pub required: usize,
}

#[derive(Debug, Error)]
pub enum CastError {
    #[error(transparent)]
    Duplicate(#[from] DuplicateVote),

    #[error("quorum not reached: {votes} of {required} required nodes hold the vote")]
    QuorumNotReached { votes: usize, required: usize },

    /// The registry could not be asked for peers, so no quorum can be
    /// established. The tentative apply has been rolled back.
    #[error("peer membership unavailable: {0}")]
    MembershipUnavailable(#[from] RegistryError),
}

impl CastError {
    fn outcome_label(&self) -> &'static str {
        match self {
            CastError::Duplicate(_) => "duplicate_vote",
            CastError::QuorumNotReached { .. } | CastError::MembershipUnavailable(_) => {
                "quorum_not_reached"
            }
        }
    }
}

pub struct ReplicationCoordinator {
    node_id: String,
    store: Arc<VoteStore>,
    directory: Arc<PeerDirectory>,
    transport: Arc<dyn PeerTransport>,
    peer_timeout: Duration,
    quorum_basis: QuorumBasis,
}

impl ReplicationCoordinator {
    pub fn new(
        node_id: impl Into<String>,
        store: Arc<VoteStore>,
        directory: Arc<PeerDirectory>,
        transport: Arc<dyn PeerTransport>,
        peer_timeout: Duration,
        quorum_basis: QuorumBasis,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            store,
            directory,
            transport,
            peer_timeout,
            quorum_basis,
        }
    }

    /// Run the full protocol for one ballot.
    ///
    /// The ballot is applied locally before any peer is contacted and is
    /// removed again if quorum is not reached. A duplicate voter is rejected
    /// before any peer traffic.
    pub async fn cast_vote(&self, ballot: Ballot) -> Result<CommittedVote, CastError> {
        let result = self.coordinate(ballot).await;
        let outcome = match &result {
            Ok(_) => "committed",
            Err(e) => e.outcome_label(),
        };
        counter!(VOTES_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn coordinate(&self, ballot: Ballot) -> Result<CommittedVote, CastError> {
        let record = self.store.try_apply(&ballot).map_err(|e| {
            info!("[{}] Rejected duplicate vote from '{}'", self.node_id, e.voter_id);
            e
        })?;

        let peers = match self.directory.peers().await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(
                    "[{}] Registry unavailable, rolling back vote {}: {}",
                    self.node_id, record.vote_id, e
                );
                self.store.remove(&record.vote_id);
                return Err(e.into());
            }
        };

        let tally = self.replicate(&peers, &record).await;
        let votes = tally.votes();
        let required = tally.required(self.quorum_basis);

        match tally.decide(self.quorum_basis) {
            QuorumDecision::Commit => {
                info!(
                    "[{}] Committed vote {} for '{}' ({}/{} nodes, {} contacted)",
                    self.node_id, record.vote_id, record.candidate, votes, required, tally.contacted
                );
                Ok(CommittedVote {
                    record,
                    votes,
                    required,
                })
            }
            QuorumDecision::Rollback => {
                self.store.remove(&record.vote_id);
                warn!(
                    "[{}] Rolled back vote {}: {}/{} nodes ({} contacted, {} responded, {} conflicts)",
                    self.node_id,
                    record.vote_id,
                    votes,
                    required,
                    tally.contacted,
                    tally.responded,
                    tally.conflicts
                );
                Err(CastError::QuorumNotReached { votes, required })
            }
        }
    }

    /// Send `record` to every peer concurrently and wait for each to answer
    /// or time out.
    async fn replicate(&self, peers: &[Peer], record: &VoteRecord) -> ReplicationTally {
        let mut tasks = JoinSet::new();
        for peer in peers {
            let transport = Arc::clone(&self.transport);
            let peer = peer.clone();
            let record = record.clone();
            let timeout = self.peer_timeout;
            tasks.spawn(async move {
                let call = transport.replicate_vote(&peer.endpoint, &record);
                let outcome = match tokio::time::timeout(timeout, call).await {
                    Err(_) => PeerOutcome::Unreachable(format!("timed out after {timeout:?}")),
                    Ok(Ok(ReplicateReply::Acked)) => PeerOutcome::Acked,
                    Ok(Ok(ReplicateReply::Rejected { .. })) => PeerOutcome::Conflict,
                    Ok(Err(TransportError::Unreachable(msg))) => PeerOutcome::Unreachable(msg),
                    Ok(Err(e)) => PeerOutcome::Rejected(e.to_string()),
                };
                (peer, outcome)
            });
        }

        let mut tally = ReplicationTally::default();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((peer, outcome)) => {
                    match &outcome {
                        PeerOutcome::Acked => {
                            debug!("[{}] {} acked {}", self.node_id, peer.node_id, record.vote_id)
                        }
                        PeerOutcome::Conflict => warn!(
                            "[{}] {} already holds a vote from '{}'",
                            self.node_id, peer.node_id, record.voter_id
                        ),
                        PeerOutcome::Rejected(msg) | PeerOutcome::Unreachable(msg) => warn!(
                            "[{}] Replication to {} failed: {}",
                            self.node_id, peer.node_id, msg
                        ),
                    }
                    outcome
                }
                Err(e) => {
                    error!("[{}] Replication task failed: {}", self.node_id, e);
                    PeerOutcome::Unreachable(e.to_string())
                }
            };
            counter!(REPLICATION_REPLIES_TOTAL, "reply" => outcome.label()).increment(1);
            tally.record(&outcome);
        }
        tally
    }
}
