//! Quorum arithmetic for a single replicated vote.
//!
//! The live set is measured per operation: the coordinator counts itself
//! plus the peers it dealt with, and a vote commits once a strict majority
//! of that set holds it.

use crate::config::QuorumBasis;

/// Strict majority of `active_nodes`: `floor(n / 2) + 1`.
pub fn majority(active_nodes: usize) -> usize {
    active_nodes / 2 + 1
}

/// How one peer answered a replicate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOutcome {
    /// Peer applied the vote.
    Acked,
    /// Peer reports the voter already voted there.
    Conflict,
    /// Peer answered but refused or failed the request.
    Rejected(String),
    /// Timeout or connection failure.
    Unreachable(String),
}

impl PeerOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            PeerOutcome::Acked => "acked",
            PeerOutcome::Conflict => "conflict",
            PeerOutcome::Rejected(_) => "rejected",
            PeerOutcome::Unreachable(_) => "unreachable",
        }
    }

    pub fn is_responsive(&self) -> bool {
        !matches!(self, PeerOutcome::Unreachable(_))
    }
}

/// Commit or roll back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumDecision {
    Commit,
    Rollback,
}

/// Peer replies gathered for one vote. The coordinator itself is implicit:
/// it always counts as one active node and one vote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationTally {
    /// Peers a replicate call was issued to.
    pub contacted: usize,
    /// Peers that answered at all.
    pub responded: usize,
    pub acks: usize,
    pub conflicts: usize,
}

impl ReplicationTally {
    pub fn record(&mut self, outcome: &PeerOutcome) {
        self.contacted += 1;
        if outcome.is_responsive() {
            self.responded += 1;
        }
        match outcome {
            PeerOutcome::Acked => self.acks += 1,
            PeerOutcome::Conflict => self.conflicts += 1,
            PeerOutcome::Rejected(_) | PeerOutcome::Unreachable(_) => {}
        }
    }

    /// Size of the live set, coordinator included.
    pub fn active_nodes(&self, basis: QuorumBasis) -> usize {
        1 + match basis {
            QuorumBasis::Contacted => self.contacted,
            QuorumBasis::Responsive => self.responded,
        }
    }

    pub fn required(&self, basis: QuorumBasis) -> usize {
        majority(self.active_nodes(basis))
    }

    /// Nodes holding the vote: the coordinator plus acking peers.
    pub fn votes(&self) -> usize {
        1 + self.acks
    }

    pub fn decide(&self, basis: QuorumBasis) -> QuorumDecision {
        if self.votes() >= self.required(basis) {
            QuorumDecision::Commit
        } else {
            QuorumDecision::Rollback
        }
    }
}
