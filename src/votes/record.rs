//! Vote records, snapshots, and protocol outcome types.
//!
//! These types cross every boundary in the system: they are stored in the
//! [`VoteStore`](super::store::VoteStore), shipped between peers as JSON,
//! and written to the durable snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use uuid::Uuid;

/// Candidate name -> number of committed votes.
pub type Tally = BTreeMap<String, u64>;

// ── Ballots and records ────────────────────────────────────────────

/// A vote before it has been stamped by a node's local sequence counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// Identifier generated by the coordinating node.
    pub vote_id: Uuid,
    /// Identifier of the casting voter.
    pub voter_id: String,
    /// Selected option.
    pub candidate: String,
}

impl Ballot {
    /// Create a ballot with a fresh vote id.
    pub fn new(voter_id: impl Into<String>, candidate: impl Into<String>) -> Self {
        Self {
            vote_id: Uuid::new_v4(),
            voter_id: voter_id.into(),
            candidate: candidate.into(),
        }
    }
}

/// A vote as held in a node's log.
///
/// `sequence` is the applying node's own counter, so the same vote carries
/// different sequence numbers on different replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VoteRecord {
    pub vote_id: Uuid,
    pub voter_id: String,
    pub candidate: String,
    pub sequence: u64,
}

impl VoteRecord {
    /// Strip the node-local sequence number.
    pub fn ballot(&self) -> Ballot {
        Ballot {
            vote_id: self.vote_id,
            voter_id: self.voter_id.clone(),
            candidate: self.candidate.clone(),
        }
    }
}

/// Returned by [`VoteStore::try_apply`](super::store::VoteStore::try_apply)
/// when the voter is already present in the voted-voters set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("voter '{voter_id}' has already voted")]
pub struct DuplicateVote {
    pub voter_id: String,
}

// ── Snapshots ──────────────────────────────────────────────────────

/// Full-state copy of one node's vote store.
///
/// Used for result queries, recovery responses, and the durable snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSnapshot {
    #[serde(default)]
    pub tally: Tally,
    #[serde(default)]
    pub voted_voters: BTreeSet<String>,
    #[serde(default)]
    pub log: Vec<VoteRecord>,
}

/// Invariant violations detected in a snapshot received from outside the
/// local store (a peer or a file on disk).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("voter '{voter_id}' appears more than once in the log")]
    DuplicateVoter { voter_id: String },

    #[error("vote id {vote_id} appears more than once in the log")]
    DuplicateVoteId { vote_id: Uuid },

    #[error("tally for '{candidate}' is {actual}, log implies {expected}")]
    TallyMismatch {
        candidate: String,
        expected: u64,
        actual: u64,
    },

    #[error("voted-voters set does not match the voters in the log")]
    VotedVotersMismatch,
}

impl VoteSnapshot {
    /// Build a snapshot whose tally and voted-voters set are derived from `log`.
    pub fn from_log(log: Vec<VoteRecord>) -> Self {
        let mut tally = Tally::new();
        let mut voted_voters = BTreeSet::new();
        for record in &log {
            *tally.entry(record.candidate.clone()).or_insert(0) += 1;
            voted_voters.insert(record.voter_id.clone());
        }
        Self {
            tally,
            voted_voters,
            log,
        }
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Sum of all tally counts.
    pub fn tally_total(&self) -> u64 {
        self.tally.values().sum()
    }

    pub fn contains_vote(&self, vote_id: &Uuid) -> bool {
        self.log.iter().any(|r| &r.vote_id == vote_id)
    }

    /// Highest sequence number in the log, or 0 for an empty log.
    pub fn max_sequence(&self) -> u64 {
        self.log.iter().map(|r| r.sequence).max().unwrap_or(0)
    }

    /// Check the store invariants:
    /// - no voter or vote id appears twice in the log
    /// - `tally[c]` equals the number of log entries for `c`
    /// - `voted_voters` equals the set of voters in the log
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut voters = BTreeSet::new();
        let mut vote_ids = BTreeSet::new();
        for record in &self.log {
            if !voters.insert(record.voter_id.clone()) {
                return Err(SnapshotError::DuplicateVoter {
                    voter_id: record.voter_id.clone(),
                });
            }
            if !vote_ids.insert(record.vote_id) {
                return Err(SnapshotError::DuplicateVoteId {
                    vote_id: record.vote_id,
                });
            }
        }

        let derived = Self::from_log(self.log.clone()).tally;
        let candidates: BTreeSet<&String> = derived.keys().chain(self.tally.keys()).collect();
        for candidate in candidates {
            let expected = derived.get(candidate).copied().unwrap_or(0);
            let actual = self.tally.get(candidate).copied().unwrap_or(0);
            if expected != actual {
                return Err(SnapshotError::TallyMismatch {
                    candidate: candidate.clone(),
                    expected,
                    actual,
                });
            }
        }

        if voters != self.voted_voters {
            return Err(SnapshotError::VotedVotersMismatch);
        }
        Ok(())
    }

    /// Whether `self` should win over `other` when picking a recovery source.
    /// A valid snapshot's tally sums to its log length, so the longer log
    /// wins and equal lengths do not.
    pub fn is_more_authoritative_than(&self, other: &VoteSnapshot) -> bool {
        self.log_len() > other.log_len()
    }
}

// ── Protocol outcomes ──────────────────────────────────────────────

/// Why a peer refused a replicated vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    DuplicateVote,
}

/// A peer's answer to `replicateVote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReplicateReply {
    Acked,
    Rejected { reason: RejectReason },
}

/// Aggregate result of `castVote` as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CastOutcome {
    Committed { vote_id: Uuid },
    DuplicateVote,
    QuorumNotReached,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(voter: &str, candidate: &str, sequence: u64) -> VoteRecord {
        let ballot = Ballot::new(voter, candidate);
        VoteRecord {
            vote_id: ballot.vote_id,
            voter_id: ballot.voter_id,
            candidate: ballot.candidate,
            sequence,
        }
    }

    #[test]
    fn test_from_log_derives_tally_and_voters() {
        let snap = VoteSnapshot::from_log(vec![
            record("v1", "alice", 1),
            record("v2", "bob", 2),
            record("v3", "alice", 3),
        ]);
        assert_eq!(snap.tally.get("alice"), Some(&2));
        assert_eq!(snap.tally.get("bob"), Some(&1));
        assert_eq!(snap.voted_voters.len(), 3);
        assert_eq!(snap.tally_total(), 3);
        assert_eq!(snap.max_sequence(), 3);
        assert!(snap.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_voter() {
        let snap = VoteSnapshot::from_log(vec![record("v1", "alice", 1), record("v1", "bob", 2)]);
        assert_eq!(
            snap.validate(),
            Err(SnapshotError::DuplicateVoter {
                voter_id: "v1".to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_tally_mismatch() {
        let mut snap = VoteSnapshot::from_log(vec![record("v1", "alice", 1)]);
        snap.tally.insert("alice".to_string(), 5);
        assert!(matches!(
            snap.validate(),
            Err(SnapshotError::TallyMismatch { expected: 1, actual: 5, .. })
        ));

        let mut snap = VoteSnapshot::from_log(vec![record("v1", "alice", 1)]);
        snap.tally.insert("ghost".to_string(), 1);
        assert!(matches!(
            snap.validate(),
            Err(SnapshotError::TallyMismatch { expected: 0, actual: 1, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_voter_set_mismatch() {
        let mut snap = VoteSnapshot::from_log(vec![record("v1", "alice", 1)]);
        snap.voted_voters.insert("v9".to_string());
        assert_eq!(snap.validate(), Err(SnapshotError::VotedVotersMismatch));
    }

    #[test]
    fn test_authority_ordering() {
        let short = VoteSnapshot::from_log(vec![record("v1", "alice", 1)]);
        let long = VoteSnapshot::from_log(vec![record("v1", "alice", 1), record("v2", "bob", 2)]);
        assert!(long.is_more_authoritative_than(&short));
        assert!(!short.is_more_authoritative_than(&long));
        assert!(!short.is_more_authoritative_than(&short.clone()));

        // Equal lengths never displace each other, whatever the votes.
        let other = VoteSnapshot::from_log(vec![record("v9", "bob", 7)]);
        assert!(!other.is_more_authoritative_than(&short));
        assert!(!short.is_more_authoritative_than(&other));
    }

    #[test]
    fn test_replicate_reply_wire_format() {
        let acked = serde_json::to_value(ReplicateReply::Acked).unwrap();
        assert_eq!(acked, serde_json::json!({"result": "acked"}));

        let rejected = serde_json::to_value(ReplicateReply::Rejected {
            reason: RejectReason::DuplicateVote,
        })
        .unwrap();
        assert_eq!(
            rejected,
            serde_json::json!({"result": "rejected", "reason": "duplicate_vote"})
        );
    }

    #[test]
    fn test_cast_outcome_wire_format() {
        let value = serde_json::to_value(CastOutcome::QuorumNotReached).unwrap();
        assert_eq!(value, serde_json::json!({"outcome": "quorum_not_reached"}));
    }
}
