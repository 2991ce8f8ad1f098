//! Per-node vote state.
//!
//! Tally, voted-voters set, and log live behind one `Mutex` so that every
//! mutation updates all three together and every snapshot sees them at a
//! single point.

use std::sync::Mutex;

use uuid::Uuid;

use super::record::{Ballot, DuplicateVote, SnapshotError, Tally, VoteRecord, VoteSnapshot};

#[derive(Debug, Default)]
struct Inner {
    state: VoteSnapshot,
    /// Sequence number stamped on the next applied record.
    next_sequence: u64,
}

/// Thread-safe in-memory vote store for one node.
#[derive(Debug)]
pub struct VoteStore {
    inner: Mutex<Inner>,
}

impl Default for VoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VoteStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: VoteSnapshot::default(),
                next_sequence: 1,
            }),
        }
    }

    /// Create a store seeded from a previously persisted snapshot.
    pub fn from_snapshot(snapshot: VoteSnapshot) -> Result<Self, SnapshotError> {
        let store = Self::new();
        store.merge(snapshot)?;
        Ok(store)
    }

    /// Tentatively apply `ballot`, stamping it with this node's next sequence
    /// number. Rejects the ballot if its voter has already voted here.
    pub fn try_apply(&self, ballot: &Ballot) -> Result<VoteRecord, DuplicateVote> {
        let mut inner = self.inner.lock().expect("vote store mutex poisoned");
        if inner.state.voted_voters.contains(&ballot.voter_id) {
            return Err(DuplicateVote {
                voter_id: ballot.voter_id.clone(),
            });
        }

        let record = VoteRecord {
            vote_id: ballot.vote_id,
            voter_id: ballot.voter_id.clone(),
            candidate: ballot.candidate.clone(),
            sequence: inner.next_sequence,
        };
        inner.next_sequence += 1;

        *inner.state.tally.entry(record.candidate.clone()).or_insert(0) += 1;
        inner.state.voted_voters.insert(record.voter_id.clone());
        inner.state.log.push(record.clone());
        Ok(record)
    }

    /// Undo a tentative apply. Returns the removed record, or `None` if
    /// `vote_id` is not in the log.
    ///
    /// Sequence numbers are never reused, so the counter is left alone.
    pub fn remove(&self, vote_id: &Uuid) -> Option<VoteRecord> {
        let mut inner = self.inner.lock().expect("vote store mutex poisoned");
        let pos = inner.state.log.iter().position(|r| &r.vote_id == vote_id)?;
        let record = inner.state.log.remove(pos);

        if let Some(count) = inner.state.tally.get_mut(&record.candidate) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.state.tally.remove(&record.candidate);
            }
        }
        inner.state.voted_voters.remove(&record.voter_id);
        Some(record)
    }

    /// Consistent full-state copy.
    pub fn snapshot(&self) -> VoteSnapshot {
        let inner = self.inner.lock().expect("vote store mutex poisoned");
        inner.state.clone()
    }

    /// Copy of the tally only.
    pub fn tally(&self) -> Tally {
        let inner = self.inner.lock().expect("vote store mutex poisoned");
        inner.state.tally.clone()
    }

    pub fn log_len(&self) -> usize {
        let inner = self.inner.lock().expect("vote store mutex poisoned");
        inner.state.log.len()
    }

    pub fn contains_vote(&self, vote_id: &Uuid) -> bool {
        let inner = self.inner.lock().expect("vote store mutex poisoned");
        inner.state.contains_vote(vote_id)
    }

    /// Replace the whole state with `remote`.
    ///
    /// This is an overwrite, not a field-level merge: local records absent
    /// from `remote` are discarded. `remote` is validated first and the
    /// local state is untouched if it violates the store invariants.
    pub fn merge(&self, remote: VoteSnapshot) -> Result<(), SnapshotError> {
        remote.validate()?;
        let mut inner = self.inner.lock().expect("vote store mutex poisoned");
        inner.next_sequence = inner.next_sequence.max(remote.max_sequence() + 1);
        inner.state = remote;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_consistent(store: &VoteStore) {
        store
            .snapshot()
            .validate()
            .expect("store invariants must hold");
    }

    #[test]
    fn test_try_apply_updates_all_fields() {
        let store = VoteStore::new();
        let record = store.try_apply(&Ballot::new("v1", "alice")).unwrap();
        assert_eq!(record.sequence, 1);

        let snap = store.snapshot();
        assert_eq!(snap.tally.get("alice"), Some(&1));
        assert!(snap.voted_voters.contains("v1"));
        assert_eq!(snap.log, vec![record]);
        assert_consistent(&store);
    }

    #[test]
    fn test_try_apply_rejects_duplicate_voter() {
        let store = VoteStore::new();
        store.try_apply(&Ballot::new("v1", "alice")).unwrap();

        let err = store.try_apply(&Ballot::new("v1", "bob")).unwrap_err();
        assert_eq!(err.voter_id, "v1");
        assert_eq!(store.log_len(), 1);
        assert_eq!(store.tally().get("bob"), None);
    }

    #[test]
    fn test_sequence_is_monotonic_across_removal() {
        let store = VoteStore::new();
        let first = store.try_apply(&Ballot::new("v1", "alice")).unwrap();
        store.remove(&first.vote_id).unwrap();
        let second = store.try_apply(&Ballot::new("v1", "alice")).unwrap();
        assert!(second.sequence > first.sequence);
    }

    #[test]
    fn test_remove_undoes_apply() {
        let store = VoteStore::new();
        store.try_apply(&Ballot::new("v1", "alice")).unwrap();
        let tentative = store.try_apply(&Ballot::new("v2", "alice")).unwrap();

        let removed = store.remove(&tentative.vote_id).unwrap();
        assert_eq!(removed.voter_id, "v2");

        let snap = store.snapshot();
        assert_eq!(snap.tally.get("alice"), Some(&1));
        assert!(!snap.voted_voters.contains("v2"));
        assert!(!snap.contains_vote(&tentative.vote_id));
        assert_consistent(&store);

        // The voter may vote again after a rollback.
        assert!(store.try_apply(&Ballot::new("v2", "bob")).is_ok());
    }

    #[test]
    fn test_remove_last_vote_drops_candidate() {
        let store = VoteStore::new();
        let record = store.try_apply(&Ballot::new("v1", "alice")).unwrap();
        store.remove(&record.vote_id);
        assert!(store.tally().is_empty());
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let store = VoteStore::new();
        assert!(store.remove(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_merge_overwrites_local_state() {
        let donor = VoteStore::new();
        for (voter, candidate) in [("v1", "alice"), ("v2", "bob"), ("v3", "alice")] {
            donor.try_apply(&Ballot::new(voter, candidate)).unwrap();
        }

        let store = VoteStore::new();
        store.try_apply(&Ballot::new("stale", "carol")).unwrap();
        store.merge(donor.snapshot()).unwrap();

        assert_eq!(store.snapshot(), donor.snapshot());
        assert_eq!(store.tally().get("carol"), None);

        // New local applies continue past the donor's sequence numbers.
        let next = store.try_apply(&Ballot::new("v4", "bob")).unwrap();
        assert!(next.sequence > 3);
    }

    #[test]
    fn test_merge_rejects_invalid_snapshot() {
        let store = VoteStore::new();
        store.try_apply(&Ballot::new("v1", "alice")).unwrap();
        let before = store.snapshot();

        let mut bad = before.clone();
        bad.tally.insert("alice".to_string(), 7);
        assert!(store.merge(bad).is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_concurrent_applies_for_same_voter_admit_one() {
        let store = Arc::new(VoteStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .try_apply(&Ballot::new("contested", format!("c{}", i % 3)))
                        .is_ok()
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(applied, 1);
        assert_eq!(store.log_len(), 1);
        assert_consistent(&store);
    }
}
