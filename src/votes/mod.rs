//! Vote state for a single node.
//!
//! [`record`] defines the data carried between nodes; [`store::VoteStore`]
//! holds one node's tally, voted-voters set, and log.

pub mod record;
pub mod store;

pub use record::{
    Ballot, CastOutcome, DuplicateVote, RejectReason, ReplicateReply, SnapshotError, Tally,
    VoteRecord, VoteSnapshot,
};
pub use store::VoteStore;
