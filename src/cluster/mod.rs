//! Replication across nodes.
//!
//! Every node is a peer: whichever node a client reaches coordinates that
//! vote. There is no leader, no election, and no log reconciliation beyond
//! full-state recovery at startup.

pub mod coordinator;
pub mod directory;
pub mod quorum;
pub mod recovery;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
