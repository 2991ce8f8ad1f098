//! Abstract durable-snapshot backend.
//!
//! Every persistence backend must implement [`SnapshotBackend`].  The core
//! only hands over whole [`VoteSnapshot`] values; how they hit the disk is
//! the backend's business, as long as tally, voted voters, and log
//! round-trip losslessly.

use std::future::Future;
use std::pin::Pin;

use crate::votes::VoteSnapshot;

/// Async snapshot storage contract.
pub trait SnapshotBackend: Send + Sync + 'static {
    /// Read the last saved snapshot, or `None` if nothing was ever saved.
    fn load(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<VoteSnapshot>>> + Send + '_>>;

    /// Durably replace the saved snapshot with `snapshot`.
    fn save(
        &self,
        snapshot: VoteSnapshot,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Short human-readable description for log lines.
    fn describe(&self) -> String;
}
