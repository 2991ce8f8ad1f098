//! In-process snapshot backends: one that keeps the last snapshot in
//! memory (tests, ephemeral nodes) and one that discards everything.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::backend::SnapshotBackend;
use crate::votes::VoteSnapshot;

/// Keeps the most recent snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotBackend {
    slot: Mutex<Option<VoteSnapshot>>,
    saves: AtomicUsize,
}

impl MemorySnapshotBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `snapshot` already "on disk".
    pub fn with_snapshot(snapshot: VoteSnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<VoteSnapshot> {
        self.slot.lock().expect("snapshot slot poisoned").clone()
    }
}

impl SnapshotBackend for MemorySnapshotBackend {
    fn load(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<VoteSnapshot>>> + Send + '_>> {
        Box::pin(async move { Ok(self.current()) })
    }

    fn save(
        &self,
        snapshot: VoteSnapshot,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            *self.slot.lock().expect("snapshot slot poisoned") = Some(snapshot);
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Persistence disabled: loads nothing, saves nothing.
#[derive(Debug, Default)]
pub struct NullSnapshotBackend;

impl SnapshotBackend for NullSnapshotBackend {
    fn load(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<VoteSnapshot>>> + Send + '_>> {
        Box::pin(async move { Ok(None) })
    }

    fn save(
        &self,
        _snapshot: VoteSnapshot,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }

    fn describe(&self) -> String {
        "none".to_string()
    }
}
