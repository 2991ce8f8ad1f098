//! Durable snapshot persistence.
//!
//! The [`backend::SnapshotBackend`] trait is the boundary; [`Persister`]
//! serialises writes so that a later store state is never overwritten by an
//! earlier one.

pub mod backend;
pub mod json;
pub mod memory;
pub mod sqlite;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PersistenceConfig;
use crate::votes::VoteStore;
use backend::SnapshotBackend;

/// Build the snapshot backend selected by `config.backend` for `node_id`.
pub fn open_backend(
    config: &PersistenceConfig,
    node_id: &str,
) -> anyhow::Result<Arc<dyn SnapshotBackend>> {
    let path = config.path_for(node_id);
    let backend: Arc<dyn SnapshotBackend> = match config.backend.as_str() {
        "json" => Arc::new(json::JsonSnapshotBackend::new(path)),
        "sqlite" => Arc::new(sqlite::SqliteSnapshotBackend::new(path)),
        "memory" => Arc::new(memory::MemorySnapshotBackend::new()),
        "none" => Arc::new(memory::NullSnapshotBackend),
        other => anyhow::bail!("unknown persistence backend '{other}'"),
    };
    Ok(backend)
}

/// Sibling file a snapshot is written to before being renamed over `path`.
/// `votes.json` becomes `votes.json.tmp`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes store snapshots through a backend, one at a time.
pub struct Persister {
    backend: Arc<dyn SnapshotBackend>,
    gate: tokio::sync::Mutex<()>,
}

impl Persister {
    pub fn new(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self {
            backend,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn SnapshotBackend> {
        &self.backend
    }

    /// Snapshot `store` and save it.
    ///
    /// The snapshot is taken after acquiring the write gate, so saves land
    /// in the same order as the store states they capture.
    pub async fn persist(&self, store: &VoteStore) -> anyhow::Result<()> {
        let _guard = self.gate.lock().await;
        let snapshot = store.snapshot();
        self.backend.save(snapshot).await
    }
}
