//! JSON file snapshot backend.
//!
//! The snapshot is written as pretty-printed JSON to a temporary sibling
//! file and renamed into place, so a crash mid-write leaves the previous
//! snapshot intact.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use super::backend::SnapshotBackend;
use super::temp_path;
use crate::votes::VoteSnapshot;

/// Snapshot stored as a single JSON document.
pub struct JsonSnapshotBackend {
    path: PathBuf,
}

impl JsonSnapshotBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotBackend for JsonSnapshotBackend {
    fn load(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<VoteSnapshot>>> + Send + '_>> {
        Box::pin(async move {
            if !tokio::fs::try_exists(&self.path).await? {
                return Ok(None);
            }
            let contents = tokio::fs::read_to_string(&self.path).await?;
            let snapshot: VoteSnapshot = serde_json::from_str(&contents).map_err(|e| {
                anyhow::anyhow!("Failed to parse snapshot {}: {e}", self.path.display())
            })?;
            Ok(Some(snapshot))
        })
    }

    fn save(
        &self,
        snapshot: VoteSnapshot,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }

            let body = serde_json::to_vec_pretty(&snapshot)?;
            let tmp_path = temp_path(&self.path);
            tokio::fs::write(&tmp_path, body).await?;
            tokio::fs::rename(&tmp_path, &self.path).await?;

            tracing::debug!("Snapshot written to {:?}", self.path);
            Ok(())
        })
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}
