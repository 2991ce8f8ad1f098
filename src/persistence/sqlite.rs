//! SQLite snapshot backend.
//!
//! Each save writes a fresh database file next to the target, then renames
//! it into place.  Blocking `rusqlite` work runs on the blocking pool.

use rusqlite::{params, Connection, OpenFlags};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use super::backend::SnapshotBackend;
use super::temp_path;
use crate::votes::{VoteRecord, VoteSnapshot};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS vote_log (
        position   INTEGER PRIMARY KEY,
        vote_id    TEXT NOT NULL UNIQUE,
        voter_id   TEXT NOT NULL,
        candidate  TEXT NOT NULL,
        sequence   INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS tally (
        candidate  TEXT PRIMARY KEY,
        count      INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS voted_voters (
        voter_id   TEXT PRIMARY KEY
    );";

/// Snapshot stored as a small SQLite database.
pub struct SqliteSnapshotBackend {
    path: PathBuf,
}

impl SqliteSnapshotBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_snapshot(path: &Path, snapshot: &VoteSnapshot) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = temp_path(path);
        // Remove stale temp file if present.
        let _ = std::fs::remove_file(&tmp_path);

        let mut conn = Connection::open(&tmp_path)?;
        conn.execute_batch("PRAGMA synchronous=FULL;")?;
        conn.execute_batch(SCHEMA)?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO vote_log (position, vote_id, voter_id, candidate, sequence)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, record) in snapshot.log.iter().enumerate() {
                stmt.execute(params![
                    position as i64,
                    record.vote_id.to_string(),
                    record.voter_id,
                    record.candidate,
                    record.sequence as i64,
                ])?;
            }

            let mut stmt = tx.prepare("INSERT INTO tally (candidate, count) VALUES (?1, ?2)")?;
            for (candidate, count) in &snapshot.tally {
                stmt.execute(params![candidate, *count as i64])?;
            }

            let mut stmt = tx.prepare("INSERT INTO voted_voters (voter_id) VALUES (?1)")?;
            for voter in &snapshot.voted_voters {
                stmt.execute(params![voter])?;
            }
        }
        tx.commit()?;
        drop(conn);

        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn read_snapshot(path: &Path) -> anyhow::Result<Option<VoteSnapshot>> {
        if !path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        let mut log = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT vote_id, voter_id, candidate, sequence FROM vote_log ORDER BY position",
            )?;
            let rows = stmt.query_map([], |row| {
                let vote_id: String = row.get(0)?;
                let voter_id: String = row.get(1)?;
                let candidate: String = row.get(2)?;
                let sequence: i64 = row.get(3)?;
                Ok((vote_id, voter_id, candidate, sequence))
            })?;
            for row in rows {
                let (vote_id, voter_id, candidate, sequence) = row?;
                log.push(VoteRecord {
                    vote_id: vote_id.parse()?,
                    voter_id,
                    candidate,
                    sequence: sequence as u64,
                });
            }
        }

        let mut tally = BTreeMap::new();
        {
            let mut stmt = conn.prepare("SELECT candidate, count FROM tally")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (candidate, count) = row?;
                tally.insert(candidate, count as u64);
            }
        }

        let mut voted_voters = BTreeSet::new();
        {
            let mut stmt = conn.prepare("SELECT voter_id FROM voted_voters")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                voted_voters.insert(row?);
            }
        }

        Ok(Some(VoteSnapshot {
            tally,
            voted_voters,
            log,
        }))
    }
}

impl SnapshotBackend for SqliteSnapshotBackend {
    fn load(
        &self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<VoteSnapshot>>> + Send + '_>> {
        let path = self.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::read_snapshot(&path)).await?
        })
    }

    fn save(
        &self,
        snapshot: VoteSnapshot,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let path = self.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::write_snapshot(&path, &snapshot)).await??;
            tracing::debug!("Snapshot written to {:?}", self.path);
            Ok(())
        })
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
