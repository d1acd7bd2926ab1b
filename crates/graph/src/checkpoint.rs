//! Durable per-session checkpoint store.
//!
//! One JSON line per snapshot in `checkpoints.db` inside the session
//! directory, exclusive-locked while open so two processes never interleave
//! appends. Snapshots are ordered by a monotonic checkpoint id; `prune`
//! drops the oldest beyond the retention count.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use voco_domain::error::{Error, Result};

use crate::state::TurnState;

pub const DEFAULT_MAX_CHECKPOINTS: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    checkpoint_id: u64,
    created_at: DateTime<Utc>,
    state: TurnState,
}

struct Inner {
    file: File,
    latest: Option<TurnState>,
    next_id: u64,
    count: usize,
}

pub struct Checkpointer {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl Checkpointer {
    /// Open (or create) the checkpoint store in `session_dir`.
    pub fn open(session_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(session_dir).map_err(|e| Error::io("creating session directory", e))?;
        let path = session_dir.join("checkpoints.db");

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::io("opening checkpoint store", e))?;
        file.try_lock_exclusive().map_err(|e| Error::Checkpoint {
            path: path.display().to_string(),
            message: format!("locked by another process: {e}"),
        })?;

        let (latest, next_id, count) = load_tail(&path)?;
        tracing::info!(
            path = %path.display(),
            checkpoints = count,
            "checkpoint store opened"
        );

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                file,
                latest,
                next_id,
                count,
            }),
        })
    }

    /// Append a snapshot; returns its checkpoint id.
    pub fn append(&self, state: &TurnState) -> Result<u64> {
        let mut inner = self.inner.lock();
        let record = CheckpointRecord {
            checkpoint_id: inner.next_id,
            created_at: Utc::now(),
            state: state.clone(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| Error::json("serializing checkpoint", e))?;
        line.push('\n');
        inner.file.write_all(line.as_bytes()).map_err(|e| Error::io("writing checkpoint", e))?;
        inner.file.flush().map_err(|e| Error::io("writing checkpoint", e))?;

        inner.latest = Some(state.clone());
        inner.next_id += 1;
        inner.count += 1;
        Ok(record.checkpoint_id)
    }

    /// The most recent snapshot, if any.
    pub fn latest(&self) -> Option<TurnState> {
        self.inner.lock().latest.clone()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().count
    }

    /// Delete the oldest snapshots beyond `keep_last`. Returns how many
    /// were dropped.
    pub fn prune(&self, keep_last: usize) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.count <= keep_last {
            return Ok(0);
        }

        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::io("reading checkpoint store", e))?;
        let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
        let deleted = lines.len().saturating_sub(keep_last);
        let kept = &lines[deleted..];

        // The handle is in append mode, so writes land at the new EOF.
        inner.file.set_len(0).map_err(|e| Error::io("rewriting checkpoint store", e))?;
        for line in kept {
            inner
                .file
                .write_all(line.as_bytes())
                .map_err(|e| Error::io("rewriting checkpoint store", e))?;
            inner
                .file
                .write_all(b"\n")
                .map_err(|e| Error::io("rewriting checkpoint store", e))?;
        }
        inner.file.flush().map_err(|e| Error::io("rewriting checkpoint store", e))?;
        inner.count = kept.len();

        tracing::info!(deleted, kept = kept.len(), "pruned checkpoints");
        Ok(deleted)
    }
}

/// Scan the file once at open: latest state, next id, record count.
fn load_tail(path: &Path) -> Result<(Option<TurnState>, u64, usize)> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::io("reading checkpoint store", e))?;
    let mut latest = None;
    let mut next_id = 0;
    let mut count = 0;
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CheckpointRecord>(line) {
            Ok(record) => {
                next_id = next_id.max(record.checkpoint_id + 1);
                latest = Some(record.state);
                count += 1;
            }
            Err(e) => {
                // A torn write at the tail loses one snapshot, not the session.
                tracing::warn!(error = %e, "skipping corrupt checkpoint line");
            }
        }
    }
    Ok((latest, next_id, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voco_domain::message::ChatMessage;

    fn state_with(text: &str) -> TurnState {
        let mut state = TurnState::default();
        state.append_messages(vec![ChatMessage::human(text)]);
        state
    }

    #[test]
    fn append_then_latest() {
        let dir = tempfile::tempdir().unwrap();
        let cp = Checkpointer::open(dir.path()).unwrap();
        assert!(cp.latest().is_none());

        cp.append(&state_with("one")).unwrap();
        cp.append(&state_with("two")).unwrap();

        let latest = cp.latest().unwrap();
        assert_eq!(latest.last_human_text(), Some("two"));
        assert_eq!(cp.count(), 2);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cp = Checkpointer::open(dir.path()).unwrap();
            cp.append(&state_with("persisted")).unwrap();
        }
        let cp = Checkpointer::open(dir.path()).unwrap();
        assert_eq!(cp.count(), 1);
        assert_eq!(cp.latest().unwrap().last_human_text(), Some("persisted"));
    }

    #[test]
    fn checkpoint_ids_are_monotonic_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first_id;
        {
            let cp = Checkpointer::open(dir.path()).unwrap();
            first_id = cp.append(&state_with("a")).unwrap();
        }
        let cp = Checkpointer::open(dir.path()).unwrap();
        let second_id = cp.append(&state_with("b")).unwrap();
        assert!(second_id > first_id);
    }

    #[test]
    fn prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let cp = Checkpointer::open(dir.path()).unwrap();
        for i in 0..7 {
            cp.append(&state_with(&format!("turn {i}"))).unwrap();
        }

        let deleted = cp.prune(3).unwrap();
        assert_eq!(deleted, 4);
        assert_eq!(cp.count(), 3);
        assert_eq!(cp.latest().unwrap().last_human_text(), Some("turn 6"));

        // Reopen sees the pruned view.
        drop(cp);
        let cp = Checkpointer::open(dir.path()).unwrap();
        assert_eq!(cp.count(), 3);
        assert_eq!(cp.latest().unwrap().last_human_text(), Some("turn 6"));
    }

    #[test]
    fn prune_under_limit_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cp = Checkpointer::open(dir.path()).unwrap();
        cp.append(&state_with("only")).unwrap();
        assert_eq!(cp.prune(50).unwrap(), 0);
        assert_eq!(cp.count(), 1);
    }

    #[test]
    fn corrupt_tail_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cp = Checkpointer::open(dir.path()).unwrap();
            cp.append(&state_with("good")).unwrap();
        }
        // Simulate a torn write.
        let path = dir.path().join("checkpoints.db");
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"checkpoint_id\":9,\"truncated");
        std::fs::write(&path, raw).unwrap();

        let cp = Checkpointer::open(dir.path()).unwrap();
        assert_eq!(cp.count(), 1);
        assert_eq!(cp.latest().unwrap().last_human_text(), Some("good"));
    }
}
