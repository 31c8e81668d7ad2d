//! Checkpointer (C7): pluggable per-`(thread_id, checkpoint_id)` state
//! persistence. Writes are atomic per state transition; reading a thread
//! returns its latest checkpoint.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ra_domain::error::{Error, Result};
use ra_domain::run_state::RunState;

/// One persisted checkpoint row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub written_at: DateTime<Utc>,
    pub state: RunState,
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist `state` under `(thread_id, checkpoint_id)`. Overwrites any
    /// existing row with the same key.
    async fn save(&self, thread_id: &str, checkpoint_id: &str, state: &RunState) -> Result<()>;

    /// Return the most recently written checkpoint for a thread, if any.
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Return a specific checkpoint by id.
    async fn load(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>>;
}

fn row_key(thread_id: &str, checkpoint_id: &str) -> String {
    format!("{thread_id}:{checkpoint_id}")
}

/// In-memory checkpointer. No persistence across process restarts; used
/// for tests and for runs that opt out of durable checkpointing.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    rows: RwLock<HashMap<String, Checkpoint>>,
    /// thread_id → ordered list of checkpoint_ids, oldest first.
    order: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, thread_id: &str, checkpoint_id: &str, state: &RunState) -> Result<()> {
        let key = row_key(thread_id, checkpoint_id);
        let is_new = !self.rows.read().contains_key(&key);
        self.rows.write().insert(
            key,
            Checkpoint {
                thread_id: thread_id.to_owned(),
                checkpoint_id: checkpoint_id.to_owned(),
                written_at: Utc::now(),
                state: state.clone(),
            },
        );
        if is_new {
            self.order
                .write()
                .entry(thread_id.to_owned())
                .or_default()
                .push(checkpoint_id.to_owned());
        }
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let order = self.order.read();
        let Some(ids) = order.get(thread_id) else {
            return Ok(None);
        };
        let Some(last) = ids.last() else {
            return Ok(None);
        };
        Ok(self.rows.read().get(&row_key(thread_id, last)).cloned())
    }

    async fn load(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.rows.read().get(&row_key(thread_id, checkpoint_id)).cloned())
    }
}

/// JSON-file-backed checkpointer: one row per `(thread_id, checkpoint_id)`,
/// the durable side of C7's contract. Adequate for single-process
/// deployments; a SQL-backed implementation would satisfy the same trait
/// without changing engine code.
pub struct FileCheckpointer {
    path: PathBuf,
    rows: RwLock<HashMap<String, Checkpoint>>,
    order: RwLock<HashMap<String, Vec<String>>>,
}

impl FileCheckpointer {
    /// Load or create the checkpoint store at `state_path/checkpoints.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("checkpoints.json");
        let rows: HashMap<String, Checkpoint> = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        let mut order: HashMap<String, Vec<String>> = HashMap::new();
        let mut by_thread: Vec<_> = rows.values().collect();
        by_thread.sort_by_key(|c| c.written_at);
        for checkpoint in by_thread {
            order
                .entry(checkpoint.thread_id.clone())
                .or_default()
                .push(checkpoint.checkpoint_id.clone());
        }

        tracing::info!(checkpoints = rows.len(), path = %path.display(), "checkpoint store loaded");

        Ok(Self {
            path,
            rows: RwLock::new(rows),
            order: RwLock::new(order),
        })
    }

    fn flush(&self) -> Result<()> {
        let rows = self.rows.read();
        let json = serde_json::to_string_pretty(&*rows)
            .map_err(|e| Error::Other(format!("serializing checkpoints: {e}")))?;
        std::fs::write(&self.path, json).map_err(Error::Io)?;
        Ok(())
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(&self, thread_id: &str, checkpoint_id: &str, state: &RunState) -> Result<()> {
        let key = row_key(thread_id, checkpoint_id);
        let is_new = !self.rows.read().contains_key(&key);
        self.rows.write().insert(
            key,
            Checkpoint {
                thread_id: thread_id.to_owned(),
                checkpoint_id: checkpoint_id.to_owned(),
                written_at: Utc::now(),
                state: state.clone(),
            },
        );
        if is_new {
            self.order
                .write()
                .entry(thread_id.to_owned())
                .or_default()
                .push(checkpoint_id.to_owned());
        }
        self.flush()
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let order = self.order.read();
        let Some(ids) = order.get(thread_id) else {
            return Ok(None);
        };
        let Some(last) = ids.last() else {
            return Ok(None);
        };
        Ok(self.rows.read().get(&row_key(thread_id, last)).cloned())
    }

    async fn load(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.rows.read().get(&row_key(thread_id, checkpoint_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RunState {
        RunState::new("run-1".into(), "thread-1".into(), "hello".into())
    }

    #[tokio::test]
    async fn in_memory_round_trips_latest() {
        let cp = InMemoryCheckpointer::new();
        cp.save("thread-1", "a", &state()).await.unwrap();
        let mut s2 = state();
        s2.draft_report = "draft".into();
        cp.save("thread-1", "b", &s2).await.unwrap();

        let latest = cp.load_latest("thread-1").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, "b");
        assert_eq!(latest.state.draft_report, "draft");
    }

    #[tokio::test]
    async fn in_memory_missing_thread_is_none() {
        let cp = InMemoryCheckpointer::new();
        assert!(cp.load_latest("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_checkpointer_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cp = FileCheckpointer::new(dir.path()).unwrap();
            cp.save("thread-1", "a", &state()).await.unwrap();
        }
        let cp2 = FileCheckpointer::new(dir.path()).unwrap();
        let latest = cp2.load_latest("thread-1").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, "a");
    }
}
