//! Durable progress snapshots that let an interrupted run resume without
//! paying twice for completed lookups.
//!
//! The whole state is rewritten on each flush: serialized to a sibling
//! temporary file, synced, then renamed over the checkpoint. A crash at any
//! point leaves either the previous snapshot or the new one on disk.

use crate::core::error::{AppError, Result};
use crate::core::kind::EnrichmentKind;
use crate::core::models::{Identity, LookupResult};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_VERSION: u32 = 1;

/// Where the run stood when the snapshot was taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorMetadata {
    pub kind: Option<EnrichmentKind>,
    pub source_id: Option<String>,
    pub total_records: usize,
    pub flush_count: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub version: u32,
    /// Every identity whose lookup finished. Superset of `partial_results` keys.
    pub completed_ids: BTreeSet<Identity>,
    pub partial_results: BTreeMap<Identity, LookupResult>,
    pub cursor: CursorMetadata,
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            completed_ids: BTreeSet::new(),
            partial_results: BTreeMap::new(),
            cursor: CursorMetadata::default(),
        }
    }
}

impl CheckpointState {
    /// Whether this snapshot belongs to a run over the same source and kind.
    pub fn matches(&self, kind: EnrichmentKind, source_id: &str) -> bool {
        self.cursor.kind == Some(kind) && self.cursor.source_id.as_deref() == Some(source_id)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: CheckpointState,
    since_flush: usize,
}

/// Owns the checkpoint state of one pipeline kind. Safe to share across workers.
#[derive(Debug)]
pub struct CheckpointManager {
    path: PathBuf,
    flush_every: usize,
    inner: Mutex<Inner>,
}

impl CheckpointManager {
    pub fn new(path: impl Into<PathBuf>, flush_every: usize) -> Self {
        Self {
            path: path.into(),
            flush_every: flush_every.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// `<dir>/<kind>_checkpoint.json`
    pub fn for_kind(dir: impl AsRef<Path>, kind: EnrichmentKind, flush_every: usize) -> Self {
        Self::new(dir.as_ref().join(kind.checkpoint_file_name()), flush_every)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush_every(&self) -> usize {
        self.flush_every
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Reads an unfinished run's state, if one was left behind.
    pub fn load(&self) -> Result<Option<CheckpointState>> {
        if !self.path.exists() {
            tracing::debug!(target: "checkpoint", "No checkpoint at {}", self.path.display());
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let state: CheckpointState = serde_json::from_str(&content).map_err(|e| {
            AppError::Checkpoint(format!(
                "Checkpoint '{}' is unreadable ({}). Remove it or start fresh.",
                self.path.display(),
                e
            ))
        })?;
        if state.version != CHECKPOINT_VERSION {
            return Err(AppError::Checkpoint(format!(
                "Checkpoint '{}' has version {}, expected {}",
                self.path.display(),
                state.version,
                CHECKPOINT_VERSION
            )));
        }
        tracing::info!(target: "checkpoint",
            "Found checkpoint with {} completed lookups at {}", state.completed_ids.len(), self.path.display());
        Ok(Some(state))
    }

    /// Adopts a loaded state as the starting point of this run.
    pub fn resume(&self, mut state: CheckpointState) {
        for id in state.partial_results.keys() {
            state.completed_ids.insert(id.clone());
        }
        let mut inner = self.inner.lock();
        inner.state = state;
        inner.since_flush = 0;
    }

    /// Stamps the run this checkpoint belongs to. Fails when the checkpoint
    /// location cannot be written, before any lookup has been paid for.
    pub fn begin(&self, kind: EnrichmentKind, source_id: &str, total_records: usize) -> Result<()> {
        self.ensure_writable()?;
        let mut inner = self.inner.lock();
        inner.state.cursor.kind = Some(kind);
        inner.state.cursor.source_id = Some(source_id.to_string());
        inner.state.cursor.total_records = total_records;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        let unwritable = |e: std::io::Error| {
            AppError::Checkpoint(format!(
                "Checkpoint location '{}' is not writable: {}",
                self.path.display(),
                e
            ))
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(unwritable)?;
            }
        }
        let temp = self.temp_path();
        fs::File::create(&temp).map_err(unwritable)?;
        fs::remove_file(&temp).map_err(unwritable)?;
        Ok(())
    }

    /// Records a finished lookup. Returns true when a flush is due.
    pub fn record(&self, identity: Identity, result: LookupResult) -> bool {
        let mut inner = self.inner.lock();
        inner.state.completed_ids.insert(identity.clone());
        inner.state.partial_results.insert(identity, result);
        inner.since_flush += 1;
        inner.since_flush >= self.flush_every
    }

    /// Atomically replaces the checkpoint file with the current state.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.state.cursor.flush_count += 1;
        inner.state.cursor.updated_at = Some(Utc::now());
        let payload = serde_json::to_vec_pretty(&inner.state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        tracing::debug!(target: "checkpoint",
            "Flushed checkpoint #{} ({} completed) to {}",
            inner.state.cursor.flush_count, inner.state.completed_ids.len(), self.path.display());
        inner.since_flush = 0;
        Ok(())
    }

    /// Removes the checkpoint after a fully successful run.
    pub fn delete(&self) -> Result<()> {
        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => tracing::info!(target: "checkpoint", "Removed checkpoint {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn completed_ids(&self) -> HashSet<Identity> {
        self.inner.lock().state.completed_ids.iter().cloned().collect()
    }

    pub fn results(&self) -> BTreeMap<Identity, LookupResult> {
        self.inner.lock().state.partial_results.clone()
    }

    /// Drops failed results so their identities are attempted again.
    pub fn forget_failures(&self) -> usize {
        let mut inner = self.inner.lock();
        let failed: Vec<Identity> = inner
            .state
            .partial_results
            .iter()
            .filter(|(_, r)| r.is_failed())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &failed {
            inner.state.partial_results.remove(id);
            inner.state.completed_ids.remove(id);
        }
        failed.len()
    }
}
