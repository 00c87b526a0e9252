//! File-per-context store.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/contexts/NC0.json   root context
//! <data_dir>/contexts/NC7.json   one document per context
//! <data_dir>/counter.json        last allocated identifier counter
//! ```
//!
//! Every write goes to a `.tmp` sibling, is synced, then renamed over the
//! target, and the directory is synced after the rename (and after a
//! delete), so a crash leaves either the old or the new document and never a
//! torn one. A process-wide single writer is assumed; the activator
//! serializes writes per context and the counter under its own lock.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::ContextId;
use super::{ContextRecord, ContextStore, StorageError, StorageResult};

const CONTEXTS_DIR: &str = "contexts";
const COUNTER_FILE: &str = "counter.json";

#[derive(Debug, Serialize, Deserialize)]
struct CounterFile {
    last_allocated: u64,
}

/// Durable store writing one JSON document per context.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = data_dir.into();
        fs::create_dir_all(base_path.join(CONTEXTS_DIR))?;
        info!(path = %base_path.display(), "opened file context store");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, id: ContextId) -> PathBuf {
        self.base_path.join(CONTEXTS_DIR).join(format!("{id}.json"))
    }

    fn counter_path(&self) -> PathBuf {
        self.base_path.join(COUNTER_FILE)
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> StorageResult<Option<T>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a JSON file atomically (write to .tmp, sync, then rename).
    fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
        let content = serde_json::to_vec_pretty(value)?;
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        if let Some(dir) = path.parent() {
            Self::sync_dir(dir)?;
        }
        Ok(())
    }

    /// Flush directory entries (renames, unlinks) in `dir` to disk.
    fn sync_dir(dir: &Path) -> StorageResult<()> {
        #[cfg(unix)]
        fs::File::open(dir)?.sync_all()?;
        #[cfg(not(unix))]
        let _ = dir;
        Ok(())
    }
}

impl ContextStore for FileStore {
    fn load(&self, id: ContextId) -> StorageResult<Option<ContextRecord>> {
        let record: Option<ContextRecord> = Self::read_json(&self.record_path(id))?;
        match record {
            Some(r) if r.id != id => Err(StorageError::Corrupt(format!(
                "file for {id} holds record {}",
                r.id
            ))),
            other => Ok(other),
        }
    }

    fn save(&self, record: &ContextRecord) -> StorageResult<()> {
        let path = self.record_path(record.id);
        Self::write_json_atomic(&path, record)?;
        debug!(context = %record.id, bindings = record.bindings.len(), "wrote context record");
        Ok(())
    }

    fn remove(&self, id: ContextId) -> StorageResult<bool> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => {
                Self::sync_dir(&self.base_path.join(CONTEXTS_DIR))?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn context_ids(&self) -> StorageResult<Vec<ContextId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.base_path.join(CONTEXTS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match stem.parse::<ContextId>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!(path = %path.display(), "ignoring unrecognised file in context store"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn load_counter(&self) -> StorageResult<Option<u64>> {
        let counter: Option<CounterFile> = Self::read_json(&self.counter_path())?;
        Ok(counter.map(|c| c.last_allocated))
    }

    fn save_counter(&self, value: u64) -> StorageResult<()> {
        Self::write_json_atomic(&self.counter_path(), &CounterFile { last_allocated: value })
    }

    fn contains(&self, id: ContextId) -> StorageResult<bool> {
        Ok(self.record_path(id).try_exists()?)
    }
}
