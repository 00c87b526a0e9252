//! In-memory context store.
//!
//! This is the reference implementation of `ContextStore`.
//! It keeps records in a HashMap protected by a RwLock.
//!
//! ## Limitations
//!
//! - **No persistence across processes**: records live as long as the
//!   last clone of the store. Clones share state, so a test can drop a
//!   service, keep a clone, and open a new service over the same records
//!   to simulate a restart.
//!
//! Use this store for:
//! - Testing the engine and activator
//! - Embedding a naming graph that does not need to survive restarts
//! - Fault injection (`fail_writes`) to exercise rollback paths

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::model::ContextId;
use super::{ContextRecord, ContextStore, StorageError, StorageResult};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory record storage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    records: RwLock<HashMap<ContextId, ContextRecord>>,
    counter: Mutex<Option<u64>>,
    fail_writes: AtomicBool,
    saves: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `StorageError::Unavailable`
    /// until switched back off.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful record writes so far.
    pub fn save_count(&self) -> u64 {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

// ============================================================================
// ContextStore impl
// ============================================================================

impl ContextStore for MemoryStore {
    fn load(&self, id: ContextId) -> StorageResult<Option<ContextRecord>> {
        Ok(self.inner.records.read().get(&id).cloned())
    }

    fn save(&self, record: &ContextRecord) -> StorageResult<()> {
        self.check_writable()?;
        self.inner.records.write().insert(record.id, record.clone());
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, id: ContextId) -> StorageResult<bool> {
        self.check_writable()?;
        Ok(self.inner.records.write().remove(&id).is_some())
    }

    fn context_ids(&self) -> StorageResult<Vec<ContextId>> {
        let mut ids: Vec<ContextId> = self.inner.records.read().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    fn load_counter(&self) -> StorageResult<Option<u64>> {
        Ok(*self.inner.counter.lock())
    }

    fn save_counter(&self, value: u64) -> StorageResult<()> {
        self.check_writable()?;
        *self.inner.counter.lock() = Some(value);
        Ok(())
    }

    fn contains(&self, id: ContextId) -> StorageResult<bool> {
        Ok(self.inner.records.read().contains_key(&id))
    }
}

// ============================================================================
// Tests
// ============================================================================
