//! # Context Store Trait
//!
//! This is the contract between the activator and durable storage. Only the
//! activator talks to a store; everything else reaches contexts through it.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | Process-local, for testing/embedding |
//! | `FileStore` | `file` | One JSON file per context under a data directory |
//!
//! ## Record layout
//!
//! Each context is one [`ContextRecord`]: its identifier, the time of the
//! last write, and the full binding table as `(id, kind, binding_type, value)`
//! rows. Object values are codec strings; context values are `NC<n>`
//! identifiers. Loading a record reproduces the table exactly.

pub mod memory;
pub mod file;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::*;

pub use memory::MemoryStore;
pub use file::FileStore;

// ============================================================================
// Errors
// ============================================================================

/// Durable storage or reference codec failure (StorageFailure).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("No durable record for context {0}")]
    MissingRecord(ContextId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Reference codec error: {0}")]
    Codec(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ============================================================================
// Store Configuration
// ============================================================================

/// Which durable store backs the naming graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory (lost on exit)
    #[default]
    Memory,

    /// One JSON document per context
    File { data_dir: PathBuf },
}

impl StoreConfig {
    /// Open the configured store.
    pub fn open(&self) -> StorageResult<Box<dyn ContextStore>> {
        match self {
            StoreConfig::Memory => Ok(Box::new(MemoryStore::new())),
            StoreConfig::File { data_dir } => Ok(Box::new(FileStore::open(data_dir)?)),
        }
    }
}

// ============================================================================
// Persisted layout
// ============================================================================

/// One persisted table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedBinding {
    pub id: String,
    pub kind: String,
    pub binding_type: BindingKind,
    pub value: String,
}

/// The durable form of one naming context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: ContextId,
    pub updated_at: DateTime<Utc>,
    pub bindings: Vec<PersistedBinding>,
}

impl ContextRecord {
    /// Empty record, as written for a freshly allocated context.
    pub fn empty(id: ContextId) -> Self {
        Self { id, updated_at: Utc::now(), bindings: Vec::new() }
    }

    /// Snapshot a live table. Rows are sorted so identical tables produce
    /// identical documents.
    pub fn from_table(id: ContextId, table: &BindingTable) -> Self {
        let mut bindings: Vec<PersistedBinding> = table
            .iter()
            .map(|(atom, binding)| PersistedBinding {
                id: atom.id.clone(),
                kind: atom.kind.clone(),
                binding_type: binding.kind(),
                value: binding.value().to_string(),
            })
            .collect();
        bindings.sort_by(|a, b| (&a.id, &a.kind).cmp(&(&b.id, &b.kind)));
        Self { id, updated_at: Utc::now(), bindings }
    }

    /// Rebuild the in-memory table, rejecting rows no engine could have written.
    pub fn into_table(self) -> StorageResult<BindingTable> {
        let mut table = BindingTable::with_capacity(self.bindings.len());
        for row in self.bindings {
            let atom = NameAtom::new(row.id, row.kind);
            if atom.is_empty() {
                return Err(StorageError::Corrupt(format!("context {} has an empty name atom", self.id)));
            }
            let binding = match row.binding_type {
                BindingKind::Object => Binding::object(row.value),
                BindingKind::Context => {
                    let child: ContextId = row.value.parse().map_err(|e| {
                        StorageError::Corrupt(format!("context {}: binding '{atom}': {e}", self.id))
                    })?;
                    Binding::context(child)
                }
            };
            if table.insert(atom.clone(), binding).is_some() {
                return Err(StorageError::Corrupt(format!(
                    "context {} binds '{atom}' more than once",
                    self.id
                )));
            }
        }
        Ok(table)
    }
}

// ============================================================================
// ContextStore Trait
// ============================================================================

/// Durable storage for context records and the identifier counter.
///
/// Calls block until the write is durable (or has failed). Implementations
/// must be safe to share between request threads.
pub trait ContextStore: Send + Sync + 'static {
    /// Read a context record. `Ok(None)` when no record exists.
    fn load(&self, id: ContextId) -> StorageResult<Option<ContextRecord>>;

    /// Write (create or replace) a context record.
    fn save(&self, record: &ContextRecord) -> StorageResult<()>;

    /// Delete a context record. Returns true if it existed.
    fn remove(&self, id: ContextId) -> StorageResult<bool>;

    /// Identifiers of every stored context.
    fn context_ids(&self) -> StorageResult<Vec<ContextId>>;

    /// Last persisted identifier counter, if any.
    fn load_counter(&self) -> StorageResult<Option<u64>>;

    /// Persist the identifier counter.
    fn save_counter(&self, value: u64) -> StorageResult<()>;

    /// Does a record exist for `id`?
    ///
    /// Default: load and discard.
    fn contains(&self, id: ContextId) -> StorageResult<bool> {
        Ok(self.load(id)?.is_some())
    }
}

impl<S: ContextStore + ?Sized> ContextStore for Box<S> {
    fn load(&self, id: ContextId) -> StorageResult<Option<ContextRecord>> {
        (**self).load(id)
    }

    fn save(&self, record: &ContextRecord) -> StorageResult<()> {
        (**self).save(record)
    }

    fn remove(&self, id: ContextId) -> StorageResult<bool> {
        (**self).remove(id)
    }

    fn context_ids(&self) -> StorageResult<Vec<ContextId>> {
        (**self).context_ids()
    }

    fn load_counter(&self) -> StorageResult<Option<u64>> {
        (**self).load_counter()
    }

    fn save_counter(&self, value: u64) -> StorageResult<()> {
        (**self).save_counter(value)
    }

    fn contains(&self, id: ContextId) -> StorageResult<bool> {
        (**self).contains(id)
    }
}
