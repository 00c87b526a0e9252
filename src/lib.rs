//! # cosnaming-rs: Persistent Hierarchical Naming Service
//!
//! Server-side core of a CosNaming-style directory: clients bind compound
//! names to object references or to child naming contexts, then resolve,
//! rebind, unbind and list them. Contexts are durable and only the recently
//! touched ones are held in memory.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `ContextStore` is the contract between activation and storage
//! 2. **Clean DTOs**: `NameAtom`, `CompoundName`, `Binding` cross all boundaries
//! 3. **Write-through**: a mutation is durable before it is reported successful
//! 4. **One lock at a time**: compound names hop context to context, never holding two table locks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cosnaming_rs::{CompoundName, NameService, ObjectRef};
//!
//! # fn example() -> cosnaming_rs::Result<()> {
//! let service = NameService::open_memory()?;
//! let root = service.root();
//!
//! let users = root.bind_new_context(&CompoundName::of(["users"]))?;
//! let alice = ObjectRef::new("IDL:Account:1.0", "accounts:9000", "alice");
//! users.bind(&CompoundName::of(["alice"]), &alice)?;
//!
//! assert_eq!(root.resolve_str("users/alice")?, alice);
//! # Ok(())
//! # }
//! ```
//!
//! ## Context Stores
//!
//! | Store | Config | Description |
//! |-------|--------|-------------|
//! | Memory | `StoreConfig::Memory` | In-memory for testing/embedding |
//! | File | `StoreConfig::File` | One JSON document per context |

use std::fmt;

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod activator;
pub mod engine;
pub mod iterator;
pub mod adapter;
pub mod syntax;
pub mod service;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    NameAtom, CompoundName, ContextId,
    Binding, BindingKind, BindingEntry, BindingTable, ObjectRef,
};

// ============================================================================
// Re-exports: Storage and activation
// ============================================================================

pub use storage::{
    ContextStore, ContextRecord, StoreConfig, StorageError,
    MemoryStore, FileStore,
};
pub use activator::{Activator, ActivatorConfig};

// ============================================================================
// Re-exports: Engine and service
// ============================================================================

pub use engine::NamingEngine;
pub use iterator::BindingIterator;
pub use adapter::{
    ObjectAdapter, ReferenceCodec, DiscoveryRegistry,
    LocalAdapter, IorCodec, LocalRegistry,
};
pub use service::{NameService, NameServiceConfig, ContextHandle};

// ============================================================================
// Error Types
// ============================================================================

/// Why a name component could not be followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// Nothing is bound at the component.
    MissingNode,
    /// A context was needed but an object is bound there.
    NotContext,
    /// An object was needed but a context is bound there.
    NotObject,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotFoundReason::MissingNode => "missing_node",
            NotFoundReason::NotContext => "not_context",
            NotFoundReason::NotObject => "not_object",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid name")]
    InvalidName,

    #[error("Not found ({reason}): {rest_of_name}")]
    NotFound { reason: NotFoundReason, rest_of_name: CompoundName },

    #[error("Already bound")]
    AlreadyBound,

    #[error("Context not empty")]
    NotEmpty,

    #[error("Cannot proceed at context {context}: {rest_of_name}")]
    CannotProceed { context: ContextId, rest_of_name: CompoundName },

    #[error("Invalid address: '{0}'")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl Error {
    pub fn not_found(reason: NotFoundReason, rest_of_name: CompoundName) -> Self {
        Error::NotFound { reason, rest_of_name }
    }

    /// The `NotFound` reason, if this is a `NotFound`.
    pub fn not_found_reason(&self) -> Option<NotFoundReason> {
        match self {
            Error::NotFound { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
