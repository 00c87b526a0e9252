//! # Collaborator Contracts
//!
//! The naming core sits behind an object adapter that owns the wire. This
//! module defines what the core needs from it, and ships small local
//! implementations good enough for embedding and tests:
//!
//! | Contract | Local implementation | Role |
//! |----------|----------------------|------|
//! | `ObjectAdapter` | `LocalAdapter` | context id ⇄ reference |
//! | `ReferenceCodec` | `IorCodec` | reference ⇄ string, for storing object bindings |
//! | `DiscoveryRegistry` | `LocalRegistry` | publish the root reference at bootstrap |

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::info;

use crate::model::{ContextId, ObjectRef};
use crate::storage::{StorageError, StorageResult};
use crate::Result;

/// Repository id carried by references to naming contexts.
pub const NAMING_CONTEXT_TYPE_ID: &str = "IDL:omg.org/CosNaming/NamingContextExt:1.0";

/// Prefix of stringified references produced by [`IorCodec`].
pub const IOR_PREFIX: &str = "IOR:";

// ============================================================================
// Contracts
// ============================================================================

/// Maps context identifiers to transport handles and back.
///
/// A reference created here routes inbound calls to the context it names;
/// the adapter activates that context on demand for each request and does
/// not keep it resident between calls.
pub trait ObjectAdapter: Send + Sync {
    fn create_reference(&self, id: ContextId) -> ObjectRef;

    /// `None` when `reference` is not a context served by this adapter.
    fn reference_to_identifier(&self, reference: &ObjectRef) -> Option<ContextId>;
}

/// Stringifies references so object bindings can be stored as text.
pub trait ReferenceCodec: Send + Sync {
    fn encode(&self, reference: &ObjectRef) -> StorageResult<String>;
    fn decode(&self, encoded: &str) -> StorageResult<ObjectRef>;
}

/// Well-known place where the root context is made discoverable.
pub trait DiscoveryRegistry: Send + Sync {
    fn publish(&self, name: &str, reference: ObjectRef) -> Result<()>;
}

// ============================================================================
// LocalAdapter
// ============================================================================

/// Adapter for contexts served from one endpoint.
#[derive(Debug, Clone)]
pub struct LocalAdapter {
    endpoint: String,
}

impl LocalAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into() }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ObjectAdapter for LocalAdapter {
    fn create_reference(&self, id: ContextId) -> ObjectRef {
        ObjectRef::new(NAMING_CONTEXT_TYPE_ID, self.endpoint.clone(), id.to_string())
    }

    fn reference_to_identifier(&self, reference: &ObjectRef) -> Option<ContextId> {
        if reference.type_id != NAMING_CONTEXT_TYPE_ID || reference.endpoint != self.endpoint {
            return None;
        }
        reference.object_key.parse().ok()
    }
}

// ============================================================================
// IorCodec
// ============================================================================

/// `IOR:` followed by the hex of the reference's JSON form.
#[derive(Debug, Clone, Copy, Default)]
pub struct IorCodec;

impl ReferenceCodec for IorCodec {
    fn encode(&self, reference: &ObjectRef) -> StorageResult<String> {
        let bytes = serde_json::to_vec(reference)?;
        Ok(format!("{IOR_PREFIX}{}", hex::encode(bytes)))
    }

    fn decode(&self, encoded: &str) -> StorageResult<ObjectRef> {
        let body = encoded
            .strip_prefix(IOR_PREFIX)
            .ok_or_else(|| StorageError::Codec(format!("missing {IOR_PREFIX} prefix")))?;
        let bytes = hex::decode(body).map_err(|e| StorageError::Codec(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Codec(e.to_string()))
    }
}

// ============================================================================
// LocalRegistry
// ============================================================================

/// In-process discovery registry (the `resolve_initial_references` table).
#[derive(Debug, Default)]
pub struct LocalRegistry {
    entries: RwLock<HashMap<String, ObjectRef>>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<ObjectRef> {
        self.entries.read().get(name).cloned()
    }
}

impl DiscoveryRegistry for LocalRegistry {
    fn publish(&self, name: &str, reference: ObjectRef) -> Result<()> {
        info!(name, reference = %reference, "published initial reference");
        self.entries.write().insert(name.to_string(), reference);
        Ok(())
    }
}
