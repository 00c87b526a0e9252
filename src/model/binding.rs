//! Typed bindings stored in a context's table.

use std::fmt;
use std::sync::OnceLock;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{ContextId, NameAtom, ObjectRef};

/// The binding table of one naming context.
pub type BindingTable = HashMap<NameAtom, Binding>;

/// What a name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingKind {
    /// Opaque object reference, stored in its stringified form.
    #[serde(rename = "nobject")]
    Object,
    /// Child naming context, stored as its identifier.
    #[serde(rename = "ncontext")]
    Context,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Object => f.write_str("nobject"),
            BindingKind::Context => f.write_str("ncontext"),
        }
    }
}

/// A binding value.
///
/// `value` is the codec string of an object reference, or the `NC<n>`
/// identifier of a child context. The decoded object reference is cached
/// lazily for the lifetime of the in-memory table and never persisted.
#[derive(Clone)]
pub struct Binding {
    kind: BindingKind,
    value: String,
    decoded: OnceLock<ObjectRef>,
}

impl Binding {
    /// Object binding from an already-encoded reference string.
    pub fn object(encoded: impl Into<String>) -> Self {
        Self { kind: BindingKind::Object, value: encoded.into(), decoded: OnceLock::new() }
    }

    /// Object binding that starts out with its decoded form cached.
    pub fn object_with_ref(encoded: impl Into<String>, reference: ObjectRef) -> Self {
        let binding = Self::object(encoded);
        let _ = binding.decoded.set(reference);
        binding
    }

    pub fn context(id: ContextId) -> Self {
        Self { kind: BindingKind::Context, value: id.to_string(), decoded: OnceLock::new() }
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_context(&self) -> bool {
        self.kind == BindingKind::Context
    }

    /// Child identifier of a context binding. `None` for object bindings
    /// and for context values that do not parse (corrupt storage).
    pub fn context_id(&self) -> Option<ContextId> {
        match self.kind {
            BindingKind::Context => self.value.parse().ok(),
            BindingKind::Object => None,
        }
    }

    pub fn cached_ref(&self) -> Option<&ObjectRef> {
        self.decoded.get()
    }

    /// Remember the decoded reference. First writer wins.
    pub fn cache_ref(&self, reference: ObjectRef) {
        let _ = self.decoded.set(reference);
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.value == other.value
    }
}

impl Eq for Binding {}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("cached", &self.decoded.get().is_some())
            .finish()
    }
}

/// One row of a `list` result: the atom and what it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingEntry {
    pub atom: NameAtom,
    pub binding: Binding,
}

impl BindingEntry {
    pub fn new(atom: NameAtom, binding: Binding) -> Self {
        Self { atom, binding }
    }

    pub fn kind(&self) -> BindingKind {
        self.binding.kind()
    }
}
