//! # Naming Graph Model
//!
//! Plain DTOs shared by storage, activation, the engine and the facade.
//! No I/O, no locks, no codec calls live here.

pub mod name;
pub mod context_id;
pub mod binding;
pub mod object_ref;

pub use name::{NameAtom, CompoundName};
pub use context_id::{ContextId, ParseContextIdError, CONTEXT_PREFIX};
pub use binding::{Binding, BindingKind, BindingEntry, BindingTable};
pub use object_ref::ObjectRef;
