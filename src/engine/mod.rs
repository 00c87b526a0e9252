//! Naming graph engine.
//!
//! Bind, resolve, unbind and list over compound names that may cross many
//! contexts. Every hop goes through the activator, and at most one context
//! lock is held at a time: the parent's lock is released before the child
//! is materialized and locked. Operations on different branches therefore
//! overlap freely, while operations on the same context serialize.
//!
//! Traversal consumes one atom per hop, so even a graph with cycles (a
//! context bound somewhere below itself) cannot make a call loop.
//!
//! Mutations are persisted before they are reported successful. If the
//! write fails the in-memory table is put back as it was.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::activator::{Activator, NamingContext};
use crate::adapter::ReferenceCodec;
use crate::iterator::BindingIterator;
use crate::model::*;
use crate::storage::{ContextStore, StorageError};
use crate::{Error, NotFoundReason, Result};

/// Runs naming operations against contexts reached through an [`Activator`].
pub struct NamingEngine<S: ContextStore> {
    activator: Arc<Activator<S>>,
    codec: Arc<dyn ReferenceCodec>,
}

impl<S: ContextStore> NamingEngine<S> {
    pub fn new(activator: Arc<Activator<S>>, codec: Arc<dyn ReferenceCodec>) -> Self {
        Self { activator, codec }
    }

    pub fn activator(&self) -> &Arc<Activator<S>> {
        &self.activator
    }

    pub fn codec(&self) -> &dyn ReferenceCodec {
        self.codec.as_ref()
    }

    // ========================================================================
    // Bind
    // ========================================================================

    /// Bind `name` (relative to `target`) to `value`.
    ///
    /// With `rebind` an existing binding of the same kind is replaced; a
    /// binding of the other kind is refused with `NotFound` (`not_context`
    /// when an object is in the way of a context, `not_object` the other
    /// way round). Without `rebind` any existing binding is `AlreadyBound`.
    pub fn bind(&self, target: ContextId, name: &CompoundName, value: Binding, rebind: bool) -> Result<()> {
        name.validate()?;
        let child = match value.context_id() {
            Some(child) => Some(self.activator.materialize(child).map_err(|e| match e {
                StorageError::MissingRecord(_) => Error::CannotProceed {
                    context: target,
                    rest_of_name: name.clone(),
                },
                other => other.into(),
            })?),
            None => None,
        };

        let (ctx, last) = self.walk_to_parent(target, name)?;
        self.bind_atom(&ctx, last, value, rebind, child.as_deref())
    }

    /// `child` is the context a context binding points at. It is checked
    /// again under the parent lock: a destroy that got there first makes
    /// the bind fail, one that comes later sees the binding as any other
    /// binding left pointing at a destroyed context.
    fn bind_atom(
        &self,
        ctx: &NamingContext,
        atom: &NameAtom,
        value: Binding,
        rebind: bool,
        child: Option<&NamingContext>,
    ) -> Result<()> {
        let mut state = ctx.lock_live()?;

        if let Some(existing) = state.table.get(atom) {
            if !rebind {
                return Err(Error::AlreadyBound);
            }
            match (existing.kind(), value.kind()) {
                (BindingKind::Object, BindingKind::Context) => {
                    return Err(Error::not_found(NotFoundReason::NotContext, atom.clone().into()));
                }
                (BindingKind::Context, BindingKind::Object) => {
                    return Err(Error::not_found(NotFoundReason::NotObject, atom.clone().into()));
                }
                _ => {}
            }
        }

        if child.is_some_and(NamingContext::is_destroyed) {
            return Err(Error::CannotProceed { context: ctx.id(), rest_of_name: atom.clone().into() });
        }

        let kind = value.kind();
        let previous = state.table.insert(atom.clone(), value);
        if let Err(e) = self.activator.persist(ctx.id(), &state.table) {
            match previous {
                Some(old) => state.table.insert(atom.clone(), old),
                None => state.table.remove(atom),
            };
            warn!(context = %ctx.id(), atom = %atom, error = %e, "bind not persisted, rolled back");
            return Err(e.into());
        }

        debug!(context = %ctx.id(), atom = %atom, %kind, rebind, "bound");
        Ok(())
    }

    // ========================================================================
    // Resolve
    // ========================================================================

    /// Resolve `name` relative to `target`.
    ///
    /// The one-atom name whose atom is empty denotes `target` itself.
    /// Object bindings come back with their decoded reference cached; a
    /// value the codec cannot decode is a storage failure.
    pub fn resolve(&self, target: ContextId, name: &CompoundName) -> Result<Binding> {
        if name.is_self_reference() {
            let ctx = self.activator.materialize(target)?;
            drop(ctx.lock_live()?);
            return Ok(Binding::context(target));
        }
        name.validate()?;

        let (ctx, last) = self.walk_to_parent(target, name)?;
        let state = ctx.lock_live()?;
        let binding = state
            .table
            .get(last)
            .ok_or_else(|| Error::not_found(NotFoundReason::MissingNode, last.clone().into()))?;

        if binding.kind() == BindingKind::Object {
            self.decode(binding)?;
        }
        Ok(binding.clone())
    }

    /// Resolve to a reference: the decoded object, or the adapter
    /// reference of a context.
    pub fn resolve_ref(&self, target: ContextId, name: &CompoundName) -> Result<ObjectRef> {
        let binding = self.resolve(target, name)?;
        self.reference_of(&binding)
    }

    /// The reference a binding stands for.
    pub fn reference_of(&self, binding: &Binding) -> Result<ObjectRef> {
        match binding.kind() {
            BindingKind::Object => Ok(self.decode(binding)?),
            BindingKind::Context => {
                let id = child_id(binding)?;
                Ok(self.activator.reference_for(id))
            }
        }
    }

    /// Encode `reference` into an object binding with the decoded form
    /// already cached.
    pub fn object_binding(&self, reference: &ObjectRef) -> Result<Binding> {
        let encoded = self.codec.encode(reference)?;
        Ok(Binding::object_with_ref(encoded, reference.clone()))
    }

    fn decode(&self, binding: &Binding) -> std::result::Result<ObjectRef, StorageError> {
        if let Some(cached) = binding.cached_ref() {
            return Ok(cached.clone());
        }
        let decoded = self.codec.decode(binding.value())?;
        binding.cache_ref(decoded.clone());
        Ok(decoded)
    }

    // ========================================================================
    // Unbind
    // ========================================================================

    /// Remove the binding for `name`. A removed context binding does not
    /// destroy the child context.
    pub fn unbind(&self, target: ContextId, name: &CompoundName) -> Result<()> {
        name.validate()?;
        let (ctx, last) = self.walk_to_parent(target, name)?;

        let mut state = ctx.lock_live()?;
        let removed = state
            .table
            .remove(last)
            .ok_or_else(|| Error::not_found(NotFoundReason::MissingNode, last.clone().into()))?;

        if let Err(e) = self.activator.persist(ctx.id(), &state.table) {
            state.table.insert(last.clone(), removed);
            warn!(context = %ctx.id(), atom = %last, error = %e, "unbind not persisted, rolled back");
            return Err(e.into());
        }

        debug!(context = %ctx.id(), atom = %last, "unbound");
        Ok(())
    }

    // ========================================================================
    // List
    // ========================================================================

    /// Up to `how_many` bindings of `target`, plus a cursor over the rest
    /// when there are more.
    ///
    /// Both come from one snapshot taken under the context lock; later
    /// changes to the context do not show through the cursor.
    pub fn list(&self, target: ContextId, how_many: usize) -> Result<(Vec<BindingEntry>, Option<BindingIterator>)> {
        let ctx = self.activator.materialize(target)?;
        let mut snapshot: Vec<BindingEntry> = {
            let state = ctx.lock_live()?;
            state
                .table
                .iter()
                .map(|(atom, binding)| BindingEntry::new(atom.clone(), binding.clone()))
                .collect()
        };
        snapshot.sort_by(|a, b| a.atom.cmp(&b.atom));

        let rest = snapshot.split_off(how_many.min(snapshot.len()));
        let cursor = (!rest.is_empty()).then(|| BindingIterator::new(rest));
        debug!(context = %target, returned = snapshot.len(), deferred = cursor.as_ref().map_or(0, |c| c.remaining()), "listed");
        Ok((snapshot, cursor))
    }

    // ========================================================================
    // Context lifecycle
    // ========================================================================

    /// Create an unbound context. Its empty table is persisted immediately,
    /// so it survives a restart even if it is never bound anywhere.
    pub fn new_context(&self) -> Result<ContextId> {
        let ctx = self.activator.create()?;
        debug!(context = %ctx.id(), "new context");
        Ok(ctx.id())
    }

    /// Create a context and bind it at `name`.
    ///
    /// Not transactional: if the bind fails the new context is destroyed
    /// again on a best-effort basis and the bind error is returned.
    pub fn bind_new_context(&self, target: ContextId, name: &CompoundName) -> Result<ContextId> {
        name.validate()?;
        let id = self.new_context()?;
        if let Err(e) = self.bind(target, name, Binding::context(id), false) {
            if let Err(cleanup) = self.destroy(id) {
                warn!(context = %id, error = %cleanup, "could not clean up context after failed bind_new_context");
            }
            return Err(e);
        }
        Ok(id)
    }

    /// Destroy `target`. Fails `NotEmpty` while it still has bindings.
    ///
    /// The durable record is deleted. Bindings elsewhere that point at the
    /// context are not touched.
    pub fn destroy(&self, target: ContextId) -> Result<()> {
        let ctx = self.activator.materialize(target)?;
        let mut state = ctx.lock_live()?;
        if !state.table.is_empty() {
            return Err(Error::NotEmpty);
        }
        self.activator.destroy(&ctx, &mut state)?;
        Ok(())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Follow every atom but the last, returning the context that holds the
    /// final atom.
    ///
    /// Only bindings typed as contexts are traversed. The error carries the
    /// unresolved suffix starting at the atom that stopped the walk.
    fn walk_to_parent<'n>(
        &self,
        target: ContextId,
        name: &'n CompoundName,
    ) -> Result<(Arc<NamingContext>, &'n NameAtom)> {
        let atoms = name.atoms();
        let (last, path) = atoms.split_last().ok_or(Error::InvalidName)?;

        let mut ctx = self.activator.materialize(target)?;
        for (i, atom) in path.iter().enumerate() {
            let child = {
                let state = ctx.lock_live()?;
                let binding = state
                    .table
                    .get(atom)
                    .ok_or_else(|| Error::not_found(NotFoundReason::MissingNode, name.rest_from(i)))?;
                if binding.kind() != BindingKind::Context {
                    return Err(Error::not_found(NotFoundReason::NotContext, name.rest_from(i)));
                }
                child_id(binding)?
            };

            ctx = match self.activator.materialize(child) {
                Ok(next) => next,
                Err(StorageError::MissingRecord(_)) => {
                    warn!(context = %ctx.id(), child = %child, "context binding points at a missing context");
                    return Err(Error::CannotProceed {
                        context: ctx.id(),
                        rest_of_name: name.rest_from(i),
                    });
                }
                Err(e) => return Err(e.into()),
            };
        }
        Ok((ctx, last))
    }
}

fn child_id(binding: &Binding) -> Result<ContextId> {
    binding.context_id().ok_or_else(|| {
        Error::Storage(StorageError::Corrupt(format!(
            "context binding holds malformed identifier '{}'",
            binding.value()
        )))
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{IorCodec, LocalAdapter};
    use crate::activator::ActivatorConfig;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn engine_over(store: MemoryStore) -> NamingEngine<MemoryStore> {
        let adapter = Arc::new(LocalAdapter::new("localhost:2809"));
        let activator = Activator::open(store, adapter, &ActivatorConfig::default()).unwrap();
        activator.ensure_root().unwrap();
        NamingEngine::new(Arc::new(activator), Arc::new(IorCodec))
    }

    fn engine() -> NamingEngine<MemoryStore> {
        engine_over(MemoryStore::new())
    }

    fn obj(key: &str) -> ObjectRef {
        ObjectRef::new("IDL:Test:1.0", "localhost:9000", key)
    }

    const ROOT: ContextId = ContextId::ROOT;

    #[test]
    fn test_bind_resolve_single() {
        let e = engine();
        let name = CompoundName::of(["a"]);
        e.bind(ROOT, &name, e.object_binding(&obj("1")).unwrap(), false).unwrap();
        assert_eq!(e.resolve_ref(ROOT, &name).unwrap(), obj("1"));
    }

    #[test]
    fn test_resolve_populates_decode_cache() {
        let store = MemoryStore::new();
        let encoded = IorCodec.encode(&obj("1")).unwrap();
        {
            let e = engine_over(store.clone());
            e.bind(ROOT, &CompoundName::of(["a"]), Binding::object(encoded), false).unwrap();
        }
        let e = engine_over(store);
        let binding = e.resolve(ROOT, &CompoundName::of(["a"])).unwrap();
        assert_eq!(binding.cached_ref(), Some(&obj("1")));
    }

    #[test]
    fn test_bind_to_context_destroyed_after_check_fails() {
        let e = engine();
        let child = e.new_context().unwrap();
        // Held from before the destroy, as a concurrent bind would be.
        let child_ctx = e.activator().materialize(child).unwrap();
        e.destroy(child).unwrap();

        let root = e.activator().materialize(ROOT).unwrap();
        let atom = NameAtom::id("late");
        let err = e
            .bind_atom(&root, &atom, Binding::context(child), false, Some(&*child_ctx))
            .unwrap_err();
        assert!(matches!(err, Error::CannotProceed { context: ROOT, .. }));
        assert!(root.lock().table.get(&atom).is_none());
    }

    #[test]
    fn test_cycle_traversal_is_bounded_by_name() {
        let e = engine();
        e.bind(ROOT, &CompoundName::of(["self"]), Binding::context(ROOT), false).unwrap();
        e.bind(ROOT, &CompoundName::of(["x"]), e.object_binding(&obj("x")).unwrap(), false).unwrap();

        let got = e.resolve_ref(ROOT, &CompoundName::of(["self", "self", "x"])).unwrap();
        assert_eq!(got, obj("x"));

        let err = e.resolve(ROOT, &CompoundName::of(["self", "self", "self", "missing"])).unwrap_err();
        assert_eq!(err.not_found_reason(), Some(NotFoundReason::MissingNode));
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let e = engine();
        let empty = CompoundName::new();
        assert!(matches!(e.resolve(ROOT, &empty), Err(Error::InvalidName)));
        assert!(matches!(e.unbind(ROOT, &empty), Err(Error::InvalidName)));
        assert!(matches!(
            e.bind(ROOT, &empty, Binding::object("IOR:00"), false),
            Err(Error::InvalidName)
        ));
    }

    #[test]
    fn test_empty_atom_bind_is_invalid() {
        let e = engine();
        let name = CompoundName::from(NameAtom::empty());
        assert!(matches!(e.bind(ROOT, &name, Binding::object("IOR:00"), false), Err(Error::InvalidName)));
    }

    #[test]
    fn test_self_reference() {
        let e = engine();
        let id = e.new_context().unwrap();
        let b = e.resolve(id, &CompoundName::from(NameAtom::empty())).unwrap();
        assert_eq!(b, Binding::context(id));
    }

    #[test]
    fn test_empty_first_atom_of_path_is_invalid() {
        let e = engine();
        let name: CompoundName = vec![NameAtom::empty(), NameAtom::id("x")].into();
        assert!(matches!(e.resolve(ROOT, &name), Err(Error::InvalidName)));
    }

    #[test]
    fn test_already_bound_leaves_table() {
        let e = engine();
        let name = CompoundName::of(["a"]);
        e.bind(ROOT, &name, e.object_binding(&obj("1")).unwrap(), false).unwrap();
        let err = e.bind(ROOT, &name, e.object_binding(&obj("2")).unwrap(), false);
        assert!(matches!(err, Err(Error::AlreadyBound)));
        assert_eq!(e.resolve_ref(ROOT, &name).unwrap(), obj("1"));
    }

    #[test]
    fn test_rebind_across_kinds() {
        let e = engine();
        let a = CompoundName::of(["a"]);
        let c = CompoundName::of(["c"]);
        e.bind(ROOT, &a, e.object_binding(&obj("1")).unwrap(), false).unwrap();
        let child = e.bind_new_context(ROOT, &c).unwrap();

        let err = e.bind(ROOT, &a, Binding::context(child), true).unwrap_err();
        assert!(matches!(err, Error::NotFound { reason: NotFoundReason::NotContext, .. }));

        let err = e.bind(ROOT, &c, e.object_binding(&obj("2")).unwrap(), true).unwrap_err();
        assert!(matches!(err, Error::NotFound { reason: NotFoundReason::NotObject, .. }));

        assert_eq!(e.resolve_ref(ROOT, &a).unwrap(), obj("1"));
        assert_eq!(e.resolve(ROOT, &c).unwrap(), Binding::context(child));
    }

    #[test]
    fn test_compound_traversal_errors() {
        let e = engine();
        e.bind(ROOT, &CompoundName::of(["leaf"]), e.object_binding(&obj("1")).unwrap(), false).unwrap();

        match e.resolve(ROOT, &CompoundName::of(["nope", "x"])).unwrap_err() {
            Error::NotFound { reason, rest_of_name } => {
                assert_eq!(reason, NotFoundReason::MissingNode);
                assert_eq!(rest_of_name, CompoundName::of(["nope", "x"]));
            }
            other => panic!("unexpected {other:?}"),
        }

        match e.resolve(ROOT, &CompoundName::of(["leaf", "x"])).unwrap_err() {
            Error::NotFound { reason, rest_of_name } => {
                assert_eq!(reason, NotFoundReason::NotContext);
                assert_eq!(rest_of_name, CompoundName::of(["leaf", "x"]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_last_atom_rest_of_name() {
        let e = engine();
        e.bind_new_context(ROOT, &CompoundName::of(["dir"])).unwrap();
        match e.resolve(ROOT, &CompoundName::of(["dir", "gone"])).unwrap_err() {
            Error::NotFound { reason, rest_of_name } => {
                assert_eq!(reason, NotFoundReason::MissingNode);
                assert_eq!(rest_of_name, CompoundName::of(["gone"]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_persist_failure_rolls_back_bind() {
        let store = MemoryStore::new();
        let e = engine_over(store.clone());
        let name = CompoundName::of(["a"]);

        store.fail_writes(true);
        let err = e.bind(ROOT, &name, e.object_binding(&obj("1")).unwrap(), false);
        assert!(matches!(err, Err(Error::Storage(_))));
        store.fail_writes(false);

        assert!(matches!(
            e.resolve(ROOT, &name),
            Err(Error::NotFound { reason: NotFoundReason::MissingNode, .. })
        ));
    }

    #[test]
    fn test_persist_failure_rolls_back_rebind_and_unbind() {
        let store = MemoryStore::new();
        let e = engine_over(store.clone());
        let name = CompoundName::of(["a"]);
        e.bind(ROOT, &name, e.object_binding(&obj("1")).unwrap(), false).unwrap();

        store.fail_writes(true);
        assert!(e.bind(ROOT, &name, e.object_binding(&obj("2")).unwrap(), true).is_err());
        assert!(e.unbind(ROOT, &name).is_err());
        store.fail_writes(false);

        assert_eq!(e.resolve_ref(ROOT, &name).unwrap(), obj("1"));
    }

    #[test]
    fn test_bind_context_to_missing_context() {
        let e = engine();
        let err = e.bind(ROOT, &CompoundName::of(["x"]), Binding::context(ContextId(77)), false);
        assert!(matches!(err, Err(Error::CannotProceed { context: ROOT, .. })));
    }

    #[test]
    fn test_dangling_context_binding_cannot_proceed() {
        let store = MemoryStore::new();
        let e = engine_over(store.clone());
        let child = e.bind_new_context(ROOT, &CompoundName::of(["dir"])).unwrap();

        // Simulate external damage: the child's record disappears.
        e.activator().evict_all();
        store.remove(child).unwrap();

        let err = e.resolve(ROOT, &CompoundName::of(["dir", "x"])).unwrap_err();
        match err {
            Error::CannotProceed { context, rest_of_name } => {
                assert_eq!(context, ROOT);
                assert_eq!(rest_of_name, CompoundName::of(["dir", "x"]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_object_value_is_storage_failure() {
        let e = engine();
        let name = CompoundName::of(["bad"]);
        e.bind(ROOT, &name, Binding::object("garbage"), false).unwrap();
        assert!(matches!(e.resolve(ROOT, &name), Err(Error::Storage(StorageError::Codec(_)))));
    }

    #[test]
    fn test_list_paging() {
        let e = engine();
        for key in ["a", "b", "c", "d", "e"] {
            e.bind(ROOT, &CompoundName::of([key]), e.object_binding(&obj(key)).unwrap(), false).unwrap();
        }

        let (first, cursor) = e.list(ROOT, 2).unwrap();
        let names: Vec<String> = first.iter().map(|b| b.atom.id.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(cursor.unwrap().remaining(), 3);

        let (all, cursor) = e.list(ROOT, 10).unwrap();
        assert_eq!(all.len(), 5);
        assert!(cursor.is_none());
    }

    #[test]
    fn test_list_zero_defers_everything() {
        let e = engine();
        e.bind(ROOT, &CompoundName::of(["a"]), Binding::object("IOR:00"), false).unwrap();
        let (first, cursor) = e.list(ROOT, 0).unwrap();
        assert!(first.is_empty());
        assert_eq!(cursor.unwrap().remaining(), 1);
    }

    #[test]
    fn test_destroy() {
        let e = engine();
        let id = e.bind_new_context(ROOT, &CompoundName::of(["tmp"])).unwrap();
        e.bind(id, &CompoundName::of(["x"]), Binding::object("IOR:00"), false).unwrap();

        assert!(matches!(e.destroy(id), Err(Error::NotEmpty)));
        e.unbind(id, &CompoundName::of(["x"])).unwrap();
        e.destroy(id).unwrap();

        assert!(matches!(
            e.resolve(id, &CompoundName::of(["x"])),
            Err(Error::Storage(StorageError::MissingRecord(_)))
        ));
    }

    #[test]
    fn test_bind_new_context_cleans_up_on_failure() {
        let store = MemoryStore::new();
        let e = engine_over(store.clone());
        e.bind(ROOT, &CompoundName::of(["taken"]), Binding::object("IOR:00"), false).unwrap();
        let before = store.context_ids().unwrap();

        let err = e.bind_new_context(ROOT, &CompoundName::of(["taken"]));
        assert!(matches!(err, Err(Error::AlreadyBound)));
        assert_eq!(store.context_ids().unwrap(), before);
    }
}
