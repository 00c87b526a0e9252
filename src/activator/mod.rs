//! Context activation.
//!
//! The activator is the only component that reads or writes the store. It
//! materializes contexts on demand, keeps recently used ones resident in an
//! LRU, hands out identifiers, and writes tables through on every mutation.
//!
//! Residency is two-level: the LRU holds strong handles to the most recently
//! touched contexts, and a side map holds weak handles to every instance
//! still alive anywhere. A context evicted from the LRU while a call is
//! using it is found again through the weak map, so there is never more than
//! one in-memory instance per identifier.
//!
//! Locks: the cache map and the counter each have their own lock, separate
//! from the per-context table locks. A context lock may be held while taking
//! the cache lock (destroy); never the other way round. The cache lock only
//! guards the maps: store reads happen outside it, with a per-id load slot
//! so that a context is read from the store at most once at a time.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use lru::LruCache;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::ObjectAdapter;
use crate::model::*;
use crate::storage::{ContextRecord, ContextStore, StorageError, StorageResult};

// ============================================================================
// Configuration
// ============================================================================

/// Activation cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivatorConfig {
    /// How many contexts stay resident after their last use.
    pub cache_capacity: usize,
}

impl Default for ActivatorConfig {
    fn default() -> Self {
        Self { cache_capacity: 256 }
    }
}

// ============================================================================
// NamingContext
// ============================================================================

/// A materialized context: its identifier and its locked table.
#[derive(Debug)]
pub struct NamingContext {
    id: ContextId,
    /// Set under the table lock before the durable record is removed, and
    /// cleared again if the removal fails. Readable without the lock.
    destroyed: AtomicBool,
    state: Mutex<ContextState>,
}

/// What the per-context lock protects.
#[derive(Debug, Default)]
pub struct ContextState {
    pub table: BindingTable,
}

impl NamingContext {
    fn new(id: ContextId, table: BindingTable) -> Self {
        Self {
            id,
            destroyed: AtomicBool::new(false),
            state: Mutex::new(ContextState { table }),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// A destroyed context accepts no further operations.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Take the table lock.
    pub fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock()
    }

    /// Take the table lock, failing if the context has been destroyed.
    pub fn lock_live(&self) -> StorageResult<MutexGuard<'_, ContextState>> {
        let guard = self.state.lock();
        if self.is_destroyed() {
            return Err(StorageError::MissingRecord(self.id));
        }
        Ok(guard)
    }
}

// ============================================================================
// Activator
// ============================================================================

/// Filled once by the caller that loads a context; `None` if the load failed.
type LoadSlot = OnceLock<Option<Arc<NamingContext>>>;

struct ContextCache {
    resident: LruCache<ContextId, Arc<NamingContext>>,
    live: HashMap<ContextId, Weak<NamingContext>>,
    /// Loads in progress. Later callers for the same id wait on the slot
    /// instead of reading the store a second time.
    loading: HashMap<ContextId, Arc<LoadSlot>>,
}

enum Claim {
    Ready(Arc<NamingContext>),
    Wait(Arc<LoadSlot>),
    Load(Arc<LoadSlot>),
}

impl ContextCache {
    fn lookup(&mut self, id: ContextId) -> Option<Arc<NamingContext>> {
        if let Some(ctx) = self.resident.get(&id) {
            return Some(Arc::clone(ctx));
        }
        let ctx = self.live.get(&id).and_then(Weak::upgrade)?;
        self.resident.put(id, Arc::clone(&ctx));
        Some(ctx)
    }

    /// The live instance for `id`, the slot of a load already under way,
    /// or a fresh slot the caller must fill.
    fn claim(&mut self, id: ContextId) -> Claim {
        if let Some(ctx) = self.lookup(id) {
            return Claim::Ready(ctx);
        }
        if let Some(slot) = self.loading.get(&id) {
            return Claim::Wait(Arc::clone(slot));
        }
        let slot = Arc::new(LoadSlot::new());
        self.loading.insert(id, Arc::clone(&slot));
        Claim::Load(slot)
    }

    fn insert(&mut self, ctx: Arc<NamingContext>) {
        if self.live.len() >= 2 * self.resident.cap().get() {
            self.live.retain(|_, weak| weak.strong_count() > 0);
        }
        self.live.insert(ctx.id(), Arc::downgrade(&ctx));
        self.resident.put(ctx.id(), ctx);
    }

    fn remove(&mut self, id: ContextId) {
        self.resident.pop(&id);
        self.live.remove(&id);
    }
}

/// On-demand loader and write-through cache for naming contexts.
pub struct Activator<S: ContextStore> {
    store: S,
    adapter: Arc<dyn ObjectAdapter>,
    cache: Mutex<ContextCache>,
    /// Last identifier counter handed out (0 is the root).
    counter: Mutex<u64>,
}

impl<S: ContextStore> Activator<S> {
    /// Open an activator over `store`.
    ///
    /// The counter starts at the larger of the persisted counter and the
    /// highest identifier present in the store.
    pub fn open(store: S, adapter: Arc<dyn ObjectAdapter>, config: &ActivatorConfig) -> StorageResult<Self> {
        let persisted = store.load_counter()?.unwrap_or(0);
        let highest = store.context_ids()?.into_iter().map(|id| id.0).max().unwrap_or(0);
        let counter = persisted.max(highest);
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        debug!(counter, capacity = capacity.get(), "opened activator");

        Ok(Self {
            store,
            adapter,
            cache: Mutex::new(ContextCache {
                resident: LruCache::new(capacity),
                live: HashMap::new(),
                loading: HashMap::new(),
            }),
            counter: Mutex::new(counter),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn root_identifier(&self) -> ContextId {
        ContextId::ROOT
    }

    /// Make sure the root has a durable record. Returns true if it had to be created.
    pub fn ensure_root(&self) -> StorageResult<bool> {
        if self.store.contains(ContextId::ROOT)? {
            return Ok(false);
        }
        self.store.save(&ContextRecord::empty(ContextId::ROOT))?;
        debug!(context = %ContextId::ROOT, "created root context");
        Ok(true)
    }

    /// A fresh, never used identifier. The new counter is durable before
    /// the identifier is returned.
    pub fn allocate(&self) -> StorageResult<ContextId> {
        let mut counter = self.counter.lock();
        let next = *counter + 1;
        self.store.save_counter(next)?;
        *counter = next;
        let id = ContextId(next);
        debug!(context = %id, "allocated context identifier");
        Ok(id)
    }

    /// Allocate an identifier and persist an empty context for it.
    pub fn create(&self) -> StorageResult<Arc<NamingContext>> {
        let id = self.allocate()?;
        self.store.save(&ContextRecord::empty(id))?;
        let ctx = Arc::new(NamingContext::new(id, BindingTable::new()));
        self.cache.lock().insert(Arc::clone(&ctx));
        Ok(ctx)
    }

    /// The in-memory context for `id`, loading it from the store if it is
    /// not already live.
    ///
    /// The cache lock is never held across the store read. Concurrent
    /// callers for the same id share one load; callers for other ids are
    /// not held up by it.
    pub fn materialize(&self, id: ContextId) -> StorageResult<Arc<NamingContext>> {
        loop {
            let claim = self.cache.lock().claim(id);
            let slot = match claim {
                Claim::Ready(ctx) => return Ok(ctx),
                Claim::Wait(slot) => match slot.wait() {
                    Some(ctx) => return Ok(Arc::clone(ctx)),
                    // The other load failed; try again ourselves.
                    None => continue,
                },
                Claim::Load(slot) => slot,
            };

            let loaded = self.load(id);
            {
                let mut cache = self.cache.lock();
                cache.loading.remove(&id);
                if let Ok(ctx) = &loaded {
                    cache.insert(Arc::clone(ctx));
                }
            }
            let _ = slot.set(loaded.as_ref().ok().cloned());
            return loaded;
        }
    }

    fn load(&self, id: ContextId) -> StorageResult<Arc<NamingContext>> {
        let record = self.store.load(id)?.ok_or(StorageError::MissingRecord(id))?;
        let table = record.into_table()?;
        debug!(context = %id, bindings = table.len(), "activated context");
        Ok(Arc::new(NamingContext::new(id, table)))
    }

    /// Write the full table of `id` through to the store.
    ///
    /// Callers hold the context lock, so writes for one context land in
    /// mutation order.
    pub fn persist(&self, id: ContextId, table: &BindingTable) -> StorageResult<()> {
        self.store.save(&ContextRecord::from_table(id, table))?;
        debug!(context = %id, bindings = table.len(), "persisted context");
        Ok(())
    }

    /// Remove the durable record of `ctx` and retire the in-memory instance.
    ///
    /// The caller holds `state` (the context's own lock) and has checked the
    /// table is empty.
    pub fn destroy(&self, ctx: &NamingContext, _state: &mut ContextState) -> StorageResult<()> {
        ctx.destroyed.store(true, Ordering::Release);
        if let Err(e) = self.store.remove(ctx.id()) {
            ctx.destroyed.store(false, Ordering::Release);
            return Err(e);
        }
        self.cache.lock().remove(ctx.id());
        debug!(context = %ctx.id(), "destroyed context");
        Ok(())
    }

    pub fn reference_for(&self, id: ContextId) -> ObjectRef {
        self.adapter.create_reference(id)
    }

    pub fn identifier_for(&self, reference: &ObjectRef) -> Option<ContextId> {
        self.adapter.reference_to_identifier(reference)
    }

    /// Number of contexts held resident by the LRU.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().resident.len()
    }

    /// Is `id` resident in the LRU right now?
    pub fn is_resident(&self, id: ContextId) -> bool {
        self.cache.lock().resident.contains(&id)
    }

    /// Drop every resident context. In-flight users keep theirs alive and
    /// still share it with anyone who materializes the same identifier.
    pub fn evict_all(&self) {
        self.cache.lock().resident.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
