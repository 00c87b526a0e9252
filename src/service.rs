//! Bootstrap and the naming-context facade.
//!
//! [`NameService`] wires store, activator, engine, adapter and codec
//! together, makes sure the root context exists, and publishes the root
//! reference. [`ContextHandle`] is what an inbound call is dispatched to:
//! one context, addressed by identifier, exposing the naming-context
//! operations in their reference-typed form.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::activator::{Activator, ActivatorConfig};
use crate::adapter::{DiscoveryRegistry, IorCodec, LocalAdapter, ObjectAdapter, ReferenceCodec};
use crate::engine::NamingEngine;
use crate::iterator::BindingIterator;
use crate::model::*;
use crate::storage::{ContextStore, MemoryStore, StoreConfig};
use crate::{syntax, Error, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Everything needed to bring a naming service up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameServiceConfig {
    pub store: StoreConfig,
    pub activator: ActivatorConfig,
    /// Name the root reference is published under.
    pub publish_name: String,
    /// Endpoint written into context references.
    pub endpoint: String,
}

impl Default for NameServiceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            activator: ActivatorConfig::default(),
            publish_name: "NameService".into(),
            endpoint: "localhost:2809".into(),
        }
    }
}

impl NameServiceConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }
}

// ============================================================================
// NameService
// ============================================================================

/// A running naming graph: root context plus everything reachable from it.
pub struct NameService<S: ContextStore> {
    engine: Arc<NamingEngine<S>>,
}

impl NameService<Box<dyn ContextStore>> {
    /// Open the configured store, bootstrap the root, and publish it.
    pub fn open(config: &NameServiceConfig, registry: &dyn DiscoveryRegistry) -> Result<Self> {
        let store = config.store.open()?;
        Self::bootstrap(store, config, registry)
    }
}

impl NameService<MemoryStore> {
    /// In-memory service with default settings and nothing published.
    pub fn open_memory() -> Result<Self> {
        Self::embedded(MemoryStore::new(), &NameServiceConfig::default())
    }
}

impl<S: ContextStore> NameService<S> {
    /// Bring the service up over `store` and publish the root reference
    /// under `config.publish_name`.
    pub fn bootstrap(store: S, config: &NameServiceConfig, registry: &dyn DiscoveryRegistry) -> Result<Self> {
        let service = Self::embedded(store, config)?;
        registry.publish(&config.publish_name, service.root_reference())?;
        info!(name = %config.publish_name, endpoint = %config.endpoint, "naming service ready");
        Ok(service)
    }

    /// Bring the service up without publishing anything.
    pub fn embedded(store: S, config: &NameServiceConfig) -> Result<Self> {
        Self::with_parts(
            store,
            Arc::new(LocalAdapter::new(config.endpoint.clone())),
            Arc::new(IorCodec),
            &config.activator,
        )
    }

    /// Assemble from explicit collaborators.
    pub fn with_parts(
        store: S,
        adapter: Arc<dyn ObjectAdapter>,
        codec: Arc<dyn ReferenceCodec>,
        activator_config: &ActivatorConfig,
    ) -> Result<Self> {
        let activator = Activator::open(store, adapter, activator_config)?;
        if activator.ensure_root()? {
            info!("created root naming context");
        }
        let engine = NamingEngine::new(Arc::new(activator), codec);
        Ok(Self { engine: Arc::new(engine) })
    }

    pub fn engine(&self) -> &NamingEngine<S> {
        &self.engine
    }

    pub fn activator(&self) -> &Activator<S> {
        self.engine.activator()
    }

    pub fn root(&self) -> ContextHandle<S> {
        self.handle(ContextId::ROOT)
    }

    pub fn root_reference(&self) -> ObjectRef {
        self.activator().reference_for(ContextId::ROOT)
    }

    /// Handle for an identifier. Existence is checked on first use.
    pub fn handle(&self, id: ContextId) -> ContextHandle<S> {
        ContextHandle { engine: Arc::clone(&self.engine), id }
    }

    /// Route a reference back to its context, if it names one of ours.
    pub fn handle_for(&self, reference: &ObjectRef) -> Option<ContextHandle<S>> {
        self.activator().identifier_for(reference).map(|id| self.handle(id))
    }
}

// ============================================================================
// ContextHandle
// ============================================================================

/// One naming context as seen by a caller.
pub struct ContextHandle<S: ContextStore> {
    engine: Arc<NamingEngine<S>>,
    id: ContextId,
}

impl<S: ContextStore> Clone for ContextHandle<S> {
    fn clone(&self) -> Self {
        Self { engine: Arc::clone(&self.engine), id: self.id }
    }
}

impl<S: ContextStore> std::fmt::Debug for ContextHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle").field("id", &self.id).finish()
    }
}

impl<S: ContextStore> ContextHandle<S> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The transport reference for this context.
    pub fn reference(&self) -> ObjectRef {
        self.engine.activator().reference_for(self.id)
    }

    pub fn bind(&self, name: &CompoundName, obj: &ObjectRef) -> Result<()> {
        let value = self.engine.object_binding(obj)?;
        self.engine.bind(self.id, name, value, false)
    }

    pub fn bind_context(&self, name: &CompoundName, ctx: &ObjectRef) -> Result<()> {
        let value = self.context_binding(name, ctx)?;
        self.engine.bind(self.id, name, value, false)
    }

    pub fn rebind(&self, name: &CompoundName, obj: &ObjectRef) -> Result<()> {
        let value = self.engine.object_binding(obj)?;
        self.engine.bind(self.id, name, value, true)
    }

    pub fn rebind_context(&self, name: &CompoundName, ctx: &ObjectRef) -> Result<()> {
        let value = self.context_binding(name, ctx)?;
        self.engine.bind(self.id, name, value, true)
    }

    /// Only contexts this service serves can be bound as contexts.
    fn context_binding(&self, name: &CompoundName, ctx: &ObjectRef) -> Result<Binding> {
        let id = self.engine.activator().identifier_for(ctx).ok_or_else(|| Error::CannotProceed {
            context: self.id,
            rest_of_name: name.clone(),
        })?;
        Ok(Binding::context(id))
    }

    pub fn resolve(&self, name: &CompoundName) -> Result<ObjectRef> {
        self.engine.resolve_ref(self.id, name)
    }

    /// Resolve without turning the binding into a reference.
    pub fn resolve_binding(&self, name: &CompoundName) -> Result<Binding> {
        self.engine.resolve(self.id, name)
    }

    pub fn unbind(&self, name: &CompoundName) -> Result<()> {
        self.engine.unbind(self.id, name)
    }

    pub fn list(&self, how_many: usize) -> Result<(Vec<BindingEntry>, Option<BindingIterator>)> {
        self.engine.list(self.id, how_many)
    }

    pub fn new_context(&self) -> Result<ContextHandle<S>> {
        let id = self.engine.new_context()?;
        Ok(ContextHandle { engine: Arc::clone(&self.engine), id })
    }

    pub fn bind_new_context(&self, name: &CompoundName) -> Result<ContextHandle<S>> {
        let id = self.engine.bind_new_context(self.id, name)?;
        Ok(ContextHandle { engine: Arc::clone(&self.engine), id })
    }

    pub fn destroy(&self) -> Result<()> {
        self.engine.destroy(self.id)
    }

    pub fn to_string(&self, name: &CompoundName) -> Result<String> {
        syntax::to_string(name)
    }

    pub fn to_name(&self, sn: &str) -> Result<CompoundName> {
        syntax::to_name(sn)
    }

    pub fn to_url(&self, address: &str, sn: &str) -> Result<String> {
        syntax::to_url(address, sn)
    }

    pub fn resolve_str(&self, sn: &str) -> Result<ObjectRef> {
        self.resolve(&syntax::to_name(sn)?)
    }
}
