//! Durability tests: a service is dropped and a new one opened over the
//! same store, which must reproduce every table exactly.
//!
//! Covers the file store (one JSON document per context), identifier
//! counter recovery, the new_context/destroy contracts, and LRU eviction.

use cosnaming_rs::{
    CompoundName, ContextId, ContextStore, Error, FileStore, LocalRegistry, NameService,
    NameServiceConfig, ObjectRef, StoreConfig,
};
use cosnaming_rs::storage::MemoryStore;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn obj(key: &str) -> ObjectRef {
    ObjectRef::new("IDL:Example/Service:1.0", "services:7000", key)
}

fn name(path: &[&str]) -> CompoundName {
    CompoundName::of(path.iter().copied())
}

fn file_config(dir: &TempDir) -> NameServiceConfig {
    NameServiceConfig {
        store: StoreConfig::File { data_dir: dir.path().to_path_buf() },
        ..NameServiceConfig::default()
    }
}

// ============================================================================
// Restart round-trip
// ============================================================================

#[test]
fn test_file_store_restart_roundtrip() {
    let dir = TempDir::new().unwrap();
    let registry = LocalRegistry::new();

    let users_id = {
        let service = NameService::open(&file_config(&dir), &registry).unwrap();
        let root = service.root();
        let users = root.bind_new_context(&name(&["users"])).unwrap();
        users.bind(&name(&["alice"]), &obj("alice")).unwrap();
        users.bind(&name(&["bob"]), &obj("bob")).unwrap();
        root.bind(&name(&["printer"]), &obj("lp0")).unwrap();
        users.id()
    };

    let service = NameService::open(&file_config(&dir), &registry).unwrap();
    let root = service.root();
    assert_eq!(root.resolve(&name(&["users", "alice"])).unwrap(), obj("alice"));
    assert_eq!(root.resolve(&name(&["users", "bob"])).unwrap(), obj("bob"));
    assert_eq!(root.resolve(&name(&["printer"])).unwrap(), obj("lp0"));
    assert_eq!(
        root.resolve_binding(&name(&["users"])).unwrap().context_id(),
        Some(users_id)
    );
}

#[test]
fn test_record_tables_identical_after_reload() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let cfg = NameServiceConfig::default();

    let before = {
        let service = NameService::embedded(store.clone(), &cfg).unwrap();
        let root = service.root();
        root.bind_new_context(&name(&["a"])).unwrap();
        root.bind(&name(&["b"]), &obj("b")).unwrap();
        root.rebind(&name(&["b"]), &obj("b2")).unwrap();
        store.load(ContextId::ROOT).unwrap().unwrap().into_table().unwrap()
    };

    let service = NameService::embedded(FileStore::open(dir.path()).unwrap(), &cfg).unwrap();
    let reloaded = service.activator().materialize(ContextId::ROOT).unwrap();
    assert_eq!(reloaded.lock().table, before);
}

#[test]
fn test_memory_store_survives_service_restart() {
    let store = MemoryStore::new();
    let cfg = NameServiceConfig::default();
    {
        let service = NameService::embedded(store.clone(), &cfg).unwrap();
        service.root().bind(&name(&["k"]), &obj("v")).unwrap();
    }
    let service = NameService::embedded(store, &cfg).unwrap();
    assert_eq!(service.root().resolve(&name(&["k"])).unwrap(), obj("v"));
}

// ============================================================================
// Identifier counter
// ============================================================================

#[test]
fn test_identifiers_not_reused_after_restart() {
    let dir = TempDir::new().unwrap();
    let cfg = NameServiceConfig::default();

    let first = {
        let service = NameService::embedded(FileStore::open(dir.path()).unwrap(), &cfg).unwrap();
        let ctx = service.root().new_context().unwrap();
        // Destroy it so the highest stored record no longer reveals the id.
        ctx.destroy().unwrap();
        ctx.id()
    };

    let service = NameService::embedded(FileStore::open(dir.path()).unwrap(), &cfg).unwrap();
    let second = service.root().new_context().unwrap();
    assert!(second.id() > first, "{} should be newer than {}", second.id(), first);
}

// ============================================================================
// new_context persists immediately
// ============================================================================

#[test]
fn test_unbound_new_context_survives_restart() {
    let store = MemoryStore::new();
    let cfg = NameServiceConfig::default();

    let id = {
        let service = NameService::embedded(store.clone(), &cfg).unwrap();
        service.root().new_context().unwrap().id()
    };
    assert!(store.contains(id).unwrap());

    let service = NameService::embedded(store, &cfg).unwrap();
    let (entries, iter) = service.handle(id).list(10).unwrap();
    assert!(entries.is_empty());
    assert!(iter.is_none());
}

// ============================================================================
// destroy removes the record
// ============================================================================

#[test]
fn test_destroy_deletes_file() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let service = NameService::embedded(store.clone(), &NameServiceConfig::default()).unwrap();

    let ctx = service.root().new_context().unwrap();
    let file = dir.path().join("contexts").join(format!("{}.json", ctx.id()));
    assert!(file.exists());

    ctx.destroy().unwrap();
    assert!(!file.exists());
    assert!(!store.contains(ctx.id()).unwrap());
}

// ============================================================================
// Writes are synchronous
// ============================================================================

#[test]
fn test_every_mutation_is_written_through() {
    let store = MemoryStore::new();
    let service = NameService::embedded(store.clone(), &NameServiceConfig::default()).unwrap();
    let root = service.root();

    let start = store.save_count();
    root.bind(&name(&["a"]), &obj("a")).unwrap();
    assert_eq!(store.save_count(), start + 1);
    root.rebind(&name(&["a"]), &obj("b")).unwrap();
    assert_eq!(store.save_count(), start + 2);
    root.unbind(&name(&["a"])).unwrap();
    assert_eq!(store.save_count(), start + 3);

    // Failed operations write nothing.
    assert!(root.unbind(&name(&["a"])).is_err());
    assert_eq!(store.save_count(), start + 3);
}

#[test]
fn test_failed_write_is_not_applied() {
    let store = MemoryStore::new();
    let service = NameService::embedded(store.clone(), &NameServiceConfig::default()).unwrap();
    let root = service.root();

    store.fail_writes(true);
    assert!(matches!(root.bind(&name(&["a"]), &obj("a")), Err(Error::Storage(_))));
    assert!(matches!(root.new_context(), Err(Error::Storage(_))));
    store.fail_writes(false);

    let (entries, _) = root.list(10).unwrap();
    assert!(entries.is_empty());

    // Nothing half-applied survives a restart either.
    let restarted = NameService::embedded(store, &NameServiceConfig::default()).unwrap();
    let (entries, _) = restarted.root().list(10).unwrap();
    assert!(entries.is_empty());
}

// ============================================================================
// Bounded cache
// ============================================================================

#[test]
fn test_eviction_loses_nothing() {
    let store = MemoryStore::new();
    let mut cfg = NameServiceConfig::default();
    cfg.activator.cache_capacity = 2;
    let service = NameService::embedded(store, &cfg).unwrap();
    let root = service.root();

    for i in 0..10 {
        let ctx = root.bind_new_context(&name(&[format!("c{i}").as_str()])).unwrap();
        ctx.bind(&name(&["v"]), &obj(&i.to_string())).unwrap();
    }
    assert!(service.activator().cached_len() <= 2);

    for i in 0..10 {
        let got = root.resolve(&name(&[format!("c{i}").as_str(), "v"])).unwrap();
        assert_eq!(got, obj(&i.to_string()));
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

#[test]
fn test_open_publishes_and_reopens_root() {
    let dir = TempDir::new().unwrap();
    let registry = LocalRegistry::new();
    let mut cfg = file_config(&dir);
    cfg.publish_name = "Naming".into();

    let service = NameService::open(&cfg, &registry).unwrap();
    let published = registry.lookup("Naming").unwrap();
    let root = service.handle_for(&published).unwrap();
    root.bind(&name(&["x"]), &obj("x")).unwrap();
    drop(service);

    let registry = LocalRegistry::new();
    let service = NameService::open(&cfg, &registry).unwrap();
    let root = service.handle_for(&registry.lookup("Naming").unwrap()).unwrap();
    assert_eq!(root.id(), ContextId::ROOT);
    assert_eq!(root.resolve(&name(&["x"])).unwrap(), obj("x"));
}
