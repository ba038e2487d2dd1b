//! Backend registry with snapshot-swap refresh.
//!
//! A [`Registry`] knows a fixed catalog of backend kinds ([`BackendSpec`]s, in
//! declaration order) and exposes the subset enabled by an
//! [`EnablementStore`]. The live set is an immutable [`Snapshot`] behind an
//! `RwLock<Arc<_>>`: [`Registry::refresh`] builds a complete new snapshot and
//! swaps the pointer, so callers that already resolved an instance keep using
//! it safely while new lookups see the new generation.
//!
//! Enabled-but-unavailable backends are kept in the snapshot. `resolve`
//! returns them (so the engine reports "registered but unavailable" rather
//! than "not registered"), while [`Registry::list_available`] filters them out.

use crate::capability::{Backend, Chunker, Converter};
use crate::lifecycle::DownloadStatus;
use crate::store::EnablementStore;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Message reported for known kinds absent from the enabled set.
pub const DISABLED_MESSAGE: &str = "disabled in configuration";

/// Object types a [`Registry`] can hold.
pub trait RegistryEntry: Backend {
    /// Lifecycle status reported in descriptors.
    fn entry_status(&self) -> DownloadStatus;

    /// Human label used in log lines ("converter", "chunker").
    fn label() -> &'static str;
}

impl RegistryEntry for dyn Converter {
    fn entry_status(&self) -> DownloadStatus {
        self.download_status()
    }

    fn label() -> &'static str {
        "converter"
    }
}

impl RegistryEntry for dyn Chunker {
    fn entry_status(&self) -> DownloadStatus {
        DownloadStatus::NotRequired
    }

    fn label() -> &'static str {
        "chunker"
    }
}

type Factory<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

/// One known backend kind: its name and how to construct it.
pub struct BackendSpec<T: ?Sized> {
    name: String,
    requires_download: bool,
    factory: Factory<T>,
}

impl<T: ?Sized> BackendSpec<T> {
    pub fn new<F>(name: impl Into<String>, requires_download: bool, factory: F) -> Self
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            requires_download,
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requires_download(&self) -> bool {
        self.requires_download
    }
}

impl<T: ?Sized> Clone for BackendSpec<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            requires_download: self.requires_download,
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T: ?Sized> fmt::Debug for BackendSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSpec")
            .field("name", &self.name)
            .field("requires_download", &self.requires_download)
            .finish()
    }
}

/// Identity and runtime status of one known backend kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub available: bool,
    pub error: Option<String>,
    /// Whether the kind is in the effective enabled set.
    pub enabled: bool,
    pub requires_download: bool,
    pub download_status: DownloadStatus,
}

/// One immutable registry generation.
pub struct Snapshot<T: ?Sized> {
    generation: u64,
    enabled: BTreeSet<String>,
    /// False when the enabled set was empty and every kind was exposed.
    configured: bool,
    instances: IndexMap<String, Arc<T>>,
}

impl<T: ?Sized + RegistryEntry> Snapshot<T> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<T>> {
        self.instances.get(name).cloned()
    }

    /// Registered names in catalog order, available or not.
    pub fn names(&self) -> Vec<String> {
        self.instances.keys().cloned().collect()
    }

    pub fn available_names(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter(|(_, b)| b.available())
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// First available instance in catalog order.
    pub fn first_available(&self) -> Option<Arc<T>> {
        self.instances.values().find(|b| b.available()).cloned()
    }
}

/// Registry of one backend family (converters or chunkers).
pub struct Registry<T: ?Sized> {
    catalog: IndexMap<String, BackendSpec<T>>,
    store: Arc<dyn EnablementStore>,
    current: RwLock<Arc<Snapshot<T>>>,
}

impl<T: ?Sized + RegistryEntry> Registry<T> {
    /// Create a registry over `catalog` and build the first snapshot from `store`.
    ///
    /// Later specs with a duplicate name replace earlier ones.
    pub fn new(catalog: impl IntoIterator<Item = BackendSpec<T>>, store: Arc<dyn EnablementStore>) -> Self {
        let catalog: IndexMap<String, BackendSpec<T>> =
            catalog.into_iter().map(|s| (s.name.clone(), s)).collect();
        let registry = Self {
            catalog,
            store,
            current: RwLock::new(Arc::new(Snapshot {
                generation: 0,
                enabled: BTreeSet::new(),
                configured: false,
                instances: IndexMap::new(),
            })),
        };
        registry.refresh();
        registry
    }

    pub fn store(&self) -> &Arc<dyn EnablementStore> {
        &self.store
    }

    /// Every known kind, in catalog order.
    pub fn known_names(&self) -> Vec<String> {
        self.catalog.keys().cloned().collect()
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.catalog.contains_key(name)
    }

    /// Construct a snapshot for `enabled_names` without installing it.
    ///
    /// An empty set exposes every known kind.
    pub fn build(&self, enabled_names: &BTreeSet<String>) -> Snapshot<T> {
        let label = T::label();
        let configured = !enabled_names.is_empty();
        let enabled: BTreeSet<String> = if configured {
            enabled_names.clone()
        } else {
            warn!("No enabled {label}s configured; exposing all known {label}s");
            self.catalog.keys().cloned().collect()
        };

        let mut instances = IndexMap::new();
        for (name, spec) in &self.catalog {
            if !enabled.contains(name) {
                continue;
            }
            let backend = (spec.factory)();
            if backend.available() {
                info!("Registered {label}: {name}");
            } else {
                let reason = backend
                    .error_message()
                    .unwrap_or_else(|| "dependencies not installed".to_string());
                warn!("{label} {name} is not available: {reason}");
            }
            instances.insert(name.clone(), backend);
        }

        Snapshot {
            generation: self.snapshot().generation + 1,
            enabled,
            configured,
            instances,
        }
    }

    /// Re-read the store and atomically replace the live snapshot.
    ///
    /// A store read failure is logged and treated as an empty enabled set.
    pub fn refresh(&self) {
        let enabled = match self.store.enabled_names() {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to load enabled {}s: {e}", T::label());
                BTreeSet::new()
            }
        };
        let next = Arc::new(self.build(&enabled));
        info!(
            "{} registry generation {}: {} registered, {} available",
            T::label(),
            next.generation,
            next.instances.len(),
            next.available_names().len()
        );
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// The live snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot<T>> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Exact-name lookup. `None` means "not registered".
    pub fn resolve(&self, name: &str) -> Option<Arc<T>> {
        self.snapshot().resolve(name)
    }

    /// Names of registered backends that are currently available.
    pub fn list_available(&self) -> Vec<String> {
        self.snapshot().available_names()
    }

    /// One descriptor per known kind, in catalog order.
    pub fn list_all(&self) -> Vec<BackendDescriptor> {
        let snap = self.snapshot();
        self.catalog
            .values()
            .map(|spec| self.describe(&snap, spec))
            .collect()
    }

    /// Descriptor for one known kind; `None` if the name is unknown.
    pub fn descriptor(&self, name: &str) -> Option<BackendDescriptor> {
        let snap = self.snapshot();
        self.catalog.get(name).map(|spec| self.describe(&snap, spec))
    }

    fn describe(&self, snap: &Snapshot<T>, spec: &BackendSpec<T>) -> BackendDescriptor {
        let enabled = snap.is_enabled(&spec.name);
        match snap.resolve(&spec.name) {
            Some(backend) => {
                let available = backend.available();
                BackendDescriptor {
                    name: spec.name.clone(),
                    available,
                    error: if available {
                        None
                    } else {
                        Some(
                            backend
                                .error_message()
                                .unwrap_or_else(|| "Unavailable".to_string()),
                        )
                    },
                    enabled,
                    requires_download: spec.requires_download,
                    download_status: backend.entry_status(),
                }
            }
            None => BackendDescriptor {
                name: spec.name.clone(),
                available: false,
                error: Some(DISABLED_MESSAGE.to_string()),
                enabled,
                requires_download: spec.requires_download,
                download_status: if spec.requires_download {
                    DownloadStatus::Pending
                } else {
                    DownloadStatus::NotRequired
                },
            },
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("catalog", &self.catalog.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Chunk, ChunkParams, ParameterSchema};
    use crate::error::BackendError;
    use crate::store::MemoryStore;

    struct Fake {
        name: &'static str,
        ok: bool,
    }

    impl Backend for Fake {
        fn name(&self) -> &str {
            self.name
        }
        fn available(&self) -> bool {
            self.ok
        }
        fn error_message(&self) -> Option<String> {
            (!self.ok).then(|| "missing dependency".to_string())
        }
    }

    impl Chunker for Fake {
        fn chunk(&self, _text: &str, _params: &ChunkParams) -> Result<Vec<Chunk>, BackendError> {
            Ok(vec![])
        }
        fn parameter_schema(&self) -> ParameterSchema {
            ParameterSchema {
                name: self.name.into(),
                description: String::new(),
                parameters: vec![],
            }
        }
    }

    fn spec(name: &'static str, ok: bool) -> BackendSpec<dyn Chunker> {
        BackendSpec::new(name, false, move || Arc::new(Fake { name, ok }) as Arc<dyn Chunker>)
    }

    fn registry(store: Arc<MemoryStore>) -> Registry<dyn Chunker> {
        Registry::new(vec![spec("a", true), spec("b", false), spec("c", true)], store)
    }

    #[test]
    fn empty_enabled_set_fails_open() {
        let reg = registry(Arc::new(MemoryStore::new()));
        assert!(!reg.snapshot().is_configured());
        assert_eq!(reg.list_available(), vec!["a", "c"]);
        assert!(reg.resolve("b").is_some());
    }

    #[test]
    fn disabled_kinds_are_never_resolved() {
        let reg = registry(Arc::new(MemoryStore::with_enabled(["c"])));
        assert!(reg.resolve("a").is_none());
        assert_eq!(reg.list_available(), vec!["c"]);

        let all = reg.list_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].error.as_deref(), Some(DISABLED_MESSAGE));
        assert!(!all[0].enabled);
        assert!(all[2].available && all[2].enabled);
    }

    #[test]
    fn unavailable_enabled_backend_is_resolvable_but_not_listed() {
        let reg = registry(Arc::new(MemoryStore::with_enabled(["b"])));
        assert!(reg.list_available().is_empty());
        let b = reg.resolve("b").unwrap();
        assert!(!b.available());
        assert_eq!(
            reg.descriptor("b").unwrap().error.as_deref(),
            Some("missing dependency")
        );
        assert!(reg.descriptor("zzz").is_none());
    }

    #[test]
    fn refresh_swaps_snapshot_and_keeps_old_instances_alive() {
        let store = Arc::new(MemoryStore::with_enabled(["a"]));
        let reg = registry(Arc::clone(&store));
        let old = reg.snapshot();
        let held = reg.resolve("a").unwrap();

        store.set_enabled("a", false).unwrap();
        store.set_enabled("c", true).unwrap();
        reg.refresh();

        assert!(reg.resolve("a").is_none());
        assert!(reg.resolve("c").is_some());
        assert_eq!(held.name(), "a");
        assert!(old.resolve("a").is_some());
        assert!(reg.snapshot().generation() > old.generation());
    }

    #[test]
    fn first_available_follows_catalog_order() {
        let reg = registry(Arc::new(MemoryStore::new()));
        assert_eq!(reg.snapshot().first_available().unwrap().name(), "a");
    }
}
