//! Scoped dependency providers
//!
//! Providers are registered under a string key at one of three tiers:
//!
//! - **Global**: one instance for the process lifetime, built lazily on
//!   first resolution, never evicted.
//! - **App**: one instance per owning mount layer, torn down when that
//!   layer is disposed.
//! - **Request**: one instance per inbound request, discarded when the
//!   request completes (success, failure, or cancellation).
//!
//! Registries are layered: an include mount may carry its own layer, and
//! lookups walk from the innermost layer to the root, so the innermost
//! registration of a key shadows broader ones for routes under that
//! mount.
//!
//! The manager is frozen once serving starts; only the per-entry caches
//! mutate afterwards, which keeps request-time reads lock-free except
//! for first construction. Global/App first construction is serialized
//! by the entry's mutex, held across the factory call, so exactly one
//! instance is ever built per lifetime. Cycle detection runs on the
//! resolution chain before any cache lock is taken, so lock acquisition
//! follows the acyclic dependency order and cannot deadlock.

use crate::error::Error;
use compact_str::CompactString;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Identifier of a registry layer. Layer 0 is the application root.
pub type LayerId = usize;

/// The root (application-wide) layer.
pub const ROOT_LAYER: LayerId = 0;

/// A type-erased provider instance.
pub type SharedInstance = Arc<dyn Any + Send + Sync>;

/// A provider factory. Receives a resolution context through which it
/// may resolve its own sub-dependencies and register teardowns.
pub type ProviderFactory =
    Arc<dyn Fn(&mut ResolveContext<'_>) -> Result<SharedInstance, Error> + Send + Sync>;

/// Cache lifetime tier of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTier {
    Global,
    App,
    Request,
}

/// Wrap a typed factory closure into a [`ProviderFactory`].
pub fn factory<T, F>(f: F) -> ProviderFactory
where
    T: Send + Sync + 'static,
    F: Fn(&mut ResolveContext<'_>) -> Result<T, Error> + Send + Sync + 'static,
{
    Arc::new(move |ctx| Ok(Arc::new(f(ctx)?) as SharedInstance))
}

struct ProviderEntry {
    tier: ScopeTier,
    factory: ProviderFactory,
    /// Cached singleton for Global/App tiers. Unused for Request.
    cache: Mutex<Option<SharedInstance>>,
}

struct Layer {
    parent: Option<LayerId>,
    entries: HashMap<CompactString, ProviderEntry>,
}

// ============================================================================
// Request scope
// ============================================================================

#[derive(Default)]
struct RequestState {
    cache: HashMap<(LayerId, CompactString), SharedInstance>,
    teardowns: Vec<Box<dyn FnOnce() + Send>>,
}

/// Per-request instance cache and teardown registry.
///
/// Exclusively owned by the in-flight request's dispatch context.
/// Teardown callbacks run on drop, in reverse registration order, so
/// cancellation releases request-tier resources without any explicit
/// cleanup call.
pub struct RequestScope {
    state: Mutex<RequestState>,
}

impl RequestScope {
    fn new() -> Self {
        Self {
            state: Mutex::new(RequestState::default()),
        }
    }

    fn cached(&self, layer: LayerId, key: &str) -> Option<SharedInstance> {
        self.state
            .lock()
            .cache
            .get(&(layer, CompactString::new(key)))
            .cloned()
    }

    fn store(&self, layer: LayerId, key: &str, instance: SharedInstance) {
        self.state
            .lock()
            .cache
            .insert((layer, CompactString::new(key)), instance);
    }

    /// Register a callback to run when the request completes.
    pub fn on_teardown(&self, f: impl FnOnce() + Send + 'static) {
        self.state.lock().teardowns.push(Box::new(f));
    }

    /// Number of request-tier instances constructed so far.
    pub fn instance_count(&self) -> usize {
        self.state.lock().cache.len()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let teardowns = std::mem::take(&mut state.teardowns);
        let count = teardowns.len();
        for teardown in teardowns.into_iter().rev() {
            teardown();
        }
        state.cache.clear();
        if count > 0 {
            trace!(teardown_count = count, "request scope torn down");
        }
    }
}

// ============================================================================
// Resolution context
// ============================================================================

/// Handed to factories so nested dependency graphs resolve depth-first
/// through the same manager, sharing the cycle-detection chain.
pub struct ResolveContext<'a> {
    manager: &'a ScopeManager,
    layer: LayerId,
    request: &'a RequestScope,
    chain: &'a mut Vec<CompactString>,
}

impl ResolveContext<'_> {
    /// Resolve a sub-dependency by key.
    pub fn resolve(&mut self, key: &str) -> Result<SharedInstance, Error> {
        self.manager
            .resolve_chained(key, self.layer, self.request, self.chain)
    }

    /// Resolve a sub-dependency and downcast it.
    pub fn resolve_as<T: Send + Sync + 'static>(&mut self, key: &str) -> Result<Arc<T>, Error> {
        self.resolve(key)?
            .downcast::<T>()
            .map_err(|_| Error::ProviderTypeMismatch {
                key: key.to_string(),
            })
    }

    /// Register a teardown callback on the current request scope.
    pub fn on_teardown(&self, f: impl FnOnce() + Send + 'static) {
        self.request.on_teardown(f);
    }
}

// ============================================================================
// Scope manager
// ============================================================================

/// Three-tier, layered provider registry.
pub struct ScopeManager {
    layers: Vec<Layer>,
}

impl ScopeManager {
    /// Create a manager with the root layer only.
    pub fn new() -> Self {
        Self {
            layers: vec![Layer {
                parent: None,
                entries: HashMap::new(),
            }],
        }
    }

    /// Add a nested layer (e.g. for an include mount). Registrations in
    /// the new layer shadow same-keyed registrations in its ancestors.
    pub fn add_layer(&mut self, parent: LayerId) -> LayerId {
        let id = self.layers.len();
        self.layers.push(Layer {
            parent: Some(parent),
            entries: HashMap::new(),
        });
        id
    }

    /// Register a provider factory at a tier within a layer.
    pub fn register(&mut self, layer: LayerId, key: &str, tier: ScopeTier, factory: ProviderFactory) {
        debug!(key = key, layer = layer, tier = ?tier, "provider registered");
        self.layers[layer].entries.insert(
            CompactString::new(key),
            ProviderEntry {
                tier,
                factory,
                cache: Mutex::new(None),
            },
        );
    }

    /// Register a pre-constructed value as a Global provider.
    pub fn register_value<T: Send + Sync + 'static>(&mut self, layer: LayerId, key: &str, value: T) {
        let shared: SharedInstance = Arc::new(value);
        self.register(
            layer,
            key,
            ScopeTier::Global,
            Arc::new(move |_| Ok(shared.clone())),
        );
    }

    /// Check whether a key is visible from a layer.
    pub fn has(&self, key: &str, layer: LayerId) -> bool {
        self.lookup(key, layer).is_some()
    }

    /// Begin a request, creating its exclusive scope.
    pub fn begin_request(&self) -> RequestScope {
        RequestScope::new()
    }

    /// End a request explicitly. Equivalent to dropping the scope; the
    /// teardowns also run if the scope is dropped by cancellation.
    pub fn end_request(&self, scope: RequestScope) {
        drop(scope);
    }

    /// Resolve a key as seen from a layer, using the request scope for
    /// request-tier caching.
    pub fn resolve(
        &self,
        key: &str,
        layer: LayerId,
        request: &RequestScope,
    ) -> Result<SharedInstance, Error> {
        let mut chain = Vec::new();
        self.resolve_chained(key, layer, request, &mut chain)
    }

    /// Resolve and downcast.
    pub fn resolve_as<T: Send + Sync + 'static>(
        &self,
        key: &str,
        layer: LayerId,
        request: &RequestScope,
    ) -> Result<Arc<T>, Error> {
        self.resolve(key, layer, request)?
            .downcast::<T>()
            .map_err(|_| Error::ProviderTypeMismatch {
                key: key.to_string(),
            })
    }

    /// Drop the App-tier caches owned by a layer. Global caches are
    /// never evicted; request caches live on their request scopes.
    pub fn dispose_layer(&self, layer: LayerId) {
        let mut dropped = 0usize;
        for entry in self.layers[layer].entries.values() {
            if entry.tier == ScopeTier::App && entry.cache.lock().take().is_some() {
                dropped += 1;
            }
        }
        debug!(layer = layer, dropped = dropped, "app-tier caches disposed");
    }

    /// Walk the layer chain from `layer` to the root, returning the
    /// innermost entry for `key`.
    fn lookup(&self, key: &str, mut layer: LayerId) -> Option<(LayerId, &ProviderEntry)> {
        loop {
            let current = &self.layers[layer];
            if let Some(entry) = current.entries.get(key) {
                return Some((layer, entry));
            }
            layer = current.parent?;
        }
    }

    fn resolve_chained(
        &self,
        key: &str,
        layer: LayerId,
        request: &RequestScope,
        chain: &mut Vec<CompactString>,
    ) -> Result<SharedInstance, Error> {
        if chain.iter().any(|k| k.as_str() == key) {
            let mut named: Vec<String> = chain.iter().map(|k| k.to_string()).collect();
            named.push(key.to_string());
            return Err(Error::DependencyCycle { chain: named });
        }

        let (owner, entry) = self
            .lookup(key, layer)
            .ok_or_else(|| Error::ProviderNotFound(key.to_string()))?;

        match entry.tier {
            ScopeTier::Request => {
                if let Some(hit) = request.cached(owner, key) {
                    trace!(key = key, "request-tier cache hit");
                    return Ok(hit);
                }
                let built = self.construct(entry, key, layer, request, chain)?;
                request.store(owner, key, built.clone());
                Ok(built)
            }
            ScopeTier::Global | ScopeTier::App => {
                // The cache mutex is held across construction so first
                // resolution is serialized per entry.
                let mut cache = entry.cache.lock();
                if let Some(hit) = cache.as_ref() {
                    return Ok(hit.clone());
                }
                let built = self.construct(entry, key, layer, request, chain)?;
                *cache = Some(built.clone());
                Ok(built)
            }
        }
    }

    fn construct(
        &self,
        entry: &ProviderEntry,
        key: &str,
        layer: LayerId,
        request: &RequestScope,
        chain: &mut Vec<CompactString>,
    ) -> Result<SharedInstance, Error> {
        trace!(key = key, tier = ?entry.tier, "constructing provider instance");
        chain.push(CompactString::new(key));
        let result = {
            let mut ctx = ResolveContext {
                manager: self,
                layer,
                request,
                chain: &mut *chain,
            };
            (entry.factory)(&mut ctx)
        };
        chain.pop();
        result
    }
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(usize);

    fn counting_factory(counter: Arc<AtomicUsize>) -> ProviderFactory {
        factory(move |_| Ok(Counter(counter.fetch_add(1, Ordering::SeqCst))))
    }

    #[test]
    fn test_request_tier_identity_within_request() {
        let mut scopes = ScopeManager::new();
        let built = Arc::new(AtomicUsize::new(0));
        scopes.register(
            ROOT_LAYER,
            "db",
            ScopeTier::Request,
            counting_factory(built.clone()),
        );

        let req = scopes.begin_request();
        let a = scopes.resolve("db", ROOT_LAYER, &req).unwrap();
        let b = scopes.resolve("db", ROOT_LAYER, &req).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);

        let req2 = scopes.begin_request();
        let c = scopes.resolve("db", ROOT_LAYER, &req2).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_global_tier_identity_across_requests() {
        let mut scopes = ScopeManager::new();
        let built = Arc::new(AtomicUsize::new(0));
        scopes.register(
            ROOT_LAYER,
            "config",
            ScopeTier::Global,
            counting_factory(built.clone()),
        );

        let req1 = scopes.begin_request();
        let req2 = scopes.begin_request();
        let a = scopes.resolve("config", ROOT_LAYER, &req1).unwrap();
        let b = scopes.resolve("config", ROOT_LAYER, &req2).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nested_dependency_resolution() {
        let mut scopes = ScopeManager::new();
        scopes.register_value(ROOT_LAYER, "dsn", "postgres://localhost".to_string());
        scopes.register(
            ROOT_LAYER,
            "pool",
            ScopeTier::Global,
            factory(|ctx| {
                let dsn = ctx.resolve_as::<String>("dsn")?;
                Ok(format!("pool({dsn})"))
            }),
        );

        let req = scopes.begin_request();
        let pool = scopes.resolve_as::<String>("pool", ROOT_LAYER, &req).unwrap();
        assert_eq!(*pool, "pool(postgres://localhost)");
    }

    #[test]
    fn test_cycle_detection_names_chain() {
        let mut scopes = ScopeManager::new();
        scopes.register(
            ROOT_LAYER,
            "a",
            ScopeTier::Request,
            factory(|ctx| ctx.resolve("b").map(|_| ())),
        );
        scopes.register(
            ROOT_LAYER,
            "b",
            ScopeTier::Request,
            factory(|ctx| ctx.resolve("a").map(|_| ())),
        );

        let req = scopes.begin_request();
        let err = scopes.resolve("a", ROOT_LAYER, &req).unwrap_err();
        match err {
            Error::DependencyCycle { chain } => {
                assert_eq!(chain, vec!["a", "b", "a"]);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_layer_shadowing_innermost_wins() {
        let mut scopes = ScopeManager::new();
        scopes.register_value(ROOT_LAYER, "greeting", "root".to_string());
        let child = scopes.add_layer(ROOT_LAYER);
        scopes.register_value(child, "greeting", "child".to_string());

        let req = scopes.begin_request();
        let from_child = scopes
            .resolve_as::<String>("greeting", child, &req)
            .unwrap();
        let from_root = scopes
            .resolve_as::<String>("greeting", ROOT_LAYER, &req)
            .unwrap();
        assert_eq!(*from_child, "child");
        assert_eq!(*from_root, "root");
    }

    #[test]
    fn test_layer_falls_back_to_parent() {
        let mut scopes = ScopeManager::new();
        scopes.register_value(ROOT_LAYER, "only_root", 7i32);
        let child = scopes.add_layer(ROOT_LAYER);

        let req = scopes.begin_request();
        let v = scopes.resolve_as::<i32>("only_root", child, &req).unwrap();
        assert_eq!(*v, 7);
    }

    #[test]
    fn test_teardowns_run_in_reverse_on_drop() {
        let scopes = ScopeManager::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let req = scopes.begin_request();
        for label in ["first", "second"] {
            let order = order.clone();
            req.on_teardown(move || order.lock().push(label));
        }
        scopes.end_request(req);

        assert_eq!(*order.lock(), vec!["second", "first"]);
    }

    #[test]
    fn test_dispose_layer_clears_app_cache_only() {
        let mut scopes = ScopeManager::new();
        let app_built = Arc::new(AtomicUsize::new(0));
        let global_built = Arc::new(AtomicUsize::new(0));
        scopes.register(
            ROOT_LAYER,
            "per_app",
            ScopeTier::App,
            counting_factory(app_built.clone()),
        );
        scopes.register(
            ROOT_LAYER,
            "per_process",
            ScopeTier::Global,
            counting_factory(global_built.clone()),
        );

        let req = scopes.begin_request();
        scopes.resolve("per_app", ROOT_LAYER, &req).unwrap();
        scopes.resolve("per_process", ROOT_LAYER, &req).unwrap();

        scopes.dispose_layer(ROOT_LAYER);

        scopes.resolve("per_app", ROOT_LAYER, &req).unwrap();
        scopes.resolve("per_process", ROOT_LAYER, &req).unwrap();
        assert_eq!(app_built.load(Ordering::SeqCst), 2);
        assert_eq!(global_built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_provider_not_found() {
        let scopes = ScopeManager::new();
        let req = scopes.begin_request();
        let err = scopes.resolve("nope", ROOT_LAYER, &req).unwrap_err();
        assert!(matches!(err, Error::ProviderNotFound(_)));
    }

    #[test]
    fn test_type_mismatch() {
        let mut scopes = ScopeManager::new();
        scopes.register_value(ROOT_LAYER, "n", 1i32);
        let req = scopes.begin_request();
        let err = scopes
            .resolve_as::<String>("n", ROOT_LAYER, &req)
            .unwrap_err();
        assert!(matches!(err, Error::ProviderTypeMismatch { .. }));
    }
}
