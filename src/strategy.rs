//! Versioned cache resource strategy.
//!
//! The single entry point for reading and invalidating cached resources.
//! Keys carry three version counters (global, per-resource, per-scope)
//! so invalidation is a counter increment: every key built under the old
//! counter becomes unreachable and simply expires in the backing store.
//! Nothing is enumerated or deleted except on exact-key `invalidate`.
//!
//! Concurrent misses on one key are collapsed into a single factory call:
//! the in-progress load itself is stored as a sentinel that late arrivals
//! await. This is engine state, never an assumed backend capability.

use crate::adaptive_ttl::{AdaptiveTtl, GLOBAL_SCOPE};
use crate::backend::CacheBackend;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::metrics::MetricsMonitor;
use crate::resource::CacheResource;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Version counters saturate here; strictly increasing for the process
/// lifetime, rollover is unreachable in practice.
const MAX_VERSION: u64 = u64::MAX - 1;

type SharedLoad = Shared<BoxFuture<'static, Result<Vec<u8>>>>;

/// In-flight factory call, stored as the single-flight sentinel. The id
/// lets completers remove exactly the entry they attached to, never a
/// successor registered for the same key.
#[derive(Clone)]
struct InflightLoad {
    id: u64,
    load: SharedLoad,
}

/// Versioned, scope-aware cache over a [`CacheBackend`].
pub struct ResourceCache<B: CacheBackend> {
    backend: B,
    namespace: String,
    global_version: u64,
    resource_versions: HashMap<String, u64>,
    ttl_overrides: HashMap<String, u64>,
    /// (resource name, scope key) → version; created lazily at 1, only
    /// ever incremented.
    scope_versions: DashMap<(String, String), u64>,
    inflight: Arc<DashMap<String, InflightLoad>>,
    next_load_id: std::sync::atomic::AtomicU64,
    adaptive_ttl: Arc<AdaptiveTtl>,
    metrics: MetricsMonitor,
}

impl<B: CacheBackend> ResourceCache<B> {
    pub fn new(
        backend: B,
        config: &EngineConfig,
        adaptive_ttl: Arc<AdaptiveTtl>,
        metrics: MetricsMonitor,
    ) -> Self {
        ResourceCache {
            backend,
            namespace: config.namespace.clone(),
            global_version: config.versioning.global_version,
            resource_versions: config.versioning.resources.clone(),
            ttl_overrides: config.ttl_overrides.clone(),
            scope_versions: DashMap::new(),
            inflight: Arc::new(DashMap::new()),
            next_load_id: std::sync::atomic::AtomicU64::new(0),
            adaptive_ttl,
            metrics,
        }
    }

    /// The fully versioned key a resource instance lives under right now.
    pub fn build_key<R: CacheResource>(&self, params: &R::Params) -> String {
        let scope = Self::effective_scope::<R>(params);
        format!(
            "{}:{}:gv{}:rv{}:v{}",
            self.namespace,
            R::base_key(params),
            self.global_version,
            self.resource_version(R::name()),
            self.scope_version_for(R::name(), &scope),
        )
    }

    /// Current per-scope version for a resource instance.
    pub fn scope_version<R: CacheResource>(&self, params: &R::Params) -> u64 {
        let scope = Self::effective_scope::<R>(params);
        self.scope_version_for(R::name(), &scope)
    }

    /// Read through the cache, computing on miss.
    ///
    /// On a hit the cached payload is decoded and returned. On a miss the
    /// factory runs once per key, however many callers arrive, and its
    /// result is stored under the adaptive TTL. Backend faults on either
    /// path degrade to a recompute instead of failing the read; factory
    /// failures propagate to every attached caller.
    ///
    /// # Errors
    ///
    /// The factory's error, or a serialization failure for its result.
    pub async fn remember<R, T, F, Fut>(&self, params: &R::Params, factory: F) -> Result<T>
    where
        R: CacheResource,
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = self.build_key::<R>(params);
        let scope = R::scope_key(params);
        let ttl = self.resolve_ttl::<R>(scope.as_deref());

        match self.backend.get(&key).await {
            Ok(Some(bytes)) => match deserialize_from_cache::<T>(&bytes) {
                Ok(value) => {
                    self.metrics.record_hit(self.backend.tier());
                    return Ok(value);
                }
                Err(e) => {
                    // Corrupt or outdated entry: evict and recompute.
                    warn!("evicting undecodable cache entry {}: {}", key, e);
                    let _ = self.backend.delete(&key).await;
                    self.metrics.record_miss();
                }
            },
            Ok(None) => self.metrics.record_miss(),
            Err(e) => {
                warn!("cache read failed for {}, computing directly: {}", key, e);
                self.metrics.record_miss();
            }
        }

        let (load, created) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let id = self
                    .next_load_id
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let factory_fut = factory();
                let fut = async move {
                    let value = factory_fut.await?;
                    serialize_for_cache(&value)
                }
                .boxed()
                .shared();
                let load = InflightLoad { id, load: fut };
                entry.insert(load.clone());
                (load, true)
            }
        };

        let result = load.load.await;
        if created {
            if let Ok(bytes) = &result {
                // A failed cache write must not fail the request.
                if let Err(e) = self.backend.set(&key, bytes.clone(), ttl).await {
                    warn!("cache set failed for {}: {}", key, e);
                }
            }
        }
        self.inflight
            .remove_if(&key, |_, stored| stored.id == load.id);

        let bytes = result?;
        deserialize_from_cache(&bytes)
    }

    /// Direct read, bypassing the factory. Absent, expired, undecodable,
    /// or unreachable entries are all a `None`.
    pub async fn get<R, T>(&self, params: &R::Params) -> Option<T>
    where
        R: CacheResource,
        T: DeserializeOwned,
    {
        let key = self.build_key::<R>(params);
        let bytes = match self.backend.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.metrics.record_miss();
                return None;
            }
            Err(e) => {
                warn!("cache read failed for {}: {}", key, e);
                self.metrics.record_miss();
                return None;
            }
        };
        match deserialize_from_cache::<T>(&bytes) {
            Ok(value) => {
                self.metrics.record_hit(self.backend.tier());
                Some(value)
            }
            Err(e) => {
                warn!("evicting undecodable cache entry {}: {}", key, e);
                let _ = self.backend.delete(&key).await;
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Direct write under the adaptive TTL.
    ///
    /// # Errors
    ///
    /// Serialization failures only; a backend write fault is logged and
    /// swallowed, matching the cache's soft-dependency contract.
    pub async fn set<R, T>(&self, params: &R::Params, value: &T) -> Result<()>
    where
        R: CacheResource,
        T: Serialize,
    {
        let key = self.build_key::<R>(params);
        let scope = R::scope_key(params);
        let ttl = self.resolve_ttl::<R>(scope.as_deref());
        let bytes = serialize_for_cache(value)?;
        if let Err(e) = self.backend.set(&key, bytes, ttl).await {
            warn!("cache set failed for {}: {}", key, e);
        }
        Ok(())
    }

    /// Delete the exact current-version entry and record the mutation.
    ///
    /// Use when one scope maps to exactly one overwritten payload; use
    /// [`bump_scope`](Self::bump_scope) when many parameterizations share
    /// the scope.
    ///
    /// # Errors
    ///
    /// Backend deletion failures propagate: the caller must know the
    /// stale entry may still be served.
    pub async fn invalidate<R: CacheResource>(&self, params: &R::Params) -> Result<()> {
        let key = self.build_key::<R>(params);
        let scope = R::scope_key(params);
        self.adaptive_ttl.record_mutation(R::name(), scope.as_deref());
        self.backend.delete(&key).await
    }

    /// Increment the scope version, orphaning every cached
    /// parameterization of this scope at once, and record the mutation.
    /// Orphaned entries expire naturally in the backing store.
    ///
    /// Returns the new version.
    pub fn bump_scope<R: CacheResource>(&self, params: &R::Params) -> u64 {
        let scope = Self::effective_scope::<R>(params);
        let mut entry = self
            .scope_versions
            .entry((R::name().to_string(), scope.clone()))
            .or_insert(1);
        *entry = entry.saturating_add(1).min(MAX_VERSION);
        let version = *entry;
        drop(entry);
        self.adaptive_ttl.record_mutation(R::name(), Some(&scope));
        debug!(
            "» scope bump {}:{} -> v{}",
            R::name(),
            scope,
            version
        );
        version
    }

    /// Forget all scope versions and in-flight loads (test isolation).
    /// Cached payloads in the backend are untouched.
    pub fn reset(&self) {
        self.scope_versions.clear();
        self.inflight.clear();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn effective_scope<R: CacheResource>(params: &R::Params) -> String {
        R::scope_key(params).unwrap_or_else(|| GLOBAL_SCOPE.to_string())
    }

    fn resource_version(&self, name: &str) -> u64 {
        self.resource_versions.get(name).copied().unwrap_or(1)
    }

    fn scope_version_for(&self, name: &str, scope: &str) -> u64 {
        *self
            .scope_versions
            .entry((name.to_string(), scope.to_string()))
            .or_insert(1)
    }

    fn resolve_ttl<R: CacheResource>(&self, scope: Option<&str>) -> u64 {
        let base = self
            .ttl_overrides
            .get(R::name())
            .copied()
            .unwrap_or_else(R::base_ttl_seconds);
        self.adaptive_ttl.ttl_seconds(R::name(), scope, base)
    }
}
