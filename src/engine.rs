//! The engine: one constructed instance owning all caching and
//! resilience state.
//!
//! Version counters, mutation timestamps, availability state, view
//! freshness, and metrics counters all live inside a [`CacheEngine`]
//! instead of module-level globals, so tests build isolated engines and
//! applications inject one wherever data access happens. Cloning is
//! cheap and shares the same instance.

use crate::adaptive_ttl::AdaptiveTtl;
use crate::availability::{AvailabilitySnapshot, AvailabilityTracker};
use crate::backend::CacheBackend;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{Result, StoreError};
use crate::metrics::{LogSink, MetricsMonitor, MonitoringSink};
use crate::retry::RetryExecutor;
use crate::strategy::ResourceCache;
use crate::views::ViewRefreshCoordinator;
use crate::warming::{CacheWarmer, WarmingPlan};
use std::future::Future;
use std::sync::{Arc, Mutex};

struct EngineInner<B: CacheBackend> {
    config: EngineConfig,
    resources: ResourceCache<B>,
    adaptive_ttl: Arc<AdaptiveTtl>,
    availability: AvailabilityTracker,
    retry: RetryExecutor,
    views: ViewRefreshCoordinator,
    metrics: MetricsMonitor,
    warmer: Mutex<Option<Arc<CacheWarmer>>>,
}

/// Builder for [`CacheEngine`], allowing clock and monitoring-sink
/// injection.
pub struct CacheEngineBuilder<B: CacheBackend> {
    backend: B,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn MonitoringSink>,
}

impl<B: CacheBackend> CacheEngineBuilder<B> {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject a clock (deterministic tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Route monitoring events somewhere other than the log.
    pub fn with_monitoring_sink(mut self, sink: Arc<dyn MonitoringSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> CacheEngine<B> {
        let config = self.config.validated();
        let adaptive_ttl = Arc::new(AdaptiveTtl::new(
            config.adaptive_ttl.clone(),
            Arc::clone(&self.clock),
        ));
        let metrics = MetricsMonitor::new(config.monitoring.clone(), self.sink);
        let resources = ResourceCache::new(
            self.backend,
            &config,
            Arc::clone(&adaptive_ttl),
            metrics.clone(),
        );
        CacheEngine {
            inner: Arc::new(EngineInner {
                resources,
                adaptive_ttl,
                availability: AvailabilityTracker::new(
                    config.availability.clone(),
                    Arc::clone(&self.clock),
                ),
                retry: RetryExecutor::new(config.retry.clone()),
                views: ViewRefreshCoordinator::new(config.views.clone(), Arc::clone(&self.clock)),
                metrics,
                warmer: Mutex::new(None),
                config,
            }),
        }
    }
}

/// Resilience-and-caching engine over one cache backend and one data
/// store.
///
/// # Example
///
/// ```no_run
/// use cache_steward::backend::InMemoryBackend;
/// use cache_steward::engine::CacheEngine;
/// use cache_steward::error::StoreError;
///
/// # async fn example() -> Result<(), StoreError> {
/// let engine = CacheEngine::new(InMemoryBackend::new());
///
/// // Every data-store call goes through `execute`: retried when
/// // transient, observed by the availability tracker.
/// let names = engine
///     .execute(|| async {
///         // run the query against your store client
///         Ok::<_, StoreError>(vec!["squat".to_string()])
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct CacheEngine<B: CacheBackend> {
    inner: Arc<EngineInner<B>>,
}

impl<B: CacheBackend> Clone for CacheEngine<B> {
    fn clone(&self) -> Self {
        CacheEngine {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: CacheBackend> CacheEngine<B> {
    /// Engine with default configuration, system clock, and log sink.
    pub fn new(backend: B) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: B) -> CacheEngineBuilder<B> {
        CacheEngineBuilder {
            backend,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(LogSink),
        }
    }

    /// Run one logical data-store call: transient failures are retried
    /// with backoff, and the final outcome feeds the availability
    /// tracker. The caller sees the successful value or the original
    /// failure; availability is never surfaced as an error here.
    pub async fn execute<T, F, Fut>(&self, op: F) -> std::result::Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let inner = &self.inner;
        inner
            .availability
            .observe(|| inner.retry.execute(op))
            .await
    }

    /// Gate a derived-view read on its refresh interval; see
    /// [`ViewRefreshCoordinator::ensure_fresh`]. Run the actual refresh
    /// statement through [`execute`](Self::execute) inside `refresh` so
    /// it benefits from retry and availability tracking.
    pub async fn ensure_view_fresh<F, Fut>(
        &self,
        view: &str,
        refresh: F,
    ) -> std::result::Result<(), StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<(), StoreError>> + Send + 'static,
    {
        self.inner.views.ensure_fresh(view, refresh).await
    }

    /// Versioned resource cache: remember/get/set/invalidate/bump_scope.
    pub fn resources(&self) -> &ResourceCache<B> {
        &self.inner.resources
    }

    pub fn availability(&self) -> &AvailabilityTracker {
        &self.inner.availability
    }

    /// Shortcut for the current availability snapshot.
    pub fn availability_snapshot(&self) -> AvailabilitySnapshot {
        self.inner.availability.snapshot()
    }

    pub fn metrics(&self) -> &MetricsMonitor {
        &self.inner.metrics
    }

    pub fn views(&self) -> &ViewRefreshCoordinator {
        &self.inner.views
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start the periodic hit-ratio reporter. Call once from async
    /// startup; a no-op when monitoring is disabled.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for an invalid reporting interval.
    pub fn start_reporting(&self) -> Result<()> {
        self.inner.metrics.start_reporting()
    }

    /// Schedule background warming of `plan` per the engine's warming
    /// config. Replaces (and disposes) any previously scheduled plan.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for an invalid warming interval.
    pub fn schedule_warming(&self, plan: WarmingPlan) -> Result<()> {
        let warmer = CacheWarmer::schedule(plan, &self.inner.config.warming)?;
        let mut slot = self.inner.warmer.lock().expect("warmer lock poisoned");
        if let Some(previous) = slot.take() {
            previous.dispose();
        }
        *slot = warmer.map(Arc::new);
        Ok(())
    }

    /// Run a warming pass now, if warming is scheduled.
    pub async fn trigger_warming(&self) {
        let warmer = {
            let slot = self.inner.warmer.lock().expect("warmer lock poisoned");
            slot.clone()
        };
        if let Some(warmer) = warmer {
            warmer.trigger().await;
        }
    }

    /// Clear all process-local state: version counters, mutation
    /// timestamps, availability history, metrics counters, and view
    /// freshness. Cached payloads in the backend are untouched.
    pub fn reset(&self) {
        self.inner.resources.reset();
        self.inner.adaptive_ttl.reset();
        self.inner.availability.reset();
        self.inner.metrics.reset();
        self.inner.views.reset();
    }

    /// Stop background work (warming, metrics reporting). Idempotent;
    /// meant for process shutdown.
    pub fn dispose(&self) {
        let mut slot = self.inner.warmer.lock().expect("warmer lock poisoned");
        if let Some(warmer) = slot.take() {
            warmer.dispose();
        }
        drop(slot);
        self.inner.metrics.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn engine_with_clock() -> (CacheEngine<InMemoryBackend>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let engine = CacheEngine::builder(InMemoryBackend::new())
            .with_clock(Arc::clone(&clock) as Arc<dyn Clock>)
            .build();
        (engine, clock)
    }

    #[tokio::test]
    async fn test_execute_success_keeps_availability() {
        let (engine, _clock) = engine_with_clock();
        let value = engine
            .execute(|| async { Ok::<_, StoreError>(21) })
            .await
            .expect("Failed to execute");
        assert_eq!(value, 21);
        assert!(!engine.availability().is_temporarily_unavailable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_connectivity_failure_degrades() {
        let (engine, clock) = engine_with_clock();

        let result: std::result::Result<(), _> = engine
            .execute(|| async { Err(StoreError::initialization("could not connect to server")) })
            .await;
        assert!(result.is_err());
        assert!(engine.availability().is_temporarily_unavailable());

        // Past the cooldown the next check reports available again.
        clock.advance_millis(30_000);
        assert!(!engine.availability().is_temporarily_unavailable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_retries_transient_failures() {
        let (engine, _clock) = engine_with_clock();
        let attempts = Arc::new(AtomicU32::new(0));

        let attempts_ref = Arc::clone(&attempts);
        let value = engine
            .execute(move || {
                let attempts = Arc::clone(&attempts_ref);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StoreError::request("40001", "could not serialize access"))
                    } else {
                        Ok(9)
                    }
                }
            })
            .await
            .expect("Failed after retry");
        assert_eq!(value, 9);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // A transient non-connectivity failure never degrades availability.
        assert!(!engine.availability().is_temporarily_unavailable());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let (engine, _clock) = engine_with_clock();
        let clone = engine.clone();

        engine
            .execute::<(), _, _>(|| async {
                Err(StoreError::initialization("could not connect to server"))
            })
            .await
            .expect_err("Expected failure");
        assert!(clone.availability().is_temporarily_unavailable());
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let (engine, _clock) = engine_with_clock();
        engine
            .execute::<(), _, _>(|| async {
                Err(StoreError::initialization("could not connect to server"))
            })
            .await
            .expect_err("Expected failure");
        engine.reset();
        assert!(!engine.availability().is_temporarily_unavailable());
        assert_eq!(engine.metrics().snapshot().window_samples, 0);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let (engine, _clock) = engine_with_clock();
        engine.start_reporting().expect("Failed to start reporting");
        engine
            .schedule_warming(WarmingPlan::new())
            .expect("Failed to schedule warming");
        engine.dispose();
        engine.dispose();
    }

    #[tokio::test]
    async fn test_trigger_warming_without_schedule_is_noop() {
        let (engine, _clock) = engine_with_clock();
        engine.trigger_warming().await;
    }
}
