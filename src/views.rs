//! Materialized view refresh coordination.
//!
//! Reads against a derived aggregate view call
//! [`ViewRefreshCoordinator::ensure_fresh`] first. Refreshes are
//! interval-gated per view and single-flight: while one refresh is in
//! flight, late callers attach to it instead of starting another. A
//! view's state is seeded with "now" on first access so a freshly started
//! process serves existing view data instead of blocking its first read
//! on an expensive refresh.
//!
//! The gate is measured from the last *successful* refresh: a failing
//! view is retried by the next read rather than waiting out a full
//! interval with stale data.

use crate::clock::Clock;
use crate::config::ViewRefreshConfig;
use crate::error::StoreError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

type SharedRefresh = Shared<BoxFuture<'static, Result<(), StoreError>>>;

struct ViewState {
    last_refreshed_at: u64,
    inflight: Option<SharedRefresh>,
}

enum Plan {
    Fresh,
    Attach(SharedRefresh),
    Start(SharedRefresh),
}

/// Single-flight, interval-gated refresher for derived views.
pub struct ViewRefreshCoordinator {
    config: ViewRefreshConfig,
    clock: Arc<dyn Clock>,
    views: Arc<Mutex<HashMap<String, ViewState>>>,
}

impl ViewRefreshCoordinator {
    pub fn new(config: ViewRefreshConfig, clock: Arc<dyn Clock>) -> Self {
        ViewRefreshCoordinator {
            config,
            clock,
            views: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Make sure `view` is fresh enough to read, refreshing it through
    /// `refresh` if its interval elapsed.
    ///
    /// Concurrent callers observe one shared outcome.
    ///
    /// # Errors
    ///
    /// The refresh failure, passed through to every attached caller; the
    /// freshness timestamp is left untouched so the next read retries.
    pub async fn ensure_fresh<F, Fut>(&self, view: &str, refresh: F) -> Result<(), StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        let plan = self.plan_refresh(view, refresh);
        match plan {
            Plan::Fresh => Ok(()),
            Plan::Attach(load) => load.await,
            Plan::Start(load) => load.await,
        }
    }

    /// Epoch millis of the view's last successful refresh, if it has been
    /// accessed at all.
    pub fn last_refreshed_at(&self, view: &str) -> Option<u64> {
        let views = self.views.lock().expect("view state lock poisoned");
        views.get(view).map(|state| state.last_refreshed_at)
    }

    /// Drop all view bookkeeping (test isolation).
    pub fn reset(&self) {
        self.views.lock().expect("view state lock poisoned").clear();
    }

    fn plan_refresh<F, Fut>(&self, view: &str, refresh: F) -> Plan
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        let now = self.clock.now_millis();
        let interval = self.config.interval_ms(view);
        let mut views = self.views.lock().expect("view state lock poisoned");
        let state = views.entry(view.to_string()).or_insert_with(|| ViewState {
            last_refreshed_at: now,
            inflight: None,
        });

        if let Some(inflight) = &state.inflight {
            return Plan::Attach(inflight.clone());
        }
        if interval > 0 && now.saturating_sub(state.last_refreshed_at) < interval {
            return Plan::Fresh;
        }

        let views_ref = Arc::clone(&self.views);
        let clock = Arc::clone(&self.clock);
        let view_name = view.to_string();
        let refresh_fut = refresh();
        let load = async move {
            let result = refresh_fut.await;
            let mut views = views_ref.lock().expect("view state lock poisoned");
            if let Some(state) = views.get_mut(&view_name) {
                state.inflight = None;
                match &result {
                    Ok(()) => state.last_refreshed_at = clock.now_millis(),
                    Err(e) => warn!(
                        "materialized_view_refresh_failed view={} error={}",
                        view_name, e
                    ),
                }
            }
            result
        }
        .boxed()
        .shared();
        state.inflight = Some(load.clone());
        Plan::Start(load)
    }
}
