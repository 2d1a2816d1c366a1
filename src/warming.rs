//! Background cache warming.
//!
//! Pre-populates hot resources so the first reader after a deploy or an
//! invalidation doesn't pay the full computation cost. A warming run
//! executes a plan in three phases: cheap global/catalog tasks, then a
//! bounded sample of the most-recently-active scopes, each warmed by the
//! per-scope tasks. Every step is isolated: one failing scope logs a
//! warning and the run moves on. Warming never runs on a request path.

use crate::config::WarmingConfig;
use crate::error::Result;
use crate::scheduler::RecurringTask;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

type WarmFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;
type ScopeWarmFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type SamplerFn = Arc<dyn Fn(usize) -> BoxFuture<'static, Result<Vec<String>>> + Send + Sync>;

/// One unconditional warming step (catalogs, small enumerable lists).
struct WarmTask {
    name: String,
    run: WarmFn,
}

/// One per-scope warming step (a profile's costliest resources).
struct ScopeWarmTask {
    name: String,
    run: ScopeWarmFn,
}

/// What a warming run does. Built once at startup and handed to
/// [`CacheWarmer::schedule`].
///
/// # Example
///
/// ```no_run
/// use cache_steward::warming::WarmingPlan;
///
/// let plan = WarmingPlan::new()
///     .global_task("training-catalog", || async {
///         // recompute + set the catalog resources
///         Ok(())
///     })
///     .sample_scopes(|_limit| async move {
///         // e.g. SELECT id FROM profiles ORDER BY updated_at DESC LIMIT $limit
///         Ok(vec!["p-1".to_string()])
///     })
///     .per_scope_task("profile-summary", |_profile_id| async move {
///         // warm that profile's summary
///         Ok(())
///     });
/// ```
pub struct WarmingPlan {
    global: Vec<WarmTask>,
    sampler: Option<SamplerFn>,
    per_scope: Vec<ScopeWarmTask>,
}

impl WarmingPlan {
    pub fn new() -> Self {
        WarmingPlan {
            global: Vec::new(),
            sampler: None,
            per_scope: Vec::new(),
        }
    }

    /// Add an unconditional task, run first on every warming pass.
    pub fn global_task<F, Fut>(mut self, name: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.global.push(WarmTask {
            name: name.into(),
            run: Arc::new(move || Box::pin(run()) as BoxFuture<'static, Result<()>>),
        });
        self
    }

    /// Provide the most-recently-active scope ids, at most `limit` of them.
    pub fn sample_scopes<F, Fut>(mut self, sampler: F) -> Self
    where
        F: Fn(usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<String>>> + Send + 'static,
    {
        self.sampler = Some(Arc::new(move |limit| {
            Box::pin(sampler(limit)) as BoxFuture<'static, Result<Vec<String>>>
        }));
        self
    }

    /// Add a task run once per sampled scope.
    pub fn per_scope_task<F, Fut>(mut self, name: impl Into<String>, run: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.per_scope.push(ScopeWarmTask {
            name: name.into(),
            run: Arc::new(move |scope| Box::pin(run(scope)) as BoxFuture<'static, Result<()>>),
        });
        self
    }

    async fn execute(&self, sample_size: usize) {
        for task in &self.global {
            if let Err(e) = (task.run)().await {
                warn!("[cache-warming] global task '{}' failed: {}", task.name, e);
            }
        }

        if self.per_scope.is_empty() {
            info!("[cache-warming] critical caches refreshed");
            return;
        }
        let Some(sampler) = &self.sampler else {
            info!("[cache-warming] critical caches refreshed");
            return;
        };

        let scopes = match sampler(sample_size).await {
            Ok(scopes) => scopes,
            Err(e) => {
                warn!("[cache-warming] scope sampling failed: {}", e);
                return;
            }
        };

        for scope in scopes.into_iter().take(sample_size) {
            for task in &self.per_scope {
                if let Err(e) = (task.run)(scope.clone()).await {
                    warn!(
                        "[cache-warming] task '{}' failed for scope {}: {}",
                        task.name, scope, e
                    );
                }
            }
        }
        info!("[cache-warming] critical caches refreshed");
    }
}

impl Default for WarmingPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the scheduled warming loop.
pub struct CacheWarmer {
    task: RecurringTask,
    startup: Mutex<Option<JoinHandle<()>>>,
}

impl CacheWarmer {
    /// Schedule `plan`: after `startup_delay_ms` it runs once, then every
    /// `interval_ms`. Returns `None` when warming is disabled.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for a zero interval.
    pub fn schedule(plan: WarmingPlan, config: &WarmingConfig) -> Result<Option<CacheWarmer>> {
        if !config.enabled {
            debug!("[cache-warming] disabled by configuration");
            return Ok(None);
        }

        let plan = Arc::new(plan);
        let sample_size = config.profile_sample_size;
        let task = RecurringTask::builder(
            "cache-warming",
            Duration::from_millis(config.interval_ms),
            move || {
                let plan = Arc::clone(&plan);
                async move {
                    plan.execute(sample_size).await;
                    Ok(())
                }
            },
        )
        .immediate(false)
        .auto_start(false)
        .build()?;

        let startup_task = task.clone();
        let startup_delay = Duration::from_millis(config.startup_delay_ms);
        let startup = tokio::spawn(async move {
            tokio::time::sleep(startup_delay).await;
            startup_task.trigger().await;
            startup_task.start();
        });

        Ok(Some(CacheWarmer {
            task,
            startup: Mutex::new(Some(startup)),
        }))
    }

    /// Run a warming pass now, outside the schedule.
    pub async fn trigger(&self) {
        self.task.trigger().await;
    }

    /// Cancel the startup timer and the schedule; terminal.
    pub fn dispose(&self) {
        if let Some(startup) = self
            .startup
            .lock()
            .expect("warming startup lock poisoned")
            .take()
        {
            startup.abort();
        }
        self.task.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(enabled: bool) -> WarmingConfig {
        WarmingConfig {
            enabled,
            startup_delay_ms: 1_000,
            interval_ms: 60_000,
            profile_sample_size: 2,
        }
    }

    fn counting_plan(counter: &Arc<AtomicU32>) -> WarmingPlan {
        let counter = Arc::clone(counter);
        WarmingPlan::new().global_task("count", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_disabled_config_schedules_nothing() {
        let counter = Arc::new(AtomicU32::new(0));
        let warmer = CacheWarmer::schedule(counting_plan(&counter), &config(false))
            .expect("Failed to schedule");
        assert!(warmer.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_delay_then_interval() {
        let counter = Arc::new(AtomicU32::new(0));
        let warmer = CacheWarmer::schedule(counting_plan(&counter), &config(true))
            .expect("Failed to schedule")
            .expect("Expected a warmer");

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(60_000)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        warmer.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_before_startup_cancels_everything() {
        let counter = Arc::new(AtomicU32::new(0));
        let warmer = CacheWarmer::schedule(counting_plan(&counter), &config(true))
            .expect("Failed to schedule")
            .expect("Expected a warmer");

        warmer.dispose();
        tokio::time::sleep(Duration::from_millis(120_000)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trigger_runs_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let warmer = CacheWarmer::schedule(counting_plan(&counter), &config(true))
            .expect("Failed to schedule")
            .expect("Expected a warmer");

        warmer.trigger().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        warmer.dispose();
    }

    #[tokio::test]
    async fn test_scope_failures_are_isolated() {
        let warmed = Arc::new(Mutex::new(Vec::new()));
        let warmed_ref = Arc::clone(&warmed);

        let plan = WarmingPlan::new()
            .sample_scopes(|_limit| async {
                Ok(vec![
                    "p-1".to_string(),
                    "p-2".to_string(),
                    "p-3".to_string(),
                ])
            })
            .per_scope_task("summary", move |scope| {
                let warmed = Arc::clone(&warmed_ref);
                async move {
                    if scope == "p-2" {
                        return Err(crate::error::Error::Other("profile gone".to_string()));
                    }
                    warmed.lock().expect("Failed to lock").push(scope);
                    Ok(())
                }
            });

        // Sample size caps how many scopes are warmed per run.
        plan.execute(3).await;
        let warmed = warmed.lock().expect("Failed to lock");
        assert_eq!(*warmed, vec!["p-1".to_string(), "p-3".to_string()]);
    }

    #[tokio::test]
    async fn test_sample_size_bounds_scopes() {
        let warmed = Arc::new(AtomicU32::new(0));
        let warmed_ref = Arc::clone(&warmed);

        let plan = WarmingPlan::new()
            .sample_scopes(|_limit| async {
                Ok((0..10).map(|i| format!("p-{}", i)).collect())
            })
            .per_scope_task("summary", move |_scope| {
                let warmed = Arc::clone(&warmed_ref);
                async move {
                    warmed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });

        plan.execute(2).await;
        assert_eq!(warmed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_global_failure_does_not_stop_run() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_ref = Arc::clone(&counter);

        let plan = WarmingPlan::new()
            .global_task("failing", || async {
                Err(crate::error::Error::Other("store offline".to_string()))
            })
            .global_task("counting", move || {
                let counter = Arc::clone(&counter_ref);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });

        plan.execute(5).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
