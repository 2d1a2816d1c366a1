//! Recurring background task primitive.
//!
//! Every timer-driven loop in the engine (cache warming, metrics
//! reporting) runs through [`RecurringTask`] instead of ad hoc spawned
//! intervals, so they all share the same overlap-skipping, error logging,
//! and shutdown semantics.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct TaskInner {
    name: String,
    interval: Duration,
    run: TaskFn,
    immediate: bool,
    skip_if_running: bool,
    running: AtomicBool,
    disposed: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskInner {
    async fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if self.skip_if_running
            && self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            debug!(
                "[recurring-task:{}] previous run still active, skipping",
                self.name
            );
            return;
        } else if !self.skip_if_running {
            self.running.store(true, Ordering::SeqCst);
        }

        if let Err(e) = (self.run)().await {
            error!("[recurring-task:{}] execution failed: {}", self.name, e);
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Handle to a periodically executed task.
///
/// Cloning shares the underlying task: stopping or disposing through any
/// clone affects all of them.
///
/// # Example
///
/// ```no_run
/// use cache_steward::scheduler::RecurringTask;
/// use std::time::Duration;
///
/// # async fn example() -> cache_steward::Result<()> {
/// let task = RecurringTask::builder("metrics-flush", Duration::from_secs(60), || async {
///     // periodic work
///     Ok(())
/// })
/// .immediate(false)
/// .build()?;
///
/// task.trigger().await; // manual run, outside the schedule
/// task.dispose();       // stop and prevent restarts
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RecurringTask {
    inner: Arc<TaskInner>,
}

/// Builder for [`RecurringTask`].
pub struct RecurringTaskBuilder {
    name: String,
    interval: Duration,
    run: TaskFn,
    immediate: bool,
    skip_if_running: bool,
    auto_start: bool,
}

impl RecurringTaskBuilder {
    /// Whether to execute once right after start, before the first tick.
    /// Defaults to true.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Skip a tick while the previous iteration is still running.
    /// Defaults to true.
    pub fn skip_if_running(mut self, skip: bool) -> Self {
        self.skip_if_running = skip;
        self
    }

    /// Start the schedule immediately on build. Defaults to true.
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the interval is zero.
    pub fn build(self) -> Result<RecurringTask> {
        if self.interval.is_zero() {
            return Err(Error::ConfigError(format!(
                "recurring task '{}' requires a positive interval",
                self.name
            )));
        }
        let task = RecurringTask {
            inner: Arc::new(TaskInner {
                name: self.name,
                interval: self.interval,
                run: self.run,
                immediate: self.immediate,
                skip_if_running: self.skip_if_running,
                running: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                handle: Mutex::new(None),
            }),
        };
        if self.auto_start {
            task.start();
        }
        Ok(task)
    }
}

impl RecurringTask {
    /// Create a builder for a named task running `run` every `interval`.
    pub fn builder<F, Fut>(name: impl Into<String>, interval: Duration, run: F) -> RecurringTaskBuilder
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        RecurringTaskBuilder {
            name: name.into(),
            interval,
            run: Arc::new(move || Box::pin(run()) as BoxFuture<'static, Result<()>>),
            immediate: true,
            skip_if_running: true,
            auto_start: true,
        }
    }

    /// Start the schedule. No-op if already started or disposed.
    pub fn start(&self) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        let mut handle = self.inner.handle.lock().expect("task handle lock poisoned");
        if handle.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *handle = Some(tokio::spawn(async move {
            if inner.immediate {
                inner.execute().await;
            }
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.execute().await;
            }
        }));
        debug!(
            "[recurring-task:{}] started (every {:?})",
            self.inner.name, self.inner.interval
        );
    }

    /// Cancel the pending schedule. The task can be started again.
    pub fn stop(&self) {
        let mut handle = self.inner.handle.lock().expect("task handle lock poisoned");
        if let Some(handle) = handle.take() {
            handle.abort();
            debug!("[recurring-task:{}] stopped", self.inner.name);
        }
    }

    /// Stop and mark the task non-restartable.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.stop();
    }

    /// Run the task now, outside the schedule, and wait for it to finish.
    /// Honors the overlap-skipping and disposed flags.
    pub async fn trigger(&self) {
        self.inner.execute().await;
    }

    /// Whether an iteration is currently executing.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_task(
        interval: Duration,
        counter: Arc<AtomicU32>,
    ) -> RecurringTaskBuilder {
        RecurringTask::builder("test-task", interval, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = RecurringTask::builder("bad", Duration::ZERO, || async { Ok(()) })
            .auto_start(false)
            .build();
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = counting_task(Duration::from_millis(100), Arc::clone(&counter))
            .immediate(false)
            .build()
            .expect("Failed to build task");

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        task.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_run() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = counting_task(Duration::from_millis(100), Arc::clone(&counter))
            .build()
            .expect("Failed to build task");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        task.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_schedule() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = counting_task(Duration::from_millis(100), Arc::clone(&counter))
            .immediate(false)
            .build()
            .expect("Failed to build task");

        tokio::time::sleep(Duration::from_millis(150)).await;
        task.stop();
        let after_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_task_cannot_restart() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = counting_task(Duration::from_millis(100), Arc::clone(&counter))
            .immediate(false)
            .auto_start(false)
            .build()
            .expect("Failed to build task");

        task.dispose();
        task.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // trigger is also a no-op once disposed
        task.trigger().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trigger_runs_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = counting_task(Duration::from_secs(3_600), Arc::clone(&counter))
            .immediate(false)
            .auto_start(false)
            .build()
            .expect("Failed to build task");

        task.trigger().await;
        task.trigger().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        task.dispose();
    }

    #[tokio::test]
    async fn test_failing_run_does_not_kill_schedule() {
        let counter = Arc::new(AtomicU32::new(0));
        let failing_counter = Arc::clone(&counter);
        let task = RecurringTask::builder("failing", Duration::from_secs(3_600), move || {
            let counter = Arc::clone(&failing_counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Other("simulated failure".to_string()))
            }
        })
        .immediate(false)
        .auto_start(false)
        .build()
        .expect("Failed to build task");

        task.trigger().await;
        task.trigger().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        task.dispose();
    }
}
