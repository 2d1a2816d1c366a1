//! Cache hit/miss monitoring.
//!
//! Rolling counters drained on a fixed reporting interval: the window
//! trades temporal precision for O(1) memory. When a drained window has
//! enough samples and its hit ratio falls below the warn threshold, an
//! event is pushed into the monitoring sink; otherwise the window resets
//! silently. Recording never blocks or fails the read path.

use crate::backend::CacheTier;
use crate::config::MonitoringConfig;
use crate::error::Result;
use crate::scheduler::RecurringTask;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Severity of a monitoring event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// An event for the monitoring pipeline.
#[derive(Clone, Debug)]
pub struct MonitoringEvent {
    pub category: String,
    pub severity: Severity,
    pub message: String,
    /// The component the event is about.
    pub resource: Option<String>,
    pub metadata: serde_json::Value,
}

/// Destination for monitoring events.
///
/// Implement this to forward events to your alerting pipeline; recording
/// must not block the caller.
pub trait MonitoringSink: Send + Sync {
    fn record(&self, event: MonitoringEvent);
}

/// Default sink: events go to the log.
#[derive(Clone, Default)]
pub struct LogSink;

impl MonitoringSink for LogSink {
    fn record(&self, event: MonitoringEvent) {
        match event.severity {
            Severity::Warning => warn!(
                "[monitoring:{}] {} {}",
                event.category, event.message, event.metadata
            ),
            Severity::Critical => error!(
                "[monitoring:{}] {} {}",
                event.category, event.message, event.metadata
            ),
        }
    }
}

/// Counters for one reporting window.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub memory_hits: u64,
    pub remote_hits: u64,
    pub hit_ratio: f64,
    pub window_samples: u64,
}

struct MetricsInner {
    config: MonitoringConfig,
    sink: Arc<dyn MonitoringSink>,
    hits: AtomicU64,
    misses: AtomicU64,
    memory_hits: AtomicU64,
    remote_hits: AtomicU64,
    reporter: Mutex<Option<RecurringTask>>,
}

/// Hit/miss monitor with threshold alerting.
///
/// Cloning shares the same counters and reporter.
#[derive(Clone)]
pub struct MetricsMonitor {
    inner: Arc<MetricsInner>,
}

impl MetricsMonitor {
    pub fn new(config: MonitoringConfig, sink: Arc<dyn MonitoringSink>) -> Self {
        MetricsMonitor {
            inner: Arc::new(MetricsInner {
                config,
                sink,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                memory_hits: AtomicU64::new(0),
                remote_hits: AtomicU64::new(0),
                reporter: Mutex::new(None),
            }),
        }
    }

    /// Count a cache hit against its storage tier. No-op when disabled.
    pub fn record_hit(&self, tier: CacheTier) {
        if !self.inner.config.enabled {
            return;
        }
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        match tier {
            CacheTier::Memory => self.inner.memory_hits.fetch_add(1, Ordering::Relaxed),
            CacheTier::Remote => self.inner.remote_hits.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Count a cache miss. No-op when disabled.
    pub fn record_miss(&self) {
        if !self.inner.config.enabled {
            return;
        }
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Current window counters, without draining them.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        Self::build_snapshot(
            hits,
            misses,
            self.inner.memory_hits.load(Ordering::Relaxed),
            self.inner.remote_hits.load(Ordering::Relaxed),
        )
    }

    /// Start the periodic reporter. No-op when monitoring is disabled or
    /// the reporter already runs.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for a zero reporting interval.
    pub fn start_reporting(&self) -> Result<()> {
        if !self.inner.config.enabled {
            return Ok(());
        }
        let mut reporter = self.inner.reporter.lock().expect("reporter lock poisoned");
        if reporter.is_some() {
            return Ok(());
        }
        let monitor = self.clone();
        let task = RecurringTask::builder(
            "cache-hit-miss-monitor",
            Duration::from_millis(self.inner.config.report_interval_ms),
            move || {
                let monitor = monitor.clone();
                async move {
                    monitor.report();
                    Ok(())
                }
            },
        )
        .immediate(false)
        .build()?;
        *reporter = Some(task);
        Ok(())
    }

    /// Dispose the reporter and zero the counters.
    pub fn shutdown(&self) {
        let mut reporter = self.inner.reporter.lock().expect("reporter lock poisoned");
        if let Some(task) = reporter.take() {
            task.dispose();
        }
        drop(reporter);
        self.reset();
    }

    /// Zero the counters without reporting.
    pub fn reset(&self) {
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);
        self.inner.memory_hits.store(0, Ordering::Relaxed);
        self.inner.remote_hits.store(0, Ordering::Relaxed);
    }

    /// Drain the window and emit an event if the hit ratio warrants one.
    fn report(&self) {
        if !self.inner.config.enabled {
            return;
        }
        let Some(snapshot) = self.drain_window() else {
            return;
        };
        if snapshot.window_samples < self.inner.config.min_samples {
            return;
        }
        if snapshot.hit_ratio >= self.inner.config.warn_threshold {
            return;
        }
        let severity = if snapshot.hit_ratio < self.inner.config.critical_threshold {
            Severity::Critical
        } else {
            Severity::Warning
        };
        self.inner.sink.record(MonitoringEvent {
            category: "cache".to_string(),
            severity,
            message: "Cache hit ratio dropped below target".to_string(),
            resource: Some("cache-store".to_string()),
            metadata: serde_json::json!({
                "hits": snapshot.hits,
                "misses": snapshot.misses,
                "memoryHits": snapshot.memory_hits,
                "remoteHits": snapshot.remote_hits,
                "hitRatio": snapshot.hit_ratio,
                "windowSamples": snapshot.window_samples,
                "warnThreshold": self.inner.config.warn_threshold,
                "criticalThreshold": self.inner.config.critical_threshold,
                "intervalMs": self.inner.config.report_interval_ms,
            }),
        });
    }

    fn drain_window(&self) -> Option<MetricsSnapshot> {
        let hits = self.inner.hits.swap(0, Ordering::Relaxed);
        let misses = self.inner.misses.swap(0, Ordering::Relaxed);
        let memory_hits = self.inner.memory_hits.swap(0, Ordering::Relaxed);
        let remote_hits = self.inner.remote_hits.swap(0, Ordering::Relaxed);
        if hits + misses == 0 {
            return None;
        }
        Some(Self::build_snapshot(hits, misses, memory_hits, remote_hits))
    }

    fn build_snapshot(hits: u64, misses: u64, memory_hits: u64, remote_hits: u64) -> MetricsSnapshot {
        let total = hits + misses;
        let ratio = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        MetricsSnapshot {
            hits,
            misses,
            memory_hits,
            remote_hits,
            hit_ratio: ratio,
            window_samples: total,
        }
    }
}
