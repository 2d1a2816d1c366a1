//! Data-store availability tracking.
//!
//! A two-state (available/degraded) machine fed by the classifier's
//! connectivity verdicts. A connectivity failure opens a cooldown window
//! during which the store is assumed unhealthy; recovery is observed
//! lazily on the next status read after the window elapses; there is no
//! background timer. Snapshots are cached briefly so health endpoints can
//! poll aggressively without contending on the state lock.

use crate::classifier::classify;
use crate::clock::Clock;
use crate::config::AvailabilityConfig;
use crate::error::StoreError;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Available,
    Degraded,
}

/// What was wrong the last time a call failed.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorSnapshot {
    pub code: Option<String>,
    pub message: String,
    pub target: Option<String>,
    /// Epoch millis of the failure.
    pub at: u64,
}

impl ErrorSnapshot {
    fn from_error(error: &StoreError, at: u64) -> Self {
        ErrorSnapshot {
            code: error.code().map(str::to_string),
            message: error.message().to_string(),
            target: error.target().map(str::to_string),
            at,
        }
    }
}

/// Point-in-time availability report.
#[derive(Clone, Debug, Serialize)]
pub struct AvailabilitySnapshot {
    pub status: AvailabilityStatus,
    pub degraded_until: Option<u64>,
    /// Remaining cooldown, for Retry-After style headers.
    pub retry_after_ms: Option<u64>,
    pub last_failure_at: Option<u64>,
    pub last_success_at: Option<u64>,
    pub last_error: Option<ErrorSnapshot>,
}

struct TrackerState {
    status: AvailabilityStatus,
    degraded_until: u64,
    last_failure_at: Option<u64>,
    last_success_at: Option<u64>,
    last_error: Option<ErrorSnapshot>,
    cached_snapshot: Option<(AvailabilitySnapshot, u64)>,
}

impl TrackerState {
    fn new() -> Self {
        TrackerState {
            status: AvailabilityStatus::Available,
            degraded_until: 0,
            last_failure_at: None,
            last_success_at: None,
            last_error: None,
            cached_snapshot: None,
        }
    }

    /// Lazy degraded → available transition once the cooldown elapsed.
    fn refresh_if_due(&mut self, now: u64) {
        if self.status == AvailabilityStatus::Degraded && self.degraded_until <= now {
            self.status = AvailabilityStatus::Available;
            self.degraded_until = 0;
            self.cached_snapshot = None;
        }
    }
}

/// Tracks whether the data store should be treated as reachable.
pub struct AvailabilityTracker {
    config: AvailabilityConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

impl AvailabilityTracker {
    pub fn new(config: AvailabilityConfig, clock: Arc<dyn Clock>) -> Self {
        AvailabilityTracker {
            config,
            clock,
            state: Mutex::new(TrackerState::new()),
        }
    }

    /// Run `op`, feeding its outcome into the state machine. The result is
    /// passed through unchanged; availability is never surfaced as an error.
    pub async fn observe<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure(&error);
                Err(error)
            }
        }
    }

    /// Record a successful store call. Leaving degraded mode logs the
    /// outage duration.
    pub fn record_success(&self) {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().expect("availability state lock poisoned");
        let was_degraded = state.status == AvailabilityStatus::Degraded;
        state.status = AvailabilityStatus::Available;
        state.degraded_until = 0;
        state.last_success_at = Some(now);
        state.cached_snapshot = None;
        if was_degraded {
            match state.last_failure_at {
                Some(failed_at) => warn!(
                    "[store] connectivity restored after {}ms outage",
                    now.saturating_sub(failed_at)
                ),
                None => warn!("[store] connectivity restored after temporary outage"),
            }
        }
    }

    /// Record a failed store call. Only connectivity-classified failures
    /// enter degraded mode; transient contention does not.
    pub fn record_failure(&self, error: &StoreError) {
        if !classify(error).is_connectivity {
            return;
        }
        let now = self.clock.now_millis();
        let snapshot = ErrorSnapshot::from_error(error, now);
        let mut state = self.state.lock().expect("availability state lock poisoned");
        state.status = AvailabilityStatus::Degraded;
        state.degraded_until = now + self.config.degraded_cooldown_ms;
        state.last_failure_at = Some(now);
        state.last_error = Some(snapshot);
        state.cached_snapshot = None;
        error!(
            "[store] entering degraded mode for {}ms due to connectivity issue ({})",
            self.config.degraded_cooldown_ms,
            error.describe()
        );
    }

    /// Whether callers should currently avoid the store.
    pub fn is_temporarily_unavailable(&self) -> bool {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().expect("availability state lock poisoned");
        state.refresh_if_due(now);
        state.status == AvailabilityStatus::Degraded
    }

    /// Current availability, cached for `health_snapshot_ttl_ms` and
    /// invalidated on every transition.
    pub fn snapshot(&self) -> AvailabilitySnapshot {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().expect("availability state lock poisoned");
        state.refresh_if_due(now);
        if let Some((snapshot, generated_at)) = &state.cached_snapshot {
            if now.saturating_sub(*generated_at) < self.config.health_snapshot_ttl_ms {
                return snapshot.clone();
            }
        }
        let remaining = if state.status == AvailabilityStatus::Degraded {
            state.degraded_until.saturating_sub(now)
        } else {
            0
        };
        let snapshot = AvailabilitySnapshot {
            status: state.status,
            degraded_until: (state.degraded_until > 0).then_some(state.degraded_until),
            retry_after_ms: (remaining > 0).then_some(remaining),
            last_failure_at: state.last_failure_at,
            last_success_at: state.last_success_at,
            last_error: state.last_error.clone(),
        };
        state.cached_snapshot = Some((snapshot.clone(), now));
        snapshot
    }

    /// Drop all recorded history (test isolation).
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("availability state lock poisoned");
        *state = TrackerState::new();
    }
}
