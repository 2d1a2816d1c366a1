//! Adaptive TTL control.
//!
//! Maps (resource, scope, age since last mutation) to a TTL multiplier:
//! recently-mutated data is likely to mutate again soon, so it is cached
//! briefly; data that has been stable for a long time is cached
//! aggressively. Mutation timestamps are process-local and never deleted.

use crate::clock::Clock;
use crate::config::AdaptiveTtlConfig;
use dashmap::DashMap;
use std::sync::Arc;

/// Scope marker for resources without an owner.
pub(crate) const GLOBAL_SCOPE: &str = "__global";

fn effective_scope(scope: Option<&str>) -> &str {
    match scope {
        Some(key) if !key.is_empty() => key,
        _ => GLOBAL_SCOPE,
    }
}

/// Mutation-frequency-aware TTL controller.
pub struct AdaptiveTtl {
    config: AdaptiveTtlConfig,
    clock: Arc<dyn Clock>,
    /// (resource name, scope key) → epoch millis of the last mutation.
    mutations: DashMap<(String, String), u64>,
}

impl AdaptiveTtl {
    pub fn new(config: AdaptiveTtlConfig, clock: Arc<dyn Clock>) -> Self {
        AdaptiveTtl {
            config,
            clock,
            mutations: DashMap::new(),
        }
    }

    /// Note that `resource`/`scope` just changed. No-op when disabled.
    pub fn record_mutation(&self, resource: &str, scope: Option<&str>) {
        if !self.config.enabled {
            return;
        }
        self.mutations.insert(
            (resource.to_string(), effective_scope(scope).to_string()),
            self.clock.now_millis(),
        );
    }

    /// Resolve the TTL for a write: `round(base_ttl × multiplier)`,
    /// floored at one second. With adaptation disabled, or before any
    /// mutation was observed, the base TTL is returned untouched.
    pub fn ttl_seconds(&self, resource: &str, scope: Option<&str>, base_ttl_seconds: u64) -> u64 {
        if !self.config.enabled {
            return base_ttl_seconds;
        }
        let multiplier = self.multiplier(self.age_seconds(resource, scope));
        let ttl = (base_ttl_seconds as f64 * multiplier).round() as u64;
        ttl.max(1)
    }

    fn age_seconds(&self, resource: &str, scope: Option<&str>) -> Option<u64> {
        let key = (resource.to_string(), effective_scope(scope).to_string());
        let last_mutation = *self.mutations.get(&key)?;
        Some(self.clock.now_millis().saturating_sub(last_mutation) / 1_000)
    }

    fn multiplier(&self, age_seconds: Option<u64>) -> f64 {
        let Some(age) = age_seconds else {
            return 1.0;
        };
        let fast = self.config.fast_window_seconds;
        let slow = self.config.slow_window_seconds;
        if age <= fast {
            return self.config.min_multiplier;
        }
        if age >= slow {
            return self.config.max_multiplier;
        }
        let span = (slow - fast).max(1) as f64;
        let ratio = ((age - fast) as f64 / span).clamp(0.0, 1.0);
        self.config.min_multiplier + ratio * (self.config.max_multiplier - self.config.min_multiplier)
    }

    /// Forget all recorded mutations (test isolation).
    pub fn reset(&self) {
        self.mutations.clear();
    }
}
