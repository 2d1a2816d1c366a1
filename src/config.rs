//! Engine configuration.
//!
//! Every section deserializes from partial input (all fields have
//! defaults) and passes through [`EngineConfig::validated`], which clamps
//! values into their documented ranges instead of failing startup over a
//! sloppy override. Invalid relationships (max delay below initial delay,
//! slow window below fast window) are repaired the same way.

use serde::Deserialize;
use std::collections::HashMap;

fn clamp_ratio(value: f64, fallback: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        return fallback;
    }
    value.min(1.0)
}

fn clamp_positive_f64(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

fn clamp_min_u64(value: u64, minimum: u64) -> u64 {
    value.max(minimum)
}

/// Version counters baked into every cache key.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Global version: bump to orphan the entire namespace at deploy time.
    pub global_version: u64,
    /// Per-resource version overrides: bump one after changing that
    /// resource's payload shape.
    pub resources: HashMap<String, u64>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        VersioningConfig {
            global_version: 1,
            resources: HashMap::new(),
        }
    }
}

impl VersioningConfig {
    fn validated(mut self) -> Self {
        self.global_version = clamp_min_u64(self.global_version, 1);
        for version in self.resources.values_mut() {
            *version = clamp_min_u64(*version, 1);
        }
        self
    }
}

/// Adaptive TTL: recently-mutated data is cached briefly, long-stable
/// data aggressively.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AdaptiveTtlConfig {
    pub enabled: bool,
    /// Mutations younger than this keep the TTL at `min_multiplier`.
    pub fast_window_seconds: u64,
    /// Mutations older than this raise the TTL to `max_multiplier`.
    pub slow_window_seconds: u64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
}

impl Default for AdaptiveTtlConfig {
    fn default() -> Self {
        AdaptiveTtlConfig {
            enabled: true,
            fast_window_seconds: 120,
            slow_window_seconds: 3_600,
            min_multiplier: 0.5,
            max_multiplier: 2.0,
        }
    }
}

impl AdaptiveTtlConfig {
    fn validated(mut self) -> Self {
        self.fast_window_seconds = clamp_min_u64(self.fast_window_seconds, 1);
        self.slow_window_seconds = self
            .slow_window_seconds
            .max(self.fast_window_seconds + 1);
        self.min_multiplier = clamp_positive_f64(self.min_multiplier, 0.5);
        self.max_multiplier = clamp_positive_f64(self.max_multiplier, 2.0).max(self.min_multiplier);
        self
    }
}

/// Bounded retry with exponential backoff and symmetric jitter.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first (≥ 1).
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Fraction of the computed delay randomized in both directions, in [0, 1].
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryConfig {
    fn validated(mut self) -> Self {
        self.max_attempts = self.max_attempts.max(1);
        self.initial_delay_ms = clamp_min_u64(self.initial_delay_ms, 1);
        self.max_delay_ms = self.max_delay_ms.max(self.initial_delay_ms);
        self.backoff_multiplier = clamp_positive_f64(self.backoff_multiplier, 2.0);
        self.jitter_ratio = clamp_ratio(self.jitter_ratio, 0.25);
        self
    }
}

/// Degraded-mode tracking for the data store.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AvailabilityConfig {
    /// How long the store is assumed unhealthy after a connectivity failure.
    pub degraded_cooldown_ms: u64,
    /// Suggested client back-off, surfaced in snapshots for Retry-After style headers.
    pub retry_after_ms: u64,
    /// Snapshot cache lifetime, bounding the cost of frequent health polling.
    pub health_snapshot_ttl_ms: u64,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        AvailabilityConfig {
            degraded_cooldown_ms: 30_000,
            retry_after_ms: 15_000,
            health_snapshot_ttl_ms: 5_000,
        }
    }
}

impl AvailabilityConfig {
    fn validated(mut self) -> Self {
        self.degraded_cooldown_ms = clamp_min_u64(self.degraded_cooldown_ms, 1);
        self.retry_after_ms = clamp_min_u64(self.retry_after_ms, 1);
        self.health_snapshot_ttl_ms = clamp_min_u64(self.health_snapshot_ttl_ms, 1);
        self
    }
}

/// Materialized-view refresh gating.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ViewRefreshConfig {
    /// Interval applied to views without an explicit entry.
    pub default_interval_ms: u64,
    /// Per-view refresh intervals, keyed by view name. A zero disables
    /// gating for that view (every read refreshes).
    pub views: HashMap<String, u64>,
}

impl Default for ViewRefreshConfig {
    fn default() -> Self {
        ViewRefreshConfig {
            default_interval_ms: 15 * 60 * 1_000,
            views: HashMap::new(),
        }
    }
}

impl ViewRefreshConfig {
    pub fn interval_ms(&self, view: &str) -> u64 {
        self.views
            .get(view)
            .copied()
            .unwrap_or(self.default_interval_ms)
    }
}

/// Background cache warming.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WarmingConfig {
    pub enabled: bool,
    /// Delay before the first warming run, so startup traffic settles first.
    pub startup_delay_ms: u64,
    pub interval_ms: u64,
    /// Upper bound on recently-active scopes warmed per run.
    pub profile_sample_size: usize,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        WarmingConfig {
            enabled: true,
            startup_delay_ms: 10_000,
            interval_ms: 15 * 60 * 1_000,
            profile_sample_size: 25,
        }
    }
}

impl WarmingConfig {
    fn validated(mut self) -> Self {
        self.interval_ms = clamp_min_u64(self.interval_ms, 1);
        self.profile_sample_size = self.profile_sample_size.clamp(1, 200);
        self
    }
}

/// Hit-ratio monitoring and alert thresholds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub report_interval_ms: u64,
    /// Hit ratios at or above this are healthy; below it an event is emitted.
    pub warn_threshold: f64,
    /// Below this the event severity escalates to critical.
    pub critical_threshold: f64,
    /// Windows with fewer samples than this are discarded silently.
    pub min_samples: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            enabled: true,
            report_interval_ms: 60_000,
            warn_threshold: 0.8,
            critical_threshold: 0.5,
            min_samples: 200,
        }
    }
}

impl MonitoringConfig {
    fn validated(mut self) -> Self {
        self.report_interval_ms = clamp_min_u64(self.report_interval_ms, 1);
        self.warn_threshold = clamp_ratio(self.warn_threshold, 0.8);
        self.critical_threshold = clamp_ratio(self.critical_threshold, 0.5).min(self.warn_threshold);
        self.min_samples = clamp_min_u64(self.min_samples, 1);
        self
    }
}

/// Top-level engine configuration.
///
/// # Example
///
/// ```
/// use cache_steward::config::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(
///     r#"{ "namespace": "api", "retry": { "max_attempts": 5 } }"#,
/// )
/// .unwrap();
/// let config = config.validated();
/// assert_eq!(config.namespace, "api");
/// assert_eq!(config.retry.max_attempts, 5);
/// assert_eq!(config.retry.initial_delay_ms, 200);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix for every cache key, isolating environments sharing a store.
    pub namespace: String,
    pub versioning: VersioningConfig,
    /// Base-TTL overrides in seconds, keyed by resource name.
    pub ttl_overrides: HashMap<String, u64>,
    pub adaptive_ttl: AdaptiveTtlConfig,
    pub retry: RetryConfig,
    pub availability: AvailabilityConfig,
    pub views: ViewRefreshConfig,
    pub warming: WarmingConfig,
    pub monitoring: MonitoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            namespace: "cache".to_string(),
            versioning: VersioningConfig::default(),
            ttl_overrides: HashMap::new(),
            adaptive_ttl: AdaptiveTtlConfig::default(),
            retry: RetryConfig::default(),
            availability: AvailabilityConfig::default(),
            views: ViewRefreshConfig::default(),
            warming: WarmingConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Clamp every section into its documented range.
    pub fn validated(mut self) -> Self {
        if self.namespace.trim().is_empty() {
            self.namespace = "cache".to_string();
        }
        self.versioning = self.versioning.validated();
        self.adaptive_ttl = self.adaptive_ttl.validated();
        self.retry = self.retry.validated();
        self.availability = self.availability.validated();
        self.warming = self.warming.validated();
        self.monitoring = self.monitoring.validated();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.namespace, "cache");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.availability.degraded_cooldown_ms, 30_000);
        assert!(config.adaptive_ttl.enabled);
        assert_eq!(config.monitoring.min_samples, 200);
    }

    #[test]
    fn test_validated_repairs_relationships() {
        let config = EngineConfig {
            retry: RetryConfig {
                max_attempts: 0,
                initial_delay_ms: 500,
                max_delay_ms: 100,
                backoff_multiplier: -1.0,
                jitter_ratio: 4.0,
                ..RetryConfig::default()
            },
            adaptive_ttl: AdaptiveTtlConfig {
                fast_window_seconds: 600,
                slow_window_seconds: 60,
                ..AdaptiveTtlConfig::default()
            },
            ..EngineConfig::default()
        }
        .validated();

        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.max_delay_ms, 500);
        assert_eq!(config.retry.backoff_multiplier, 2.0);
        assert_eq!(config.retry.jitter_ratio, 1.0);
        assert!(config.adaptive_ttl.slow_window_seconds > config.adaptive_ttl.fast_window_seconds);
    }

    #[test]
    fn test_monitoring_threshold_ordering() {
        let config = EngineConfig {
            monitoring: MonitoringConfig {
                warn_threshold: 0.4,
                critical_threshold: 0.9,
                ..MonitoringConfig::default()
            },
            ..EngineConfig::default()
        }
        .validated();
        assert!(config.monitoring.critical_threshold <= config.monitoring.warn_threshold);
    }

    #[test]
    fn test_partial_deserialization() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "warming": { "profile_sample_size": 1000 } }"#)
                .expect("Failed to parse config");
        let config = config.validated();
        assert_eq!(config.warming.profile_sample_size, 200);
        assert_eq!(config.warming.startup_delay_ms, 10_000);
    }

    #[test]
    fn test_view_interval_lookup() {
        let mut config = ViewRefreshConfig::default();
        config.views.insert("session_volume".to_string(), 5_000);
        assert_eq!(config.interval_ms("session_volume"), 5_000);
        assert_eq!(config.interval_ms("unknown"), 15 * 60 * 1_000);
    }
}
