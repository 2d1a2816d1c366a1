//! # cache-steward
//!
//! A resilience-and-caching engine for read-heavy services over
//! unreliable data stores.
//!
//! ## Features
//!
//! - **Versioned cache keys:** global, per-resource, and per-scope
//!   counters baked into every key: invalidation is a counter bump, not
//!   a key enumeration
//! - **Adaptive TTLs:** freshness windows shrink for recently-mutated
//!   data and grow for long-stable data
//! - **Single-flight:** concurrent misses on one key and concurrent
//!   materialized-view refreshes collapse into one computation
//! - **Failure classification:** one pure classifier feeds both the
//!   retry executor (backoff + jitter) and the availability tracker
//!   (degrade/recover state machine), so they can never disagree
//! - **Background warming and hit-ratio monitoring** on a shared
//!   recurring-task primitive
//!
//! ## Quick Start
//!
//! ```ignore
//! use cache_steward::{CacheEngine, CacheResource, WarmingPlan};
//! use cache_steward::backend::InMemoryBackend;
//!
//! // 1. Define a resource
//! struct ProfileSummary;
//!
//! impl CacheResource for ProfileSummary {
//!     type Params = String; // profile id
//!     fn name() -> &'static str { "profileSummary" }
//!     fn base_key(profile_id: &String) -> String {
//!         format!("profile:summary:{}", profile_id)
//!     }
//!     fn scope_key(profile_id: &String) -> Option<String> {
//!         Some(profile_id.clone())
//!     }
//!     fn base_ttl_seconds() -> u64 { 300 }
//! }
//!
//! // 2. Build the engine
//! let engine = CacheEngine::new(InMemoryBackend::new());
//!
//! // 3. Read through the cache; the factory runs once per miss
//! let engine_for_read = engine.clone();
//! let summary: Summary = engine
//!     .resources()
//!     .remember::<ProfileSummary, _, _, _>(&profile_id, move || async move {
//!         let rows = engine_for_read
//!             .execute(|| async { /* query the store */ })
//!             .await?;
//!         Ok(build_summary(rows))
//!     })
//!     .await?;
//!
//! // 4. After a write, orphan everything cached for that profile
//! engine.resources().bump_scope::<ProfileSummary>(&profile_id);
//! ```

#[macro_use]
extern crate log;

pub mod adaptive_ttl;
pub mod availability;
pub mod backend;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod resource;
pub mod retry;
pub mod scheduler;
pub mod serialization;
pub mod strategy;
pub mod views;
pub mod warming;

// Re-exports for convenience
pub use availability::{AvailabilitySnapshot, AvailabilityStatus, AvailabilityTracker};
pub use backend::{CacheBackend, CacheTier};
pub use classifier::{classify, Classification};
pub use clock::{Clock, SystemClock};
pub use config::EngineConfig;
pub use engine::CacheEngine;
pub use error::{Error, Result, StoreError, StoreErrorKind};
pub use metrics::{MetricsMonitor, MonitoringEvent, MonitoringSink, Severity};
pub use resource::CacheResource;
pub use retry::RetryExecutor;
pub use scheduler::RecurringTask;
pub use strategy::ResourceCache;
pub use views::ViewRefreshCoordinator;
pub use warming::{CacheWarmer, WarmingPlan};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
