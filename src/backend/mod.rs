//! Cache backend interface.
//!
//! The engine consumes the backing key/value store through this narrow
//! trait; everything above it (versioned keys, single-flight, TTL policy)
//! is backend-agnostic.

use crate::error::Result;

pub mod inmemory;

pub use inmemory::InMemoryBackend;

/// Storage tier a backend serves from, used to tag cache hits in the
/// metrics monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheTier {
    /// Process-local memory.
    Memory,
    /// A remote store shared between instances (Redis and friends).
    Remote,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Memory => "memory",
            CacheTier::Remote => "remote",
        }
    }
}

/// Trait for cache backend implementations.
///
/// All methods take `&self`; implementations use interior mutability so a
/// single backend can serve concurrent engine calls. The engine always
/// resolves a concrete TTL before writing, so `set` takes plain seconds.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync + Clone {
    /// Retrieve raw entry bytes by key.
    ///
    /// # Errors
    /// Returns `Err` on backend failure (connection lost, etc.). Read
    /// paths in the engine treat such failures as soft misses.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store entry bytes under `key` for `ttl_seconds`.
    ///
    /// # Errors
    /// Returns `Err` on backend failure.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;

    /// Remove an entry.
    ///
    /// # Errors
    /// Returns `Err` on backend failure.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check whether a live entry exists for `key`.
    ///
    /// # Errors
    /// Returns `Err` on backend failure.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Verify the backend is reachable (readiness probes).
    ///
    /// # Errors
    /// Returns `Err` if the backend is not accessible.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Which storage tier hits from this backend count against.
    fn tier(&self) -> CacheTier {
        CacheTier::Memory
    }
}
