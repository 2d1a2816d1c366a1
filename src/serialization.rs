//! Canonical serialization for cached payloads.
//!
//! Every value stored through the engine is Postcard-encoded inside a
//! versioned envelope:
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  magic: [u8; 4] │ version: u32    │ postcard payload (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//! ```
//!
//! Magic and schema version are validated on every read, so corrupted
//! entries and entries written by an older deployment are rejected (and
//! recomputed) instead of being silently misinterpreted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header identifying engine-written cache entries.
pub const CACHE_MAGIC: [u8; 4] = *b"CSTW";

/// Current payload schema version.
///
/// Increment when making breaking changes to any cached type; old entries
/// are then evicted and recomputed on next access.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope wrapped around every cached payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    pub magic: [u8; 4],
    pub version: u32,
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Serialize a payload with the envelope for cache storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard encoding fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        error!("cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Deserialize a payload from cache bytes, validating magic and version.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: magic header mismatch
/// - `Error::VersionMismatch`: entry written under another schema version
/// - `Error::DeserializationError`: corrupted payload
pub fn deserialize_from_cache<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        error!("cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        warn!(
            "invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        warn!(
            "cache schema version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION, envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
    struct Payload {
        id: u64,
        label: String,
    }

    #[test]
    fn test_roundtrip() {
        let payload = Payload {
            id: 9,
            label: "summary".to_string(),
        };
        let bytes = serialize_for_cache(&payload).expect("Failed to serialize");
        let decoded: Payload = deserialize_from_cache(&bytes).expect("Failed to deserialize");
        assert_eq!(payload, decoded);
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let payload = Payload {
            id: 1,
            label: "x".to_string(),
        };
        let mut envelope = CacheEnvelope::new(&payload);
        envelope.magic = *b"XXXX";
        let bytes = postcard::to_allocvec(&envelope).expect("Failed to encode");

        let result: Result<Payload> = deserialize_from_cache(&bytes);
        assert!(matches!(result, Err(Error::InvalidCacheEntry(_))));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let payload = Payload {
            id: 1,
            label: "x".to_string(),
        };
        let mut envelope = CacheEnvelope::new(&payload);
        envelope.version = 999;
        let bytes = postcard::to_allocvec(&envelope).expect("Failed to encode");

        let result: Result<Payload> = deserialize_from_cache(&bytes);
        match result {
            Err(Error::VersionMismatch { expected, found }) => {
                assert_eq!(expected, CURRENT_SCHEMA_VERSION);
                assert_eq!(found, 999);
            }
            other => panic!("Expected VersionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let payload = Payload {
            id: 42,
            label: "long enough to truncate".to_string(),
        };
        let mut bytes = serialize_for_cache(&payload).expect("Failed to serialize");
        bytes.truncate(bytes.len() / 2);

        let result: Result<Payload> = deserialize_from_cache(&bytes);
        assert!(result.is_err());
    }
}
