// Storage backend abstraction
// A keyed store whose values are field maps sharing one per-key expiry

#[cfg(test)]
pub(crate) mod failing;
pub mod memory;
pub mod redis_hash;

use crate::clock::Clock;
use crate::config::{BackendConfig, SsoStoreConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use memory::MemoryHashStore;
pub use redis_hash::RedisHashStore;

/// Remaining lifetime of a key as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist (never written, deleted, or expired)
    Missing,
    /// The key exists without an expiry
    Persistent,
    /// The key expires after this duration
    Expires(Duration),
}

/// Hash-field store consumed by the session layer.
///
/// Absence of a key or field is reported as `Ok(None)` / an empty map and is
/// never an error. Implementations must make each call atomic on its own;
/// no isolation is promised across calls.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Write one or more fields. When `ttl` is given the key expiry is
    /// set to it in the same atomic step; otherwise the existing expiry is kept.
    async fn set_fields(
        &self,
        key: &str,
        fields: Vec<(String, Vec<u8>)>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Read a single field
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Read every field of a key
    async fn get_all_fields(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError>;

    /// Delete fields in one batch. Unknown fields are ignored.
    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<(), StoreError>;

    /// Delete the whole key. Deleting a missing key succeeds.
    async fn delete_key(&self, key: &str) -> Result<(), StoreError>;

    /// Set the key expiry. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining lifetime of the key, millisecond resolution
    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;
}

/// Storage errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("lock poisoned: {0}")]
    Lock(String),
}

/// TTL in whole milliseconds, clamped to `i64::MAX`
pub(crate) fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Build the store backend selected by configuration
pub async fn create_hash_store(
    config: &SsoStoreConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn HashStore>, StoreError> {
    match &config.backend {
        BackendConfig::Memory => Ok(Arc::new(MemoryHashStore::new(clock))),
        BackendConfig::Redis { url } => Ok(Arc::new(RedisHashStore::connect(url).await?)),
    }
}
