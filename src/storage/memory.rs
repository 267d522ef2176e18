// In-memory hash store implementation
// Per-key expiry is evaluated lazily against the injected clock

use super::{HashStore, KeyTtl, StoreError, ttl_millis};
use crate::clock::Clock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

struct Entry {
    fields: HashMap<String, Vec<u8>>,
    /// Absolute expiry in unix milliseconds
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// In-memory hash store
/// Thread-safe storage behaving like a Redis hash with key expiry
pub struct MemoryHashStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
    write_ops: AtomicU64,
}

impl MemoryHashStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            write_ops: AtomicU64::new(0),
        }
    }

    /// Number of mutating calls served so far
    pub fn write_ops(&self) -> u64 {
        self.write_ops.load(Ordering::SeqCst)
    }

    /// Number of live keys
    pub async fn key_count(&self) -> usize {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    fn record_write(&self) {
        self.write_ops.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop the key if its expiry has passed
    fn purge_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: i64) {
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            debug!("Memory store: key '{}' expired", key);
            entries.remove(key);
        }
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    async fn set_fields(
        &self,
        key: &str,
        fields: Vec<(String, Vec<u8>)>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.record_write();
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        Self::purge_if_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            fields: HashMap::new(),
            expires_at: None,
        });
        entry.fields.extend(fields);
        if let Some(ttl) = ttl {
            entry.expires_at = Some(now.saturating_add(ttl_millis(ttl)));
        }
        Ok(())
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.fields.get(field).cloned()))
    }

    async fn get_all_fields(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.fields.clone())
            .unwrap_or_default())
    }

    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        self.record_write();
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        Self::purge_if_expired(&mut entries, key, now);

        let now_empty = match entries.get_mut(key) {
            Some(entry) => {
                for field in fields {
                    entry.fields.remove(field);
                }
                entry.fields.is_empty()
            }
            None => false,
        };
        // A hash with no fields left ceases to exist
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        self.record_write();
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.record_write();
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        Self::purge_if_expired(&mut entries, key, now);

        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now.saturating_add(ttl_millis(ttl)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            None => KeyTtl::Missing,
            Some(entry) => match entry.expires_at {
                None => KeyTtl::Persistent,
                Some(at) if at <= now => KeyTtl::Missing,
                Some(at) => KeyTtl::Expires(Duration::from_millis((at - now) as u64)),
            },
        })
    }
}
