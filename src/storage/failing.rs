// Test double that fails selected calls with a connection error

use super::{HashStore, KeyTtl, MemoryHashStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Wraps a memory store; each switch makes one kind of call fail
/// with `StoreError::Connection` until it is turned back off.
pub struct FailingStore {
    inner: Arc<MemoryHashStore>,
    pub fail_reads: AtomicBool,
    pub fail_set_fields: AtomicBool,
    pub fail_delete_fields: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: Arc<MemoryHashStore>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_set_fields: AtomicBool::new(false),
            fail_delete_fields: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool, call: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!("{} refused", call)));
        }
        Ok(())
    }
}

#[async_trait]
impl HashStore for FailingStore {
    async fn set_fields(
        &self,
        key: &str,
        fields: Vec<(String, Vec<u8>)>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_set_fields, "HSET")?;
        self.inner.set_fields(key, fields, ttl).await
    }

    async fn get_field(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Self::check(&self.fail_reads, "HGET")?;
        self.inner.get_field(key, field).await
    }

    async fn get_all_fields(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        Self::check(&self.fail_reads, "HGETALL")?;
        self.inner.get_all_fields(key).await
    }

    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        Self::check(&self.fail_delete_fields, "HDEL")?;
        self.inner.delete_fields(key, fields).await
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete_key(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.expire(key, ttl).await
    }

    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        Self::check(&self.fail_reads, "PTTL")?;
        self.inner.remaining_ttl(key).await
    }
}
