// Parent-token store: shared state for the lifecycle, registrar and snapshot operations

use super::layout::container_key;
use crate::clock::{Clock, SystemClock};
use crate::config::SsoStoreConfig;
use crate::error::{Result, SsoStoreError};
use crate::storage::{HashStore, StoreError, create_hash_store};
use std::future::Future;
use std::sync::Arc;

/// Keeps one hash container per parent token holding its creation time,
/// bound users, per-user sessions, sub-tokens and their expiration index.
///
/// Operations are independent read-then-write sequences against a single
/// container key. Nothing is locked across calls, so two concurrent
/// `set_token` calls on the same parent token may both rewrite the
/// expiration index and the last write wins. A multi-account `create`
/// that races the record's expiry can leave a key with no `ctime` and no
/// expiry behind (see [`ParentTokenStore::create`]).
pub struct ParentTokenStore {
    pub(super) store: Arc<dyn HashStore>,
    pub(super) config: Arc<SsoStoreConfig>,
    pub(super) clock: Arc<dyn Clock>,
}

impl ParentTokenStore {
    /// Create a store over an existing backend, using the system clock
    pub fn new(store: Arc<dyn HashStore>, config: Arc<SsoStoreConfig>) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create a store with an explicit time source
    pub fn with_clock(
        store: Arc<dyn HashStore>,
        config: Arc<SsoStoreConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Validate the configuration and connect the configured backend
    pub async fn from_config(config: Arc<SsoStoreConfig>) -> Result<Self> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = create_hash_store(&config, clock.clone())
            .await
            .map_err(SsoStoreError::store("parent_token.connect"))?;
        Ok(Self::with_clock(store, config, clock))
    }

    pub fn config(&self) -> &SsoStoreConfig {
        &self.config
    }

    pub(super) fn key(&self, parent_token: &str) -> String {
        container_key(&self.config.parent_token_key_template, parent_token)
    }

    /// Run one store call under the configured timeout
    pub(super) async fn call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<T> {
        let result = match self.config.store_timeout() {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(limit)),
            },
            None => fut.await,
        };
        result.map_err(SsoStoreError::store(op))
    }
}
