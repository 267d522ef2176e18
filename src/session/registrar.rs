// Sub-token registration with lazy eviction of expired sub-tokens

use super::codec::StoreValue;
use super::layout::{FIELD_CTIME, FIELD_EXPIRE_TIME_LIST, client_field, is_valid_sub_token};
use super::parent_token::ParentTokenStore;
use super::types::{ClientToken, ExpirationEntry, ExpirationIndex};
use crate::config::ExpiryPolicy;
use crate::error::{Result, SsoStoreError};
use crate::storage::KeyTtl;
use std::time::Duration;
use tracing::{debug, warn};

const OP_SET_TOKEN: &str = "parent_token.set_token";
const OP_GET_TOKEN: &str = "parent_token.get_client_token";

/// Outcome of partitioning the expiration index at registration time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionPlan {
    /// New index: the registered entry first, then surviving entries in prior order
    pub index: ExpirationIndex,
    /// Client-token fields whose expiry has passed
    pub evicted: Vec<String>,
}

/// Place the new entry first and split the previous index into expired
/// (`expire_time <= now`) and live entries.
///
/// A previous entry for the same field is superseded by the new one and
/// neither kept nor evicted.
pub fn plan_eviction(
    previous: ExpirationIndex,
    field: String,
    expire_time: i64,
    now: i64,
) -> EvictionPlan {
    let mut entries = Vec::with_capacity(previous.len() + 1);
    let mut evicted = Vec::new();

    for entry in previous.0 {
        if entry.token == field {
            continue;
        }
        if entry.expire_time <= now {
            evicted.push(entry.token);
            continue;
        }
        entries.push(entry);
    }
    entries.insert(
        0,
        ExpirationEntry {
            token: field,
            expire_time,
        },
    );

    EvictionPlan {
        index: ExpirationIndex(entries),
        evicted,
    }
}

impl ParentTokenStore {
    /// Register a sub-token under an existing parent token.
    ///
    /// Sub-tokens whose recorded expiry has passed are deleted in the same
    /// call. The parent token must have been created first; otherwise the
    /// call fails with `PreconditionFailed` before writing anything.
    ///
    /// `client_id` is only logged: sub-tokens are keyed by token string, so
    /// a client holding several sub-tokens has several entries. A token
    /// string that is empty or contains `:` is rejected with
    /// `InvalidSubToken` before any store call.
    ///
    /// Writes are not transactional. A failure part way leaves whatever the
    /// store already applied.
    pub async fn set_token(
        &self,
        parent_token: &str,
        client_id: &str,
        token: &ClientToken,
    ) -> Result<()> {
        if !is_valid_sub_token(&token.token) {
            return Err(SsoStoreError::InvalidSubToken {
                op: OP_SET_TOKEN,
                token: token.token.clone(),
            });
        }
        let key = self.key(parent_token);

        let previous = self.read_expiration_index(&key).await?;

        let ctime = self
            .call(OP_SET_TOKEN, self.store.get_field(&key, FIELD_CTIME))
            .await?;
        if ctime.is_none() {
            warn!(
                "Client {} registered a sub-token against missing parent token record {}",
                client_id, key
            );
            return Err(SsoStoreError::PreconditionFailed {
                op: OP_SET_TOKEN,
                parent_token: parent_token.to_string(),
            });
        }

        let now = self.clock.now_unix();
        let field = client_field(&token.token);
        let expire_time = now.saturating_add(token.expires_in);
        let plan = plan_eviction(previous, field.clone(), expire_time, now);

        if !plan.evicted.is_empty() {
            debug!(
                "Evicting {} expired sub-token(s) from {}",
                plan.evicted.len(),
                key
            );
            self.call(OP_SET_TOKEN, self.store.delete_fields(&key, &plan.evicted))
                .await?;
        }

        let index_bytes = plan
            .index
            .encode()
            .map_err(SsoStoreError::encode(OP_SET_TOKEN, ExpirationIndex::SHAPE))?;
        self.call(
            OP_SET_TOKEN,
            self.store.set_fields(
                &key,
                vec![(FIELD_EXPIRE_TIME_LIST.to_string(), index_bytes)],
                None,
            ),
        )
        .await?;

        let token_bytes = token
            .encode()
            .map_err(SsoStoreError::encode(OP_SET_TOKEN, ClientToken::SHAPE))?;
        self.call(
            OP_SET_TOKEN,
            self.store.set_fields(&key, vec![(field, token_bytes)], None),
        )
        .await?;

        if self.config.expiry_policy == ExpiryPolicy::ExtendToSubTokens {
            self.extend_expiry(&key, &plan.index, now).await?;
        }

        debug!(
            "Registered sub-token for client {} under {} ({} live)",
            client_id,
            key,
            plan.index.len()
        );
        Ok(())
    }

    /// Read one sub-token by its token string
    pub async fn get_client_token(
        &self,
        parent_token: &str,
        sub_token: &str,
    ) -> Result<Option<ClientToken>> {
        let key = self.key(parent_token);
        let Some(bytes) = self
            .call(OP_GET_TOKEN, self.store.get_field(&key, &client_field(sub_token)))
            .await?
        else {
            return Ok(None);
        };
        let token = ClientToken::decode(&bytes)
            .map_err(SsoStoreError::decode(OP_GET_TOKEN, ClientToken::SHAPE))?;
        Ok(Some(token))
    }

    async fn read_expiration_index(&self, key: &str) -> Result<ExpirationIndex> {
        let Some(bytes) = self
            .call(OP_SET_TOKEN, self.store.get_field(key, FIELD_EXPIRE_TIME_LIST))
            .await?
        else {
            return Ok(ExpirationIndex::default());
        };
        ExpirationIndex::decode(&bytes)
            .map_err(SsoStoreError::decode(OP_SET_TOKEN, ExpirationIndex::SHAPE))
    }

    /// Push the container expiry out to the latest live sub-token expiry
    async fn extend_expiry(&self, key: &str, index: &ExpirationIndex, now: i64) -> Result<()> {
        let Some(latest) = index.latest_expiry() else {
            return Ok(());
        };
        let secs = latest.saturating_sub(now);
        if secs <= 0 {
            return Ok(());
        }
        let lifetime = Duration::from_secs(secs as u64);

        let remaining = self
            .call(OP_SET_TOKEN, self.store.remaining_ttl(key))
            .await?;
        if let KeyTtl::Expires(remaining) = remaining
            && remaining < lifetime
        {
            debug!("Extending {} expiry from {:?} to {:?}", key, remaining, lifetime);
            self.call(OP_SET_TOKEN, self.store.expire(key, lifetime))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SsoStoreConfig;
    use crate::session::types::{ParentTokenGrant, UserSession};
    use crate::storage::failing::FailingStore;
    use crate::storage::{HashStore, MemoryHashStore};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    const NOW: i64 = 1_648_785_386;

    fn entry(field: &str, expire_time: i64) -> ExpirationEntry {
        ExpirationEntry {
            token: field.to_string(),
            expire_time,
        }
    }

    fn test_store(policy: ExpiryPolicy) -> (ParentTokenStore, Arc<MemoryHashStore>, ManualClock) {
        let clock = ManualClock::at_unix(NOW);
        let backend = Arc::new(MemoryHashStore::new(Arc::new(clock.clone())));
        let config = SsoStoreConfig {
            expiry_policy: policy,
            ..Default::default()
        };
        let store =
            ParentTokenStore::with_clock(backend.clone(), Arc::new(config), Arc::new(clock.clone()));
        (store, backend, clock)
    }

    async fn create_parent(store: &ParentTokenStore, expires_in: i64) {
        store
            .create(&ParentTokenGrant {
                token: "P1".to_string(),
                expires_in,
                uid: 1,
                user_session: UserSession::default(),
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_plan_eviction_removes_expired_entries() {
        let previous = ExpirationIndex(vec![
            entry("client:b", NOW + 10),
            entry("client:a", NOW),
            entry("client:c", NOW - 5),
        ]);

        let plan = plan_eviction(previous, "client:new".to_string(), NOW + 60, NOW);

        assert_eq!(
            plan.index.entries(),
            &[entry("client:new", NOW + 60), entry("client:b", NOW + 10)]
        );
        assert_eq!(plan.evicted, vec!["client:a", "client:c"]);
    }

    #[test]
    fn test_plan_eviction_keeps_live_order() {
        let previous = ExpirationIndex(vec![
            entry("client:c", NOW + 30),
            entry("client:b", NOW + 20),
            entry("client:a", NOW + 10),
        ]);

        let plan = plan_eviction(previous, "client:d".to_string(), NOW + 5, NOW);

        let fields: Vec<&str> = plan.index.entries().iter().map(|e| e.token.as_str()).collect();
        assert_eq!(fields, vec!["client:d", "client:c", "client:b", "client:a"]);
        assert!(plan.evicted.is_empty());
    }

    #[test]
    fn test_plan_eviction_supersedes_same_field() {
        let previous = ExpirationIndex(vec![entry("client:a", NOW + 10)]);

        let plan = plan_eviction(previous, "client:a".to_string(), NOW + 60, NOW);

        assert_eq!(plan.index.entries(), &[entry("client:a", NOW + 60)]);
        assert!(plan.evicted.is_empty());
    }

    #[tokio::test]
    async fn test_set_token_without_parent_fails_without_writes() {
        let (store, backend, _clock) = test_store(ExpiryPolicy::Fixed);

        let err = store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, 60))
            .await
            .unwrap_err();

        assert!(err.is_precondition_failed());
        assert_eq!(backend.write_ops(), 0);
        assert_eq!(backend.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_set_token_is_readable() {
        let (store, _backend, _clock) = test_store(ExpiryPolicy::Fixed);
        create_parent(&store, 86_400).await;

        let token = ClientToken::new("T1", NOW, 60);
        store.set_token("P1", "c1", &token).await.unwrap();

        assert_eq!(store.get_client_token("P1", "T1").await.unwrap(), Some(token));
        assert_eq!(store.get_client_token("P1", "T2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_token_evicts_expired_sub_token() {
        let (store, backend, clock) = test_store(ExpiryPolicy::Fixed);
        create_parent(&store, 86_400).await;

        store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, 60))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(61));
        store
            .set_token("P1", "c2", &ClientToken::new("T2", NOW + 61, 60))
            .await
            .unwrap();

        let key = store.key("P1");
        assert!(backend.get_field(&key, "client:T1").await.unwrap().is_none());
        assert!(backend.get_field(&key, "client:T2").await.unwrap().is_some());

        let index = store.read_expiration_index(&key).await.unwrap();
        assert_eq!(index.entries(), &[entry("client:T2", NOW + 121)]);
    }

    #[tokio::test]
    async fn test_set_token_propagates_corrupt_index() {
        let (store, backend, _clock) = test_store(ExpiryPolicy::Fixed);
        create_parent(&store, 86_400).await;
        backend
            .set_fields(
                &store.key("P1"),
                vec![(FIELD_EXPIRE_TIME_LIST.to_string(), b"{".to_vec())],
                None,
            )
            .await
            .unwrap();

        let err = store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, 60))
            .await
            .unwrap_err();
        assert!(matches!(err, SsoStoreError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_fixed_policy_keeps_short_container_expiry() {
        let (store, backend, _clock) = test_store(ExpiryPolicy::Fixed);
        create_parent(&store, 30).await;

        store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, 3_600))
            .await
            .unwrap();

        assert_eq!(
            backend.remaining_ttl(&store.key("P1")).await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn test_extend_policy_covers_new_sub_token() {
        let (store, backend, _clock) = test_store(ExpiryPolicy::ExtendToSubTokens);
        create_parent(&store, 30).await;

        store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, 3_600))
            .await
            .unwrap();
        assert_eq!(
            backend.remaining_ttl(&store.key("P1")).await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(3_600))
        );

        // A shorter sub-token never shortens the container
        store
            .set_token("P1", "c2", &ClientToken::new("T2", NOW, 60))
            .await
            .unwrap();
        assert_eq!(
            backend.remaining_ttl(&store.key("P1")).await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(3_600))
        );
    }

    #[tokio::test]
    async fn test_extend_policy_covers_latest_outstanding_sub_token() {
        let (store, backend, _clock) = test_store(ExpiryPolicy::ExtendToSubTokens);
        create_parent(&store, 30).await;

        store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, 3_600))
            .await
            .unwrap();
        assert!(store.renew("P1", Duration::from_secs(10)).await.unwrap());

        // T1 is still live, so the container must outlast it, not just T2
        store
            .set_token("P1", "c2", &ClientToken::new("T2", NOW, 60))
            .await
            .unwrap();
        assert_eq!(
            backend.remaining_ttl(&store.key("P1")).await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(3_600))
        );
    }

    #[tokio::test]
    async fn test_huge_sub_token_lifetime_saturates() {
        let (store, _backend, _clock) = test_store(ExpiryPolicy::Fixed);
        create_parent(&store, 86_400).await;

        let token = ClientToken::new("T1", NOW, i64::MAX);
        store.set_token("P1", "c1", &token).await.unwrap();

        let index = store.read_expiration_index(&store.key("P1")).await.unwrap();
        assert_eq!(index.entries(), &[entry("client:T1", i64::MAX)]);
        assert_eq!(store.get_client_token("P1", "T1").await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_huge_sub_token_lifetime_with_extend_policy() {
        let (store, backend, _clock) = test_store(ExpiryPolicy::ExtendToSubTokens);
        create_parent(&store, 30).await;

        store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, i64::MAX))
            .await
            .unwrap();

        assert!(matches!(
            backend.remaining_ttl(&store.key("P1")).await.unwrap(),
            KeyTtl::Expires(remaining) if remaining > Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn test_set_token_rejects_unstorable_sub_token() {
        let (store, backend, _clock) = test_store(ExpiryPolicy::Fixed);
        create_parent(&store, 86_400).await;
        let writes = backend.write_ops();

        for bad in ["", "a:b"] {
            let err = store
                .set_token("P1", "c1", &ClientToken::new(bad, NOW, 60))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                SsoStoreError::InvalidSubToken { ref token, .. } if token == bad
            ));
        }
        assert_eq!(backend.write_ops(), writes);
    }

    fn failing_store() -> (ParentTokenStore, Arc<FailingStore>, Arc<MemoryHashStore>, ManualClock) {
        let clock = ManualClock::at_unix(NOW);
        let inner = Arc::new(MemoryHashStore::new(Arc::new(clock.clone())));
        let backend = Arc::new(FailingStore::new(inner.clone()));
        let store = ParentTokenStore::with_clock(
            backend.clone(),
            Arc::new(SsoStoreConfig::default()),
            Arc::new(clock.clone()),
        );
        (store, backend, inner, clock)
    }

    #[tokio::test]
    async fn test_failed_index_write_keeps_applied_eviction() {
        let (store, backend, inner, clock) = failing_store();
        create_parent(&store, 86_400).await;
        store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, 60))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(61));
        backend.fail_set_fields.store(true, Ordering::SeqCst);
        let err = store
            .set_token("P1", "c2", &ClientToken::new("T2", NOW + 61, 60))
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());

        // The eviction already applied is not rolled back, and nothing after it ran
        let key = store.key("P1");
        assert!(inner.get_field(&key, "client:T1").await.unwrap().is_none());
        assert!(inner.get_field(&key, "client:T2").await.unwrap().is_none());
        let index = store.read_expiration_index(&key).await.unwrap();
        assert_eq!(index.entries(), &[entry("client:T1", NOW + 60)]);
    }

    #[tokio::test]
    async fn test_failed_eviction_stops_registration() {
        let (store, backend, inner, clock) = failing_store();
        create_parent(&store, 86_400).await;
        store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, 60))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(61));
        backend.fail_delete_fields.store(true, Ordering::SeqCst);
        let writes = inner.write_ops();
        let err = store
            .set_token("P1", "c2", &ClientToken::new("T2", NOW + 61, 60))
            .await
            .unwrap_err();

        assert!(err.is_store_unavailable());
        assert_eq!(inner.write_ops(), writes);
        let key = store.key("P1");
        assert!(inner.get_field(&key, "client:T2").await.unwrap().is_none());
        let index = store.read_expiration_index(&key).await.unwrap();
        assert_eq!(index.entries(), &[entry("client:T1", NOW + 60)]);
    }

    #[tokio::test]
    async fn test_failed_index_read_writes_nothing() {
        let (store, backend, inner, _clock) = failing_store();
        create_parent(&store, 86_400).await;
        let writes = inner.write_ops();

        backend.fail_reads.store(true, Ordering::SeqCst);
        let err = store
            .set_token("P1", "c1", &ClientToken::new("T1", NOW, 60))
            .await
            .unwrap_err();

        assert!(err.is_store_unavailable());
        assert_eq!(inner.write_ops(), writes);
    }
}
