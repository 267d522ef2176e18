// Parent-token record creation and removal

use super::codec::StoreValue;
use super::layout::{FIELD_CTIME, FIELD_UIDS, user_field};
use super::parent_token::ParentTokenStore;
use super::types::{ParentTokenGrant, UidList, UserSession};
use crate::error::{Result, SsoStoreError};
use std::time::Duration;
use tracing::{debug, info};

const OP_CREATE: &str = "parent_token.create";
const OP_DELETE: &str = "parent_token.delete";
const OP_RENEW: &str = "parent_token.renew";
const OP_BOUND_USERS: &str = "parent_token.bound_users";

impl ParentTokenStore {
    /// Create the record for a parent token, or bind another user to it.
    ///
    /// With multiple accounts disabled the record is overwritten: `uids`
    /// becomes the single user and the container expiry is reset to the
    /// grant lifetime. With multiple accounts enabled an existing record
    /// gains the user (once) and its `user:<uid>` entry, keeping `ctime`
    /// and the container expiry untouched.
    ///
    /// The append path reads `uids` and writes back in a separate call
    /// without an expiry. If the record expires in between, the write
    /// recreates the key with no `ctime` and no expiry, and it is never
    /// reclaimed. Concurrent appends for different users race the same way
    /// and the last `uids` write wins.
    pub async fn create(&self, grant: &ParentTokenGrant) -> Result<()> {
        let key = self.key(&grant.token);

        if !self.config.enable_multiple_accounts {
            return self.write_new_record(&key, grant).await;
        }

        let Some(mut uids) = self.read_uids(&key, OP_CREATE).await? else {
            return self.write_new_record(&key, grant).await;
        };

        let mut fields = vec![(
            user_field(grant.uid),
            encode_user(&grant.user_session)?,
        )];
        if uids.contains(grant.uid) {
            debug!(
                "User {} already bound to parent token, refreshing user session only",
                grant.uid
            );
        } else {
            uids.push(grant.uid);
            let uid_bytes = uids
                .encode()
                .map_err(SsoStoreError::encode(OP_CREATE, UidList::SHAPE))?;
            fields.push((FIELD_UIDS.to_string(), uid_bytes));
        }

        self.call(OP_CREATE, self.store.set_fields(&key, fields, None))
            .await?;

        info!(
            "Bound user {} to existing parent token ({} user(s))",
            grant.uid,
            uids.len()
        );
        Ok(())
    }

    /// Delete the whole record. Deleting a missing record succeeds.
    pub async fn delete(&self, parent_token: &str) -> Result<()> {
        let key = self.key(parent_token);
        self.call(OP_DELETE, self.store.delete_key(&key)).await?;
        info!("Deleted parent token record {}", key);
        Ok(())
    }

    /// Reset the container expiry. Returns false when the record does not exist.
    pub async fn renew(&self, parent_token: &str, lifetime: Duration) -> Result<bool> {
        let key = self.key(parent_token);
        let renewed = self
            .call(OP_RENEW, self.store.expire(&key, lifetime))
            .await?;
        debug!("Renewed {} for {:?}: {}", key, lifetime, renewed);
        Ok(renewed)
    }

    /// User ids bound to a parent token, `None` when the record does not exist
    pub async fn bound_users(&self, parent_token: &str) -> Result<Option<UidList>> {
        let key = self.key(parent_token);
        self.read_uids(&key, OP_BOUND_USERS).await
    }

    pub(super) async fn read_uids(&self, key: &str, op: &'static str) -> Result<Option<UidList>> {
        let Some(bytes) = self.call(op, self.store.get_field(key, FIELD_UIDS)).await? else {
            return Ok(None);
        };
        let uids = UidList::decode(&bytes).map_err(SsoStoreError::decode(op, UidList::SHAPE))?;
        Ok(Some(uids))
    }

    async fn write_new_record(&self, key: &str, grant: &ParentTokenGrant) -> Result<()> {
        let now = self.clock.now_unix();
        let uid_bytes = UidList::single(grant.uid)
            .encode()
            .map_err(SsoStoreError::encode(OP_CREATE, UidList::SHAPE))?;

        let fields = vec![
            (FIELD_CTIME.to_string(), now.to_string().into_bytes()),
            (FIELD_UIDS.to_string(), uid_bytes),
            (user_field(grant.uid), encode_user(&grant.user_session)?),
        ];

        self.call(
            OP_CREATE,
            self.store.set_fields(key, fields, Some(grant.lifetime())),
        )
        .await?;

        info!(
            "Created parent token record {} for user {} (expires in {}s)",
            key, grant.uid, grant.expires_in
        );
        Ok(())
    }
}

fn encode_user(user: &UserSession) -> Result<Vec<u8>> {
    user.encode()
        .map_err(SsoStoreError::encode(OP_CREATE, UserSession::SHAPE))
}
