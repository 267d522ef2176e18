// Typed projection of a parent-token container

use super::codec::StoreValue;
use super::layout::{FieldKind, classify};
use super::parent_token::ParentTokenStore;
use super::types::{ClientToken, ExpirationIndex, SessionSnapshot, UidList, UserSession};
use crate::error::Result;
use crate::storage::KeyTtl;
use tracing::{debug, warn};

const OP_GET_ALL: &str = "parent_token.get_all";

impl ParentTokenStore {
    /// Read every field stored under a parent token.
    ///
    /// Best effort: malformed or undecodable entries are left out of the
    /// snapshot instead of failing the read. Store failures are returned.
    /// A missing record yields an empty snapshot with `ttl: None`.
    pub async fn get_all(&self, parent_token: &str) -> Result<SessionSnapshot> {
        let key = self.key(parent_token);

        let fields = self
            .call(OP_GET_ALL, self.store.get_all_fields(&key))
            .await?;

        let mut snapshot = SessionSnapshot::default();
        for (field, value) in &fields {
            absorb_field(&mut snapshot, field, value);
        }

        let ttl = self
            .call(OP_GET_ALL, self.store.remaining_ttl(&key))
            .await?;
        snapshot.ttl = match ttl {
            KeyTtl::Expires(remaining) => Some((remaining.as_millis() / 1000) as i64),
            KeyTtl::Missing | KeyTtl::Persistent => None,
        };

        debug!(
            "Snapshot of {}: {} field(s), {} client(s), {} user(s)",
            key,
            fields.len(),
            snapshot.clients.len(),
            snapshot.users.len()
        );
        Ok(snapshot)
    }
}

fn absorb_field(snapshot: &mut SessionSnapshot, field: &str, value: &[u8]) {
    match classify(field) {
        FieldKind::Ctime => {
            snapshot.ctime = std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);
        }
        FieldKind::Uids => {
            snapshot.uids = UidList::decode(value).unwrap_or_default();
        }
        FieldKind::ExpireTimeList => {
            snapshot.expire_time_list = ExpirationIndex::decode(value).unwrap_or_default();
        }
        FieldKind::Client(sub_token) => match ClientToken::decode(value) {
            Ok(token) => {
                snapshot.clients.insert(sub_token.to_string(), token);
            }
            Err(e) => warn!("Dropping undecodable client field '{}': {}", field, e),
        },
        FieldKind::User(uid) => match UserSession::decode(value) {
            Ok(user) => {
                snapshot.users.insert(uid, user);
            }
            Err(e) => warn!("Dropping undecodable user field '{}': {}", field, e),
        },
        FieldKind::Malformed => warn!("Dropping malformed field name '{}'", field),
        FieldKind::Unknown => {}
    }
}
