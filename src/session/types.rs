// Session record types and data structures

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// User identifier bound to a parent token
pub type Uid = i64;

/// User ids bound to a parent token, in authorization order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UidList(pub Vec<Uid>);

impl UidList {
    pub fn single(uid: Uid) -> Self {
        Self(vec![uid])
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.0.contains(&uid)
    }

    pub fn push(&mut self, uid: Uid) {
        self.0.push(uid);
    }

    pub fn as_slice(&self) -> &[Uid] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Metadata of a sub-token issued to one client application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientToken {
    /// The sub-token string
    pub token: String,
    /// Issuance time (unix seconds)
    #[serde(rename = "authAt")]
    pub auth_at: i64,
    /// Lifetime in seconds
    #[serde(rename = "expiresIn")]
    pub expires_in: i64,
}

impl ClientToken {
    pub fn new(token: impl Into<String>, auth_at: i64, expires_in: i64) -> Self {
        Self {
            token: token.into(),
            auth_at,
            expires_in,
        }
    }
}

/// Per-user metadata recorded when a user is bound to a parent token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// When the user authorized (unix seconds)
    pub ctime: i64,
    /// User agent string
    pub ua: String,
    #[serde(rename = "clientIp")]
    pub client_ip: String,
    /// Login platform, e.g. "web"
    pub platform: String,
}

/// One entry of the expiration index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationEntry {
    /// Namespaced client-token field name (`client:<subToken>`)
    pub token: String,
    /// Absolute expiry (unix seconds)
    #[serde(rename = "expireTime")]
    pub expire_time: i64,
}

/// Sub-token expiry entries, newest registration first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpirationIndex(pub Vec<ExpirationEntry>);

impl ExpirationIndex {
    pub fn entries(&self) -> &[ExpirationEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Latest expiry across all entries
    pub fn latest_expiry(&self) -> Option<i64> {
        self.0.iter().map(|e| e.expire_time).max()
    }
}

/// Input for creating (or joining) a parent token session
#[derive(Debug, Clone)]
pub struct ParentTokenGrant {
    /// The parent token string
    pub token: String,
    /// Configured lifetime of the parent token in seconds
    pub expires_in: i64,
    /// User being bound to the session
    pub uid: Uid,
    pub user_session: UserSession,
}

impl ParentTokenGrant {
    pub fn lifetime(&self) -> Duration {
        lifetime_from_secs(self.expires_in)
    }
}

/// Typed view of everything stored under one parent token
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub ctime: i64,
    pub uids: UidList,
    /// Sub-token string to its metadata
    pub clients: HashMap<String, ClientToken>,
    pub users: HashMap<Uid, UserSession>,
    #[serde(rename = "expireTimeList")]
    pub expire_time_list: ExpirationIndex,
    /// Remaining container lifetime in whole seconds, `None` when the
    /// container is gone or has no expiry
    pub ttl: Option<i64>,
}

impl SessionSnapshot {
    /// True when nothing is stored under the parent token
    pub fn is_empty(&self) -> bool {
        self.ctime == 0
            && self.uids.is_empty()
            && self.clients.is_empty()
            && self.users.is_empty()
            && self.expire_time_list.is_empty()
    }
}

fn lifetime_from_secs(secs: i64) -> Duration {
    Duration::from_secs(secs.max(0) as u64)
}
