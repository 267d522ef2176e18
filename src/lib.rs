// Parent-token session store for SSO servers
pub mod clock;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendConfig, ExpiryPolicy, SsoStoreConfig};
pub use error::{Result, SsoStoreError};
pub use session::{
    ClientToken, ExpirationEntry, ExpirationIndex, ParentTokenGrant, ParentTokenStore,
    SessionSnapshot, Uid, UidList, UserSession,
};
pub use storage::{HashStore, KeyTtl, MemoryHashStore, RedisHashStore, StoreError};
