// Parent-token session module
// Tracks the sub-tokens and users bound to one SSO parent token

pub mod codec;
pub mod layout;
mod lifecycle;
pub mod parent_token;
pub mod registrar;
mod snapshot;
pub mod types;

pub use codec::{CodecError, StoreValue};
pub use parent_token::ParentTokenStore;
pub use registrar::{EvictionPlan, plan_eviction};
pub use types::{
    ClientToken, ExpirationEntry, ExpirationIndex, ParentTokenGrant, SessionSnapshot, Uid,
    UidList, UserSession,
};
