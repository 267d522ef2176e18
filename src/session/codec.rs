// Byte codec for the values stored in a parent-token container

use super::types::{ClientToken, ExpirationIndex, UidList, UserSession};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Failure to encode or decode a stored value
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct CodecError(#[from] serde_json::Error);

/// A value shape that can be written into a container field
pub trait StoreValue: Serialize + DeserializeOwned {
    /// Shape name used in error context
    const SHAPE: &'static str;

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl StoreValue for UidList {
    const SHAPE: &'static str = "uid list";
}

impl StoreValue for ClientToken {
    const SHAPE: &'static str = "client token";
}

impl StoreValue for UserSession {
    const SHAPE: &'static str = "user session";
}

impl StoreValue for ExpirationIndex {
    const SHAPE: &'static str = "expiration index";
}
