// Error taxonomy for parent-token session operations

use crate::session::codec::CodecError;
use crate::storage::StoreError;

/// Errors surfaced by [`ParentTokenStore`](crate::session::ParentTokenStore) operations.
///
/// A missing key or field is not an error at this level: the store reports it
/// as `Ok(None)` and each operation decides whether absence is benign.
#[derive(Debug, thiserror::Error)]
pub enum SsoStoreError {
    /// The backing store failed or timed out.
    #[error("{op}: store unavailable: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    /// A sub-token was registered against a parent token that has no record.
    #[error("{op}: parent token session not found: {parent_token}")]
    PreconditionFailed {
        op: &'static str,
        parent_token: String,
    },

    /// A sub-token that cannot be stored as a `client:<token>` field:
    /// empty, or containing the `:` separator.
    #[error("{op}: invalid sub-token {token:?}")]
    InvalidSubToken { op: &'static str, token: String },

    /// Stored bytes for a value shape could not be decoded.
    #[error("{op}: failed to decode {shape}: {source}")]
    Decode {
        op: &'static str,
        shape: &'static str,
        #[source]
        source: CodecError,
    },

    /// A value could not be serialized for storage.
    #[error("{op}: failed to encode {shape}: {source}")]
    Encode {
        op: &'static str,
        shape: &'static str,
        #[source]
        source: CodecError,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SsoStoreError {
    pub(crate) fn store(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| SsoStoreError::Store { op, source }
    }

    pub(crate) fn decode(op: &'static str, shape: &'static str) -> impl FnOnce(CodecError) -> Self {
        move |source| SsoStoreError::Decode { op, shape, source }
    }

    pub(crate) fn encode(op: &'static str, shape: &'static str) -> impl FnOnce(CodecError) -> Self {
        move |source| SsoStoreError::Encode { op, shape, source }
    }

    /// True for failures of the backing store itself (network, timeout).
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, SsoStoreError::Store { .. })
    }

    /// True when the caller registered a sub-token before creating the session.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, SsoStoreError::PreconditionFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, SsoStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_carries_operation_context() {
        let err = SsoStoreError::store("parent_token.create")(StoreError::Connection(
            "connection refused".to_string(),
        ));
        assert!(err.is_store_unavailable());
        let message = err.to_string();
        assert!(message.contains("parent_token.create"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_precondition_failed_message() {
        let err = SsoStoreError::PreconditionFailed {
            op: "parent_token.set_token",
            parent_token: "P1".to_string(),
        };
        assert!(err.is_precondition_failed());
        assert!(!err.is_store_unavailable());
        assert!(err.to_string().contains("P1"));
    }

    #[test]
    fn test_invalid_sub_token_is_not_a_store_failure() {
        let err = SsoStoreError::InvalidSubToken {
            op: "parent_token.set_token",
            token: "a:b".to_string(),
        };
        assert!(!err.is_store_unavailable());
        assert!(!err.is_precondition_failed());
        assert!(err.to_string().contains("\"a:b\""));
    }
}
