// Field naming scheme inside a parent-token container

use super::types::Uid;

/// Creation time field
pub const FIELD_CTIME: &str = "ctime";
/// Bound user ids field
pub const FIELD_UIDS: &str = "uids";
/// Expiration index field
pub const FIELD_EXPIRE_TIME_LIST: &str = "expireTimeList";
/// Namespace of per-client sub-token fields
pub const CLIENT_PREFIX: &str = "client:";
/// Namespace of per-user session fields
pub const USER_PREFIX: &str = "user:";

/// Classification of a raw container field name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind<'a> {
    Ctime,
    Uids,
    ExpireTimeList,
    Client(&'a str),
    User(Uid),
    /// Well-formed prefix but unusable suffix
    Malformed,
    Unknown,
}

/// Container key for a parent token, from a template with one `{}`
pub fn container_key(template: &str, parent_token: &str) -> String {
    template.replacen("{}", parent_token, 1)
}

/// True when a sub-token can be stored as a client field and classified back
pub fn is_valid_sub_token(sub_token: &str) -> bool {
    !sub_token.is_empty() && !sub_token.contains(':')
}

pub fn client_field(sub_token: &str) -> String {
    format!("{}{}", CLIENT_PREFIX, sub_token)
}

pub fn user_field(uid: Uid) -> String {
    format!("{}{}", USER_PREFIX, uid)
}

/// Classify a field name read back from the store.
///
/// A client field whose sub-token contains `:` and a user field whose
/// suffix is not a non-zero integer are malformed.
pub fn classify(field: &str) -> FieldKind<'_> {
    match field {
        FIELD_CTIME => FieldKind::Ctime,
        FIELD_UIDS => FieldKind::Uids,
        FIELD_EXPIRE_TIME_LIST => FieldKind::ExpireTimeList,
        _ => {
            if let Some(sub_token) = field.strip_prefix(CLIENT_PREFIX) {
                if !is_valid_sub_token(sub_token) {
                    return FieldKind::Malformed;
                }
                return FieldKind::Client(sub_token);
            }
            if let Some(uid) = field.strip_prefix(USER_PREFIX) {
                return match uid.parse::<Uid>() {
                    Ok(uid) if uid != 0 => FieldKind::User(uid),
                    _ => FieldKind::Malformed,
                };
            }
            FieldKind::Unknown
        }
    }
}
