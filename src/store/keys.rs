//! Key layout inside the engine.
//!
//! ```text
//! member:{guild}:{user}
//! message:{guild}:{channel}:{message}
//! index:{guild}:{author}:{created_at_ms:020}:{message:020}
//! ```
//!
//! Index components are zero-padded so byte order equals numeric order.

use crate::models::Snowflake;

use super::{CacheError, CacheResult};

pub const SEPARATOR: char = ':';

/// Reject IDs that would break the key layout.
pub fn validate_id(kind: &str, id: &str) -> CacheResult<()> {
    if id.is_empty() {
        return Err(CacheError::Invalid(format!("{kind} id is empty")));
    }
    if id.contains(SEPARATOR) {
        return Err(CacheError::Invalid(format!(
            "{kind} id {id:?} contains '{SEPARATOR}'"
        )));
    }
    Ok(())
}

pub fn member(guild_id: &str, user_id: &str) -> String {
    format!("member:{guild_id}:{user_id}")
}

pub fn member_prefix() -> &'static str {
    "member:"
}

pub fn message(guild_id: &str, channel_id: &str, message_id: Snowflake) -> String {
    format!("message:{guild_id}:{channel_id}:{message_id}")
}

pub fn message_prefix() -> &'static str {
    "message:"
}

pub fn index(guild_id: &str, author_id: &str, message_id: Snowflake) -> String {
    format!(
        "index:{guild_id}:{author_id}:{:020}:{:020}",
        message_id.timestamp_millis(),
        message_id.0
    )
}

/// Prefix covering every index entry of one author in one guild.
pub fn index_author_prefix(guild_id: &str, author_id: &str) -> String {
    format!("index:{guild_id}:{author_id}:")
}

pub fn index_prefix() -> &'static str {
    "index:"
}

/// Exclusive upper bound of all keys starting with `prefix`.
///
/// UTF-8 byte order follows code point order, so bumping the last char
/// yields a bound. Returns `None` for an empty prefix.
pub fn prefix_end(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = char::from_u32(last as u32 + 1) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let id = Snowflake(1000000000000000001);
        assert_eq!(member("g1", "u1"), "member:g1:u1");
        assert_eq!(message("g1", "c1", id), "message:g1:c1:1000000000000000001");
        assert_eq!(
            index("g1", "u1", id),
            "index:g1:u1:00000001658488979101:01000000000000000001"
        );
        assert!(index("g1", "u1", id).starts_with(&index_author_prefix("g1", "u1")));
    }

    #[test]
    fn test_index_keys_sort_numerically() {
        let short = index("g", "u", Snowflake(999));
        let long = index("g", "u", Snowflake(1000000000000000001));
        assert!(short < long);
    }

    #[test]
    fn test_author_prefix_does_not_match_longer_ids() {
        let prefix = index_author_prefix("g1", "u1");
        let other = index("g1", "u10", Snowflake(5));
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn test_prefix_end() {
        assert_eq!(prefix_end("index:g:u:").as_deref(), Some("index:g:u;"));
        assert_eq!(prefix_end(""), None);
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("guild", "123").is_ok());
        assert!(validate_id("guild", "").is_err());
        assert!(validate_id("user", "a:b").is_err());
    }
}
