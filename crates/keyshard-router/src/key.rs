//! Routing key extraction
//!
//! A key containing `{...}` is routed by the text between the first `{` and
//! the last `}` instead of the whole key, so `user{42}:name` and
//! `cart{42}` land on the same shard.

/// The tag of `key`, if it has one.
///
/// The closing brace must come after the opening one. An empty tag (`a{}b`)
/// is still a tag and routes by the empty string.
pub fn find_tag(key: &str) -> Option<&str> {
    let open = key.find('{')?;
    let close = key.rfind('}')?;
    if close <= open {
        return None;
    }
    Some(&key[open + 1..close])
}

/// True if `key` carries a `{tag}`
pub fn has_tag(key: &str) -> bool {
    find_tag(key).is_some()
}

/// The string actually hashed for `key`: its tag, or the key itself
pub fn extract_routing_key(key: &str) -> &str {
    find_tag(key).unwrap_or(key)
}
