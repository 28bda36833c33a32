//! Conversation title derivation.
//!
//! Titles come from the first message of a conversation: short seeds are
//! used verbatim, long ones are cut to a fixed prefix with an ellipsis.

/// Title used when there is neither an explicit title nor a seed.
pub const DEFAULT_TITLE: &str = "New conversation";

/// Seeds longer than this many characters get truncated.
pub const TRUNCATE_ABOVE: usize = 50;

/// Characters kept from a truncated seed.
pub const TRUNCATED_LEN: usize = 25;

pub const ELLIPSIS: &str = "...";

/// Derive a display title from the seed content.
///
/// Counts characters, not bytes, so multi-byte text is never split inside a
/// code point. Leading and trailing whitespace is ignored.
pub fn derive_title(seed: Option<&str>) -> String {
    let Some(seed) = seed.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_TITLE.to_string();
    };

    if seed.chars().count() > TRUNCATE_ABOVE {
        let mut title: String = seed.chars().take(TRUNCATED_LEN).collect();
        title.push_str(ELLIPSIS);
        title
    } else {
        seed.to_string()
    }
}

/// Pick the explicit title if it has content, else derive one.
pub fn resolve_title(explicit: Option<&str>, seed: Option<&str>) -> String {
    match explicit.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => derive_title(seed),
    }
}
