//! Input validators.
//!
//! Pure predicates over user-supplied text; the presentation layer calls
//! these before handing anything to the session.

/// Maximum outgoing message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Room codes are 8-16 characters drawn from `A-Z` and `0-9`.
pub fn room_code(code: &str) -> bool {
    (8..=16).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Messages are non-empty and at most [`MAX_MESSAGE_CHARS`] characters.
pub fn message(text: &str) -> bool {
    let count = text.chars().count();
    count > 0 && count <= MAX_MESSAGE_CHARS
}
