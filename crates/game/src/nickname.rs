//! Nickname rules shared by the relay and the client.
//!
//! `validate` is what the relay enforces. `sanitize` only strips characters
//! and can return names that still fail `validate`, so clients that accept
//! free-form input should go through `canonicalize`, which rejects input that
//! sanitising would have changed.

pub const MIN_LEN: usize = 2;
pub const MAX_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NicknameError {
    #[error("Invalid nickname length (2-20 characters required)")]
    Length,
    #[error("Invalid characters in nickname (only letters, numbers, underscore, and dash allowed)")]
    Characters,
    #[error("Nickname already taken")]
    Taken,
    #[error("Player already registered")]
    AlreadyRegistered,
}

pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Trims `raw` and checks it, returning the trimmed nickname.
pub fn validate(raw: &str) -> Result<&str, NicknameError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if !(MIN_LEN..=MAX_LEN).contains(&len) {
        return Err(NicknameError::Length);
    }
    if !trimmed.chars().all(is_allowed_char) {
        return Err(NicknameError::Characters);
    }
    Ok(trimmed)
}

pub fn is_valid(raw: &str) -> bool {
    validate(raw).is_ok()
}

/// Drops every character outside `[A-Za-z0-9_-]`. Length is left alone.
pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(|&c| is_allowed_char(c)).collect()
}

pub fn canonicalize(raw: &str) -> Result<String, NicknameError> {
    let sanitized = sanitize(raw);
    let nickname = validate(&sanitized)?;
    if nickname != raw.trim() {
        return Err(NicknameError::Characters);
    }
    Ok(nickname.to_string())
}
