//! Allow-list validation for caller-supplied profile keys.
//!
//! Callers are expected to sanitize identifiers already; the store re-checks
//! before a key reaches any lookup or path construction.

use crate::storage::ProfileStoreError;

pub const MAX_KEY_LEN: usize = 64;

/// Accepts 1..=64 characters of `[A-Za-z0-9_.:-]`, not starting with `.`.
pub fn validate_key(key: &str) -> Result<&str, ProfileStoreError> {
    if key.is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(invalid(&format!(
            "key longer than {MAX_KEY_LEN} characters"
        )));
    }
    if key.starts_with('.') {
        return Err(invalid("key must not start with '.'"));
    }
    if let Some(bad) = key.chars().find(|c| !is_allowed(*c)) {
        return Err(invalid(&format!("key contains disallowed character {bad:?}")));
    }
    Ok(key)
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn invalid(reason: &str) -> ProfileStoreError {
    ProfileStoreError::Validation {
        reason: reason.to_string(),
    }
}
