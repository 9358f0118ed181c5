//! Name normalization shared by every store implementation.

use crate::errors::{Result, StoreError};

/// Upper bound on entity names after trimming.
pub const NAME_MAX_LEN: usize = 100;

/// Trim and validate a display name. Empty or oversized names are rejected
/// before any storage write.
pub fn normalized_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation("name must not be empty".into()));
    }
    if trimmed.chars().count() > NAME_MAX_LEN {
        return Err(StoreError::Validation(format!(
            "name exceeds {NAME_MAX_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Case-folded form used in composite uniqueness comparisons.
pub fn folded_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(normalized_name("  Alice  ").unwrap(), "Alice");
    }

    #[test]
    fn rejects_empty_and_whitespace_only() {
        assert!(normalized_name("").is_err());
        assert!(normalized_name("   ").is_err());
    }

    #[test]
    fn rejects_oversized() {
        let long = "x".repeat(NAME_MAX_LEN + 1);
        assert!(normalized_name(&long).is_err());
        let max = "x".repeat(NAME_MAX_LEN);
        assert_eq!(normalized_name(&max).unwrap(), max);
    }

    #[test]
    fn folding_is_case_insensitive() {
        assert_eq!(folded_name(" Eagles "), folded_name("EAGLES"));
    }
}
