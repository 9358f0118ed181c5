//! Deterministic per-user database naming.

use matchops_core::{Result, StoreError};

/// Prefix of every user-scoped database name.
pub const USER_DB_PREFIX: &str = "matchops_user_";

/// Pre-scoping database name, recognized for one-time adoption on behalf of
/// users who signed in before per-user isolation existed.
pub const LEGACY_DATABASE_NAME: &str = "MatchOpsLocal";

/// Hard cap on a full database name.
pub const MAX_DATABASE_NAME_LEN: usize = 255;

fn validated_user_id(user_id: &str) -> Result<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation("user id must not be empty".into()));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StoreError::Validation(format!(
            "user id '{trimmed}' contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(trimmed)
}

/// `matchops_user_<userId>` after validating the id.
pub fn database_name(user_id: &str) -> Result<String> {
    let user_id = validated_user_id(user_id)?;
    let name = format!("{USER_DB_PREFIX}{user_id}");
    if name.len() > MAX_DATABASE_NAME_LEN {
        return Err(StoreError::Validation(format!(
            "database name exceeds {MAX_DATABASE_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

pub fn is_user_scoped(name: &str) -> bool {
    name.len() > USER_DB_PREFIX.len() && name.starts_with(USER_DB_PREFIX)
}

pub fn extract_user_id(name: &str) -> Option<&str> {
    name.strip_prefix(USER_DB_PREFIX).filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trips_with_extract() {
        let name = database_name("abc-123_X").unwrap();
        assert_eq!(name, "matchops_user_abc-123_X");
        assert!(is_user_scoped(&name));
        assert_eq!(extract_user_id(&name), Some("abc-123_X"));
    }

    #[test]
    fn rejects_empty_whitespace_and_bad_characters() {
        assert!(database_name("").is_err());
        assert!(database_name("   ").is_err());
        assert!(database_name("user id").is_err());
        assert!(database_name("user/../etc").is_err());
    }

    #[test]
    fn enforces_length_cap() {
        let long_id = "a".repeat(MAX_DATABASE_NAME_LEN);
        assert!(database_name(&long_id).is_err());
        let ok_id = "a".repeat(MAX_DATABASE_NAME_LEN - USER_DB_PREFIX.len());
        assert!(database_name(&ok_id).is_ok());
    }

    #[test]
    fn legacy_name_is_not_user_scoped() {
        assert!(!is_user_scoped(LEGACY_DATABASE_NAME));
        assert_eq!(extract_user_id(LEGACY_DATABASE_NAME), None);
        assert_eq!(extract_user_id(USER_DB_PREFIX), None);
    }
}
