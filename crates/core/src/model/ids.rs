//! Opaque entity identifiers and timestamp helpers.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// Generate a fresh opaque id with a type prefix, e.g. `player_0192f3…`.
/// Ids are assigned once at creation and never reassigned.
pub fn new_entity_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Current instant as an ISO-8601 UTC string, the format used by every
/// persisted `created_at` / `updated_at`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_are_prefixed_and_unique() {
        let a = new_entity_id("player");
        let b = new_entity_id("player");
        assert!(a.starts_with("player_"));
        assert_ne!(a, b);
    }

    #[test]
    fn now_iso_is_rfc3339_utc() {
        let ts = now_iso();
        let parsed = chrono::DateTime::parse_from_rfc3339(&ts).expect("parse timestamp");
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }
}
