//! Sync queue domain model: entry shape, entity kinds, coalescing table.

use serde::{Deserialize, Serialize};

/// Entity kinds that flow through the sync queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncEntityKind {
    Player,
    Team,
    TeamRoster,
    Season,
    Tournament,
    Personnel,
    Game,
    PlayerAdjustment,
    WarmupPlan,
    Settings,
}

/// Supported sync operations. Upserts are encoded as `Create` so the
/// create+delete annihilation rule stays correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOp {
    Create,
    Update,
    Delete,
}

/// One pending remote operation, persisted in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueEntry {
    pub id: String,
    pub entity_type: SyncEntityKind,
    pub entity_id: String,
    pub op: SyncOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub enqueued_at: String,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<String>,
}

impl SyncQueueEntry {
    pub fn new(
        entity_type: SyncEntityKind,
        entity_id: impl Into<String>,
        op: SyncOp,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            entity_type,
            entity_id: entity_id.into(),
            op,
            data,
            enqueued_at: crate::model::now_iso(),
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
        }
    }
}

/// Queue counters exposed to status consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending_count: usize,
    pub failed_count: usize,
}

/// Outcome of coalescing an incoming op against a prior pending op for the
/// same `(entity_type, entity_id)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Coalesced {
    /// Replace the prior entry in place (keeps its queue position).
    Replace(SyncQueueEntry),
    /// Prior and incoming annihilate; remove the prior entry entirely.
    RemoveBoth,
}

/// The coalescing table:
///
/// | prior    | incoming | result                              |
/// |----------|----------|-------------------------------------|
/// | update   | update   | later update                        |
/// | create   | update   | create carrying the latest data     |
/// | create   | delete   | nothing                             |
/// | update   | delete   | delete                              |
/// | anything | create   | incoming create (upsert semantics)  |
///
/// Replacements keep the prior entry's queue position, so the engine still
/// observes first-enqueue order.
pub fn coalesce(prior: &SyncQueueEntry, incoming: SyncQueueEntry) -> Coalesced {
    match (prior.op, incoming.op) {
        (SyncOp::Create, SyncOp::Delete) => Coalesced::RemoveBoth,
        (SyncOp::Create, SyncOp::Update) => {
            let mut merged = incoming;
            merged.op = SyncOp::Create;
            Coalesced::Replace(merged)
        }
        _ => Coalesced::Replace(incoming),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(op: SyncOp, data: Option<serde_json::Value>) -> SyncQueueEntry {
        SyncQueueEntry::new(SyncEntityKind::Player, "player_1", op, data)
    }

    #[test]
    fn update_then_update_keeps_later() {
        let prior = entry(SyncOp::Update, Some(serde_json::json!({ "name": "A" })));
        let incoming = entry(SyncOp::Update, Some(serde_json::json!({ "name": "B" })));
        match coalesce(&prior, incoming) {
            Coalesced::Replace(kept) => {
                assert_eq!(kept.op, SyncOp::Update);
                assert_eq!(kept.data.unwrap()["name"], "B");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn create_then_update_stays_create_with_latest_data() {
        let prior = entry(SyncOp::Create, Some(serde_json::json!({ "name": "A" })));
        let incoming = entry(SyncOp::Update, Some(serde_json::json!({ "name": "B" })));
        match coalesce(&prior, incoming) {
            Coalesced::Replace(kept) => {
                assert_eq!(kept.op, SyncOp::Create);
                assert_eq!(kept.data.unwrap()["name"], "B");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn create_then_delete_annihilates() {
        let prior = entry(SyncOp::Create, Some(serde_json::json!({ "name": "A" })));
        let incoming = entry(SyncOp::Delete, None);
        assert_eq!(coalesce(&prior, incoming), Coalesced::RemoveBoth);
    }

    #[test]
    fn update_then_delete_keeps_delete() {
        let prior = entry(SyncOp::Update, Some(serde_json::json!({ "name": "A" })));
        let incoming = entry(SyncOp::Delete, None);
        match coalesce(&prior, incoming) {
            Coalesced::Replace(kept) => assert_eq!(kept.op, SyncOp::Delete),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn delete_then_create_keeps_create() {
        // A delete pending when an upsert arrives: the create (upsert) wins.
        let prior = entry(SyncOp::Delete, None);
        let incoming = entry(SyncOp::Create, Some(serde_json::json!({ "name": "B" })));
        match coalesce(&prior, incoming) {
            Coalesced::Replace(kept) => assert_eq!(kept.op, SyncOp::Create),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn entity_kind_serialization_matches_queue_contract() {
        let actual = [
            SyncEntityKind::Player,
            SyncEntityKind::Team,
            SyncEntityKind::TeamRoster,
            SyncEntityKind::Season,
            SyncEntityKind::Tournament,
            SyncEntityKind::Personnel,
            SyncEntityKind::Game,
            SyncEntityKind::PlayerAdjustment,
            SyncEntityKind::WarmupPlan,
            SyncEntityKind::Settings,
        ]
        .iter()
        .map(|kind| serde_json::to_string(kind).expect("serialize entity kind"))
        .collect::<Vec<_>>();

        let expected = vec![
            "\"player\"",
            "\"team\"",
            "\"teamRoster\"",
            "\"season\"",
            "\"tournament\"",
            "\"personnel\"",
            "\"game\"",
            "\"playerAdjustment\"",
            "\"warmupPlan\"",
            "\"settings\"",
        ];

        assert_eq!(actual, expected);
    }
}
