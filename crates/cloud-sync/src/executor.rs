//! Maps queue entries to RemoteDataStore calls.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use matchops_core::model::{
    AppSettings, AppState, PersonnelMember, Player, PlayerAdjustment, Season, Team,
    TeamRosterEntry, Tournament, WarmupPlan,
};
use matchops_core::sync::{SyncApplyOutcome, SyncEntityKind, SyncExecutor, SyncOp, SyncQueueEntry};
use matchops_core::{DataStore, Result, StoreError};

use crate::store::RemoteDataStore;

/// Payload of a `playerAdjustment` delete entry; the entry id alone does not
/// identify the owning player.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustmentDeletePayload {
    player_id: String,
}

fn decode<T: DeserializeOwned>(entry: &SyncQueueEntry) -> Result<T> {
    let data = entry
        .data
        .clone()
        .ok_or_else(|| StoreError::Validation("queue entry carries no payload".into()))?;
    serde_json::from_value(data)
        .map_err(|err| StoreError::Validation(format!("undecodable queue payload: {err}")))
}

fn applied_or_skipped(applied: bool, what: &str) -> SyncApplyOutcome {
    if applied {
        SyncApplyOutcome::Applied
    } else {
        SyncApplyOutcome::Skipped(format!("{what} already absent remotely"))
    }
}

/// Executor the sync engine drains the queue through in cloud mode.
///
/// Creates are applied as upserts; that is what keeps the queue's
/// create+delete annihilation rule sound. Game entries re-save the whole
/// state document, so the index-based event contract never crosses the wire
/// as individual event operations.
pub struct RemoteSyncExecutor {
    store: Arc<RemoteDataStore>,
}

impl RemoteSyncExecutor {
    pub fn new(store: Arc<RemoteDataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SyncExecutor for RemoteSyncExecutor {
    async fn apply(&self, entry: &SyncQueueEntry) -> Result<SyncApplyOutcome> {
        let store = self.store.as_ref();
        match (entry.entity_type, entry.op) {
            (SyncEntityKind::Player, SyncOp::Create | SyncOp::Update) => {
                store.upsert_player(decode::<Player>(entry)?).await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::Player, SyncOp::Delete) => {
                let deleted = store.delete_player(&entry.entity_id).await?;
                Ok(applied_or_skipped(deleted, "player"))
            }

            (SyncEntityKind::Team, SyncOp::Create | SyncOp::Update) => {
                store.upsert_team(decode::<Team>(entry)?).await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::Team, SyncOp::Delete) => {
                let deleted = store.delete_team(&entry.entity_id).await?;
                Ok(applied_or_skipped(deleted, "team"))
            }

            (SyncEntityKind::TeamRoster, SyncOp::Create | SyncOp::Update) => {
                let roster = decode::<Vec<TeamRosterEntry>>(entry)?;
                store.set_team_roster(&entry.entity_id, roster).await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::TeamRoster, SyncOp::Delete) => {
                store.set_team_roster(&entry.entity_id, Vec::new()).await?;
                Ok(SyncApplyOutcome::Applied)
            }

            (SyncEntityKind::Season, SyncOp::Create | SyncOp::Update) => {
                store.upsert_season(decode::<Season>(entry)?).await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::Season, SyncOp::Delete) => {
                let deleted = store.delete_season(&entry.entity_id).await?;
                Ok(applied_or_skipped(deleted, "season"))
            }

            (SyncEntityKind::Tournament, SyncOp::Create | SyncOp::Update) => {
                store
                    .upsert_tournament(decode::<Tournament>(entry)?)
                    .await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::Tournament, SyncOp::Delete) => {
                let deleted = store.delete_tournament(&entry.entity_id).await?;
                Ok(applied_or_skipped(deleted, "tournament"))
            }

            (SyncEntityKind::Personnel, SyncOp::Create | SyncOp::Update) => {
                store
                    .upsert_personnel_member(decode::<PersonnelMember>(entry)?)
                    .await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::Personnel, SyncOp::Delete) => {
                let deleted = store.remove_personnel_member(&entry.entity_id).await?;
                Ok(applied_or_skipped(deleted, "personnel member"))
            }

            (SyncEntityKind::Game, SyncOp::Create | SyncOp::Update) => {
                let state = decode::<AppState>(entry)?;
                store.save_game(&entry.entity_id, state).await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::Game, SyncOp::Delete) => {
                let deleted = store.delete_game(&entry.entity_id).await?;
                Ok(applied_or_skipped(deleted, "game"))
            }

            (SyncEntityKind::PlayerAdjustment, SyncOp::Create | SyncOp::Update) => {
                store
                    .upsert_player_adjustment(decode::<PlayerAdjustment>(entry)?)
                    .await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::PlayerAdjustment, SyncOp::Delete) => {
                let payload = decode::<AdjustmentDeletePayload>(entry)?;
                let deleted = store
                    .delete_player_adjustment(&payload.player_id, &entry.entity_id)
                    .await?;
                Ok(applied_or_skipped(deleted, "adjustment"))
            }

            (SyncEntityKind::WarmupPlan, SyncOp::Create | SyncOp::Update) => {
                store.save_warmup_plan(decode::<WarmupPlan>(entry)?).await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::WarmupPlan, SyncOp::Delete) => {
                let deleted = store.delete_warmup_plan().await?;
                Ok(applied_or_skipped(deleted, "warmup plan"))
            }

            (SyncEntityKind::Settings, SyncOp::Create | SyncOp::Update) => {
                store.save_settings(decode::<AppSettings>(entry)?).await?;
                Ok(SyncApplyOutcome::Applied)
            }
            (SyncEntityKind::Settings, SyncOp::Delete) => Ok(SyncApplyOutcome::Skipped(
                "settings singleton cannot be deleted".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_missing_payload() {
        let entry = SyncQueueEntry::new(SyncEntityKind::Player, "p1", SyncOp::Create, None);
        let err = decode::<Player>(&entry).unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        let entry = SyncQueueEntry::new(
            SyncEntityKind::Player,
            "p1",
            SyncOp::Create,
            Some(serde_json::json!({ "unexpected": true })),
        );
        let err = decode::<Player>(&entry).unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn adjustment_delete_payload_shape() {
        let payload: AdjustmentDeletePayload =
            serde_json::from_value(serde_json::json!({ "playerId": "player_1" })).unwrap();
        assert_eq!(payload.player_id, "player_1");
    }
}
