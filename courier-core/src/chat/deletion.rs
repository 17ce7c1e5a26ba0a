use serde::Serialize;
use tracing::{info, warn};

use super::{
    inbox_path, inbox_root, messages_path, require_identity, room_path, validate_id, ChatService,
};
use crate::error::{CourierError, CourierResult};
use crate::models::{Identity, RoomRecord};
use crate::store::{read_as, read_children, DocumentStore, WriteBatch};

/// Outcome of deleting every room of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl DeletionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl ChatService {
    /// Delete a room, its messages and every participant's inbox entry in one
    /// batch. Only participants may do this.
    pub async fn delete_room(&self, identity: &Identity, room_id: &str) -> CourierResult<()> {
        let me = require_identity(identity)?;
        validate_id("room_id", room_id)?;

        let room: RoomRecord = read_as(self.store.as_ref(), &room_path(room_id))
            .await?
            .ok_or_else(|| CourierError::RoomNotFound(room_id.to_string()))?;

        if !room.is_participant(me) {
            return Err(CourierError::NotParticipant {
                room_id: room_id.to_string(),
                user_id: me.to_string(),
            });
        }

        let mut batch = WriteBatch::new();
        batch.delete(messages_path(room_id));
        for participant in &room.participants {
            if validate_id("participant", participant).is_ok() {
                batch.delete(inbox_path(participant, room_id));
            }
        }
        batch.delete(room_path(room_id));
        self.store.apply(batch).await?;

        info!(room_id = %room_id, user_id = %me, "Deleted chat room");
        Ok(())
    }

    /// Delete every room in a user's inbox, continuing past failures.
    ///
    /// Inbox entries that point at a room that no longer exists are removed.
    pub async fn delete_all_for_user(&self, user_id: &str) -> CourierResult<DeletionReport> {
        validate_id("user_id", user_id)?;
        let identity = Identity::new(user_id);

        let room_ids: Vec<String> =
            read_children::<serde_json::Value>(self.store.as_ref(), &inbox_root(user_id))
                .await?
                .into_iter()
                .map(|(room_id, _)| room_id)
                .collect();

        let mut report = DeletionReport::default();
        for room_id in room_ids {
            let result = match self.delete_room(&identity, &room_id).await {
                Err(CourierError::RoomNotFound(_)) => self
                    .store
                    .remove(&inbox_path(user_id, &room_id))
                    .await
                    .map_err(CourierError::from),
                other => other,
            };

            match result {
                Ok(()) => report.deleted.push(room_id),
                Err(e) => {
                    warn!(
                        room_id = %room_id,
                        user_id = %user_id,
                        error = %e,
                        "Failed to delete room"
                    );
                    report.failed.push((room_id, e.to_string()));
                }
            }
        }

        info!(
            user_id = %user_id,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Deleted user chats"
        );
        Ok(report)
    }
}
