use serde_json::json;
use tracing::{debug, info};

use super::{
    inbox_path, inbox_root, now_millis, require_identity, room_path, validate_id, ChatService,
};
use crate::error::CourierResult;
use crate::models::{Identity, InboxEntry, RoomRecord};
use crate::store::{read_as, read_children, DocumentStore, WriteBatch};

impl ChatService {
    /// Make sure the room for `(current_user_id, other_user_id, context_id)`
    /// and both inbox entries exist, returning the room id.
    ///
    /// A new room and its two inbox entries are written in one batch of field
    /// writes, with counters touched only through a zero increment, so two
    /// callers creating the same room never reset each other's deliveries.
    /// Last-message fields start absent and read back blank. On an existing
    /// room only drifted fields are repaired (context id, participant pair,
    /// missing inbox entries); a consistent room costs no writes.
    pub async fn ensure_room(
        &self,
        current_user_id: &str,
        other_user_id: &str,
        context_id: Option<&str>,
    ) -> CourierResult<String> {
        let room_id = self.room_id_for(current_user_id, other_user_id, context_id)?;
        let context = super::resolve_context(context_id, &self.settings.general_context);

        let mut participants = vec![current_user_id.to_string(), other_user_id.to_string()];
        participants.sort();

        let existing: Option<RoomRecord> = read_as(self.store.as_ref(), &room_path(&room_id)).await?;

        let mut batch = WriteBatch::new();

        match existing {
            None => {
                // Field writes only: a racing creator must not clobber the
                // summaries or counters of a message delivered in between.
                let path = room_path(&room_id);
                batch
                    .set(format!("{}/createdAt", path), json!(now_millis()))
                    .set(format!("{}/participants", path), json!(participants))
                    .set(format!("{}/contextId", path), json!(context));

                for (owner, other) in [
                    (current_user_id, other_user_id),
                    (other_user_id, current_user_id),
                ] {
                    let entry_path = inbox_path(owner, &room_id);
                    batch
                        .increment(format!("{}/unreadCount", entry_path), 0)
                        .set(format!("{}/contextId", entry_path), json!(context))
                        .set(format!("{}/otherUserId", entry_path), json!(other));
                }

                self.store.apply(batch).await?;
                info!(room_id = %room_id, context_id = %context, "Created chat room");
                return Ok(room_id);
            }
            Some(room) => {
                let path = room_path(&room_id);

                if room.context_id != context {
                    batch.set(format!("{}/contextId", path), json!(context));
                }
                if room.participants != participants {
                    batch.set(format!("{}/participants", path), json!(participants));
                }

                for (owner, other) in [
                    (current_user_id, other_user_id),
                    (other_user_id, current_user_id),
                ] {
                    let entry_path = inbox_path(owner, &room_id);
                    if self.store.get(&entry_path).await?.is_none() {
                        batch
                            .increment(format!("{}/unreadCount", entry_path), 0)
                            .set(format!("{}/lastMessage", entry_path), json!(room.last_message))
                            .set(
                                format!("{}/lastMessageTimestamp", entry_path),
                                json!(room.last_message_timestamp),
                            )
                            .set(format!("{}/contextId", entry_path), json!(context))
                            .set(format!("{}/otherUserId", entry_path), json!(other));
                    }
                }
            }
        }

        if !batch.is_empty() {
            debug!(room_id = %room_id, writes = batch.len(), "Repairing chat room");
            self.store.apply(batch).await?;
        }

        Ok(room_id)
    }

    /// Open (creating when needed) the room between the caller and `other_user_id`.
    pub async fn open_room(
        &self,
        identity: &Identity,
        other_user_id: &str,
        context_id: Option<&str>,
    ) -> CourierResult<String> {
        let me = require_identity(identity)?;
        validate_id("other_user_id", other_user_id)?;
        self.ensure_room(me, other_user_id, context_id).await
    }

    /// Room to continue a conversation with `other_user_id` when no context is known.
    ///
    /// Picks the caller's most recent room with that user about a specific
    /// context, and falls back to their general room.
    pub async fn resume_conversation(
        &self,
        identity: &Identity,
        other_user_id: &str,
    ) -> CourierResult<String> {
        let me = require_identity(identity)?;
        validate_id("other_user_id", other_user_id)?;

        let entries: Vec<(String, InboxEntry)> =
            read_children(self.store.as_ref(), &inbox_root(me)).await?;

        let latest = entries
            .into_iter()
            .filter(|(_, entry)| {
                entry.other_user_id == other_user_id
                    && !entry.context_id.is_empty()
                    && entry.context_id != self.settings.general_context
                    && entry.context_id != self.settings.escrow_context
            })
            .max_by_key(|(_, entry)| entry.last_message_timestamp);

        let context = latest.map(|(_, entry)| entry.context_id);
        debug!(
            user_id = %me,
            other_user_id = %other_user_id,
            context_id = context.as_deref().unwrap_or(&self.settings.general_context),
            "Resuming conversation"
        );

        self.ensure_room(me, other_user_id, context.as_deref()).await
    }
}
