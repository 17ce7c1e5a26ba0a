use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use super::{inbox_root, messages_path, room_path, validate_id, ChatService};
use crate::error::{CourierError, CourierResult};
use crate::models::{ChatMessage, Identity, InboxEntry, RoomRecord, RoomSummary};
use crate::store::{read_as, read_children, DocumentStore, StoreChange};

/// Handle to a running subscription. Dropping it cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    fn spawn(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// A subscription that never delivers anything.
    pub fn inert() -> Self {
        Self { handle: None }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl ChatService {
    /// Deliver the full ordered message list of `room_id` now and again after
    /// every change to it.
    pub async fn subscribe_messages<F>(
        &self,
        room_id: &str,
        mut callback: F,
    ) -> CourierResult<Subscription>
    where
        F: FnMut(Vec<ChatMessage>) + Send + 'static,
    {
        validate_id("room_id", room_id)?;

        // subscribe before the first read so no change falls in between
        let mut changes = self.store.changes();
        callback(fetch_messages(self.store.as_ref(), room_id).await?);

        let store = self.store.clone();
        let room_id = room_id.to_string();
        let watched = messages_path(&room_id);

        let handle = tokio::spawn(async move {
            while wait_for_change(&mut changes, &watched).await {
                match fetch_messages(store.as_ref(), &room_id).await {
                    Ok(messages) => callback(messages),
                    Err(e) => warn!(room_id = %room_id, error = %e, "Failed to reload messages"),
                }
            }
            debug!(room_id = %room_id, "Message subscription closed");
        });

        Ok(Subscription::spawn(handle))
    }

    /// Deliver the caller's room list, most recent first, now and after every
    /// change to their inbox. An unauthenticated caller gets one empty list.
    pub async fn subscribe_rooms<F>(
        &self,
        identity: &Identity,
        mut callback: F,
    ) -> CourierResult<Subscription>
    where
        F: FnMut(Vec<RoomSummary>) + Send + 'static,
    {
        if !identity.is_authenticated() {
            callback(Vec::new());
            return Ok(Subscription::inert());
        }
        validate_id("identity.id", &identity.id)?;

        let mut changes = self.store.changes();
        callback(fetch_rooms(self.store.clone(), &identity.id).await?);

        let store = self.store.clone();
        let user_id = identity.id.clone();
        let watched = inbox_root(&user_id);

        let handle = tokio::spawn(async move {
            while wait_for_change(&mut changes, &watched).await {
                match fetch_rooms(store.clone(), &user_id).await {
                    Ok(rooms) => callback(rooms),
                    Err(e) => warn!(user_id = %user_id, error = %e, "Failed to reload rooms"),
                }
            }
            debug!(user_id = %user_id, "Room subscription closed");
        });

        Ok(Subscription::spawn(handle))
    }

    /// The caller's room list, most recent first.
    pub async fn rooms(&self, identity: &Identity) -> CourierResult<Vec<RoomSummary>> {
        if !identity.is_authenticated() {
            return Ok(Vec::new());
        }
        validate_id("identity.id", &identity.id)?;
        fetch_rooms(self.store.clone(), &identity.id).await
    }
}

/// Wait for a change under `watched`, then drain whatever else is already
/// queued so one batch causes one reload. Returns false once the store is gone.
async fn wait_for_change(changes: &mut broadcast::Receiver<StoreChange>, watched: &str) -> bool {
    loop {
        match changes.recv().await {
            Ok(change) if change.affects(watched) => break,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Subscription lagged, reloading");
                break;
            }
            Err(RecvError::Closed) => return false,
        }
    }

    loop {
        match changes.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Closed) => return true,
        }
    }
}

pub(crate) async fn fetch_messages(
    store: &dyn DocumentStore,
    room_id: &str,
) -> CourierResult<Vec<ChatMessage>> {
    let mut messages: Vec<ChatMessage> = read_children(store, &messages_path(room_id))
        .await?
        .into_iter()
        .map(|(key, message): (String, ChatMessage)| message.with_id(key))
        .collect();
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    Ok(messages)
}

/// Inbox entries merged with their rooms; entries whose room is gone are skipped.
pub(crate) async fn fetch_rooms(
    store: Arc<dyn DocumentStore>,
    user_id: &str,
) -> CourierResult<Vec<RoomSummary>> {
    let entries: Vec<(String, InboxEntry)> =
        read_children(store.as_ref(), &inbox_root(user_id)).await?;

    let mut lookups = JoinSet::new();
    for (room_id, entry) in entries {
        let store = store.clone();
        lookups.spawn(async move {
            let room = read_as::<RoomRecord>(store.as_ref(), &room_path(&room_id)).await;
            (room_id, entry, room)
        });
    }

    let mut rooms = Vec::with_capacity(lookups.len());
    while let Some(joined) = lookups.join_next().await {
        let (room_id, entry, room) =
            joined.map_err(|e| CourierError::Internal(format!("room lookup failed: {}", e)))?;
        match room? {
            Some(room) => rooms.push(RoomSummary::merge(room_id, room, entry)),
            None => debug!(room_id = %room_id, "Skipping inbox entry without a room"),
        }
    }

    rooms.sort_by(|a, b| {
        b.last_message_timestamp
            .cmp(&a.last_message_timestamp)
            .then_with(|| a.room_id.cmp(&b.room_id))
    });
    Ok(rooms)
}
