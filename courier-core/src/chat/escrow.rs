use serde_json::json;
use tracing::{info, warn};

use super::{
    inbox_path, message_path, now_millis, require_identity, require_text, resolve_context,
    room_path, ChatService,
};
use crate::config::EscrowRouting;
use crate::error::CourierResult;
use crate::models::{ChatMessage, Identity, RoomRecord};
use crate::store::{read_as, DocumentStore, WriteBatch};

impl ChatService {
    /// Id of the account that handles escrow conversations, if any.
    ///
    /// Lookup failures are logged and reported as no agent.
    pub async fn resolve_escrow_agent(&self) -> Option<String> {
        match self.roles.find_escrow_agent().await {
            Ok(agent) => agent,
            Err(e) => {
                warn!(error = %e, "Escrow agent lookup failed");
                None
            }
        }
    }

    /// Send a message to the escrow agent, or to the placeholder recipient
    /// when no agent is registered. Returns the stored message and its room.
    pub async fn send_to_escrow_agent(
        &self,
        identity: &Identity,
        text: &str,
        context_id: Option<&str>,
    ) -> CourierResult<(String, ChatMessage)> {
        let me = require_identity(identity)?;
        require_text("text", text)?;

        let agent = self
            .resolve_escrow_agent()
            .await
            .filter(|agent| agent != me)
            .unwrap_or_else(|| self.settings.escrow_placeholder_id.clone());
        let context = resolve_context(context_id, &self.settings.escrow_context);

        match self.settings.escrow_routing {
            EscrowRouting::PerUser => {
                let message = self.send(identity, &agent, text, Some(&context)).await?;
                let room_id = self.room_id_for(me, &agent, Some(&context))?;
                Ok((room_id, message))
            }
            EscrowRouting::SharedQueue => {
                let message = ChatMessage::text(
                    me,
                    identity.sender_name(&self.settings.default_sender_name),
                    agent,
                    text,
                    context,
                    now_millis(),
                );
                let message = self.deliver_to_queue(message).await?;
                Ok((self.settings.escrow_room_id.clone(), message))
            }
        }
    }

    /// One batch against the shared escrow room: room upsert with the
    /// participant union, both inbox entries, and the message.
    async fn deliver_to_queue(&self, message: ChatMessage) -> CourierResult<ChatMessage> {
        let room_id = self.settings.escrow_room_id.as_str();
        let path = room_path(room_id);
        let existing: Option<RoomRecord> = read_as(self.store.as_ref(), &path).await?;

        let mut participants = existing
            .as_ref()
            .map(|room| room.participants.clone())
            .unwrap_or_default();
        for id in [&message.sender_id, &message.recipient_id] {
            if !participants.contains(id) {
                participants.push(id.clone());
            }
        }

        let message = message.with_id(self.store.push_key());
        let mut batch = WriteBatch::new();

        if existing.is_none() {
            batch.set(format!("{}/createdAt", path), json!(message.timestamp));
        }
        batch
            .set(format!("{}/participants", path), json!(participants))
            .set(format!("{}/lastMessage", path), json!(message.text))
            .set(format!("{}/lastMessageTimestamp", path), json!(message.timestamp))
            .set(format!("{}/lastSenderId", path), json!(message.sender_id))
            .set(format!("{}/contextId", path), json!(message.context_id));

        let sender_inbox = inbox_path(&message.sender_id, room_id);
        batch
            .increment(format!("{}/unreadCount", sender_inbox), 0)
            .set(format!("{}/lastMessage", sender_inbox), json!(message.text))
            .set(
                format!("{}/lastMessageTimestamp", sender_inbox),
                json!(message.timestamp),
            )
            .set(format!("{}/contextId", sender_inbox), json!(message.context_id))
            .set(format!("{}/otherUserId", sender_inbox), json!(message.recipient_id));

        if message.recipient_id != self.settings.escrow_placeholder_id {
            let agent_inbox = inbox_path(&message.recipient_id, room_id);
            batch
                .increment(format!("{}/unreadCount", agent_inbox), 1)
                .set(format!("{}/lastMessage", agent_inbox), json!(message.text))
                .set(
                    format!("{}/lastMessageTimestamp", agent_inbox),
                    json!(message.timestamp),
                )
                .set(format!("{}/contextId", agent_inbox), json!(message.context_id))
                .set(format!("{}/otherUserId", agent_inbox), json!(message.sender_id));
        }

        batch.set(message_path(room_id, &message.id), message.to_record()?);
        self.store.apply(batch).await?;

        info!(
            room_id = %room_id,
            message_id = %message.id,
            recipient_id = %message.recipient_id,
            participants = participants.len(),
            "Message queued for escrow agent"
        );

        Ok(message)
    }
}
