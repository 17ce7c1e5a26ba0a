use serde_json::json;
use tracing::{debug, info, warn};

use super::purchase::{purchase_request_body, purchase_summary, random_transaction_id};
use super::{
    inbox_path, message_path, now_millis, require_identity, require_text,
    room_path, validate_id, ChatService,
};
use crate::error::{CourierError, CourierResult};
use crate::models::{
    ChatMessage, Identity, InboxEntry, MessageKind, PurchaseRequest, PurchaseStatus,
};
use crate::store::{read_as, DocumentStore, WriteBatch};

impl ChatService {
    /// Send a text message, creating the room on first contact.
    pub async fn send(
        &self,
        identity: &Identity,
        recipient_id: &str,
        text: &str,
        context_id: Option<&str>,
    ) -> CourierResult<ChatMessage> {
        let me = require_identity(identity)?;
        validate_id("recipient_id", recipient_id)?;
        require_text("text", text)?;

        let room_id = self.ensure_room(me, recipient_id, context_id).await?;
        let context = super::resolve_context(context_id, &self.settings.general_context);

        let message = ChatMessage::text(
            me,
            identity.sender_name(&self.settings.default_sender_name),
            recipient_id,
            text,
            context,
            now_millis(),
        );
        let summary = message.text.clone();
        self.deliver(&room_id, message, &summary).await
    }

    /// Send a purchase request. The body follows a fixed template and the
    /// room summary reads `Purchase Request: {label}`.
    pub async fn send_purchase_request(
        &self,
        identity: &Identity,
        recipient_id: &str,
        request: &PurchaseRequest,
    ) -> CourierResult<ChatMessage> {
        let me = require_identity(identity)?;
        validate_id("recipient_id", recipient_id)?;
        require_text("label", &request.label)?;
        validate_id("context_id", &request.context_id)?;
        if !request.price.is_finite() || request.price < 0.0 {
            return Err(CourierError::invalid_argument(
                "price",
                "must be a finite, non-negative amount",
            ));
        }

        let room_id = self
            .ensure_room(me, recipient_id, Some(&request.context_id))
            .await?;

        let transaction_id = random_transaction_id();
        let mut message = ChatMessage::text(
            me,
            identity.sender_name(&self.settings.default_sender_name),
            recipient_id,
            purchase_request_body(request, transaction_id),
            request.context_id.trim(),
            now_millis(),
        );
        message.kind = MessageKind::PurchaseRequest;
        message.status = Some(PurchaseStatus::Pending);
        message.price = Some(request.price);
        message.payment_method = Some(request.payment_method);
        message.use_escrow = Some(request.use_escrow);
        message.wallet_address = request.effective_wallet_address().map(str::to_string);

        debug!(
            room_id = %room_id,
            transaction_id,
            payment_method = %request.payment_method,
            use_escrow = request.use_escrow,
            "Sending purchase request"
        );

        self.deliver(&room_id, message, &purchase_summary(&request.label))
            .await
    }

    /// Write `message` under a fresh key and refresh the room and both inbox
    /// summaries in one batch. The recipient's counter is incremented by the
    /// store; the sender's is reset.
    pub(crate) async fn deliver(
        &self,
        room_id: &str,
        message: ChatMessage,
        summary: &str,
    ) -> CourierResult<ChatMessage> {
        let message = message.with_id(self.store.push_key());
        let room = room_path(room_id);
        let recipient_inbox = inbox_path(&message.recipient_id, room_id);
        let sender_inbox = inbox_path(&message.sender_id, room_id);

        let mut batch = WriteBatch::new();
        batch.set(message_path(room_id, &message.id), message.to_record()?);

        batch
            .set(format!("{}/lastMessage", room), json!(summary))
            .set(format!("{}/lastMessageTimestamp", room), json!(message.timestamp))
            .set(format!("{}/lastSenderId", room), json!(message.sender_id))
            .set(format!("{}/contextId", room), json!(message.context_id));

        batch
            .increment(format!("{}/unreadCount", recipient_inbox), 1)
            .set(format!("{}/lastMessage", recipient_inbox), json!(summary))
            .set(
                format!("{}/lastMessageTimestamp", recipient_inbox),
                json!(message.timestamp),
            )
            .set(format!("{}/contextId", recipient_inbox), json!(message.context_id))
            .set(format!("{}/otherUserId", recipient_inbox), json!(message.sender_id));

        batch
            .set(format!("{}/unreadCount", sender_inbox), json!(0))
            .set(format!("{}/lastMessage", sender_inbox), json!(summary))
            .set(
                format!("{}/lastMessageTimestamp", sender_inbox),
                json!(message.timestamp),
            )
            .set(format!("{}/contextId", sender_inbox), json!(message.context_id))
            .set(format!("{}/otherUserId", sender_inbox), json!(message.recipient_id));

        self.store.apply(batch).await?;

        info!(
            room_id = %room_id,
            message_id = %message.id,
            recipient_id = %message.recipient_id,
            kind = %message.kind,
            "Message delivered"
        );

        Ok(message)
    }

    pub async fn message(&self, room_id: &str, message_id: &str) -> CourierResult<ChatMessage> {
        validate_id("room_id", room_id)?;
        validate_id("message_id", message_id)?;

        let stored: Option<ChatMessage> =
            read_as(self.store.as_ref(), &message_path(room_id, message_id)).await?;
        stored
            .map(|m| m.with_id(message_id))
            .ok_or_else(|| CourierError::MessageNotFound {
                room_id: room_id.to_string(),
                message_id: message_id.to_string(),
            })
    }

    /// All messages of a room, oldest first.
    pub async fn messages(&self, room_id: &str) -> CourierResult<Vec<ChatMessage>> {
        validate_id("room_id", room_id)?;
        load_messages(self, room_id).await
    }

    /// Move a purchase request forward. Only the recipient may do this.
    ///
    /// Agreeing also posts the configured agreement notice back to the
    /// requester in the request's context.
    pub async fn update_status(
        &self,
        identity: &Identity,
        room_id: &str,
        message_id: &str,
        new_status: PurchaseStatus,
    ) -> CourierResult<ChatMessage> {
        let me = require_identity(identity)?;
        let mut message = self.message(room_id, message_id).await?;

        if message.recipient_id != me {
            return Err(CourierError::NotRecipient {
                message_id: message_id.to_string(),
                user_id: me.to_string(),
            });
        }

        let Some(current) = message.purchase_status() else {
            return Err(CourierError::NotAPurchaseRequest(message_id.to_string()));
        };

        if new_status == PurchaseStatus::Pending || new_status <= current {
            return Err(CourierError::InvalidStatusTransition {
                from: current.to_string(),
                to: new_status.to_string(),
            });
        }

        let path = message_path(room_id, message_id);
        let status_path = format!("{}/status", path);
        self.store.set(&status_path, json!(new_status)).await?;

        // The room may have been deleted since the read; drop the lone status leaf.
        if self.store.get(&format!("{}/senderId", path)).await?.is_none() {
            self.store.remove(&status_path).await?;
            warn!(
                room_id = %room_id,
                message_id = %message_id,
                "Message removed during status update"
            );
            return Err(CourierError::MessageNotFound {
                room_id: room_id.to_string(),
                message_id: message_id.to_string(),
            });
        }
        message.status = Some(new_status);

        info!(
            room_id = %room_id,
            message_id = %message_id,
            from = %current,
            to = %new_status,
            "Purchase request status updated"
        );

        if new_status == PurchaseStatus::Agreed {
            let context = Some(message.context_id.as_str()).filter(|c| !c.is_empty());
            self.send(
                identity,
                &message.sender_id,
                &self.settings.agreement_notice,
                context,
            )
            .await?;
        }

        Ok(message)
    }

    /// Mark every unread message from `sender_id` to the caller as read and
    /// reset the caller's counter. Returns the number of messages marked.
    ///
    /// Writes nothing when the caller is unauthenticated, is the sender, or
    /// has nothing unread from that sender.
    pub async fn mark_read(
        &self,
        identity: &Identity,
        room_id: &str,
        sender_id: &str,
    ) -> CourierResult<usize> {
        if !identity.is_authenticated() || identity.id == sender_id {
            return Ok(0);
        }
        let me = require_identity(identity)?;
        validate_id("room_id", room_id)?;
        validate_id("sender_id", sender_id)?;

        let unread: Vec<ChatMessage> = load_messages(self, room_id)
            .await?
            .into_iter()
            .filter(|m| m.sender_id == sender_id && m.recipient_id == me && !m.read)
            .collect();

        if unread.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for message in &unread {
            batch.set(
                format!("{}/read", message_path(room_id, &message.id)),
                json!(true),
            );
        }
        batch.set(format!("{}/unreadCount", inbox_path(me, room_id)), json!(0));
        self.store.apply(batch).await?;

        debug!(room_id = %room_id, count = unread.len(), "Marked messages read");
        Ok(unread.len())
    }

    /// Recompute the caller's unread counter for a room from its messages.
    pub async fn reconcile_unread(&self, identity: &Identity, room_id: &str) -> CourierResult<i64> {
        let me = require_identity(identity)?;
        validate_id("room_id", room_id)?;

        let entry_path = inbox_path(me, room_id);
        let entry: InboxEntry = read_as(self.store.as_ref(), &entry_path)
            .await?
            .ok_or_else(|| CourierError::RoomNotFound(room_id.to_string()))?;

        let actual = load_messages(self, room_id)
            .await?
            .iter()
            .filter(|m| m.recipient_id == me && !m.read)
            .count() as i64;

        if entry.unread_count != actual {
            info!(
                room_id = %room_id,
                stored = entry.unread_count,
                actual,
                "Repairing unread counter"
            );
            self.store
                .set(&format!("{}/unreadCount", entry_path), json!(actual))
                .await?;
        }

        Ok(actual)
    }
}

/// Messages of a room ordered by timestamp, then key.
pub(crate) async fn load_messages(
    service: &ChatService,
    room_id: &str,
) -> CourierResult<Vec<ChatMessage>> {
    super::subscriptions::fetch_messages(service.store.as_ref(), room_id).await
}
