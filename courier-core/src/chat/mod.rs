//! Room and message bookkeeping on top of a [`DocumentStore`].
//!
//! Layout:
//!
//! - `chatRooms/{roomId}`: participants, context and last-message summary
//! - `userChats/{userId}/{roomId}`: per-user inbox entry with the unread counter
//! - `messages/{roomId}/{key}`: messages under store-generated sortable keys
//!
//! Every multi-path change (room creation, delivery, mark-as-read, deletion)
//! is written as a single [`WriteBatch`](crate::store::WriteBatch).

mod deletion;
mod escrow;
mod messages;
mod purchase;
mod room_id;
mod rooms;
mod subscriptions;

pub use deletion::DeletionReport;
pub use purchase::{
    purchase_request_body, purchase_summary, random_transaction_id, DIRECT_TRANSACTION_NOTE,
    ESCROW_STEPS,
};
pub use room_id::{derive_room_id, resolve_context, ROOM_ID_SEPARATOR};
pub use subscriptions::Subscription;

use std::sync::Arc;

use chrono::Utc;

use crate::config::ChatConfig;
use crate::error::{CourierError, CourierResult};
use crate::models::Identity;
use crate::roles::RoleRegistry;
use crate::store::DocumentStore;

pub(crate) const ROOMS_ROOT: &str = "chatRooms";
pub(crate) const INBOX_ROOT: &str = "userChats";
pub(crate) const MESSAGES_ROOT: &str = "messages";

pub(crate) fn room_path(room_id: &str) -> String {
    format!("{}/{}", ROOMS_ROOT, room_id)
}

pub(crate) fn inbox_root(user_id: &str) -> String {
    format!("{}/{}", INBOX_ROOT, user_id)
}

pub(crate) fn inbox_path(user_id: &str, room_id: &str) -> String {
    format!("{}/{}/{}", INBOX_ROOT, user_id, room_id)
}

pub(crate) fn messages_path(room_id: &str) -> String {
    format!("{}/{}", MESSAGES_ROOT, room_id)
}

pub(crate) fn message_path(room_id: &str, message_id: &str) -> String {
    format!("{}/{}/{}", MESSAGES_ROOT, room_id, message_id)
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Reject empty ids and ids that would escape their path segment.
pub(crate) fn validate_id(field: &str, value: &str) -> CourierResult<()> {
    if value.trim().is_empty() {
        return Err(CourierError::MissingField(field.to_string()));
    }
    if value.contains('/') || value.chars().any(char::is_control) {
        return Err(CourierError::invalid_argument(
            field,
            "must not contain '/' or control characters",
        ));
    }
    Ok(())
}

pub(crate) fn require_identity(identity: &Identity) -> CourierResult<&str> {
    if !identity.is_authenticated() {
        return Err(CourierError::NotAuthenticated);
    }
    validate_id("identity.id", &identity.id)?;
    Ok(&identity.id)
}

pub(crate) fn require_text(field: &str, text: &str) -> CourierResult<()> {
    if text.trim().is_empty() {
        return Err(CourierError::MissingField(field.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn DocumentStore>,
    roles: RoleRegistry,
    settings: ChatConfig,
}

impl ChatService {
    pub fn new(store: Arc<dyn DocumentStore>, settings: ChatConfig) -> Self {
        let roles = RoleRegistry::new(store.clone());
        Self {
            store,
            roles,
            settings,
        }
    }

    pub fn with_defaults(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(store, ChatConfig::default())
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn settings(&self) -> &ChatConfig {
        &self.settings
    }

    /// Room id for a pair of users, falling back to the general context.
    pub fn room_id_for(
        &self,
        user_a: &str,
        user_b: &str,
        context_id: Option<&str>,
    ) -> CourierResult<String> {
        let context = resolve_context(context_id, &self.settings.general_context);
        derive_room_id(user_a, user_b, &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_paths() {
        assert_eq!(room_path("a_b_p"), "chatRooms/a_b_p");
        assert_eq!(inbox_path("a", "a_b_p"), "userChats/a/a_b_p");
        assert_eq!(message_path("a_b_p", "k"), "messages/a_b_p/k");
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("id", "u1").is_ok());
        assert!(matches!(
            validate_id("id", ""),
            Err(CourierError::MissingField(_))
        ));
        assert!(matches!(
            validate_id("id", "a/b"),
            Err(CourierError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_require_identity() {
        assert!(matches!(
            require_identity(&Identity::anonymous()),
            Err(CourierError::NotAuthenticated)
        ));
        assert_eq!(require_identity(&Identity::new("u1")).unwrap(), "u1");
    }

    #[test]
    fn test_room_id_for_uses_general_context() {
        let service = ChatService::with_defaults(Arc::new(MemoryStore::new()));
        assert_eq!(service.room_id_for("b", "a", None).unwrap(), "a_b_general");
        assert_eq!(
            service.room_id_for("b", "a", Some("p1")).unwrap(),
            "a_b_p1"
        );
    }
}
