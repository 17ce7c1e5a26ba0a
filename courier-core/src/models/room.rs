use serde::{Deserialize, Serialize};

/// Stored at `chatRooms/{roomId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub context_id: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_message_timestamp: i64,
    #[serde(default)]
    pub last_sender_id: String,
}

impl RoomRecord {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// Per-user denormalized room summary, stored at `userChats/{userId}/{roomId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_message_timestamp: i64,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(default)]
    pub context_id: String,
    #[serde(default)]
    pub other_user_id: String,
}

/// A room as shown in a user's conversation list: room fields merged with
/// that user's inbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub participants: Vec<String>,
    pub last_sender_id: String,
    pub last_message: String,
    pub last_message_timestamp: i64,
    pub unread_count: i64,
    pub context_id: String,
    pub other_user_id: String,
}

impl RoomSummary {
    pub fn merge(room_id: impl Into<String>, room: RoomRecord, inbox: InboxEntry) -> Self {
        Self {
            room_id: room_id.into(),
            participants: room.participants,
            last_sender_id: room.last_sender_id,
            last_message: inbox.last_message,
            last_message_timestamp: inbox.last_message_timestamp,
            unread_count: inbox.unread_count.max(0),
            context_id: inbox.context_id,
            other_user_id: inbox.other_user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_record_field_names() {
        let room = RoomRecord {
            participants: vec!["a".to_string(), "b".to_string()],
            context_id: "p1".to_string(),
            created_at: 10,
            ..Default::default()
        };
        let value = serde_json::to_value(&room).unwrap();
        assert_eq!(value["contextId"], "p1");
        assert_eq!(value["lastSenderId"], "");
        assert!(room.is_participant("a"));
        assert!(!room.is_participant("c"));
    }

    #[test]
    fn test_inbox_entry_tolerates_missing_fields() {
        let entry: InboxEntry = serde_json::from_value(json!({"unreadCount": 3})).unwrap();
        assert_eq!(entry.unread_count, 3);
        assert!(entry.last_message.is_empty());
    }

    #[test]
    fn test_summary_merge_clamps_negative_counts() {
        let inbox = InboxEntry {
            unread_count: -2,
            other_user_id: "b".to_string(),
            ..Default::default()
        };
        let summary = RoomSummary::merge("r", RoomRecord::default(), inbox);
        assert_eq!(summary.unread_count, 0);
        assert_eq!(summary.other_user_id, "b");
    }
}
