pub mod chat;
pub mod roles;
pub mod rooms;

pub use chat::{handle_chat_command, ChatCommand};
pub use roles::{handle_roles_command, RolesCommand};
pub use rooms::{handle_rooms_command, RoomsCommand};

use anyhow::Result;
use chrono::{DateTime, Utc};
use courier_core::{ChatService, Database, PgDocumentStore};
use std::sync::Arc;

use crate::config::CliConfig;

/// An open database connection plus the chat service running on it.
pub struct Session {
    db: Database,
    pub chat: ChatService,
}

impl Session {
    pub async fn open(config: &CliConfig) -> Result<Self> {
        let db = Database::connect(&config.database_config()).await?;
        let store = PgDocumentStore::connect(&db).await?;
        let chat = ChatService::new(Arc::new(store), config.chat.clone());
        Ok(Self { db, chat })
    }

    pub async fn close(self) {
        drop(self.chat);
        self.db.close().await;
    }
}

pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let cut: String = single_line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}
