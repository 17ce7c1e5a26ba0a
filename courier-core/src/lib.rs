pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod roles;
pub mod store;

pub use chat::{
    derive_room_id, purchase_request_body, purchase_summary, resolve_context, ChatService,
    DeletionReport, Subscription, DIRECT_TRANSACTION_NOTE, ESCROW_STEPS, ROOM_ID_SEPARATOR,
};
pub use config::{
    get_config_dir, ChatConfig, ConfigLoadError, CourierConfig, DatabaseSettings, EscrowRouting,
    LoggingConfig,
};
pub use db::{init_database_with_url, Database, DatabaseConfig, DatabaseError};
pub use error::{CliErrorDisplay, CourierError, CourierResult};
pub use models::{
    ChatMessage, Identity, InboxEntry, MessageKind, PaymentMethod, PurchaseRequest,
    PurchaseStatus, RoomRecord, RoomSummary,
};
pub use roles::{AdminRecord, Role, RoleRegistry, UserProfile};
pub use store::{
    DocumentStore, MemoryStore, PgDocumentStore, PushKeyGenerator, StoreChange, StoreError,
    StoreResult, WriteBatch, WriteOp,
};
