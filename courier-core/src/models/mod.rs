mod identity;
mod message;
mod room;

pub use identity::Identity;
pub use message::{ChatMessage, MessageKind, PaymentMethod, PurchaseRequest, PurchaseStatus};
pub use room::{InboxEntry, RoomRecord, RoomSummary};
