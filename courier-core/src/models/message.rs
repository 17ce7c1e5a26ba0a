use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MessageKind {
    #[default]
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "purchase-request")]
    PurchaseRequest,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::PurchaseRequest => write!(f, "purchase-request"),
        }
    }
}

/// Lifecycle of a purchase request. Ordered so that later states compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Agreed,
    Completed,
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseStatus::Pending => write!(f, "pending"),
            PurchaseStatus::Agreed => write!(f, "agreed"),
            PurchaseStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(PurchaseStatus::Pending),
            "agreed" => Ok(PurchaseStatus::Agreed),
            "completed" => Ok(PurchaseStatus::Completed),
            other => Err(format!("unknown purchase status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Stripe,
    Bitcoin,
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "Stripe",
            PaymentMethod::Bitcoin => "Bitcoin",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Stripe => write!(f, "stripe"),
            PaymentMethod::Bitcoin => write!(f, "bitcoin"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stripe" => Ok(PaymentMethod::Stripe),
            "bitcoin" => Ok(PaymentMethod::Bitcoin),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

/// A message as stored under `messages/{roomId}/{key}`.
///
/// `id` is the store key and is not part of the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub text: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    pub recipient_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub read: bool,
    #[serde(default, rename = "messageType")]
    pub kind: MessageKind,
    #[serde(default)]
    pub context_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PurchaseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_escrow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl ChatMessage {
    pub fn text(
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        recipient_id: impl Into<String>,
        text: impl Into<String>,
        context_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: String::new(),
            text: text.into(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            recipient_id: recipient_id.into(),
            timestamp,
            read: false,
            kind: MessageKind::Text,
            context_id: context_id.into(),
            status: None,
            price: None,
            payment_method: None,
            use_escrow: None,
            wallet_address: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_purchase_request(&self) -> bool {
        self.kind == MessageKind::PurchaseRequest
    }

    /// Status of a purchase request; requests stored without one are pending.
    pub fn purchase_status(&self) -> Option<PurchaseStatus> {
        if self.is_purchase_request() {
            Some(self.status.unwrap_or(PurchaseStatus::Pending))
        } else {
            None
        }
    }

    /// The stored form, without the key.
    pub fn to_record(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("id");
        }
        Ok(value)
    }
}

/// Arguments of a purchase request.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub label: String,
    pub price: f64,
    pub context_id: String,
    pub payment_method: PaymentMethod,
    pub use_escrow: bool,
    pub wallet_address: Option<String>,
}

impl PurchaseRequest {
    pub fn new(
        label: impl Into<String>,
        price: f64,
        context_id: impl Into<String>,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            label: label.into(),
            price,
            context_id: context_id.into(),
            payment_method,
            use_escrow: false,
            wallet_address: None,
        }
    }

    pub fn with_escrow(mut self, use_escrow: bool) -> Self {
        self.use_escrow = use_escrow;
        self
    }

    pub fn with_wallet_address(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }

    /// The wallet address, kept only for bitcoin payments with a non-blank address.
    pub fn effective_wallet_address(&self) -> Option<&str> {
        match (self.payment_method, self.wallet_address.as_deref()) {
            (PaymentMethod::Bitcoin, Some(addr)) if !addr.trim().is_empty() => Some(addr.trim()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_order_and_display() {
        assert!(PurchaseStatus::Pending < PurchaseStatus::Agreed);
        assert!(PurchaseStatus::Agreed < PurchaseStatus::Completed);
        assert_eq!(PurchaseStatus::Agreed.to_string(), "agreed");
        assert_eq!("Completed".parse::<PurchaseStatus>(), Ok(PurchaseStatus::Completed));
        assert!("shipped".parse::<PurchaseStatus>().is_err());
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("bitcoin".parse::<PaymentMethod>(), Ok(PaymentMethod::Bitcoin));
        assert_eq!(PaymentMethod::Stripe.label(), "Stripe");
        assert!("paypal".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_text_message_record_shape() {
        let msg = ChatMessage::text("a", "Ana", "b", "hi", "p1", 1_700_000_000_000).with_id("k1");
        let record = msg.to_record().unwrap();

        assert_eq!(
            record,
            json!({
                "text": "hi",
                "senderId": "a",
                "senderName": "Ana",
                "recipientId": "b",
                "timestamp": 1_700_000_000_000i64,
                "read": false,
                "messageType": "text",
                "contextId": "p1"
            })
        );
        assert!(msg.purchase_status().is_none());
    }

    #[test]
    fn test_purchase_message_deserialize() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "text": "Request",
            "senderId": "a",
            "recipientId": "b",
            "timestamp": 5,
            "messageType": "purchase-request",
            "price": 100.0,
            "paymentMethod": "bitcoin",
            "useEscrow": true
        }))
        .unwrap();

        assert!(msg.is_purchase_request());
        assert_eq!(msg.purchase_status(), Some(PurchaseStatus::Pending));
        assert_eq!(msg.payment_method, Some(PaymentMethod::Bitcoin));
        assert!(!msg.read);
    }

    #[test]
    fn test_wallet_address_only_for_bitcoin() {
        let req = PurchaseRequest::new("X", 1.0, "p", PaymentMethod::Stripe)
            .with_wallet_address("bc1q");
        assert_eq!(req.effective_wallet_address(), None);

        let req = PurchaseRequest::new("X", 1.0, "p", PaymentMethod::Bitcoin)
            .with_wallet_address("  ");
        assert_eq!(req.effective_wallet_address(), None);

        let req = PurchaseRequest::new("X", 1.0, "p", PaymentMethod::Bitcoin)
            .with_wallet_address("bc1qxyz");
        assert_eq!(req.effective_wallet_address(), Some("bc1qxyz"));
    }
}
