use serde::{Deserialize, Serialize};

/// The acting user, passed explicitly into every chat operation.
///
/// An identity with an empty id is unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Display name to stamp on outgoing messages.
    pub fn sender_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => fallback,
        }
    }
}
