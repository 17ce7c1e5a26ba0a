//! Error types for the courier core library.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Store | Document store, database connection and migration errors |
//! | E2001-E2099 | Config | Environment, config file, and validation errors |
//! | E3001-E3099 | Identity | Authentication and participant/recipient permission errors |
//! | E4001-E4099 | Chat | Room, message and purchase-request errors |
//! | E9001-E9099 | General | Internal, IO, serialization, and validation errors |

use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::ConfigLoadError;
use crate::db::DatabaseError;
use crate::store::StoreError;

/// The main error type for the courier core library.
#[derive(Debug, Error)]
pub enum CourierError {
    // ========================================================================
    // Store Errors (E1001-E1099)
    // ========================================================================
    /// Failed to establish database connection
    #[error("[E1001] Database connection failed: {0}")]
    DatabaseConnectionFailed(String),

    /// A store read or write failed
    #[error("[E1002] Store operation failed: {0}")]
    StoreOperationFailed(String),

    /// Database migration failed
    #[error("[E1003] Database migration failed: {0}")]
    DatabaseMigrationFailed(String),

    /// Database pool exhausted or unavailable
    #[error("[E1004] Database pool unavailable: {0}")]
    DatabasePoolUnavailable(String),

    /// A store path was rejected
    #[error("[E1005] Invalid store path: {0}")]
    InvalidStorePath(String),

    // ========================================================================
    // Configuration Errors (E2001-E2099)
    // ========================================================================
    /// Required environment variable is missing
    #[error("[E2001] Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Configuration file parse error
    #[error("[E2002] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// Invalid configuration value
    #[error("[E2003] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    // ========================================================================
    // Identity Errors (E3001-E3099)
    // ========================================================================
    /// The caller has no identity
    #[error("[E3001] Not authenticated")]
    NotAuthenticated,

    /// The caller is not a participant of the room
    #[error("[E3002] '{user_id}' is not a participant of room '{room_id}'")]
    NotParticipant { room_id: String, user_id: String },

    /// The caller is not the recipient of the message
    #[error("[E3003] '{user_id}' is not the recipient of message '{message_id}'")]
    NotRecipient { message_id: String, user_id: String },

    // ========================================================================
    // Chat Errors (E4001-E4099)
    // ========================================================================
    /// Room not found
    #[error("[E4001] Room not found: {0}")]
    RoomNotFound(String),

    /// Message not found
    #[error("[E4002] Message '{message_id}' not found in room '{room_id}'")]
    MessageNotFound { room_id: String, message_id: String },

    /// A required id or field is missing or empty
    #[error("[E4003] Missing required field: {0}")]
    MissingField(String),

    /// Invalid argument
    #[error("[E4004] Invalid value for '{field}': {message}")]
    InvalidArgument { field: String, message: String },

    /// Status change is not strictly forward
    #[error("[E4005] Invalid purchase status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Status change targeted a plain text message
    #[error("[E4006] Message '{0}' is not a purchase request")]
    NotAPurchaseRequest(String),

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    /// Internal error (catch-all for unexpected conditions)
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("[E9002] IO error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("[E9003] Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for courier operations.
pub type CourierResult<T> = Result<T, CourierError>;

impl CourierError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        CourierError::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// From trait implementations for seamless error propagation
// ============================================================================

impl From<sqlx::Error> for CourierError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => CourierError::DatabasePoolUnavailable(err.to_string()),
            sqlx::Error::PoolClosed => {
                CourierError::DatabasePoolUnavailable("Connection pool is closed".to_string())
            }
            sqlx::Error::Configuration(_) | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                CourierError::DatabaseConnectionFailed(err.to_string())
            }
            _ => CourierError::StoreOperationFailed(err.to_string()),
        }
    }
}

impl From<StoreError> for CourierError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidPath(path) => CourierError::InvalidStorePath(path),
            StoreError::Database(e) => e.into(),
            StoreError::Serialization(e) => CourierError::SerializationError(e.to_string()),
            StoreError::Closed => CourierError::StoreOperationFailed("store is closed".to_string()),
        }
    }
}

impl From<DatabaseError> for CourierError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConnectionFailed(e) => {
                CourierError::DatabaseConnectionFailed(e.to_string())
            }
            DatabaseError::MigrationFailed(e) => {
                CourierError::DatabaseMigrationFailed(e.to_string())
            }
            DatabaseError::InvalidConfig(msg) => CourierError::InvalidConfigValue {
                key: "database".to_string(),
                message: msg,
            },
        }
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CourierError {
    fn from(err: std::io::Error) -> Self {
        CourierError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for CourierError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => CourierError::InvalidConfigValue {
                key,
                message: "Key not found".to_string(),
            },
            config::ConfigError::FileParse { uri, cause } => CourierError::ConfigParseError(
                format!("Failed to parse {}: {}", uri.unwrap_or_default(), cause),
            ),
            config::ConfigError::Type {
                origin,
                unexpected,
                expected,
                key,
            } => CourierError::InvalidConfigValue {
                key: key.unwrap_or_else(|| origin.map(|o| o.to_string()).unwrap_or_default()),
                message: format!("Expected {}, got {}", expected, unexpected),
            },
            _ => CourierError::ConfigParseError(err.to_string()),
        }
    }
}

impl From<ConfigLoadError> for CourierError {
    fn from(err: ConfigLoadError) -> Self {
        match err {
            ConfigLoadError::Config(e) => e.into(),
            ConfigLoadError::MissingRequired(key) if key == "database.url" => {
                CourierError::MissingEnvVar("DATABASE_URL".to_string())
            }
            ConfigLoadError::MissingRequired(key) => CourierError::InvalidConfigValue {
                key,
                message: "Value is required".to_string(),
            },
            ConfigLoadError::InvalidValue { key, message } => {
                CourierError::InvalidConfigValue { key, message }
            }
            ConfigLoadError::Io(e) => e.into(),
        }
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl CourierError {
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            CourierError::DatabaseConnectionFailed(_)
                | CourierError::StoreOperationFailed(_)
                | CourierError::DatabaseMigrationFailed(_)
                | CourierError::DatabasePoolUnavailable(_)
                | CourierError::InvalidStorePath(_)
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CourierError::MissingEnvVar(_)
                | CourierError::ConfigParseError(_)
                | CourierError::InvalidConfigValue { .. }
        )
    }

    /// Returns true if the caller lacks the identity or role the operation requires.
    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            CourierError::NotAuthenticated
                | CourierError::NotParticipant { .. }
                | CourierError::NotRecipient { .. }
        )
    }

    /// Returns true if the operation was rejected before anything was written.
    pub fn is_precondition(&self) -> bool {
        self.is_permission_error()
            || matches!(
                self,
                CourierError::RoomNotFound(_)
                    | CourierError::MessageNotFound { .. }
                    | CourierError::MissingField(_)
                    | CourierError::InvalidArgument { .. }
                    | CourierError::InvalidStatusTransition { .. }
                    | CourierError::NotAPurchaseRequest(_)
            )
    }

    /// Returns true if this error is transient and the operation might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CourierError::DatabasePoolUnavailable(_) | CourierError::DatabaseConnectionFailed(_)
        )
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            CourierError::DatabaseConnectionFailed(_) => "E1001",
            CourierError::StoreOperationFailed(_) => "E1002",
            CourierError::DatabaseMigrationFailed(_) => "E1003",
            CourierError::DatabasePoolUnavailable(_) => "E1004",
            CourierError::InvalidStorePath(_) => "E1005",
            CourierError::MissingEnvVar(_) => "E2001",
            CourierError::ConfigParseError(_) => "E2002",
            CourierError::InvalidConfigValue { .. } => "E2003",
            CourierError::NotAuthenticated => "E3001",
            CourierError::NotParticipant { .. } => "E3002",
            CourierError::NotRecipient { .. } => "E3003",
            CourierError::RoomNotFound(_) => "E4001",
            CourierError::MessageNotFound { .. } => "E4002",
            CourierError::MissingField(_) => "E4003",
            CourierError::InvalidArgument { .. } => "E4004",
            CourierError::InvalidStatusTransition { .. } => "E4005",
            CourierError::NotAPurchaseRequest(_) => "E4006",
            CourierError::Internal(_) => "E9001",
            CourierError::IoError(_) => "E9002",
            CourierError::SerializationError(_) => "E9003",
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error.
    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            CourierError::DatabaseConnectionFailed(_) => {
                Some("Check that PostgreSQL is running and DATABASE_URL is correct")
            }
            CourierError::DatabasePoolUnavailable(_) => {
                Some("The database is busy. Try again in a few seconds")
            }
            CourierError::DatabaseMigrationFailed(_) => {
                Some("Run 'courier init' against an empty or up-to-date database")
            }
            CourierError::MissingEnvVar(_) => {
                Some("Create a .env file or set the environment variable")
            }
            CourierError::NotAuthenticated => Some("Pass the acting user id with '--as <uid>'"),
            CourierError::NotParticipant { .. } => {
                Some("Run 'courier rooms --as <uid>' to list rooms you take part in")
            }
            CourierError::RoomNotFound(_) => Some("Check the room id with 'courier rooms'"),
            CourierError::InvalidStatusTransition { .. } => {
                Some("Purchase requests move forward only: pending, agreed, completed")
            }
            _ => None,
        }
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        let suggestion = self.user_suggestion();

        if self.is_transient() || self.is_precondition() {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Operation rejected: {}",
                self
            );
        } else {
            error!(
                error_code = %code,
                suggestion = suggestion,
                "Error occurred: {}",
                self
            );
        }
    }
}

// ============================================================================
// User-friendly error formatting for CLI
// ============================================================================

/// Format an error for CLI display with suggestions.
pub struct CliErrorDisplay<'a> {
    error: &'a CourierError,
    show_suggestion: bool,
}

impl<'a> CliErrorDisplay<'a> {
    pub fn new(error: &'a CourierError) -> Self {
        Self {
            error,
            show_suggestion: true,
        }
    }

    pub fn without_suggestion(mut self) -> Self {
        self.show_suggestion = false;
        self
    }
}

impl<'a> fmt::Display for CliErrorDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;

        if self.show_suggestion {
            if let Some(suggestion) = self.error.user_suggestion() {
                writeln!(f)?;
                writeln!(f, "  Suggestion: {}", suggestion)?;
            }
        }

        if self.error.is_transient() {
            writeln!(f)?;
            writeln!(f, "  This error may be temporary. Try again shortly.")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CourierError::MissingEnvVar("DATABASE_URL".to_string());
        assert!(err.to_string().contains("E2001"));
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = CourierError::NotParticipant {
            room_id: "a_b_general".to_string(),
            user_id: "c".to_string(),
        };
        assert!(err.to_string().contains("E3002"));
        assert!(err.to_string().contains("a_b_general"));
    }

    #[test]
    fn test_error_categorization() {
        let store_err = CourierError::StoreOperationFailed("timeout".to_string());
        assert!(store_err.is_store_error());
        assert!(!store_err.is_precondition());

        assert!(CourierError::NotAuthenticated.is_permission_error());
        assert!(CourierError::NotAuthenticated.is_precondition());
        assert!(CourierError::MissingField("recipient_id".to_string()).is_precondition());
        assert!(!CourierError::MissingField("x".to_string()).is_permission_error());
        assert!(CourierError::MissingEnvVar("KEY".to_string()).is_config_error());
    }

    #[test]
    fn test_missing_database_url_maps_to_env_var() {
        let err: CourierError = ConfigLoadError::MissingRequired("database.url".to_string()).into();
        assert!(matches!(err, CourierError::MissingEnvVar(ref name) if name == "DATABASE_URL"));
        assert_eq!(err.error_code(), "E2001");

        let err: CourierError =
            ConfigLoadError::MissingRequired("chat.escrow_room_id".to_string()).into();
        assert!(matches!(err, CourierError::InvalidConfigValue { .. }));
    }

    #[test]
    fn test_is_transient() {
        assert!(CourierError::DatabasePoolUnavailable("timeout".to_string()).is_transient());
        assert!(CourierError::DatabaseConnectionFailed("refused".to_string()).is_transient());
        assert!(!CourierError::NotAuthenticated.is_transient());
        assert!(!CourierError::RoomNotFound("r".to_string()).is_transient());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CourierError::StoreOperationFailed("e".to_string()).error_code(),
            "E1002"
        );
        assert_eq!(CourierError::NotAuthenticated.error_code(), "E3001");
        assert_eq!(
            CourierError::InvalidStatusTransition {
                from: "completed".to_string(),
                to: "agreed".to_string()
            }
            .error_code(),
            "E4005"
        );
        assert_eq!(
            CourierError::Internal("err".to_string()).error_code(),
            "E9001"
        );
    }

    #[test]
    fn test_from_store_error() {
        let err: CourierError = StoreError::InvalidPath("a/../b".to_string()).into();
        assert!(matches!(err, CourierError::InvalidStorePath(_)));

        let err: CourierError = StoreError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_from_config_load_error() {
        let err: CourierError = ConfigLoadError::MissingRequired("database.url".to_string()).into();
        assert!(err.is_config_error());
        assert_eq!(err.error_code(), "E2003");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_result: Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let err: CourierError = json_result.unwrap_err().into();
        assert!(matches!(err, CourierError::SerializationError(_)));
    }

    #[test]
    fn test_cli_error_display() {
        let err = CourierError::NotAuthenticated;
        let output = CliErrorDisplay::new(&err).to_string();
        assert!(output.contains("Not authenticated"));
        assert!(output.contains("Suggestion"));

        let output = CliErrorDisplay::new(&err).without_suggestion().to_string();
        assert!(!output.contains("Suggestion"));
    }
}
