use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_pool_min")]
    pub pool_min_connections: u32,

    #[serde(default = "default_pool_max")]
    pub pool_max_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub pool_acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

/// How messages addressed to the escrow agent are grouped into rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscrowRouting {
    /// Every user writes into one shared room whose participant list grows
    /// with each new sender.
    #[default]
    SharedQueue,
    /// One ordinary two-party room per user and agent.
    PerUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Context id used when a caller does not name one.
    #[serde(default = "default_general_context")]
    pub general_context: String,

    #[serde(default = "default_escrow_context")]
    pub escrow_context: String,

    #[serde(default = "default_escrow_room_id")]
    pub escrow_room_id: String,

    /// Recipient id used when no escrow agent can be resolved.
    #[serde(default = "default_escrow_placeholder")]
    pub escrow_placeholder_id: String,

    #[serde(default)]
    pub escrow_routing: EscrowRouting,

    #[serde(default = "default_sender_name")]
    pub default_sender_name: String,

    /// Posted back to the requester when a purchase request is agreed.
    #[serde(default = "default_agreement_notice")]
    pub agreement_notice: String,
}

fn default_database_url() -> String {
    "postgres://localhost/courier_dev".to_string()
}

fn default_pool_min() -> u32 {
    1
}

fn default_pool_max() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_general_context() -> String {
    "general".to_string()
}

fn default_escrow_context() -> String {
    "general_escrow".to_string()
}

fn default_escrow_room_id() -> String {
    "escrow_agent".to_string()
}

fn default_escrow_placeholder() -> String {
    "escrow_agent".to_string()
}

fn default_sender_name() -> String {
    "User".to_string()
}

fn default_agreement_notice() -> String {
    "The recipient has agreed to the purchase request. The escrow agent will contact you shortly."
        .to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_min_connections: default_pool_min(),
            pool_max_connections: default_pool_max(),
            pool_acquire_timeout_secs: default_acquire_timeout(),
            pool_idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            general_context: default_general_context(),
            escrow_context: default_escrow_context(),
            escrow_room_id: default_escrow_room_id(),
            escrow_placeholder_id: default_escrow_placeholder(),
            escrow_routing: EscrowRouting::default(),
            default_sender_name: default_sender_name(),
            agreement_notice: default_agreement_notice(),
        }
    }
}

impl CourierConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from_paths(get_config_paths())
    }

    pub fn load_from_paths(paths: Vec<PathBuf>) -> Result<Self, ConfigLoadError> {
        load_dotenv_files();

        let mut builder = ConfigBuilder::builder();

        for path in paths {
            if path.exists() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("COURIER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut courier_config: CourierConfig = config.try_deserialize()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            courier_config.database.url = url;
        } else if let Ok(url) = std::env::var("COURIER_DATABASE_URL") {
            courier_config.database.url = url;
        }

        if let Ok(level) = std::env::var("COURIER_LOG_LEVEL") {
            courier_config.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            courier_config.logging.level = level;
        }

        courier_config.validate()?;

        Ok(courier_config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.database.url.is_empty() {
            return Err(ConfigLoadError::MissingRequired("database.url".to_string()));
        }

        if !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            return Err(ConfigLoadError::InvalidValue {
                key: "database.url".to_string(),
                message:
                    "Must be a valid PostgreSQL URL starting with postgres:// or postgresql://"
                        .to_string(),
            });
        }

        if self.database.pool_min_connections > self.database.pool_max_connections {
            return Err(ConfigLoadError::InvalidValue {
                key: "database.pool_min_connections".to_string(),
                message: "Cannot be greater than pool_max_connections".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level_lower = self.logging.level.to_lowercase();
        if !valid_levels.contains(&level_lower.as_str()) && !level_lower.contains('=') {
            return Err(ConfigLoadError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let sentinels = [
            ("chat.general_context", &self.chat.general_context),
            ("chat.escrow_context", &self.chat.escrow_context),
            ("chat.escrow_room_id", &self.chat.escrow_room_id),
            ("chat.escrow_placeholder_id", &self.chat.escrow_placeholder_id),
        ];
        for (key, value) in sentinels {
            if value.trim().is_empty() || value.contains('/') {
                return Err(ConfigLoadError::InvalidValue {
                    key: key.to_string(),
                    message: "Must be non-empty and must not contain '/'".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

fn get_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config").join("default.toml"));
        paths.push(cwd.join("config").join("local.toml"));
        paths.push(cwd.join("courier.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("courier").join("config.toml"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".courier").join("config.toml"));
    }

    paths
}

fn load_dotenv_files() {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".env"));
        paths.push(cwd.join(".env.local"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".courier").join(".env"));
    }

    for path in paths {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("courier"))
}
