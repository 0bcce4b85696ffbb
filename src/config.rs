use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub mailbox: MailboxConfig,
    pub log_level: Option<String>,
    #[serde(default)]
    pub quiet: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
    pub poll_interval_seconds: u64,
}

pub const DEFAULT_IMAP_PORT: i64 = 993;
pub const DEFAULT_FOLDER: &str = "INBOX";
pub const DEFAULT_POLL_INTERVAL_SECONDS: i64 = 10;

// Implement loading configuration
impl AppConfig {
    // Load config from defaults, then file (if exists), then environment variables
    #[allow(dead_code)]
    pub fn new() -> Result<Self, ConfigError> {
        Self::configure_defaults()?
            // Merge in config file if present
            .add_source(File::with_name("config").required(false))
            // Merge in environment variables
            // e.g. APP_MAILBOX__HOST=... APP_MAILBOX__PASSWORD=...
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }

    // Load config from a specific file path
    #[allow(dead_code)]
    pub fn new_from_file(path: &str) -> Result<Self, ConfigError> {
        Self::configure_defaults()?
            .add_source(File::with_name(path).required(true))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn configure_defaults()
    -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("mailbox.port", DEFAULT_IMAP_PORT)?
            .set_default("mailbox.folder", DEFAULT_FOLDER)?
            .set_default("mailbox.poll_interval_seconds", DEFAULT_POLL_INTERVAL_SECONDS)
    }
}
