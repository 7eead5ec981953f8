//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides; the
//! command line applies its own overrides on top.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::relay::{CallbackTarget, RelayError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

/// Default blockchain.info websocket feed
pub const DEFAULT_FEED_URL: &str = "wss://ws.blockchain.info:443/inv";

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl FeedConfig {
    /// Heartbeat period as a `Duration`
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Callback delivery configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Webhook receiving one POST per event. `None` disables delivery.
    pub callback_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// The first existing file wins. A file that exists but cannot be loaded
    /// is an error rather than a silent fall back to defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("bithook").join("config.toml")),
            Some(PathBuf::from("/etc/bithook/config.toml")),
            Some(PathBuf::from("./bithook.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first of `paths` that exists, or environment-only config
    fn load_first(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        match paths.iter().find(|path| path.exists()) {
            Some(path) => Self::load_with_env(path),
            None => Ok(Self::from_env()),
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Feed overrides
        if let Ok(url) = std::env::var("BITHOOK_FEED_URL") {
            self.feed.url = url;
        }
        if let Ok(secs) = std::env::var("BITHOOK_HEARTBEAT_SECS") {
            if let Ok(s) = secs.parse() {
                self.feed.heartbeat_interval_secs = s;
            }
        }

        // Relay overrides
        if let Ok(url) = std::env::var("BITHOOK_CALLBACK_URL") {
            self.relay.callback_url = if url.trim().is_empty() { None } else { Some(url) };
        }

        // Logging overrides
        if let Ok(level) = std::env::var("BITHOOK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("BITHOOK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Check values that cannot be expressed in the TOML schema
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidHeartbeat);
        }
        self.callback_target()?;
        Ok(())
    }

    /// Parse the configured callback URL, if any
    pub fn callback_target(&self) -> Result<Option<CallbackTarget>, ConfigError> {
        self.relay
            .callback_url
            .as_deref()
            .map(CallbackTarget::parse)
            .transpose()
            .map_err(ConfigError::InvalidCallback)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error(transparent)]
    InvalidCallback(RelayError),

    #[error("Heartbeat interval must be at least one second")]
    InvalidHeartbeat,
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Bithook Configuration
#
# Environment variables override these settings:
# - BITHOOK_FEED_URL
# - BITHOOK_HEARTBEAT_SECS
# - BITHOOK_CALLBACK_URL
# - BITHOOK_LOG_LEVEL
# - BITHOOK_LOG_FORMAT

[feed]
# Websocket endpoint of the real-time feed
url = "wss://ws.blockchain.info:443/inv"

# Seconds between keep-alive pings
heartbeat_interval_secs = 30

[relay]
# Webhook receiving one POST per event (omit to disable delivery)
# callback_url = "http://localhost:9000/hook"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
