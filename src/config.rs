//! Configuration for the broker session and the sensor router
//!
//! Every field is optional in the TOML file: whatever the caller provides is
//! merged over the built-in defaults once at startup, and the merged result is
//! never mutated afterwards.
//!
//! ```toml
//! [session]
//! broker_url = "broker.emqx.io"
//! port = 8084
//! use_ssl = true
//! topic = "projects/pandashouse/devices/+/sensor/#"
//!
//! [router]
//! excluded_measurements = ["uptime", "wifi_signal"]
//! ```

use crate::protocol::{validate_topic_filter, TopicError};
use crate::transport::Endpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_BROKER_URL: &str = "broker.emqx.io";
pub const DEFAULT_PORT: u16 = 8084;
pub const DEFAULT_TOPIC: &str = "projects/pandashouse/devices/+/sensor/#";
pub const DEFAULT_WEBSOCKET_PATH: &str = "/mqtt";
/// Fixed delay between a failed or lost connection and the next attempt
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Measurement kinds the devices publish that are not sensor readings
pub const DEFAULT_EXCLUDED_MEASUREMENTS: [&str; 6] = [
    "ip_address",
    "ssid",
    "bssid",
    "esphome_version",
    "wifi_signal",
    "uptime",
];

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub router: RouterConfig,
}

/// Broker connection settings, fully resolved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Broker host name
    pub broker_url: String,
    pub port: u16,
    /// Encrypt the connection (TLS, or WSS when `websocket` is set)
    pub use_ssl: bool,
    /// Speak MQTT over WebSocket instead of raw TCP
    pub websocket: bool,
    /// Request path for WebSocket connections
    pub websocket_path: String,
    /// Unique per session; a random suffix is generated when not provided
    pub client_id: String,
    /// Subscription filter, may use `+` and `#` wildcards
    pub topic: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            port: DEFAULT_PORT,
            use_ssl: true,
            websocket: true,
            websocket_path: DEFAULT_WEBSOCKET_PATH.to_string(),
            client_id: generate_client_id(),
            topic: DEFAULT_TOPIC.to_string(),
            keep_alive_secs: 60,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            username_env: None,
            password_env: None,
        }
    }
}

/// Caller-provided values layered over [`SessionConfig::default`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SessionOverrides {
    pub broker_url: Option<String>,
    pub port: Option<u16>,
    pub use_ssl: Option<bool>,
    pub websocket: Option<bool>,
    pub websocket_path: Option<String>,
    pub client_id: Option<String>,
    pub topic: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
    pub username_env: Option<String>,
    pub password_env: Option<String>,
}

impl SessionOverrides {
    /// Layer `other` on top of `self`; fields set in `other` win
    pub fn layer(self, other: SessionOverrides) -> SessionOverrides {
        SessionOverrides {
            broker_url: other.broker_url.or(self.broker_url),
            port: other.port.or(self.port),
            use_ssl: other.use_ssl.or(self.use_ssl),
            websocket: other.websocket.or(self.websocket),
            websocket_path: other.websocket_path.or(self.websocket_path),
            client_id: other.client_id.or(self.client_id),
            topic: other.topic.or(self.topic),
            keep_alive_secs: other.keep_alive_secs.or(self.keep_alive_secs),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            username_env: other.username_env.or(self.username_env),
            password_env: other.password_env.or(self.password_env),
        }
    }
}

/// Router settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    /// Measurement kinds dropped before they reach the display
    #[serde(default = "default_excluded_measurements")]
    pub excluded_measurements: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            excluded_measurements: default_excluded_measurements(),
        }
    }
}

fn default_excluded_measurements() -> Vec<String> {
    DEFAULT_EXCLUDED_MEASUREMENTS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Generate a client identifier unique to this process
pub fn generate_client_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("sensorwatch-{}", &suffix[..7])
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid subscription topic: {0}")]
    InvalidTopic(#[from] TopicError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// On-disk layout; both sections may be omitted
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    session: SessionOverrides,
    #[serde(default)]
    router: RouterConfig,
}

impl SessionConfig {
    /// Merge caller overrides with the defaults
    ///
    /// # Examples
    /// ```
    /// use sensorwatch::config::{SessionConfig, SessionOverrides, DEFAULT_PORT};
    ///
    /// let config = SessionConfig::merged(SessionOverrides {
    ///     topic: Some("devices/+/sensor/#".to_string()),
    ///     ..Default::default()
    /// });
    /// assert_eq!(config.port, DEFAULT_PORT);
    /// assert_eq!(config.topic, "devices/+/sensor/#");
    /// ```
    pub fn merged(overrides: SessionOverrides) -> Self {
        let defaults = Self::default();
        Self {
            broker_url: overrides.broker_url.unwrap_or(defaults.broker_url),
            port: overrides.port.unwrap_or(defaults.port),
            use_ssl: overrides.use_ssl.unwrap_or(defaults.use_ssl),
            websocket: overrides.websocket.unwrap_or(defaults.websocket),
            websocket_path: overrides.websocket_path.unwrap_or(defaults.websocket_path),
            client_id: overrides.client_id.unwrap_or(defaults.client_id),
            topic: overrides.topic.unwrap_or(defaults.topic),
            keep_alive_secs: overrides.keep_alive_secs.unwrap_or(defaults.keep_alive_secs),
            reconnect_delay_ms: overrides
                .reconnect_delay_ms
                .unwrap_or(defaults.reconnect_delay_ms),
            username_env: overrides.username_env.or(defaults.username_env),
            password_env: overrides.password_env.or(defaults.password_env),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker_url cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "port must be greater than 0".to_string(),
            ));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "client_id cannot be empty".to_string(),
            ));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.websocket && !self.websocket_path.starts_with('/') {
            return Err(ConfigError::InvalidConfig(format!(
                "websocket_path '{}' must start with '/'",
                self.websocket_path
            )));
        }
        validate_topic_filter(&self.topic)?;
        Ok(())
    }

    /// Address the transport is created with
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.broker_url.clone(),
            port: self.port,
            client_id: self.client_id.clone(),
        }
    }

    pub fn reconnect_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Get MQTT username from environment variable
    pub fn username(&self) -> Option<String> {
        Self::get_env_var_optional(self.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn password(&self) -> Option<String> {
        Self::get_env_var_optional(self.password_env.as_ref())
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }
}

impl AppConfig {
    /// Build and validate from explicit overrides
    pub fn from_overrides(
        session: SessionOverrides,
        router: RouterConfig,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            session: SessionConfig::merged(session),
            router,
        };
        config.session.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, with `cli` overrides applied last
    pub fn load_from_file(path: &Path, cli: SessionOverrides) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, cli)
    }

    pub fn load_from_str(content: &str, cli: SessionOverrides) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        Self::from_overrides(file.session.layer(cli), file.router)
    }
}
