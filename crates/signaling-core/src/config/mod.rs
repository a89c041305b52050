//! Configuration for the intercom server
//!
//! Sources are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `INTERCOM` using `__` as the section
//! separator (`INTERCOM__LIVEKIT__API_SECRET`, `INTERCOM__SERVER__BIND_ADDRESS`).

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalingError};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntercomConfig {
    /// HTTP and signaling socket settings
    pub server: ServerConfig,

    /// Media service (LiveKit) settings
    pub livekit: MediaConfig,

    /// Session token verification
    pub auth: AuthConfig,

    /// Call log / user directory backing store
    pub database: DatabaseConfig,

    /// Log output
    pub logging: LoggingSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Permissive CORS for browser clients served from another origin
    pub cors_allow_any: bool,
}

/// Media service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// WebSocket URL clients use to reach the SFU
    pub url: String,
    pub api_key: String,
    pub api_secret: Option<String>,
    pub token_ttl_seconds: u64,
}

/// Session token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub issuer: String,
    /// HS256 secret shared with the login service
    pub session_secret: Option<String>,
    pub cookie_name: String,
    pub session_ttl_seconds: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration as read from config sources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
}

impl IntercomConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("INTERCOM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let parsed: Self = config.try_deserialize()?;
        parsed.validate().map_err(SignalingError::config)?;
        Ok(parsed)
    }

    /// Load configuration from TOML text layered over the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let parsed: Self = config.try_deserialize()?;
        parsed.validate().map_err(SignalingError::config)?;
        Ok(parsed)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", self.server.bind_address));
        }

        if !(self.livekit.url.starts_with("ws://") || self.livekit.url.starts_with("wss://")) {
            return Err(format!("LiveKit url must be a ws:// or wss:// URL: {}", self.livekit.url));
        }

        if self.livekit.token_ttl_seconds == 0 {
            return Err("token_ttl_seconds must be greater than 0".to_string());
        }

        if self.auth.session_ttl_seconds == 0 {
            return Err("session_ttl_seconds must be greater than 0".to_string());
        }

        if self.auth.cookie_name.is_empty() {
            return Err("cookie_name cannot be empty".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for IntercomConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            livekit: MediaConfig::default(),
            auth: AuthConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            cors_allow_any: true,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:7880".to_string(),
            api_key: "devkey".to_string(),
            api_secret: None,
            token_ttl_seconds: 6 * 60 * 60, // 6 hours
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "intercom".to_string(),
            session_secret: None,
            cookie_name: "intercom_session".to_string(),
            session_ttl_seconds: 24 * 60 * 60, // 1 day
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://intercom.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IntercomConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.livekit.token_ttl_seconds, 21600);
        assert!(config.livekit.api_secret.is_none());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = IntercomConfig::from_toml_str(
            r#"
            [server]
            bind_address = "127.0.0.1:8080"

            [livekit]
            url = "wss://media.example.net"
            api_secret = "secret-from-file"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.livekit.url, "wss://media.example.net");
        assert_eq!(config.livekit.api_secret.as_deref(), Some("secret-from-file"));
        // Untouched sections keep their defaults
        assert_eq!(config.livekit.api_key, "devkey");
        assert_eq!(config.auth.cookie_name, "intercom_session");
    }

    #[test]
    fn test_invalid_media_url_rejected() {
        let result = IntercomConfig::from_toml_str(
            r#"
            [livekit]
            url = "http://media.example.net"
            "#,
        );
        assert!(matches!(result, Err(SignalingError::Configuration(_))));
    }

    #[test]
    fn test_invalid_bind_address_rejected() {
        let mut config = IntercomConfig::default();
        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }
}
