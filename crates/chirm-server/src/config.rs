//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `CHIRM_`-prefixed environment variables (`CHIRM_JWT_SECRET`,
//! `CHIRM_ALLOWED_ORIGIN`, ...). The JWT secret is redacted in Debug output.

use chirm_realtime::{HubConfig, DEFAULT_SEND_QUEUE_CAPACITY, MAX_CONNECTIONS};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CHIRM";

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Largest inbound WebSocket message accepted, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Placeholder secrets shipped in sample env files.
const INSECURE_SECRETS: &[&str] = &[
    "change-this-secret-in-production",
    "change-me-use-a-long-random-string-here",
    "change-me-use-a-long-random-string",
];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// JWT secret missing or left at a sample value.
    #[error("jwt_secret is not set or uses an insecure default; generate one with `openssl rand -hex 32`")]
    InsecureSecret,

    /// A numeric limit is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Configuration for the Chirm server.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub bind_addr: SocketAddr,
    /// HS256 secret used to validate session tokens.
    pub jwt_secret: String,
    /// Exact Origin allowed to open WebSockets. Same-host when unset.
    pub allowed_origin: Option<String>,
    /// Log level.
    pub log_level: String,
    /// `pretty` or `json`.
    pub log_format: String,
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            jwt_secret: String::new(),
            allowed_origin: None,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            max_connections: MAX_CONNECTIONS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"[REDACTED]")
            .field("allowed_origin", &self.allowed_origin)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("send_queue_capacity", &self.send_queue_capacity)
            .field("max_connections", &self.max_connections)
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

impl ServerConfig {
    /// Load from an optional file plus the process environment, then validate.
    ///
    /// A file that is named but missing is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: ServerConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the server relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret = self.jwt_secret.trim();
        if secret.is_empty() || INSECURE_SECRETS.contains(&secret) {
            return Err(ConfigError::InsecureSecret);
        }
        if self.send_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "send_queue_capacity",
                reason: "must be at least 1",
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "max_connections",
                reason: "must be at least 1",
            });
        }
        if self.max_message_size < 1024 {
            return Err(ConfigError::Invalid {
                field: "max_message_size",
                reason: "must be at least 1024 bytes",
            });
        }
        Ok(())
    }

    /// Hub limits derived from this configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            send_queue_capacity: self.send_queue_capacity,
            max_connections: self.max_connections,
        }
    }

    /// Allowed origin with empty strings treated as unset.
    pub fn allowed_origin(&self) -> Option<&str> {
        self.allowed_origin.as_deref().filter(|o| !o.is_empty())
    }
}
