// config.rs — Service configuration.
//
// Settings come from AGENTGUARD_* environment variables, optionally
// seeded from a TOML file. Validation runs once at startup; a bad
// configuration terminates the process with a non-zero exit before any
// listener opens.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// All recognized settings, with their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage backend. Only the memory:// scheme ships in this build.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Process-wide shared admin secret. Generated (and logged once) when
    /// unset.
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// PEM-encoded RSA private key for token signing. Generated for the
    /// process lifetime when unset.
    #[serde(default)]
    pub jwt_private_key: Option<String>,

    /// Signing algorithm. RS256 is the only supported value.
    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,

    #[serde(default = "default_agent_expire")]
    pub jwt_agent_expire_seconds: i64,

    #[serde(default = "default_admin_expire")]
    pub jwt_admin_expire_seconds: i64,

    /// Outbound webhook endpoint for approval events. Disabled when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Shared secret for the webhook signature header.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default = "default_true")]
    pub rate_limit_enabled: bool,

    /// Counter store backend. Only memory:// ships in this build.
    #[serde(default = "default_counter_uri")]
    pub rate_limit_storage_uri: String,

    /// Comma-separated allowed origins, or "*".
    #[serde(default = "default_cors")]
    pub cors_origins: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "text" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Timeout in seconds for outbound dependency calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_database_url() -> String {
    "memory://".to_string()
}
fn default_jwt_algorithm() -> String {
    "RS256".to_string()
}
fn default_agent_expire() -> i64 {
    3600
}
fn default_admin_expire() -> i64 {
    28800
}
fn default_true() -> bool {
    true
}
fn default_counter_uri() -> String {
    "memory://".to_string()
}
fn default_cors() -> String {
    "*".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        // Round-trip through an empty TOML document so every default fn
        // stays the single source of truth.
        toml::from_str("").expect("empty config parses")
    }
}

impl Config {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay AGENTGUARD_* environment variables.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("AGENTGUARD_DATABASE_URL") {
            self.database_url = v;
        }
        if let Ok(v) = std::env::var("AGENTGUARD_ADMIN_API_KEY") {
            self.admin_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("AGENTGUARD_JWT_PRIVATE_KEY") {
            self.jwt_private_key = Some(v);
        }
        if let Ok(v) = std::env::var("AGENTGUARD_JWT_ALGORITHM") {
            self.jwt_algorithm = v;
        }
        if let Ok(v) = std::env::var("AGENTGUARD_JWT_AGENT_EXPIRE_SECONDS") {
            if let Ok(n) = v.parse() {
                self.jwt_agent_expire_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("AGENTGUARD_JWT_ADMIN_EXPIRE_SECONDS") {
            if let Ok(n) = v.parse() {
                self.jwt_admin_expire_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("AGENTGUARD_WEBHOOK_URL") {
            self.webhook_url = Some(v);
        }
        if let Ok(v) = std::env::var("AGENTGUARD_WEBHOOK_SECRET") {
            self.webhook_secret = Some(v);
        }
        if let Ok(v) = std::env::var("AGENTGUARD_RATE_LIMIT_ENABLED") {
            self.rate_limit_enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("AGENTGUARD_RATE_LIMIT_STORAGE_URI") {
            self.rate_limit_storage_uri = v;
        }
        if let Ok(v) = std::env::var("AGENTGUARD_CORS_ORIGINS") {
            self.cors_origins = v;
        }
        if let Ok(v) = std::env::var("AGENTGUARD_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("AGENTGUARD_LOG_FORMAT") {
            self.log_format = v;
        }
        if let Ok(v) = std::env::var("AGENTGUARD_REQUEST_TIMEOUT") {
            if let Ok(n) = v.parse() {
                self.request_timeout = n;
            }
        }
        if let Ok(v) = std::env::var("AGENTGUARD_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("AGENTGUARD_PORT") {
            if let Ok(n) = v.parse() {
                self.port = n;
            }
        }
    }

    /// Reject configurations the process cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_algorithm != "RS256" {
            return Err(ConfigError::Invalid(format!(
                "jwt_algorithm '{}' is not supported (RS256 only)",
                self.jwt_algorithm
            )));
        }
        if !self.database_url.starts_with("memory://") {
            return Err(ConfigError::Invalid(format!(
                "database_url scheme not supported: '{}'",
                self.database_url
            )));
        }
        if !self.rate_limit_storage_uri.starts_with("memory://") {
            return Err(ConfigError::Invalid(format!(
                "rate_limit_storage_uri scheme not supported: '{}'",
                self.rate_limit_storage_uri
            )));
        }
        if self.log_format != "text" && self.log_format != "json" {
            return Err(ConfigError::Invalid(format!(
                "log_format must be 'text' or 'json', got '{}'",
                self.log_format
            )));
        }
        if self.jwt_agent_expire_seconds <= 0 || self.jwt_admin_expire_seconds <= 0 {
            return Err(ConfigError::Invalid(
                "token expiry seconds must be positive".to_string(),
            ));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout must be positive".to_string(),
            ));
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(format!("invalid host/port: {}:{}", self.host, self.port))
            })
    }
}
