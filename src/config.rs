//! # Configuration Management
//!
//! Centralized configuration for the backup server.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` / `apply_env_overrides()`
//! - The one-line `port.info` file, resolved by `resolve_port()`
//!
//! ## Port Resolution
//! The listening port is read from a one-line file. A missing or unreadable file, a
//! non-numeric line, or a port outside `1025..=65535` all fall back to [`DEFAULT_PORT`].

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{warn, Level};

/// Port used when the port file is missing or holds an unusable value
pub const DEFAULT_PORT: u16 = 1234;

/// Lowest port accepted from the port file (privileged ports are refused)
pub const MIN_PORT: u16 = 1025;

/// Max allowed request payload size (64 MB)
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

pub const DEFAULT_PORT_FILE: &str = "port.info";
pub const DEFAULT_DATABASE_PATH: &str = "server.db";
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Env var naming a TOML config file for the binary
pub const ENV_CONFIG_PATH: &str = "BACKUP_SERVER_CONFIG";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BackupConfig {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Metadata database and file vault locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BackupConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Override fields from `BACKUP_SERVER_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BACKUP_SERVER_HOST") {
            self.server.host = host;
        }

        if let Ok(path) = std::env::var("BACKUP_SERVER_PORT_FILE") {
            self.server.port_file = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("BACKUP_SERVER_DB") {
            self.storage.database_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("BACKUP_SERVER_BACKUP_DIR") {
            self.storage.backup_dir = PathBuf::from(dir);
        }

        if let Ok(size) = std::env::var("BACKUP_SERVER_MAX_PAYLOAD") {
            if let Ok(val) = size.parse::<usize>() {
                self.server.max_payload_size = val;
            }
        }
    }

    /// Port from the configured port file, or [`DEFAULT_PORT`]
    pub fn resolve_port(&self) -> u16 {
        read_port_file(&self.server.port_file)
    }

    /// `host:port` to bind, with the port resolved from the port file
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.host, self.resolve_port())
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Read a listening port from a one-line file.
pub fn read_port_file<P: AsRef<Path>>(path: P) -> u16 {
    let path = path.as_ref();
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, port = DEFAULT_PORT, "Port file unavailable, using default port");
            return DEFAULT_PORT;
        }
    };

    let line = contents.lines().next().unwrap_or("").trim();
    match line.parse::<u32>() {
        Ok(port) if port >= MIN_PORT as u32 && port <= u16::MAX as u32 => port as u16,
        _ => {
            warn!(path = %path.display(), value = line, port = DEFAULT_PORT, "Invalid port in port file, using default port");
            DEFAULT_PORT
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (e.g., "0.0.0.0")
    pub host: String,

    /// One-line file holding the listening port
    pub port_file: PathBuf,

    /// Largest request payload accepted, in bytes
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port_file: PathBuf::from(DEFAULT_PORT_FILE),
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Server host cannot be empty".to_string());
        } else if self.host.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid server host: '{}' (expected an IP address such as '0.0.0.0')",
                self.host
            ));
        }

        if self.port_file.as_os_str().is_empty() {
            errors.push("Port file path cannot be empty".to_string());
        }

        if self.max_payload_size < 1024 {
            errors.push("Max payload size too small (minimum: 1 KB)".to_string());
        } else if self.max_payload_size > u32::MAX as usize {
            errors.push(format!(
                "Max payload size too large: {} bytes (payloadSize is a 32-bit field)",
                self.max_payload_size
            ));
        }

        errors
    }
}

/// Storage locations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding client and file metadata
    pub database_path: PathBuf,

    /// Root directory of received files
    pub backup_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.database_path.as_os_str().is_empty() {
            errors.push("Database path cannot be empty".to_string());
        }

        if self.backup_dir.as_os_str().is_empty() {
            errors.push("Backup directory cannot be empty".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
