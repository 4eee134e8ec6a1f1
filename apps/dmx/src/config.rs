//! # Configuration
//!
//! Settings come from an optional TOML file (`dmx.toml` by default). CLI
//! flags override the file, and `DMX_LOG_FORMAT` overrides the log format.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! cors_origins = ["http://localhost:3000"]
//!
//! [storage]
//! backend = "redb"
//! path = "dmx.redb"
//!
//! [log]
//! format = "text"
//! ```

use dmx_core::{DmxError, StorageBackend};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "dmx.toml";

/// Environment variable overriding `[log] format`.
pub const LOG_FORMAT_ENV: &str = "DMX_LOG_FORMAT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. `["*"]` allows any; empty means localhost only.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Redb,
    Memory,
}

impl std::str::FromStr for Backend {
    type Err = DmxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redb" => Ok(Self::Redb),
            "memory" => Ok(Self::Memory),
            other => Err(DmxError::InvalidState(format!(
                "unknown storage backend \"{}\", use \"redb\" or \"memory\"",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: Backend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Redb,
            path: PathBuf::from("dmx.redb"),
        }
    }
}

impl StorageConfig {
    /// Open the configured storage.
    pub fn open(&self) -> Result<StorageBackend, DmxError> {
        match self.backend {
            Backend::Memory => Ok(StorageBackend::default()),
            Backend::Redb => StorageBackend::redb(&self.path),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl LogConfig {
    /// The effective format: `DMX_LOG_FORMAT` wins over the file.
    #[must_use]
    pub fn effective_format(&self) -> LogFormat {
        match std::env::var(LOG_FORMAT_ENV).ok().as_deref() {
            Some("json") => LogFormat::Json,
            Some("text") => LogFormat::Text,
            _ => self.format,
        }
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn parse(text: &str) -> Result<Self, DmxError> {
        toml::from_str(text).map_err(|e| DmxError::SerializationError(format!("invalid config: {}", e)))
    }

    /// Load `path`, or `dmx.toml` if it exists, or the defaults.
    ///
    /// An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, DmxError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| {
            DmxError::StorageError(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(Config::parse("").expect("parse"), Config::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = Config::parse(
            r#"
            [server]
            port = 9090

            [storage]
            backend = "memory"
            "#,
        )
        .expect("parse");
        assert_eq!(config.server.addr(), "127.0.0.1:9090");
        assert_eq!(config.storage.backend, Backend::Memory);
        assert_eq!(config.storage.path, PathBuf::from("dmx.redb"));
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::parse("[server]\nhots = \"x\"").expect_err("typo");
        assert!(err.to_string().contains("invalid config"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn backend_from_flag() {
        assert_eq!("memory".parse::<Backend>().expect("memory"), Backend::Memory);
        assert!("sqlite".parse::<Backend>().is_err());
    }
}
