//! arcus configuration
//!
//! TOML-based configuration with sensible defaults: an empty config runs an
//! archiver on the default port against a readingdb on localhost. CLI flags
//! override file values in the binary.
//!
//! ```toml
//! [archiver]
//! port = 8079
//!
//! [tsdb]
//! backend = "readingdb"
//! host = "localhost"
//! port = 4242
//! keepalive_secs = 30
//! ```

mod error;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};

/// Default archiver HTTP port
pub const DEFAULT_PORT: u16 = 8079;

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Archiver service settings
    pub archiver: ArchiverConfig,
    /// Time-series backend settings
    pub tsdb: TsdbConfig,
    /// Metadata backend address, recorded for external backend builds
    pub meta: MetaConfig,
    /// Republish dispatcher settings
    pub republish: RepublishConfig,
    /// Logging settings
    pub log: LogConfig,
}

/// Archiver service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiverConfig {
    /// HTTP service port
    pub port: u16,
    /// Msgpack TCP ingest port; 0 disables the listener
    pub msgpack_port: u16,
    /// Seconds between status log lines
    pub status_interval_secs: u64,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            msgpack_port: 0,
            status_interval_secs: 5,
        }
    }
}

/// Time-series backend settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TsdbConfig {
    /// Backend kind: "readingdb" or "quasar"
    pub backend: String,
    /// Backend host
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Idle lifetime of a pooled write connection, in seconds
    pub keepalive_secs: u64,
    /// Capacity of each per-stream write inbox
    pub inbox_capacity: usize,
}

impl TsdbConfig {
    /// `host:port` for dialing
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for TsdbConfig {
    fn default() -> Self {
        Self {
            backend: "readingdb".to_string(),
            host: "localhost".to_string(),
            port: 4242,
            keepalive_secs: 30,
            inbox_capacity: 64,
        }
    }
}

/// Metadata backend address
///
/// The bundled reference backend is in-process; these values are logged and
/// kept for deployments that link an external document-database backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetaConfig {
    /// Metadata database host
    pub host: String,
    /// Metadata database port
    pub port: u16,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 27017,
        }
    }
}

/// Republish dispatcher settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepublishConfig {
    /// Per-subscriber queue capacity
    pub queue_capacity: usize,
    /// Add streams that start matching a standing predicate after
    /// registration. Default keeps the resolve-once behavior.
    pub resubscribe_on_metadata_match: bool,
}

impl Default for RepublishConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            resubscribe_on_metadata_match: false,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::io(path.display().to_string(), e))?;
        contents.parse()
    }

    /// Check cross-field consistency. Call after flag overrides are applied.
    pub fn validate(&self) -> Result<()> {
        match self.tsdb.backend.as_str() {
            "readingdb" | "quasar" => {}
            other => return Err(ConfigError::UnknownTsdb(other.to_string())),
        }
        if self.tsdb.keepalive_secs == 0 {
            return Err(ConfigError::invalid_value(
                "tsdb.keepalive_secs",
                "must be at least 1",
            ));
        }
        if self.tsdb.inbox_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "tsdb.inbox_capacity",
                "must be at least 1",
            ));
        }
        if self.republish.queue_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "republish.queue_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        Ok(config)
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
