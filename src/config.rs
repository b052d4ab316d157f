// JSON config files are parsed straight into these structs
use serde::Deserialize;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::logger::LogModule;

/// Default bound on concurrently registered sessions.
pub const DEFAULT_CAPACITY: usize = 100;

/// Same size as the receive buffer clients have always been limited to.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 1024;

//////////////////////
// ServerConfig     //
//////////////////////

/// All the settings the server needs. Missing keys fall back to defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP or hostname to listen on
    pub host: String,

    pub port: u16,

    /// Maximum number of registered sessions; further connections are turned away
    pub capacity: usize,

    /// Longer lines are truncated to this many bytes
    pub max_message_len: usize,

    /// How long shutdown waits for sessions to finish before aborting them
    pub shutdown_grace_ms: u64,

    /// Milliseconds to sleep after a failed accept
    pub accept_error_backoff_ms: u64,

    /// Tokio worker threads (defaults to cpu-1)
    pub worker_threads: usize,

    pub logger: LoggerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8123,
            capacity: DEFAULT_CAPACITY,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            shutdown_grace_ms: 2000,
            accept_error_backoff_ms: 100,
            worker_threads: num_cpus::get().saturating_sub(1).max(1),
            logger: LoggerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be at least 1".into()));
        }
        if self.max_message_len == 0 {
            return Err(ConfigError::Invalid("max_message_len must be at least 1".into()));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be at least 1".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn accept_error_backoff(&self) -> Duration {
        Duration::from_millis(self.accept_error_backoff_ms)
    }
}

//////////////////////
// LoggerConfig     //
//////////////////////

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Append-only activity log written by the pipeline
    pub log_file: PathBuf,

    /// Global switch for the pipeline
    pub enabled: bool,

    pub disabled_modules: Vec<LogModule>,

    /// Mirror pipeline records to the console logger
    pub console_output: bool,

    /// Level filter for the console logger ("trace" .. "error", "off")
    pub console_level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("simple.log"),
            enabled: true,
            disabled_modules: Vec::new(),
            console_output: false,
            console_level: "info".to_string(),
        }
    }
}
