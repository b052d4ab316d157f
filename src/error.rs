use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort server startup. The binary exits non-zero on any of these.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("address {addr} is already in use")]
    AddressInUse {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build tokio runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Lifecycle failures of the log pipeline.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("cannot open log file {}: {source}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot start log writer thread: {0}")]
    SpawnWriter(#[source] io::Error),
}

/// Raised by an `ERROR`-level log call once the record has been queued.
///
/// Carries the original message, without the captured stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LoggedError {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
