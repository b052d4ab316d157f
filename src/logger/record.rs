use std::fmt;

use chrono::{DateTime, Local};
use serde::Deserialize;

/// Severity of a log record, ordered from most verbose to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug5,
    Debug4,
    Debug3,
    Debug2,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug5 => "DEBUG5",
            LogLevel::Debug4 => "DEBUG4",
            LogLevel::Debug3 => "DEBUG3",
            LogLevel::Debug2 => "DEBUG2",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Notice => "NOTICE",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Levels at or above `Error` carry a captured stack trace.
    pub fn captures_stack(self) -> bool {
        self >= LogLevel::Error
    }

    /// Closest level of the `log` facade, used when mirroring to the console.
    pub fn to_log_level(self) -> log::Level {
        match self {
            LogLevel::Debug5 | LogLevel::Debug4 | LogLevel::Debug3 | LogLevel::Debug2 => {
                log::Level::Trace
            }
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info | LogLevel::Notice => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error | LogLevel::Critical => log::Level::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical subsystem a record belongs to. Each one can be switched off separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogModule {
    Syntax,
    Parser,
    Planner,
    Executor,
    Network,
    System,
    General,
}

impl LogModule {
    pub const ALL: [LogModule; 7] = [
        LogModule::Syntax,
        LogModule::Parser,
        LogModule::Planner,
        LogModule::Executor,
        LogModule::Network,
        LogModule::System,
        LogModule::General,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            LogModule::Syntax => "syntax",
            LogModule::Parser => "parser",
            LogModule::Planner => "planner",
            LogModule::Executor => "executor",
            LogModule::Network => "network",
            LogModule::System => "system",
            LogModule::General => "general",
        }
    }
}

impl fmt::Display for LogModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable log entry, produced by any thread and consumed once by the writer.
#[derive(Debug, Clone)]
pub struct LogRecord {
    timestamp: DateTime<Local>,
    level: LogLevel,
    module: LogModule,
    content: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, module: LogModule, content: String) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            module,
            content,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Local> {
        &self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn module(&self) -> LogModule {
        self.module
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}
