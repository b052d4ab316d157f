//! Logging for the session server.
//!
//! Two layers live here: the [`LogPipeline`], which owns the durable
//! append-only activity log, and the console logger, which routes the `log`
//! facade to stdout through fern.

pub mod console;
pub mod format;
pub mod pipeline;
pub mod record;

pub use console::init_console_logger;
pub use pipeline::LogPipeline;
pub use record::{LogLevel, LogModule, LogRecord};

/// `log_debug!(pipeline, module, "fmt", args...)`
#[macro_export]
macro_rules! log_debug {
    ($pipeline:expr, $module:expr, $($arg:tt)+) => {
        $pipeline.debug($module, format!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_info {
    ($pipeline:expr, $module:expr, $($arg:tt)+) => {
        $pipeline.info($module, format!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_notice {
    ($pipeline:expr, $module:expr, $($arg:tt)+) => {
        $pipeline.notice($module, format!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($pipeline:expr, $module:expr, $($arg:tt)+) => {
        $pipeline.warning($module, format!($($arg)+))
    };
}

/// Evaluates to the `Result` returned by [`LogPipeline::error`].
#[macro_export]
macro_rules! log_error {
    ($pipeline:expr, $module:expr, $($arg:tt)+) => {
        $pipeline.error($module, format!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_critical {
    ($pipeline:expr, $module:expr, $($arg:tt)+) => {
        $pipeline.critical($module, format!($($arg)+))
    };
}
