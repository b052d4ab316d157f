use std::backtrace::Backtrace;

use chrono::{DateTime, Local};

use super::record::LogRecord;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// `YYYY-MM-DD HH:MM:SS.mmm` in local time.
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Renders a record as `[timestamp] [LEVEL] content`, without a trailing newline.
pub fn format_record(record: &LogRecord) -> String {
    format!(
        "[{}] [{}] {}",
        format_timestamp(record.timestamp()),
        record.level(),
        record.content()
    )
}

/// Snapshot of the current call stack, captured regardless of `RUST_BACKTRACE`.
pub fn capture_stack() -> String {
    Backtrace::force_capture().to_string()
}

/// Appends a stack trace block to `message`.
pub fn with_stack_trace(message: &str) -> String {
    format!("{}\nStack trace:\n{}", message, capture_stack())
}
