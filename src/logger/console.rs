// Local time formatting for console lines
use chrono::Local;

// Colors per level for terminal output
use fern::colors::{Color, ColoredLevelConfig};

use log::LevelFilter;

// Guard so the global dispatcher is only installed once per process
use std::sync::OnceLock;

use crate::config::LoggerConfig;

static CONSOLE: OnceLock<()> = OnceLock::new();

/// Installs the colored stdout logger behind the `log` facade.
///
/// Operational messages of the listener go through here, as do pipeline
/// records when console output is switched on. Calling it again is a no-op.
pub fn init_console_logger(name: &str, cfg: &LoggerConfig) {
    CONSOLE.get_or_init(|| {
        // Fall back to Info if the configured level doesn't parse
        let level = cfg
            .console_level
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Info);

        let colors = ColoredLevelConfig::new()
            .info(Color::Green)
            .warn(Color::Yellow)
            .error(Color::Red)
            .debug(Color::Blue)
            .trace(Color::Magenta);

        let name = name.to_string();

        // [timestamp] - [logger name] - [target] - [level] - [message]
        let log_format_console = move |out: fern::FormatCallback,
                                       message: &std::fmt::Arguments,
                                       record: &log::Record| {
            out.finish(format_args!(
                "\x1b[92m{}\x1b[0m - \x1b[94m{}\x1b[0m - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                name,
                record.target(),
                colors.color(record.level()),
                message
            ))
        };

        let applied = fern::Dispatch::new()
            .level(level)
            .chain(
                fern::Dispatch::new()
                    .format(log_format_console)
                    .chain(std::io::stdout()),
            )
            .apply();

        // Another logger was installed first (e.g. by a test harness)
        if let Err(e) = applied {
            eprintln!("Warning: console logger not installed: {}", e);
        }
    });
}
