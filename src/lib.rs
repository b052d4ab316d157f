//! Multi-client TCP session server.
//!
//! Clients connect, send a display name as their first line, and then
//! exchange newline-delimited commands with the server. Session activity is
//! recorded through an asynchronous, append-only log pipeline.

use std::sync::Arc;

// Settings loaded from JSON or built in code.
pub mod config;

pub mod error;

// Activity log pipeline and console logger.
pub mod logger;

// Listener, client registry and per-connection sessions.
pub mod server;

use config::ServerConfig;
use error::StartupError;
use logger::{LogPipeline, init_console_logger};
use server::{Server, spawn_shutdown_listener};

/// Runs the server until Ctrl+C.
///
/// 1. Sets up console logging and opens the activity log.
/// 2. Builds a multi-threaded Tokio runtime.
/// 3. Binds the listener and serves clients.
/// 4. On shutdown, drains sessions and then the log pipeline.
pub fn start_server(name: &str, config: ServerConfig) -> Result<(), StartupError> {
    config.validate()?;
    init_console_logger(name, &config.logger);

    // Failing to open the log file is fatal
    let pipeline = Arc::new(LogPipeline::init(&config.logger)?);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("session-server-worker")
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;

    let result = rt.block_on(async {
        let server = Server::start(config, pipeline.clone()).await?;
        spawn_shutdown_listener(server.shutdown_handle());
        server.run().await;
        Ok::<(), StartupError>(())
    });

    if let Err(e) = &result {
        log::error!("Server error: {}", e);
    }

    // Everything queued so far reaches the file before we return
    pipeline.shutdown();
    result
}
