use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use session_relay::config::ServerConfig;
use session_relay::error::StartupError;
use session_relay::start_server;

/// Multi-client TCP session server.
#[derive(Debug, Parser)]
#[command(name = "session-relay", version)]
struct Args {
    /// JSON config file; missing keys use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum number of concurrent sessions
    #[arg(long)]
    capacity: Option<usize>,

    /// Activity log file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, StartupError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(log_file) = self.log_file {
            config.logger.log_file = log_file;
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let result = args
        .into_config()
        .and_then(|config| start_server("session_relay", config));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("session-relay: {}", e);
            ExitCode::FAILURE
        }
    }
}
