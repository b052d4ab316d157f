// === IMPORTS ===

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

// === MODULES ===

pub mod command;
pub mod registry;
pub mod session;
pub mod shutdown;

use crate::config::ServerConfig;
use crate::error::StartupError;
use crate::logger::{LogModule, LogPipeline};
use crate::{log_info, log_notice};

use command::REJECT_NOTICE;
use registry::{ClientRegistry, Registration, SessionEntry};
use session::SessionHandler;
pub use shutdown::{ShutdownHandle, spawn_shutdown_listener};

// === SERVER ===

/// Accepts connections and supervises one session task per client.
///
/// Every session task lives in a `JoinSet`, so shutdown can wait for them
/// instead of guessing with a sleep.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    pipeline: Arc<LogPipeline>,
    config: ServerConfig,
    shutdown: CancellationToken,
    sessions: JoinSet<()>,
}

impl Server {
    /// Binds the configured address. Failing to bind is fatal for the process.
    pub async fn start(config: ServerConfig, pipeline: Arc<LogPipeline>) -> Result<Self, StartupError> {
        let addr = config.bind_addr();

        let listener = TcpListener::bind(&addr).await.map_err(|source| {
            if source.kind() == io::ErrorKind::AddrInUse {
                StartupError::AddressInUse {
                    addr: addr.clone(),
                    source,
                }
            } else {
                StartupError::Bind {
                    addr: addr.clone(),
                    source,
                }
            }
        })?;
        let local_addr = listener.local_addr().map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;

        log::info!("🚀 Session server listening on {}", local_addr);
        log_info!(
            pipeline,
            LogModule::System,
            "Server listening on {} (capacity {})",
            local_addr,
            config.capacity
        );

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(ClientRegistry::new(config.capacity)),
            pipeline,
            config,
            shutdown: CancellationToken::new(),
            sessions: JoinSet::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.registry.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.shutdown.clone())
    }

    /// Accepts clients until shutdown is requested, then drains the sessions.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                // 1) Shutdown requested
                _ = self.shutdown.cancelled() => {
                    log::info!("🧹 Server received shutdown signal.");
                    break;
                }

                // 2) New client arrives
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.admit(stream, addr).await,
                        // e.g. too many open files; back off briefly
                        Err(e) => {
                            log::warn!("⚠️ Failed to accept connection: {}", e);
                            time::sleep(self.config.accept_error_backoff()).await;
                        }
                    }
                }

                // 3) A session finished; reap it
                Some(joined) = self.sessions.join_next(), if !self.sessions.is_empty() => {
                    match joined {
                        Err(e) if e.is_panic() => log::error!("Session task panicked: {}", e),
                        _ => {}
                    }
                }
            }
        }

        self.drain().await;
        log_info!(self.pipeline, LogModule::System, "Server stopped");
    }

    /// Turns the connection away if full, otherwise registers it and spawns its session.
    async fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.registry.len() >= self.registry.capacity() {
            self.reject(stream, addr).await;
            return;
        }

        let id = self.registry.next_id();
        let closer = self.shutdown.child_token();
        if !self.registry.register(SessionEntry::new(id, addr, closer.clone())) {
            self.reject(stream, addr).await;
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("⚠️ Failed to set TCP_NODELAY for {}: {}", addr, e);
        }
        log::info!(
            "🔌 {} connected as session {}. Active sessions: {}",
            addr,
            id,
            self.registry.len()
        );

        let handler = SessionHandler::new(
            Registration::new(self.registry.clone(), id),
            stream,
            addr,
            self.pipeline.clone(),
            closer,
            self.config.max_message_len,
        );
        self.sessions.spawn(handler.run());
    }

    async fn reject(&self, mut stream: TcpStream, addr: SocketAddr) {
        log::warn!("⛔ Rejecting {}: server full ({} sessions)", addr, self.registry.len());
        log_notice!(
            self.pipeline,
            LogModule::Network,
            "Rejected connection from {}: server full",
            addr
        );

        let notice = format!("{}\n", REJECT_NOTICE);
        let _ = stream.write_all(notice.as_bytes()).await;
        let _ = stream.shutdown().await;
    }

    /// Forces every session closed and waits up to the grace period for them to finish.
    async fn drain(&mut self) {
        let signalled = self.registry.close_all();
        log::info!("Closing {} session(s)", signalled);

        let grace = self.config.shutdown_grace();
        let sessions = &mut self.sessions;
        let finished = time::timeout(grace, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;

        if finished.is_err() {
            log::warn!(
                "{} session(s) still running after {:?}; aborting them",
                self.sessions.len(),
                grace
            );
            self.sessions.shutdown().await;
        }
    }
}
