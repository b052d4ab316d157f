use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cloneable trigger for a coordinated server shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Stops the accept loop and forces every session closed.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Spawns a task that waits for Ctrl+C and then triggers `handle`.
pub fn spawn_shutdown_listener(handle: ShutdownHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    log::error!("Failed to listen for ctrl_c: {}", e);
                    return;
                }
                log::warn!("🛑 Ctrl+C received, shutting down.");
                handle.shutdown();
            }
            // shut down some other way; stop listening
            _ = handle.token.cancelled() => {}
        }
    })
}
