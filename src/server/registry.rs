use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_CAPACITY;

pub type SessionId = u64;

/// A registered session as seen by the listener.
///
/// `closer` is a child of the server's shutdown token; cancelling it forces
/// the session out of a blocked read.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub id: SessionId,
    pub address: SocketAddr,
    closer: CancellationToken,
}

impl SessionEntry {
    pub fn new(id: SessionId, address: SocketAddr, closer: CancellationToken) -> Self {
        Self {
            id,
            address,
            closer,
        }
    }
}

struct Inner {
    next_id: SessionId,
    // insertion order is listing order
    sessions: Vec<SessionEntry>,
}

/// Bounded, thread-safe set of active sessions.
///
/// The lock only protects the collection and the id counter; it is never held
/// across network I/O.
pub struct ClientRegistry {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ClientRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                sessions: Vec::new(),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocates the next session id. Ids are never reused.
    pub fn next_id(&self) -> SessionId {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    /// Adds `entry` unless the registry is full or already holds its id.
    pub fn register(&self, entry: SessionEntry) -> bool {
        let mut inner = self.inner.lock();
        if inner.sessions.len() >= self.capacity || inner.sessions.iter().any(|s| s.id == entry.id)
        {
            return false;
        }
        inner.sessions.push(entry);
        true
    }

    /// Removes the session with `id`, returning whether it was present.
    pub fn deregister(&self, id: SessionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|s| s.id != id);
        inner.sessions.len() != before
    }

    /// Point-in-time `(id, address)` listing in registration order.
    pub fn snapshot(&self) -> Vec<(SessionId, SocketAddr)> {
        self.inner
            .lock()
            .sessions
            .iter()
            .map(|s| (s.id, s.address))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signals every registered session to close, returning how many were signalled.
    pub fn close_all(&self) -> usize {
        let inner = self.inner.lock();
        for session in &inner.sessions {
            session.closer.cancel();
        }
        inner.sessions.len()
    }
}

/// A session's hold on its registry slot.
///
/// Dropping it deregisters the session, so the slot is freed even when the
/// session task is aborted or panics before closing normally.
pub struct Registration {
    registry: Arc<ClientRegistry>,
    id: SessionId,
}

impl Registration {
    /// Wraps a session that was already added with [`ClientRegistry::register`].
    pub fn new(registry: Arc<ClientRegistry>, id: SessionId) -> Self {
        Self { registry, id }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Deregisters now, returning whether the session was still present.
    pub fn release(&self) -> bool {
        self.registry.deregister(self.id)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}
