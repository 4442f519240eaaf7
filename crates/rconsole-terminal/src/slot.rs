use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::stream::SessionStream;

/// An accepted network connection plus the label used in log fields
pub struct Connection {
    id: u64,
    peer: String,
    stream: Box<dyn SessionStream>,
}

impl Connection {
    /// Monotonic id assigned by the slot on install (0 until installed)
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn stream(&self) -> &dyn SessionStream {
        self.stream.as_ref()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

/// Single-slot register holding the active connection.
///
/// Every check, swap and clear happens under one mutex, but the lock is only
/// held for the slot operation itself; callers do their blocking I/O on the
/// `Arc` they got back, outside the lock.
#[derive(Default)]
pub struct ConnectionSlot {
    current: Mutex<Option<Arc<Connection>>>,
    next_id: AtomicU64,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Connection>>> {
        // Poisoning is recovered; the slot stays usable
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a new connection, closing and returning the one it displaced
    pub fn install(
        &self,
        stream: Box<dyn SessionStream>,
        peer: impl Into<String>,
    ) -> (Arc<Connection>, Option<Arc<Connection>>) {
        let conn = Arc::new(Connection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            peer: peer.into(),
            stream,
        });

        let displaced = self.lock().replace(Arc::clone(&conn));

        if let Some(old) = &displaced {
            debug!(old = old.id, new = conn.id, peer = %old.peer, "closing displaced connection");
            old.stream.close();
        }

        (conn, displaced)
    }

    /// The active connection, if any
    pub fn current(&self) -> Option<Arc<Connection>> {
        self.lock().clone()
    }

    /// Clear the slot only if it still holds `conn`.
    ///
    /// Returns true when this call removed it. A false return means a newer
    /// connection already took over and the old one was closed by `install`.
    pub fn clear_if_current(&self, conn: &Arc<Connection>) -> bool {
        let mut guard = self.lock();
        match guard.as_ref() {
            Some(active) if Arc::ptr_eq(active, conn) => {
                *guard = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}
