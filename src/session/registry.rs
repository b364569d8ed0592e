//! Live sessions keyed by id.
//!
//! Inserted on accept, removed when the connection task finishes. The idle
//! sweep walks the map and closes anything that has been quiet too long; the
//! connection task then notices the close and removes its own entry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::session::session::{CloseReason, Session};
use crate::session::write_queue::MAX_QUEUED_BYTES;

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<u64, Arc<Session>>,
    next_id: AtomicU64,
    outbound_limit: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_outbound_limit(MAX_QUEUED_BYTES)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions created here are closed once `outbound_limit` unsent bytes
    /// pile up.
    pub fn with_outbound_limit(outbound_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(0),
            outbound_limit,
        }
    }

    /// Allocate an id and register a new session in `Accepted` state.
    pub fn create(&self, peer: Option<SocketAddr>) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(Session::with_outbound_limit(id, peer, self.outbound_limit));
        self.sessions.insert(id, Arc::clone(&session));
        debug!(session = id, peer = ?peer, "session registered");
        session
    }

    pub fn get(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every open session idle for at least `idle_timeout`.
    pub fn sweep_idle(&self, idle_timeout: Duration) -> usize {
        // Collect first so no shard lock is held while closing.
        let idle: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_open() && entry.idle_for() >= idle_timeout)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut closed = 0;
        for session in idle {
            if session.close(CloseReason::IdleTimeout) {
                closed += 1;
            }
        }
        if closed > 0 {
            info!(closed, remaining = self.sessions.len(), "idle sweep");
        }
        closed
    }

    /// Close everything with `reason`. Entries stay until their tasks exit.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        sessions
            .into_iter()
            .filter(|session| session.close(reason))
            .count()
    }
}
