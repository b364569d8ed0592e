//! Token-keyed deferred responses.
//!
//! A handler that cannot answer inline registers the request token on the
//! session and hands a [`Completion`] to the worker that will produce the reply.
//! Completing after the session closed is a logged no-op. A completion dropped
//! without being completed answers `ServerError`, so the client always gets a
//! reply for a deferred request.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::debug;

use crate::core::frame::Frame;
use crate::protocol::status::{RpcError, RpcStatus};
use crate::session::session::Session;

/// Tokens with a reply still owed, keyed to when they were deferred.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<u32, Instant>,
}

impl PendingTable {
    /// Returns false when the token is already in flight.
    pub fn register(&mut self, token: u32) -> bool {
        if self.entries.contains_key(&token) {
            return false;
        }
        self.entries.insert(token, Instant::now());
        true
    }

    pub fn remove(&mut self, token: u32) -> Option<Duration> {
        self.entries.remove(&token).map(|since| since.elapsed())
    }

    pub fn contains(&self, token: u32) -> bool {
        self.entries.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

/// Handle used by worker code to deliver a deferred reply.
#[derive(Debug)]
pub struct Completion {
    session: Weak<Session>,
    token: u32,
    expects_response: bool,
    done: bool,
}

impl Completion {
    pub(crate) fn new(session: &Arc<Session>, token: u32, expects_response: bool) -> Self {
        Self {
            session: Arc::downgrade(session),
            token,
            expects_response,
            done: false,
        }
    }

    pub fn token(&self) -> u32 {
        self.token
    }

    /// The owning session, if it is still alive.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    /// Deliver the reply. Returns whether a frame was queued.
    pub fn complete(mut self, result: Result<Bytes, RpcError>) -> bool {
        self.done = true;
        self.deliver(result)
    }

    fn deliver(&self, result: Result<Bytes, RpcError>) -> bool {
        let Some(session) = self.session.upgrade() else {
            debug!(token = self.token, "deferred reply for dropped session");
            return false;
        };
        let Some(waited) = session.pending_remove(self.token) else {
            debug!(
                session = session.id(),
                token = self.token,
                "deferred reply no longer pending"
            );
            return false;
        };
        debug!(
            session = session.id(),
            token = self.token,
            waited_ms = waited.as_millis() as u64,
            "completing deferred request"
        );

        match result {
            Ok(payload) if self.expects_response => {
                session.send(Frame::response(self.token, RpcStatus::Ok.code(), payload))
            }
            Ok(_) => true,
            Err(err) => session.send_error(self.token, &err),
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.done {
            self.deliver(Err(RpcError::Internal("request abandoned".into())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_tokens_are_refused() {
        let mut table = PendingTable::default();
        assert!(table.register(7));
        assert!(!table.register(7));
        assert!(table.remove(7).is_some());
        assert!(table.register(7));
        assert_eq!(table.clear(), 1);
        assert!(table.is_empty());
    }
}
