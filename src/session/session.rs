//! Per-connection state.
//!
//! A [`Session`] is shared between the connection task that drives its socket
//! and any worker that holds a [`Completion`] for it. The connection task owns
//! reads and state transitions; anyone may enqueue outbound frames.
//!
//! ```text
//! Accepted -> Handshaking -> Ready -> Authenticated
//!     \            \            \           \
//!      +------------+------------+-----------+--> Closing -> Closed
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::auth::{AccountInfo, GameAccountInfo, SessionKey, SrpVerifier};
use crate::core::frame::Frame;
use crate::protocol::status::{RpcError, RpcStatus};
use crate::session::pending::{Completion, PendingTable};
use crate::session::write_queue::{WriteQueue, MAX_QUEUED_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Accepted,
    Handshaking,
    Ready,
    Authenticated,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether `self -> to` is a legal edge. `Closing` is reachable from any
    /// live state; `Closed` only from `Closing`.
    pub fn can_transition(self, to: SessionState) -> bool {
        use SessionState::*;
        match (self, to) {
            (Accepted, Handshaking) | (Handshaking, Ready) | (Ready, Authenticated) => true,
            (Closing, Closed) => true,
            (Closing | Closed, _) => false,
            (_, Closing) => true,
            _ => false,
        }
    }

    pub fn is_open(self) -> bool {
        !matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    PeerClosed,
    ProtocolViolation,
    IdleTimeout,
    HandshakeTimeout,
    TransportError,
    /// The client asked to disconnect; queued replies are flushed first.
    Requested,
    Shutdown,
}

impl CloseReason {
    pub fn flushes_queue(self) -> bool {
        matches!(self, CloseReason::Requested)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::ProtocolViolation => "protocol violation",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::HandshakeTimeout => "handshake timeout",
            CloseReason::TransportError => "transport error",
            CloseReason::Requested => "requested",
            CloseReason::Shutdown => "shutdown",
        };
        f.write_str(text)
    }
}

/// Client metadata reported on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub locale: String,
    pub platform: String,
    pub build: u32,
}

/// An SRP6 challenge waiting for its proof.
#[derive(Debug)]
pub struct LogonAttempt {
    pub verifier: SrpVerifier,
    /// `None` when the challenge was a decoy for an unknown identity.
    pub account: Option<AccountInfo>,
}

pub struct Session {
    id: u64,
    peer: Option<SocketAddr>,
    created: Instant,
    state: Mutex<SessionState>,
    close_reason: Mutex<Option<CloseReason>>,
    last_activity: Mutex<Instant>,
    outbound: Mutex<WriteQueue>,
    /// Unsent bytes a session may hold before it is closed.
    outbound_limit: usize,
    write_ready: Notify,
    cancel: CancellationToken,
    next_token: AtomicU32,
    pending: Mutex<PendingTable>,
    client: RwLock<Option<ClientInfo>>,
    logon: Mutex<Option<LogonAttempt>>,
    account: RwLock<Option<Arc<AccountInfo>>>,
    game_accounts: RwLock<Vec<GameAccountInfo>>,
    session_key: Mutex<Option<SessionKey>>,
}

impl Session {
    pub fn new(id: u64, peer: Option<SocketAddr>) -> Self {
        Self::with_outbound_limit(id, peer, MAX_QUEUED_BYTES)
    }

    pub fn with_outbound_limit(id: u64, peer: Option<SocketAddr>, outbound_limit: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            peer,
            created: now,
            state: Mutex::new(SessionState::Accepted),
            close_reason: Mutex::new(None),
            last_activity: Mutex::new(now),
            outbound: Mutex::new(WriteQueue::new()),
            outbound_limit,
            write_ready: Notify::new(),
            cancel: CancellationToken::new(),
            next_token: AtomicU32::new(1),
            pending: Mutex::new(PendingTable::default()),
            client: RwLock::new(None),
            logon: Mutex::new(None),
            account: RwLock::new(None),
            game_accounts: RwLock::new(Vec::new()),
            session_key: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Move along a forward edge of the state machine. Closing goes through
    /// [`Session::close`] instead.
    pub fn transition(&self, to: SessionState) -> bool {
        if !to.is_open() {
            return false;
        }
        let mut state = self.state.lock();
        if !state.can_transition(to) {
            debug!(session = self.id, from = ?*state, to = ?to, "illegal state transition");
            return false;
        }
        trace!(session = self.id, from = ?*state, to = ?to, "state transition");
        *state = to;
        true
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Queue a frame for the connection task. Returns false, without queueing,
    /// once the session is closing. A peer that lets more than the outbound
    /// limit pile up unread gets its session closed.
    pub fn send(&self, frame: Frame) -> bool {
        let queued = {
            let state = self.state.lock();
            if !state.is_open() {
                debug!(
                    session = self.id,
                    token = frame.token,
                    "dropping frame for closed session"
                );
                return false;
            }
            let mut outbound = self.outbound.lock();
            let bytes = frame.to_bytes();
            if outbound.queued_bytes() + bytes.len() > self.outbound_limit {
                Err(outbound.queued_bytes())
            } else {
                outbound.push(bytes);
                Ok(())
            }
        };

        if let Err(queued_bytes) = queued {
            warn!(
                session = self.id,
                queued_bytes,
                limit = self.outbound_limit,
                "outbound queue over limit"
            );
            self.close(CloseReason::TransportError);
            return false;
        }
        self.write_ready.notify_one();
        true
    }

    /// Answer `token` with the status for `err` and an empty payload.
    pub fn send_error(&self, token: u32, err: &RpcError) -> bool {
        debug!(session = self.id, token, error = %err, "request failed");
        self.send(Frame::response(token, err.status().code(), Bytes::new()))
    }

    pub fn send_ok(&self, token: u32, payload: Bytes) -> bool {
        self.send(Frame::response(token, RpcStatus::Ok.code(), payload))
    }

    /// Token for a server-initiated request.
    pub fn next_token(&self) -> u32 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Push a server-initiated notification that expects no reply.
    pub fn notify(&self, service_hash: u32, method: u32, payload: Bytes) -> bool {
        let token = self.next_token();
        self.send(Frame::new(service_hash, method, token, payload))
    }

    /// Begin closing. Only [`CloseReason::Requested`] keeps queued output for
    /// the writer to flush; every other reason discards it. Returns false when
    /// the session was already closing.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut state = self.state.lock();
            if !state.is_open() {
                return false;
            }
            *state = SessionState::Closing;
        }
        *self.close_reason.lock() = Some(reason);

        let dropped = if reason.flushes_queue() {
            0
        } else {
            self.outbound.lock().clear()
        };
        let abandoned = self.pending.lock().clear();
        self.logon.lock().take();

        info!(
            session = self.id,
            peer = ?self.peer,
            reason = %reason,
            dropped_frames = dropped,
            abandoned_requests = abandoned,
            "closing session"
        );
        self.cancel.cancel();
        self.write_ready.notify_one();
        true
    }

    /// Final state once the socket is released.
    pub fn mark_closed(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            if state.is_open() {
                *state = SessionState::Closing;
            }
            *state = SessionState::Closed;
        }
        self.outbound.lock().clear();
        self.session_key.lock().take();
        self.cancel.cancel();
    }

    /// Resolves once the session starts closing.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Resolves when new output was queued (or the session began closing).
    pub async fn write_ready(&self) {
        self.write_ready.notified().await
    }

    pub fn outbound_peek(&self) -> Option<Bytes> {
        self.outbound.lock().peek()
    }

    /// Returns the number of frames fully written.
    pub fn outbound_advance(&self, written: usize) -> usize {
        self.outbound.lock().advance(written)
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.lock().len()
    }

    pub fn outbound_bytes(&self) -> usize {
        self.outbound.lock().queued_bytes()
    }

    /// Register `token` for a deferred reply.
    pub fn defer(
        self: &Arc<Self>,
        token: u32,
        expects_response: bool,
    ) -> Result<Completion, RpcError> {
        if !self.is_open() {
            return Err(RpcError::Internal("session closing".into()));
        }
        if !self.pending.lock().register(token) {
            return Err(RpcError::Malformed(format!("token {token} already in flight")));
        }
        Ok(Completion::new(self, token, expects_response))
    }

    pub(crate) fn pending_remove(&self, token: u32) -> Option<Duration> {
        self.pending.lock().remove(token)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn set_client_info(&self, info: ClientInfo) {
        *self.client.write() = Some(info);
    }

    pub fn client_info(&self) -> Option<ClientInfo> {
        self.client.read().clone()
    }

    /// Store a fresh challenge, replacing any earlier unanswered one.
    pub fn begin_logon(&self, attempt: LogonAttempt) {
        *self.logon.lock() = Some(attempt);
    }

    /// Take the outstanding challenge. A challenge answers one proof.
    pub fn take_logon(&self) -> Option<LogonAttempt> {
        self.logon.lock().take()
    }

    /// `Ready -> Authenticated`, recording the account and session key.
    pub fn authenticate(&self, account: AccountInfo, key: SessionKey) -> bool {
        if !self.transition(SessionState::Authenticated) {
            return false;
        }
        info!(
            session = self.id,
            account = account.id,
            identity = %account.identity,
            "session authenticated"
        );
        *self.account.write() = Some(Arc::new(account));
        *self.session_key.lock() = Some(key);
        true
    }

    pub fn account(&self) -> Option<Arc<AccountInfo>> {
        self.account.read().clone()
    }

    pub fn set_game_accounts(&self, accounts: Vec<GameAccountInfo>) {
        *self.game_accounts.write() = accounts;
    }

    pub fn game_accounts(&self) -> Vec<GameAccountInfo> {
        self.game_accounts.read().clone()
    }

    pub fn has_session_key(&self) -> bool {
        self.session_key.lock().is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
