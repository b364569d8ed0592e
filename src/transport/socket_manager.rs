//! Listener loop: accept, TLS handshake, hand off to the session driver.
//!
//! One task owns the listening socket. It waits on three things at once:
//! shutdown, the next connection, and the sweep tick, so idle sessions are
//! closed even when no traffic arrives. Each accepted connection runs in its
//! own task on the I/O runtime; a failure there closes only that connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{constants, GatewayError, Result};
use crate::session::{CloseReason, Session, SessionDriver, SessionRegistry, SessionState};
use crate::utils::metrics::Metrics;
use crate::utils::timeout::{self, with_timeout};

/// Limits applied by the listener loop
#[derive(Debug, Clone, Copy)]
pub struct ListenerOptions {
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub handshake_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            max_connections: 5000,
            idle_timeout: timeout::IDLE_TIMEOUT,
            handshake_timeout: timeout::HANDSHAKE_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

pub struct SocketManager {
    acceptor: TlsAcceptor,
    driver: Arc<SessionDriver>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<Metrics>,
    options: ListenerOptions,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: CancellationToken,
}

impl SocketManager {
    pub fn new(
        acceptor: TlsAcceptor,
        driver: Arc<SessionDriver>,
        registry: Arc<SessionRegistry>,
        metrics: Arc<Metrics>,
        options: ListenerOptions,
    ) -> Self {
        Self {
            acceptor,
            driver,
            registry,
            metrics,
            options,
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Bind the listening socket to `address` (`host:port`). A bind failure
    /// is returned, never fatal.
    pub async fn start(&self, address: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(address).await.map_err(|source| {
            warn!(%address, error = %source, "{}", constants::ERR_BIND_FAILED);
            GatewayError::Bind {
                address: address.to_string(),
                source,
            }
        })?;
        let local = listener.local_addr()?;
        *self.listener.lock() = Some(listener);
        *self.local_addr.lock() = Some(local);
        info!(address = %local, "listening");
        Ok(local)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stop the loop started by [`SocketManager::run`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Accept and serve connections until [`SocketManager::shutdown`].
    #[instrument(level = "debug", skip_all)]
    pub async fn run(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| GatewayError::Custom("listener not started".into()))?;

        let mut sweep = tokio::time::interval(timeout::sweep_interval(self.options.idle_timeout));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.on_accept(&mut tasks, stream, peer),
                    Err(err) => {
                        // Usually fd exhaustion; back off instead of spinning.
                        warn!(error = %err, "accept failed");
                        self.metrics.connection_error();
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                _ = sweep.tick() => {
                    let closed = self.registry.sweep_idle(self.options.idle_timeout);
                    self.metrics.sessions_swept(closed);
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "connection task failed");
                    }
                }
            }
        }

        drop(listener);
        *self.local_addr.lock() = None;
        let closed = self.registry.close_all(CloseReason::Shutdown);
        info!(closed, "listener stopped, draining sessions");

        let drained = tokio::time::timeout(self.options.shutdown_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "shutdown timeout, aborting connection tasks");
            tasks.abort_all();
        }
        self.metrics.log_metrics();
        Ok(())
    }

    fn on_accept(&self, tasks: &mut JoinSet<()>, stream: TcpStream, peer: SocketAddr) {
        if self.registry.len() >= self.options.max_connections {
            warn!(%peer, limit = self.options.max_connections, "{}", constants::ERR_MAX_CONNECTIONS);
            self.metrics.connection_rejected();
            return;
        }
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer, error = %err, "set_nodelay failed");
        }

        self.metrics.connection_established();
        let session = self.registry.create(Some(peer));
        tasks.spawn(serve_connection(
            session,
            stream,
            self.acceptor.clone(),
            Arc::clone(&self.driver),
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            self.options.handshake_timeout,
        ));
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[instrument(level = "debug", skip_all, fields(session = session.id(), peer = ?session.peer()))]
async fn serve_connection(
    session: Arc<Session>,
    stream: TcpStream,
    acceptor: TlsAcceptor,
    driver: Arc<SessionDriver>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<Metrics>,
    handshake_timeout: Duration,
) {
    session.transition(SessionState::Handshaking);
    metrics.handshake_attempt();

    let handshake = tokio::select! {
        _ = session.cancelled() => None,
        result = with_timeout(handshake_timeout, acceptor.accept(stream)) => Some(result),
    };

    match handshake {
        Some(Ok(Ok(tls))) => {
            metrics.handshake_success();
            if session.transition(SessionState::Ready) {
                driver.run(Arc::clone(&session), tls).await;
            }
        }
        Some(Ok(Err(err))) => {
            debug!(error = %err, "TLS handshake failed");
            metrics.handshake_failed();
            session.close(CloseReason::TransportError);
        }
        Some(Err(_)) => {
            debug!("{}", constants::ERR_HANDSHAKE_TIMEOUT);
            metrics.handshake_failed();
            session.close(CloseReason::HandshakeTimeout);
        }
        None => metrics.handshake_failed(),
    }

    session.mark_closed();
    registry.remove(session.id());
    metrics.connection_closed();
}
