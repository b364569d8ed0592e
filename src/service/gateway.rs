//! Server assembly.
//!
//! Everything the connection tasks share is built here once, at startup, and
//! passed down by `Arc`: the metrics, the session registry, the worker pool and
//! the immutable service table.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::auth::{AccountStore, SrpParams};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::protocol::dispatcher::ServiceDispatcher;
use crate::protocol::services::{AccountService, AuthenticationService, ConnectionService};
use crate::service::worker_pool::WorkerPool;
use crate::session::{DriverOptions, SessionDriver, SessionRegistry};
use crate::transport::{build_runtime, ListenerOptions, SocketManager, TlsServerConfig};
use crate::utils::metrics::Metrics;

const DECOY_SECRET_LEN: usize = 32;

/// Register the built-in services.
pub fn build_dispatcher(
    store: Arc<dyn AccountStore>,
    pool: WorkerPool,
    params: SrpParams,
    decoy_secret: Vec<u8>,
    metrics: Arc<Metrics>,
) -> Result<ServiceDispatcher> {
    Ok(ServiceDispatcher::builder()
        .register(ConnectionService)?
        .register(AuthenticationService::new(
            Arc::clone(&store),
            pool.clone(),
            params,
            decoy_secret,
            Arc::clone(&metrics),
        ))?
        .register(AccountService::new(store, pool))?
        .build(metrics))
}

/// Configured secret, or fresh random bytes for this process.
pub fn decoy_secret(config: &GatewayConfig) -> Result<Vec<u8>> {
    if let Some(secret) = config.auth.decoy_secret_bytes() {
        return Ok(secret);
    }
    let mut secret = vec![0u8; DECOY_SECRET_LEN];
    getrandom::fill(&mut secret)
        .map_err(|e| GatewayError::Custom(format!("entropy source failed: {e}")))?;
    Ok(secret)
}

pub struct Gateway {
    config: GatewayConfig,
    metrics: Arc<Metrics>,
    registry: Arc<SessionRegistry>,
    manager: Arc<SocketManager>,
}

impl Gateway {
    /// Assemble a gateway around `store`. Must be called inside the runtime
    /// that will run it.
    pub fn new(config: GatewayConfig, store: Arc<dyn AccountStore>) -> Result<Self> {
        config.validate_strict()?;
        let acceptor = TlsServerConfig::from_config(&config.tls)?.acceptor()?;

        let metrics = Arc::new(Metrics::new());
        let registry = Arc::new(SessionRegistry::with_outbound_limit(
            config.transport.max_queued_bytes,
        ));
        let pool = WorkerPool::new(config.auth.max_in_flight);
        let dispatcher = build_dispatcher(
            store,
            pool,
            SrpParams::logon(),
            decoy_secret(&config)?,
            Arc::clone(&metrics),
        )?;
        let driver = Arc::new(SessionDriver::new(
            Arc::new(dispatcher),
            Arc::clone(&metrics),
            DriverOptions {
                max_payload: config.transport.max_payload_size,
                linger: config.server.linger,
            },
        ));
        let manager = Arc::new(SocketManager::new(
            acceptor,
            driver,
            Arc::clone(&registry),
            Arc::clone(&metrics),
            ListenerOptions {
                max_connections: config.server.max_connections,
                idle_timeout: config.server.idle_timeout,
                handshake_timeout: config.server.handshake_timeout,
                shutdown_timeout: config.server.shutdown_timeout,
            },
        ));

        Ok(Self {
            config,
            metrics,
            registry,
            manager,
        })
    }

    /// Bind the configured address.
    pub async fn start(&self) -> Result<SocketAddr> {
        self.manager
            .start(&self.config.server.listen_address())
            .await
    }

    /// Serve until [`Gateway::shutdown`].
    pub async fn run(&self) -> Result<()> {
        self.manager.run().await
    }

    pub fn shutdown(&self) {
        self.manager.shutdown();
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.manager.local_addr()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

/// Build the I/O runtime, serve until `shutdown_signal` resolves, then drain.
pub fn run_blocking<F>(
    config: GatewayConfig,
    store: Arc<dyn AccountStore>,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let runtime = build_runtime(config.server.io_threads)?;
    runtime.block_on(async move {
        let io_threads = config.server.io_threads;
        let gateway = Gateway::new(config, store)?;
        let address = gateway.start().await?;
        info!(%address, io_threads, "logon gateway started");

        let manager = Arc::clone(&gateway.manager);
        tokio::spawn(async move {
            shutdown_signal.await;
            manager.shutdown();
        });
        gateway.run().await
    })
}
