//! Deadlines used by the gateway and a helper for applying them.

use std::future::Future;
use std::time::Duration;

use crate::error::{GatewayError, Result};

/// Sessions with no traffic for this long are closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// TLS handshakes must finish within this window.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on flushing replies after a client-requested disconnect.
pub const LINGER_TIMEOUT: Duration = Duration::from_secs(2);

/// Bound on waiting for connection tasks during shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// How often the idle sweep runs: a quarter of the idle window, clamped to
/// [10 ms, 1 s].
pub fn sweep_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL)
}

/// Await `fut`, failing with [`GatewayError::Timeout`] after `duration`.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| GatewayError::Timeout)
}
