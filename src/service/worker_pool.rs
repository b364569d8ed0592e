//! Bounded pool for blocking work off the connection tasks.
//!
//! Capacity is reserved before a handler defers its reply, so a saturated pool
//! turns into an immediate `ServerBusy` answer instead of an unbounded backlog.
//! Jobs run on tokio's blocking threads; the slot is released when the job
//! finishes.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{constants, GatewayError, Result};

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// Reserved capacity for exactly one job.
#[derive(Debug)]
pub struct WorkerSlot {
    permit: OwnedSemaphorePermit,
    handle: Handle,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Reserve a slot without waiting. Fails when the pool is full or when
    /// called outside a tokio runtime.
    pub fn reserve(&self) -> Result<WorkerSlot> {
        let permit = Arc::clone(&self.permits).try_acquire_owned().map_err(|_| {
            debug!(capacity = self.capacity, "{}", constants::ERR_POOL_SATURATED);
            GatewayError::PoolSaturated
        })?;
        let handle = Handle::try_current()
            .map_err(|e| GatewayError::Custom(format!("no runtime for worker job: {e}")))?;
        Ok(WorkerSlot { permit, handle })
    }
}

impl WorkerSlot {
    /// Run `job` on a blocking thread, holding the slot until it returns.
    pub fn run<F>(self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let WorkerSlot { permit, handle } = self;
        let task = handle.spawn_blocking(move || {
            job();
            drop(permit);
        });
        handle.spawn(async move {
            if let Err(err) = task.await {
                warn!(error = %err, "worker job failed");
            }
        });
    }
}
