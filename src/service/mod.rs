//! # Service Runtime
//!
//! The bounded worker pool used for deferred replies, and the assembly of a
//! complete gateway from configuration and an account store.

pub mod gateway;
pub mod worker_pool;

pub use gateway::{build_dispatcher, run_blocking, Gateway};
pub use worker_pool::{WorkerPool, WorkerSlot};
