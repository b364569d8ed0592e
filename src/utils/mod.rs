//! # Utility Modules
//!
//! Logging setup, metrics and timeouts shared across the gateway.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` installation from [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: atomic counters owned by the server
//! - **Timeout**: default deadlines, sweep cadence and an async timeout wrapper

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
