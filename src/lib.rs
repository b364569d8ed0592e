//! # Logon Gateway
//!
//! Session core of a game-client login and account-broker server.
//!
//! Clients connect over TLS and speak a length-prefixed binary RPC protocol.
//! Each frame names a service by 32-bit hash; the service dispatcher routes it
//! to a handler, which answers inline or defers its reply to a bounded worker
//! pool. Accounts authenticate with SRP6, so the server never sees a password.
//!
//! ## Layout
//! - [`core`]: BigNumber, frames and the framing codec
//! - [`auth`]: SRP6 engine and account snapshots
//! - [`session`]: per-connection state machine, registry and connection driver
//! - [`protocol`]: status codes, payloads, dispatcher and built-in services
//! - [`service`]: worker pool and gateway assembly
//! - [`transport`]: TLS and the listener loop
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use logon_gateway::auth::{InMemoryAccountStore, SrpParams};
//! use logon_gateway::config::GatewayConfig;
//! use logon_gateway::service::run_blocking;
//!
//! let config = GatewayConfig::default_with_overrides(|c| c.tls.self_signed = true);
//! let store = Arc::new(InMemoryAccountStore::new());
//! store.register(&SrpParams::logon(), "player@example.com", "hunter2")?;
//! run_blocking(config, store, std::future::pending())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod session;
pub mod transport;
pub mod utils;

pub use error::{GatewayError, Result};
