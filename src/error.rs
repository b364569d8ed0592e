//! # Error Types
//!
//! Crate-level error handling for the logon gateway.
//!
//! This module defines the errors that end a connection or abort server startup.
//! Errors that are answered on the wire (unknown service, malformed payload,
//! authentication denial) live in [`crate::protocol::status`] instead, because
//! they never escape the dispatcher.
//!
//! ## Error Categories
//! - **Transport / TLS**: socket and handshake failures, fatal to one connection
//! - **Framing**: invalid or oversized frames, fatal to one connection
//! - **Configuration**: invalid settings, fatal at startup
//! - **Auth engine**: BigNumber and SRP6 usage errors
//!
//! ## Example Usage
//! ```rust
//! use logon_gateway::error::{GatewayError, Result};
//! use std::fs::File;
//! use std::io::Read;
//! use tracing::{info, error};
//!
//! fn read_file(path: &str) -> Result<String> {
//!     let mut file = File::open(path).map_err(GatewayError::Io)?;
//!     let mut contents = String::new();
//!     file.read_to_string(&mut contents).map_err(GatewayError::Io)?;
//!     Ok(contents)
//! }
//!
//! fn main() {
//!     match read_file("gateway.toml") {
//!         Ok(contents) => info!(bytes = contents.len(), "Successfully read file"),
//!         Err(e) => error!(error=%e, "Error reading file"),
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

use crate::auth::srp6::SrpError;
use crate::core::bignum::BigNumberError;

/// Static error messages for the hot paths.
pub mod constants {
    /// Connection errors
    pub const ERR_HANDSHAKE_TIMEOUT: &str = "TLS handshake did not complete in time";
    pub const ERR_WRITE_ZERO: &str = "Peer accepted zero bytes";

    /// Listener errors
    pub const ERR_BIND_FAILED: &str = "Failed to bind listening socket";
    pub const ERR_MAX_CONNECTIONS: &str = "Connection limit reached";

    /// Worker pool errors
    pub const ERR_POOL_SATURATED: &str = "Worker pool queue is full";
}

/// Primary error type for connection handling and server startup.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Timeout occurred")]
    Timeout,

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Bind failed for {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("BigNumber error: {0}")]
    BigNumber(#[from] BigNumberError),

    #[error("SRP6 error: {0}")]
    Srp(#[from] SrpError),

    #[error("Worker pool saturated")]
    PoolSaturated,

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;
