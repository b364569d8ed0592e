//! # Transport Layer
//!
//! TLS termination and the connection multiplexer.
//!
//! ## Components
//! - **TLS**: rustls server configuration and acceptor
//! - **SocketManager**: listener loop, handshake deadline, idle sweep, shutdown
//!
//! Connections run as tasks on a small fixed pool of I/O threads built by
//! [`build_runtime`].

pub mod socket_manager;
pub mod tls;

pub use socket_manager::{ListenerOptions, SocketManager};
pub use tls::{TlsServerConfig, TlsVersion};

use std::io;

/// Multi-threaded runtime with exactly `io_threads` workers.
pub fn build_runtime(io_threads: usize) -> io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(io_threads.max(1))
        .thread_name("gateway-io")
        .enable_all()
        .build()
}
