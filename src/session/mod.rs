//! # Sessions
//!
//! Per-connection state, its outbound queue, deferred replies, the registry of
//! live sessions, and the task that pumps a session's socket.
//!
//! ## Components
//! - **Session**: state machine, auth state, outbound FIFO
//! - **WriteQueue**: encoded frames with partial-write offset
//! - **Pending**: token-keyed deferred replies and [`Completion`]
//! - **Registry**: concurrent id -> session map with the idle sweep
//! - **Driver**: read/decode/dispatch and drain loops for one connection

pub mod driver;
pub mod pending;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod session;
pub mod write_queue;

pub use driver::{drain_outbound, Drained, DriverOptions, SessionDriver};
pub use pending::Completion;
pub use registry::SessionRegistry;
pub use session::{ClientInfo, CloseReason, LogonAttempt, Session, SessionState};
