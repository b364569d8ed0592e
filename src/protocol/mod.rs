//! # RPC Layer
//!
//! Status codes, payload messages, the service dispatcher and the built-in
//! services.
//!
//! ## Request Flow
//! ```text
//! Frame -> ServiceDispatcher::dispatch -> ServiceHandler::handle
//!       -> Reply::Payload / Reply::Empty  (answered inline)
//!       -> Reply::Deferred                (answered through a Completion)
//!       -> RpcError                       (answered with its status code)
//! ```
//!
//! Methods carry two flag bits above the 30-bit method number. Success replies
//! are only sent when `RESPONSE_EXPECTED` is set; errors are always sent.

pub mod dispatcher;
pub mod messages;
pub mod services;
pub mod status;

pub use dispatcher::{service_hash, Call, DispatcherBuilder, Reply, ServiceDispatcher, ServiceHandler};
pub use status::{RpcError, RpcStatus};
