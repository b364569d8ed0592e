//! Service-hash routing.
//!
//! The table is assembled once by [`DispatcherBuilder`] and is read-only
//! afterwards, so lookups take no lock. Every handler outcome becomes either a
//! response frame or nothing; nothing a handler does can end the connection
//! except an explicit close on the session.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, trace, warn};

use crate::core::frame::Frame;
use crate::error::{GatewayError, Result};
use crate::protocol::status::RpcError;
use crate::session::{Completion, Session};
use crate::utils::metrics::Metrics;

/// 32-bit FNV-1a of a service name.
pub const fn service_hash(name: &str) -> u32 {
    let bytes = name.as_bytes();
    let mut hash: u32 = 0x811C_9DC5;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(0x0100_0193);
        i += 1;
    }
    hash
}

/// What a handler produced for one call.
#[derive(Debug)]
pub enum Reply {
    Payload(Bytes),
    Empty,
    /// The handler took a [`Completion`]; the reply comes later.
    Deferred,
}

/// One decoded request, as seen by a handler.
pub struct Call<'a> {
    pub session: &'a Arc<Session>,
    pub token: u32,
    /// Method id with the flag bits masked off.
    pub method: u32,
    pub payload: &'a Bytes,
    pub expects_response: bool,
}

impl Call<'_> {
    /// Register this call's token for a reply delivered later.
    pub fn defer(&self) -> std::result::Result<Completion, RpcError> {
        self.session.defer(self.token, self.expects_response)
    }
}

/// One RPC service. Implementations switch on `call.method`.
pub trait ServiceHandler: Send + Sync {
    fn service_name(&self) -> &'static str;

    fn service_hash(&self) -> u32 {
        service_hash(self.service_name())
    }

    fn handle(&self, call: &Call<'_>) -> std::result::Result<Reply, RpcError>;
}

#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<u32, Arc<dyn ServiceHandler>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Two services whose names hash alike are refused.
    pub fn register<H>(mut self, handler: H) -> Result<Self>
    where
        H: ServiceHandler + 'static,
    {
        let hash = handler.service_hash();
        if let Some(existing) = self.handlers.get(&hash) {
            return Err(GatewayError::ConfigError(format!(
                "service {} collides with {} at {hash:#010x}",
                handler.service_name(),
                existing.service_name()
            )));
        }
        debug!(service = handler.service_name(), hash = format_args!("{hash:#010x}"), "service registered");
        self.handlers.insert(hash, Arc::new(handler));
        Ok(self)
    }

    pub fn build(self, metrics: Arc<Metrics>) -> ServiceDispatcher {
        ServiceDispatcher {
            handlers: self.handlers,
            metrics,
        }
    }
}

/// Immutable service table.
pub struct ServiceDispatcher {
    handlers: HashMap<u32, Arc<dyn ServiceHandler>>,
    metrics: Arc<Metrics>,
}

impl ServiceDispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn contains(&self, hash: u32) -> bool {
        self.handlers.contains_key(&hash)
    }

    /// Route one request frame and queue whatever reply it earns.
    pub fn dispatch(&self, session: &Arc<Session>, frame: Frame) {
        if frame.is_response() {
            // Clients have nothing to answer yet; drop stray responses.
            trace!(session = session.id(), token = frame.token, "ignoring client response frame");
            return;
        }

        let Some(handler) = self.handlers.get(&frame.service_hash) else {
            debug!(
                session = session.id(),
                service = format_args!("{:#010x}", frame.service_hash),
                "unknown service"
            );
            session.send_error(frame.token, &RpcError::InvalidService(frame.service_hash));
            return;
        };

        let call = Call {
            session,
            token: frame.token,
            method: frame.method(),
            payload: &frame.payload,
            expects_response: frame.expects_response(),
        };
        trace!(
            session = session.id(),
            service = handler.service_name(),
            method = call.method,
            token = call.token,
            "dispatch"
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(&call)))
            .unwrap_or_else(|_| {
                self.metrics.handler_panic();
                error!(
                    session = session.id(),
                    service = handler.service_name(),
                    method = call.method,
                    "handler panicked"
                );
                Err(RpcError::Internal("handler panicked".into()))
            });

        match outcome {
            Ok(Reply::Deferred) => {}
            Ok(Reply::Payload(payload)) if call.expects_response => {
                session.send_ok(call.token, payload);
            }
            Ok(Reply::Empty) if call.expects_response => {
                session.send_ok(call.token, Bytes::new());
            }
            Ok(_) => {}
            Err(err) => {
                if let RpcError::Internal(detail) = &err {
                    warn!(
                        session = session.id(),
                        service = handler.service_name(),
                        method = call.method,
                        detail = %detail,
                        "handler failed"
                    );
                }
                session.send_error(call.token, &err);
            }
        }
    }
}
