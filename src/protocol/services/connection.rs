//! Connection bookkeeping: hello, keep-alive and client-requested disconnect.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::protocol::dispatcher::{service_hash, Call, Reply, ServiceHandler};
use crate::protocol::messages::{self, ConnectRequest, ConnectResponse, DisconnectRequest};
use crate::protocol::status::RpcError;
use crate::session::{ClientInfo, CloseReason};

pub const NAME: &str = "bnet.protocol.connection.ConnectionService";
pub const HASH: u32 = service_hash(NAME);

pub mod method {
    pub const CONNECT: u32 = 1;
    pub const KEEP_ALIVE: u32 = 2;
    pub const REQUEST_DISCONNECT: u32 = 3;
}

#[derive(Debug, Default)]
pub struct ConnectionService;

impl ConnectionService {
    fn connect(&self, call: &Call<'_>) -> Result<Reply, RpcError> {
        let request: ConnectRequest = messages::decode(call.payload)?;
        info!(
            session = call.session.id(),
            locale = %request.locale,
            platform = %request.platform,
            build = request.build,
            "client connected"
        );
        call.session.set_client_info(ClientInfo {
            locale: request.locale,
            platform: request.platform,
            build: request.build,
        });

        let server_time_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Ok(Reply::Payload(messages::encode(&ConnectResponse {
            session_id: call.session.id(),
            server_time_ms,
        })?))
    }

    fn request_disconnect(&self, call: &Call<'_>) -> Result<Reply, RpcError> {
        let request: DisconnectRequest = messages::decode(call.payload)?;
        info!(
            session = call.session.id(),
            reason = request.reason,
            "client requested disconnect"
        );
        // The reply has to be queued before the close so it gets flushed.
        if call.expects_response {
            call.session.send_ok(call.token, bytes::Bytes::new());
        }
        call.session.close(CloseReason::Requested);
        Ok(Reply::Deferred)
    }
}

impl ServiceHandler for ConnectionService {
    fn service_name(&self) -> &'static str {
        NAME
    }

    fn handle(&self, call: &Call<'_>) -> Result<Reply, RpcError> {
        match call.method {
            method::CONNECT => self.connect(call),
            method::KEEP_ALIVE => Ok(Reply::Empty),
            method::REQUEST_DISCONNECT => self.request_disconnect(call),
            other => Err(RpcError::InvalidMethod(other)),
        }
    }
}
