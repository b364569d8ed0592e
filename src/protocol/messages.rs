//! Payload types for the built-in services.
//!
//! Payloads are serde structs encoded with bincode. A payload that fails to
//! decode becomes [`RpcError::Malformed`]; the connection stays up.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::protocol::status::RpcError;

/// Decode a request payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, RpcError> {
    bincode::deserialize(payload).map_err(|e| RpcError::Malformed(e.to_string()))
}

/// Encode a reply payload.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, RpcError> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|e| RpcError::Internal(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub locale: String,
    pub platform: String,
    pub build: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub session_id: u64,
    pub server_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectRequest {
    pub reason: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogonChallengeRequest {
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogonChallengeResponse {
    pub salt: [u8; 32],
    pub public_b: Vec<u8>,
    pub generator: Vec<u8>,
    pub modulus: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogonProofRequest {
    pub public_a: Vec<u8>,
    pub client_proof: [u8; 20],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogonProofResponse {
    pub server_proof: [u8; 20],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStateResponse {
    pub account_id: u32,
    pub identity: String,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAccountEntry {
    pub id: u32,
    pub name: String,
    pub region: u8,
    pub banned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAccountListResponse {
    pub accounts: Vec<GameAccountEntry>,
}
