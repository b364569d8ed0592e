//! Wire status codes and the typed errors handlers answer with.
//!
//! An [`RpcError`] never closes the connection: the dispatcher turns it into a
//! response frame carrying the matching [`RpcStatus`] and the request token.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcStatus {
    Ok = 0,
    InvalidService = 1,
    InvalidMethod = 2,
    MalformedRequest = 3,
    Denied = 4,
    NotAuthenticated = 5,
    AccountBanned = 6,
    ServerBusy = 7,
    ServerError = 8,
}

impl RpcStatus {
    #[inline]
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Ok,
            1 => Self::InvalidService,
            2 => Self::InvalidMethod,
            3 => Self::MalformedRequest,
            4 => Self::Denied,
            5 => Self::NotAuthenticated,
            6 => Self::AccountBanned,
            7 => Self::ServerBusy,
            8 => Self::ServerError,
            _ => return None,
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("invalid service {0:#010x}")]
    InvalidService(u32),

    #[error("invalid method {0}")]
    InvalidMethod(u32),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request denied")]
    Denied,

    #[error("authentication required")]
    NotAuthenticated,

    #[error("account banned")]
    AccountBanned,

    #[error("server busy")]
    Busy,

    #[error("server error: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn status(&self) -> RpcStatus {
        match self {
            Self::InvalidService(_) => RpcStatus::InvalidService,
            Self::InvalidMethod(_) => RpcStatus::InvalidMethod,
            Self::Malformed(_) => RpcStatus::MalformedRequest,
            Self::Denied => RpcStatus::Denied,
            Self::NotAuthenticated => RpcStatus::NotAuthenticated,
            Self::AccountBanned => RpcStatus::AccountBanned,
            Self::Busy => RpcStatus::ServerBusy,
            Self::Internal(_) => RpcStatus::ServerError,
        }
    }
}
