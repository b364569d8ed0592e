//! # RPC Frame
//!
//! One length-prefixed unit of the wire protocol.
//!
//! ## Wire Format
//! ```text
//! [Length(4)] [ServiceHash(4)] [MethodId(4)] [Token(4)] [Payload(N)]
//! ```
//! All fields are big-endian. `Length` counts every byte after itself, so it is
//! always `12 + N`. The two top bits of `MethodId` are flags; the low 30 bits
//! select the operation.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{GatewayError, Result};

/// Size of the length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Size of the header following the length prefix.
pub const HEADER_LEN: usize = 12;

/// Default cap on payload bytes in one frame (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Service hash carried by every response frame.
pub const RESPONSE_SERVICE_HASH: u32 = 0xFFFF_FFFE;

/// Method id flag bits.
pub mod flags {
    /// The sender wants a success reply for this request.
    pub const RESPONSE_EXPECTED: u32 = 1 << 31;
    /// Reserved for future use; ignored on receive.
    pub const RESERVED: u32 = 1 << 30;
    /// Mask selecting the operation.
    pub const METHOD_MASK: u32 = !(RESPONSE_EXPECTED | RESERVED);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub service_hash: u32,
    pub method_id: u32,
    pub token: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(service_hash: u32, method_id: u32, token: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            service_hash,
            method_id,
            token,
            payload: payload.into(),
        }
    }

    /// A request that asks for a success reply.
    pub fn request(service_hash: u32, method: u32, token: u32, payload: impl Into<Bytes>) -> Self {
        Self::new(
            service_hash,
            (method & flags::METHOD_MASK) | flags::RESPONSE_EXPECTED,
            token,
            payload,
        )
    }

    /// A reply to `token` carrying `status` in the method field.
    pub fn response(token: u32, status: u32, payload: impl Into<Bytes>) -> Self {
        Self::new(
            RESPONSE_SERVICE_HASH,
            status & flags::METHOD_MASK,
            token,
            payload,
        )
    }

    /// Operation selector with the flag bits masked off.
    #[inline]
    pub fn method(&self) -> u32 {
        self.method_id & flags::METHOD_MASK
    }

    #[inline]
    pub fn expects_response(&self) -> bool {
        self.method_id & flags::RESPONSE_EXPECTED != 0
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.service_hash == RESPONSE_SERVICE_HASH
    }

    /// Total bytes on the wire, prefix included.
    pub fn encoded_len(&self) -> usize {
        LENGTH_PREFIX_LEN + HEADER_LEN + self.payload.len()
    }

    /// Append the wire form to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u32((HEADER_LEN + self.payload.len()) as u32);
        dst.put_u32(self.service_hash);
        dst.put_u32(self.method_id);
        dst.put_u32(self.token);
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Parse exactly one complete frame from `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < LENGTH_PREFIX_LEN + HEADER_LEN {
            return Err(GatewayError::InvalidHeader);
        }
        let mut cursor = data;
        let length = cursor.get_u32() as usize;
        if length < HEADER_LEN || cursor.len() != length {
            return Err(GatewayError::InvalidHeader);
        }
        if length - HEADER_LEN > MAX_PAYLOAD_SIZE {
            return Err(GatewayError::OversizedFrame(length));
        }
        Ok(Self::parse_body(Bytes::copy_from_slice(cursor)))
    }

    /// Split a header+payload body (prefix already stripped) into a frame.
    pub(crate) fn parse_body(mut body: Bytes) -> Self {
        let service_hash = body.get_u32();
        let method_id = body.get_u32();
        let token = body.get_u32();
        Self {
            service_hash,
            method_id,
            token,
            payload: body,
        }
    }
}
