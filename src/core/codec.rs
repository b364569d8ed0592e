//! # Frame Codec
//!
//! Tokio codec that turns the session's growable read buffer into frames.
//!
//! Decoding is incremental: a partial frame stays buffered until the rest of
//! its bytes arrive, so any chunking of the stream produces the same frames.
//! The declared length is checked against the payload cap before any space is
//! reserved, which keeps a hostile prefix from forcing a large allocation.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::core::frame::{Frame, HEADER_LEN, LENGTH_PREFIX_LEN, MAX_PAYLOAD_SIZE};
use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        let length = u32::from_be_bytes(prefix) as usize;

        if length < HEADER_LEN {
            return Err(GatewayError::InvalidHeader);
        }
        if length - HEADER_LEN > self.max_payload {
            return Err(GatewayError::OversizedFrame(length));
        }

        let total = LENGTH_PREFIX_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            trace!(have = src.len(), need = total, "partial frame buffered");
            return Ok(None);
        }

        let mut body = src.split_to(total);
        body.advance(LENGTH_PREFIX_LEN);
        Ok(Some(Frame::parse_body(body.freeze())))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = GatewayError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        if frame.payload.len() > self.max_payload {
            return Err(GatewayError::OversizedFrame(HEADER_LEN + frame.payload.len()));
        }
        frame.write_to(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn oversized_length_rejected_before_reserve() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&((HEADER_LEN + 17) as u32).to_be_bytes());
        let capacity = buf.capacity();

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, GatewayError::OversizedFrame(29)));
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn short_prefix_waits_for_more() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[0u8, 0, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn encoder_refuses_payload_over_cap() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::new();
        let frame = Frame::new(1, 1, 1, vec![0u8; 5]);
        assert!(codec.encode(frame, &mut buf).is_err());
        assert!(buf.is_empty());
    }
}
