//! Frame codec tests
//!
//! Feeds encoded frames through the decoder in arbitrary slices and checks the
//! length limits on both sides of the codec.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{BufMut, BytesMut};
use logon_gateway::core::codec::FrameCodec;
use logon_gateway::core::frame::{flags, Frame, HEADER_LEN, MAX_PAYLOAD_SIZE};
use logon_gateway::GatewayError;
use tokio_util::codec::{Decoder, Encoder};

fn sample_frames() -> Vec<Frame> {
    vec![
        Frame::request(0xDEAD_BEEF, 1, 1, vec![]),
        Frame::request(0x0102_0304, 2, 2, vec![0xAB; 17]),
        Frame::response(2, 0, b"ok".to_vec()),
        Frame::new(0x1111_2222, 9 | flags::RESERVED, 40, vec![7u8; 300]),
    ]
}

fn encode_all(frames: &[Frame]) -> BytesMut {
    let mut codec = FrameCodec::default();
    let mut wire = BytesMut::new();
    for frame in frames {
        codec.encode(frame.clone(), &mut wire).unwrap();
    }
    wire
}

fn decode_in_chunks(wire: &[u8], chunk: usize) -> Vec<Frame> {
    let mut codec = FrameCodec::default();
    let mut buffer = BytesMut::new();
    let mut out = Vec::new();
    for piece in wire.chunks(chunk) {
        buffer.extend_from_slice(piece);
        while let Some(frame) = codec.decode(&mut buffer).unwrap() {
            out.push(frame);
        }
    }
    assert!(buffer.is_empty(), "no trailing bytes expected");
    out
}

#[test]
fn any_chunking_yields_the_same_frames() {
    let frames = sample_frames();
    let wire = encode_all(&frames);

    for chunk in [1, 2, 3, 4, 5, 11, 12, 16, 17, 64, wire.len()] {
        assert_eq!(decode_in_chunks(&wire, chunk), frames, "chunk size {chunk}");
    }
}

#[test]
fn header_is_big_endian() {
    let frame = Frame::request(0x0A0B_0C0D, 3, 0x0102_0304, b"xyz".to_vec());
    let wire = encode_all(std::slice::from_ref(&frame));

    assert_eq!(&wire[0..4], &(HEADER_LEN as u32 + 3).to_be_bytes());
    assert_eq!(&wire[4..8], &[0x0A, 0x0B, 0x0C, 0x0D]);
    assert_eq!(&wire[8..12], &(3 | flags::RESPONSE_EXPECTED).to_be_bytes());
    assert_eq!(&wire[12..16], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(&wire[16..], b"xyz");
}

#[test]
fn empty_and_maximum_payloads_round_trip() {
    for size in [0usize, 1, MAX_PAYLOAD_SIZE] {
        let frame = Frame::request(5, 1, 9, vec![0x5A; size]);
        let wire = encode_all(std::slice::from_ref(&frame));
        assert_eq!(wire.len(), 4 + HEADER_LEN + size);
        assert_eq!(decode_in_chunks(&wire, 65_536), vec![frame]);
    }
}

#[test]
fn oversized_payload_is_refused_by_encoder() {
    let mut codec = FrameCodec::new(1024);
    let mut wire = BytesMut::new();
    let result = codec.encode(Frame::request(1, 1, 1, vec![0; 1025]), &mut wire);
    assert!(matches!(result, Err(GatewayError::OversizedFrame(_))));
    assert!(wire.is_empty());
}

#[test]
fn oversized_length_is_refused_from_prefix_alone() {
    let mut codec = FrameCodec::default();
    let mut wire = BytesMut::new();
    wire.put_u32((HEADER_LEN + MAX_PAYLOAD_SIZE + 1) as u32);

    let result = codec.decode(&mut wire);
    assert!(matches!(result, Err(GatewayError::OversizedFrame(_))));
    assert!(wire.capacity() < MAX_PAYLOAD_SIZE);
}

#[test]
fn length_shorter_than_header_is_refused() {
    for declared in [0u32, 1, 11] {
        let mut codec = FrameCodec::default();
        let mut wire = BytesMut::new();
        wire.put_u32(declared);
        wire.put_slice(&[0u8; 16]);
        assert!(matches!(
            codec.decode(&mut wire),
            Err(GatewayError::InvalidHeader)
        ));
    }
}

#[test]
fn incomplete_frame_waits_for_more_bytes() {
    let wire = encode_all(&[Frame::request(1, 1, 1, vec![1, 2, 3])]);
    let mut codec = FrameCodec::default();
    let mut buffer = BytesMut::from(&wire[..wire.len() - 1]);

    assert!(codec.decode(&mut buffer).unwrap().is_none());
    assert_eq!(buffer.len(), wire.len() - 1);

    buffer.extend_from_slice(&wire[wire.len() - 1..]);
    assert!(codec.decode(&mut buffer).unwrap().is_some());
}

#[test]
fn frame_from_bytes_matches_codec() {
    let frame = Frame::request(77, 4, 12, b"payload".to_vec());
    let decoded = Frame::from_bytes(&frame.to_bytes()).unwrap();
    assert_eq!(decoded, frame);
    assert!(decoded.expects_response());
    assert_eq!(decoded.method(), 4);
}
