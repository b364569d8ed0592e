#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use logon_gateway::core::codec::FrameCodec;
use logon_gateway::core::frame::Frame;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let _ = Frame::from_bytes(data);

    // Stream decoding must terminate and never panic, whatever the prefix says
    let mut codec = FrameCodec::default();
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
});
