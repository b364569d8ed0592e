#![no_main]

use libfuzzer_sys::fuzz_target;
use logon_gateway::protocol::messages::{
    self, ConnectRequest, LogonChallengeRequest, LogonProofRequest,
};

fuzz_target!(|data: &[u8]| {
    // Request bodies come straight off the wire
    let _ = messages::decode::<ConnectRequest>(data);
    let _ = messages::decode::<LogonChallengeRequest>(data);
    let _ = messages::decode::<LogonProofRequest>(data);
});
