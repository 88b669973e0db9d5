#![no_main]

use backup_protocol::core::codec::ServerCodec;
use backup_protocol::core::message::Request;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Request parsing must never panic on attacker-controlled bytes
    let _ = Request::decode(data);

    let mut buf = BytesMut::from(data);
    let mut codec = ServerCodec::new(1024 * 1024);
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        if let Ok(request) = frame.into_request() {
            // Re-encoding a parsed request must parse again
            let _ = Request::decode(&request.encode());
        }
    }
    let _ = codec.decode_eof(&mut buf);
});
