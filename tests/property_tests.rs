//! Property-based tests using proptest
//!
//! These tests validate the wire and crypto invariants across randomly generated
//! inputs: every message survives encode/decode, and no input makes a decoder panic.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use backup_protocol::core::codec::{ClientCodec, ServerCodec};
use backup_protocol::core::frame::{ClientId, RequestHeader, REQUEST_HEADER_SIZE};
use backup_protocol::core::message::{Request, RequestBody, Response};
use backup_protocol::utils::crypto::{checksum, decrypt_file, encrypt_file, END_OF_FILE_MARKER};
use bytes::BytesMut;
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

fn client_id() -> impl Strategy<Value = ClientId> {
    any::<[u8; 16]>().prop_map(ClientId)
}

/// Names as they appear on the wire: no NUL, at most 255 bytes
fn wire_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ._-]{1,255}"
}

fn request_body() -> impl Strategy<Value = RequestBody> {
    prop_oneof![
        wire_name().prop_map(|name| RequestBody::Register { name }),
        wire_name().prop_map(|name| RequestBody::Reconnect { name }),
        (wire_name(), prop::collection::vec(1u8..=255, 1..=160)).prop_map(|(name, mut key)| {
            // The key field is fixed width and decoded verbatim.
            key.resize(160, 0x01);
            RequestBody::PublicKey { name, public_key: key }
        }),
        (wire_name(), prop::collection::vec(any::<u8>(), 0..2048)).prop_map(
            |(filename, ciphertext)| RequestBody::FileSend {
                content_size: ciphertext.len() as u32,
                filename,
                ciphertext,
            }
        ),
        wire_name().prop_map(|filename| RequestBody::CrcGood { filename }),
        wire_name().prop_map(|filename| RequestBody::CrcWrongAgain { filename }),
        wire_name().prop_map(|filename| RequestBody::CrcWrongDone { filename }),
    ]
}

fn response() -> impl Strategy<Value = Response> {
    prop_oneof![
        client_id().prop_map(|client_id| Response::RegisterSucceeded { client_id }),
        Just(Response::RegisterFailed),
        (client_id(), prop::collection::vec(any::<u8>(), 0..3000))
            .prop_map(|(client_id, wrapped_key)| Response::PublicKeyReceived { client_id, wrapped_key }),
        (client_id(), any::<u32>(), wire_name(), any::<u32>()).prop_map(
            |(client_id, content_size, filename, checksum)| Response::FileReceived {
                client_id,
                content_size,
                filename,
                checksum,
            }
        ),
        client_id().prop_map(|client_id| Response::MessageReceived { client_id }),
        (client_id(), prop::collection::vec(any::<u8>(), 0..300))
            .prop_map(|(client_id, wrapped_key)| Response::ReconnectAccepted { client_id, wrapped_key }),
        client_id().prop_map(|client_id| Response::ReconnectFailed { client_id }),
        Just(Response::GeneralError),
    ]
}

// Property: every request survives the client encoder and the server decoder
proptest! {
    #[test]
    fn prop_request_roundtrip(id in client_id(), body in request_body()) {
        let request = Request::new(id, body);
        let mut buf = BytesMut::new();
        ClientCodec::default().encode(request.clone(), &mut buf).expect("encode");

        let frame = ServerCodec::default().decode(&mut buf).expect("decode").expect("complete");
        prop_assert_eq!(frame.into_request().expect("typed request"), request);
        prop_assert!(buf.is_empty());
    }
}

// Property: every response survives block padding
proptest! {
    #[test]
    fn prop_response_roundtrip(response in response()) {
        let mut buf = BytesMut::new();
        ServerCodec::default().encode(response.clone(), &mut buf).expect("encode");
        prop_assert_eq!(buf.len() % 1024, 0);

        let decoded = ClientCodec::default().decode(&mut buf).expect("decode");
        prop_assert_eq!(decoded, Some(response));
    }
}

// Property: payloadSize always matches the bytes that follow the header
proptest! {
    #[test]
    fn prop_response_payload_size_is_exact(response in response()) {
        let bytes = response.encode();
        let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        prop_assert_eq!(declared, bytes.len() - 8);
    }
}

// Property: decoders never panic, whatever the bytes
proptest! {
    #[test]
    fn prop_arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let _ = RequestHeader::decode(&data);
        let _ = Request::decode(&data);
        let _ = Response::decode(&data);

        let mut buf = BytesMut::from(&data[..]);
        let _ = ServerCodec::new(8192).decode_eof(&mut buf);
        let mut buf = BytesMut::from(&data[..]);
        let _ = ClientCodec::new(8192).decode_eof(&mut buf);
    }
}

// Property: anything shorter than a header is a failure, not a panic
proptest! {
    #[test]
    fn prop_short_header_fails(data in prop::collection::vec(any::<u8>(), 0..REQUEST_HEADER_SIZE)) {
        prop_assert!(RequestHeader::decode(&data).is_err());
        prop_assert!(Request::decode(&data).is_err());
    }
}

// Property: sentinel-free plaintext survives the client cipher layout and keeps its CRC
proptest! {
    #[test]
    fn prop_file_cipher_roundtrip(
        key in any::<[u8; 16]>(),
        data in prop::collection::vec(
            any::<u8>().prop_map(|b| if b == END_OF_FILE_MARKER { b + 1 } else { b }),
            0..4096,
        ),
    ) {
        let ciphertext = encrypt_file(&data, &key);
        let plain = decrypt_file(&ciphertext, &key).expect("decrypt");
        prop_assert_eq!(checksum(&plain), checksum(&data));
        prop_assert_eq!(plain, data);
    }
}
