// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::core::codec::{RequestFrame, ServerCodec};
use crate::core::frame::{ClientId, RequestHeader, RequestCode, CLIENT_ID_SIZE, RESPONSE_HEADER_SIZE};
use crate::core::message::{Request, RequestBody, Response};
use crate::protocol::dispatcher::Dispatcher;
use crate::service::client::{generate_client_key, public_key_der};
use crate::store::{ClientSessions, FileVault, Persistence, SqliteStore};
use crate::utils::crypto::{checksum, encrypt_file, unwrap_key};
use crate::utils::metrics::Metrics;
use bytes::BytesMut;
use rsa::RsaPrivateKey;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::codec::Decoder;

struct Harness {
    dispatcher: Dispatcher<SqliteStore>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let sessions = ClientSessions::load(SqliteStore::open_in_memory().unwrap()).unwrap();
        let vault = FileVault::new(dir.path().join("backups"));
        Self {
            dispatcher: Dispatcher::new(sessions, vault, Arc::new(Metrics::new())),
            dir,
        }
    }

    fn send(&mut self, client_id: ClientId, body: RequestBody) -> Option<Response> {
        self.send_request(Request::new(client_id, body))
    }

    fn send_request(&mut self, request: Request) -> Option<Response> {
        let mut buf = BytesMut::from(&request.encode()[..]);
        let frame = ServerCodec::default()
            .decode(&mut buf)
            .expect("frame decodes")
            .expect("frame is complete");
        self.dispatcher.dispatch(frame)
    }

    fn register(&mut self, name: &str) -> ClientId {
        match self.send(ClientId::ZERO, RequestBody::Register { name: name.into() }) {
            Some(Response::RegisterSucceeded { client_id }) => client_id,
            other => panic!("Expected REGISTER_SUCCEEDED, got {other:?}"),
        }
    }

    /// Register, hand over a fresh public key and return the key the server issued.
    fn enrol(&mut self, name: &str) -> (ClientId, RsaPrivateKey, [u8; 16]) {
        let id = self.register(name);
        let private = generate_client_key().unwrap();
        let body = RequestBody::PublicKey {
            name: name.into(),
            public_key: public_key_der(&private).unwrap(),
        };
        let key = match self.send(id, body) {
            Some(Response::PublicKeyReceived {
                client_id,
                wrapped_key,
            }) => {
                assert_eq!(client_id, id);
                unwrap_key(&private, &wrapped_key).unwrap()
            }
            other => panic!("Expected PUBLIC_KEY_RECEIVED, got {other:?}"),
        };
        (id, private, key)
    }

    fn send_file(&mut self, id: ClientId, key: &[u8; 16], filename: &str, contents: &[u8]) -> Option<Response> {
        let ciphertext = encrypt_file(contents, key);
        self.send(
            id,
            RequestBody::FileSend {
                content_size: ciphertext.len() as u32,
                filename: filename.into(),
                ciphertext,
            },
        )
    }

    fn store(&self) -> &SqliteStore {
        self.dispatcher.sessions().store()
    }
}

#[test]
fn test_register_on_empty_store() {
    let mut h = Harness::new();
    let id = h.register("alice");

    assert!(!id.is_zero());
    let sessions = h.dispatcher.sessions();
    assert_eq!(sessions.len(), 1);
    let record = sessions.get(&id).expect("cached record");
    assert_eq!(record.name, "alice");
    assert!(record.public_key.is_none());
    assert!(record.aes_key.is_none());
    assert!(h.store().exists_by_id(&id).unwrap());
}

#[test]
fn test_duplicate_name_is_refused_with_zero_id() {
    let mut h = Harness::new();
    let id = h.register("alice");

    let response = h
        .send(ClientId::ZERO, RequestBody::Register { name: "alice".into() })
        .expect("a response");
    assert_eq!(response, Response::RegisterFailed);

    let bytes = response.encode();
    assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 2101);
    assert_eq!(&bytes[RESPONSE_HEADER_SIZE..], &[0u8; CLIENT_ID_SIZE]);

    assert_eq!(h.dispatcher.sessions().len(), 1);
    assert!(h.dispatcher.sessions().exists_by_id(&id));
}

#[test]
fn test_invalid_names_are_refused() {
    let mut h = Harness::new();
    for name in ["", "   ", "bob!", "../../etc"] {
        let response = h.send(ClientId::ZERO, RequestBody::Register { name: name.into() });
        assert_eq!(response, Some(Response::RegisterFailed), "name {name:?}");
    }
    assert!(h.dispatcher.sessions().is_empty());
}

#[test]
fn test_public_key_issues_stored_symmetric_key() {
    let mut h = Harness::new();
    let (id, _, key) = h.enrol("alice");

    assert_eq!(h.dispatcher.sessions().aes_key(&id), Some(key));
    assert_eq!(h.store().get_aes_key(&id).unwrap(), Some(key));
    assert!(h.store().has_public_key(&id).unwrap());
}

#[test]
fn test_public_key_for_unknown_client_is_general_error() {
    let mut h = Harness::new();
    let private = generate_client_key().unwrap();
    let response = h.send(
        ClientId([9; 16]),
        RequestBody::PublicKey {
            name: "ghost".into(),
            public_key: public_key_der(&private).unwrap(),
        },
    );
    assert_eq!(response, Some(Response::GeneralError));
}

#[test]
fn test_unparseable_public_key_is_general_error() {
    let mut h = Harness::new();
    let id = h.register("alice");
    let response = h.send(
        id,
        RequestBody::PublicKey {
            name: "alice".into(),
            public_key: vec![0xAA; 160],
        },
    );
    assert_eq!(response, Some(Response::GeneralError));
    assert!(!h.dispatcher.sessions().has_public_key(&id));
}

#[test]
fn test_reconnect_without_public_key_fails() {
    let mut h = Harness::new();
    let id = h.register("alice");

    let response = h.send(id, RequestBody::Reconnect { name: "alice".into() });
    assert_eq!(response, Some(Response::ReconnectFailed { client_id: id }));

    let stranger = ClientId([4; 16]);
    let response = h.send(stranger, RequestBody::Reconnect { name: "carol".into() });
    assert_eq!(response, Some(Response::ReconnectFailed { client_id: stranger }));
}

#[test]
fn test_reconnect_rotates_symmetric_key() {
    let mut h = Harness::new();
    let (id, private, first_key) = h.enrol("alice");

    let response = h.send(id, RequestBody::Reconnect { name: "alice".into() });
    let new_key = match response {
        Some(Response::ReconnectAccepted {
            client_id,
            wrapped_key,
        }) => {
            assert_eq!(client_id, id);
            unwrap_key(&private, &wrapped_key).unwrap()
        }
        other => panic!("Expected RECONNECT_ACCEPTED, got {other:?}"),
    };

    assert_ne!(new_key, first_key);
    assert_eq!(h.dispatcher.sessions().aes_key(&id), Some(new_key));
}

#[test]
fn test_file_send_reports_plaintext_checksum() {
    let mut h = Harness::new();
    let (id, _, key) = h.enrol("alice");

    let response = h.send_file(id, &key, "hello.txt", b"hello world");
    assert_eq!(
        response,
        Some(Response::FileReceived {
            client_id: id,
            content_size: 11,
            filename: "hello.txt".into(),
            checksum: checksum(b"hello world"),
        })
    );

    let record = h.store().file_record(&id, "hello.txt").unwrap().expect("file row");
    assert!(!record.verified);
    assert_eq!(std::fs::read(&record.path).unwrap(), b"hello world");
    assert!(record.path.starts_with(h.dir.path()));
}

#[test]
fn test_crc_good_is_idempotent() {
    let mut h = Harness::new();
    let (id, _, key) = h.enrol("alice");
    h.send_file(id, &key, "hello.txt", b"hello world");

    for _ in 0..2 {
        let response = h.send(id, RequestBody::CrcGood { filename: "hello.txt".into() });
        assert_eq!(response, Some(Response::MessageReceived { client_id: id }));
        assert!(h.store().file_record(&id, "hello.txt").unwrap().unwrap().verified);
    }
}

#[test]
fn test_resend_replaces_verified_record() {
    let mut h = Harness::new();
    let (id, _, key) = h.enrol("alice");
    h.send_file(id, &key, "notes.txt", b"first");
    h.send(id, RequestBody::CrcGood { filename: "notes.txt".into() });

    h.send_file(id, &key, "notes.txt", b"second draft");
    let record = h.store().file_record(&id, "notes.txt").unwrap().unwrap();
    assert!(!record.verified);
    assert_eq!(std::fs::read(&record.path).unwrap(), b"second draft");
}

#[test]
fn test_crc_wrong_again_is_silent() {
    let mut h = Harness::new();
    let (id, _, key) = h.enrol("alice");
    h.send_file(id, &key, "a.bin", b"payload");

    let response = h.send(id, RequestBody::CrcWrongAgain { filename: "a.bin".into() });
    assert!(response.is_none());
    assert_eq!(h.dispatcher.metrics().snapshot().silent_requests, 1);
    assert!(!h.store().file_record(&id, "a.bin").unwrap().unwrap().verified);
}

#[test]
fn test_crc_wrong_done_acknowledges_without_verifying() {
    let mut h = Harness::new();
    let (id, _, key) = h.enrol("alice");
    h.send_file(id, &key, "a.bin", b"payload");

    let response = h.send(id, RequestBody::CrcWrongDone { filename: "a.bin".into() });
    assert_eq!(response, Some(Response::MessageReceived { client_id: id }));
    assert!(!h.store().file_record(&id, "a.bin").unwrap().unwrap().verified);
}

#[test]
fn test_file_send_without_key_is_general_error() {
    let mut h = Harness::new();
    let id = h.register("alice");
    let response = h.send_file(id, &[0u8; 16], "a.txt", b"data");
    assert_eq!(response, Some(Response::GeneralError));
    assert!(!h.store().file_exists(&id, "a.txt").unwrap());
}

#[test]
fn test_escaping_filename_is_general_error() {
    let mut h = Harness::new();
    let (id, _, key) = h.enrol("alice");
    let response = h.send_file(id, &key, "../escape.txt", b"data");
    assert_eq!(response, Some(Response::GeneralError));
    assert!(!h.dir.path().join("escape.txt").exists());
}

#[test]
fn test_unknown_code_is_general_error() {
    let mut h = Harness::new();
    let mut header = RequestHeader::new(ClientId::ZERO, RequestCode::Register, 0);
    header.code = 1199;
    let frame = RequestFrame {
        header,
        payload: BytesMut::new(),
    };
    assert_eq!(h.dispatcher.dispatch(frame), Some(Response::GeneralError));
    assert_eq!(h.dispatcher.metrics().snapshot().general_errors, 1);
}

#[test]
fn test_short_payload_is_general_error() {
    let mut h = Harness::new();
    let header = RequestHeader::new(ClientId::ZERO, RequestCode::PublicKey, 10);
    let frame = RequestFrame {
        header,
        payload: BytesMut::from(&[0u8; 10][..]),
    };
    assert_eq!(h.dispatcher.dispatch(frame), Some(Response::GeneralError));
}

#[test]
fn test_other_protocol_versions_are_served() {
    let mut h = Harness::new();
    let mut request = Request::new(ClientId::ZERO, RequestBody::Register { name: "old".into() });
    request.version = 2;
    assert!(matches!(
        h.send_request(request),
        Some(Response::RegisterSucceeded { .. })
    ));
}

#[test]
fn test_last_seen_refreshed_on_every_request() {
    let mut h = Harness::new();
    let id = h.register("alice");
    let before = h.dispatcher.sessions().get(&id).unwrap().last_seen;

    std::thread::sleep(std::time::Duration::from_millis(5));
    // Failing and silent requests count as activity too.
    h.send(id, RequestBody::CrcWrongAgain { filename: "x".into() });
    let after = h.dispatcher.sessions().get(&id).unwrap().last_seen;
    assert!(after > before);

    std::thread::sleep(std::time::Duration::from_millis(5));
    h.send_file(id, &[0u8; 16], "x", b"no key yet");
    assert!(h.dispatcher.sessions().get(&id).unwrap().last_seen > after);
}

#[test]
fn test_incomplete_frame_still_refreshes_last_seen() {
    let mut h = Harness::new();
    let id = h.register("alice");
    let before = h.dispatcher.sessions().get(&id).unwrap().last_seen;

    std::thread::sleep(std::time::Duration::from_millis(5));
    let mut buf = BytesMut::new();
    RequestHeader::new(id, RequestCode::CrcGood, 256).encode(&mut buf);
    buf.extend_from_slice(&[0u8; 10]);
    let mut codec = ServerCodec::default();
    let error = codec.decode_eof(&mut buf).unwrap_err();

    let response = h.dispatcher.reject_frame(codec.last_header(), &error);
    assert_eq!(response, Response::GeneralError);
    assert!(h.dispatcher.sessions().get(&id).unwrap().last_seen > before);
}

#[test]
fn test_headerless_garbage_touches_nobody() {
    let mut h = Harness::new();
    let id = h.register("alice");
    let before = h.dispatcher.sessions().get(&id).unwrap().last_seen;

    let mut buf = BytesMut::from(&[0xAAu8; 10][..]);
    let mut codec = ServerCodec::default();
    let error = codec.decode_eof(&mut buf).unwrap_err();
    assert!(codec.last_header().is_none());

    assert_eq!(h.dispatcher.reject_frame(None, &error), Response::GeneralError);
    assert_eq!(h.dispatcher.sessions().get(&id).unwrap().last_seen, before);
}
