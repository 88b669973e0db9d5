#![no_main]

use backup_protocol::core::codec::ClientCodec;
use backup_protocol::core::message::Response;
use backup_protocol::utils::crypto::decrypt_file;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let _ = Response::decode(data);

    let mut buf = BytesMut::from(data);
    let _ = ClientCodec::new(1024 * 1024).decode_eof(&mut buf);

    // Ciphertext of any length is either decrypted or refused
    let _ = decrypt_file(data, &[0u8; 16]);
});
