//! # Crypto Engine
//!
//! Key exchange and file-content crypto for the backup protocol.
//!
//! - **Symmetric keys**: 16 random bytes (AES-128) from the OS CSPRNG.
//! - **Key wrap**: RSA-OAEP (SHA-1) under the client's DER public key.
//! - **File content**: the client encrypts each 16 byte chunk of `plaintext ++ [0x05]`
//!   on its own with AES-128-CBC, zero IV and PKCS#7 padding. A full chunk turns into
//!   32 bytes of ciphertext and a partial last chunk into 16, so the server decrypts the
//!   first block of every 32 byte stride and cuts the result at the first `0x05`.
//! - **Checksum**: IEEE CRC-32 of the recovered plaintext.
//!
//! The zero IV and the sentinel byte are what deployed clients speak; they are not a
//! general purpose scheme. Plaintext that itself contains `0x05` is cut short.

use crate::core::frame::SYMMETRIC_KEY_SIZE;
use crate::error::{constants, ProtocolError, Result};
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand_core::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use tracing::debug;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Marks the end of the plaintext inside the decrypted stream
pub const END_OF_FILE_MARKER: u8 = 0x05;

pub const AES_BLOCK_SIZE: usize = 16;
const ZERO_IV: [u8; AES_BLOCK_SIZE] = [0u8; AES_BLOCK_SIZE];

/// Ciphertext bytes produced per full plaintext chunk (data block + padding block)
const CIPHER_STRIDE: usize = 2 * AES_BLOCK_SIZE;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

/// Generate a fresh AES-128 key
pub fn generate_aes_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Parse an RSA public key from the wire field.
///
/// The 160 byte field holds a DER `SubjectPublicKeyInfo` (a PKCS#1 `RSAPublicKey`
/// is accepted as well); the DER length prefix decides where the key ends, so
/// trailing zero fill is ignored.
pub fn parse_public_key(field: &[u8]) -> Result<RsaPublicKey> {
    let der = der_prefix(field).unwrap_or(field);
    RsaPublicKey::from_public_key_der(der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(der))
        .map_err(|e| ProtocolError::InvalidPublicKey(format!("{}: {e}", constants::ERR_INVALID_PUBLIC_KEY)))
}

/// Encrypt `key` for the holder of `public_key` (RSA-OAEP with SHA-1).
pub fn wrap_key(public_key: &RsaPublicKey, key: &[u8]) -> Result<Vec<u8>> {
    let wrapped = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), key)
        .map_err(|e| {
            debug!(error = %e, "{}", constants::ERR_ENCRYPTION_FAILED);
            ProtocolError::EncryptionFailure
        })?;
    debug!(wrapped_len = wrapped.len(), "Wrapped symmetric key");
    Ok(wrapped)
}

/// Client side counterpart of [`wrap_key`].
pub fn unwrap_key(private_key: &RsaPrivateKey, wrapped: &[u8]) -> Result<SymmetricKey> {
    let key = private_key
        .decrypt(Oaep::new::<Sha1>(), wrapped)
        .map_err(|e| {
            debug!(error = %e, "{}", constants::ERR_DECRYPTION_FAILED);
            ProtocolError::DecryptionFailure
        })?;
    key.try_into().map_err(|_| ProtocolError::DecryptionFailure)
}

/// Recover file plaintext from client ciphertext.
pub fn decrypt_file(ciphertext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    let mut plain = Vec::with_capacity(ciphertext.len() / 2);
    for stride in ciphertext.chunks(CIPHER_STRIDE) {
        if stride.len() < AES_BLOCK_SIZE {
            debug!(trailing = stride.len(), "{}", constants::ERR_DECRYPTION_FAILED);
            return Err(ProtocolError::DecryptionFailure);
        }
        let mut block = [0u8; AES_BLOCK_SIZE];
        block.copy_from_slice(&stride[..AES_BLOCK_SIZE]);
        let decrypted = Aes128CbcDec::new(key.into(), &ZERO_IV.into())
            .decrypt_padded_mut::<NoPadding>(&mut block)
            .map_err(|_| ProtocolError::DecryptionFailure)?;
        plain.extend_from_slice(decrypted);
    }

    if let Some(end) = plain.iter().position(|&b| b == END_OF_FILE_MARKER) {
        plain.truncate(end);
    }
    Ok(plain)
}

/// Client side counterpart of [`decrypt_file`].
pub fn encrypt_file(plaintext: &[u8], key: &SymmetricKey) -> Vec<u8> {
    let mut marked = Vec::with_capacity(plaintext.len() + 1);
    marked.extend_from_slice(plaintext);
    marked.push(END_OF_FILE_MARKER);

    let mut out = Vec::with_capacity(marked.len() * 2);
    for chunk in marked.chunks(AES_BLOCK_SIZE) {
        let encrypted = Aes128CbcEnc::new(key.into(), &ZERO_IV.into())
            .encrypt_padded_vec_mut::<Pkcs7>(chunk);
        out.extend_from_slice(&encrypted);
    }
    out
}

/// Standard CRC-32 (IEEE) of `data`
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Slice `bytes` to the length announced by its outer DER SEQUENCE header.
fn der_prefix(bytes: &[u8]) -> Option<&[u8]> {
    if *bytes.first()? != 0x30 {
        return None;
    }
    let first = *bytes.get(1)? as usize;
    let (len, header) = if first < 0x80 {
        (first, 2)
    } else {
        let count = first & 0x7F;
        if count == 0 || count > 2 {
            return None;
        }
        let len = bytes
            .get(2..2 + count)?
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        (len, 2 + count)
    };
    bytes.get(..header + len)
}
