//! # Error Types
//!
//! Error handling for the backup protocol server and client.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`ProtocolError`]. The variants follow the failure classes of the protocol:
//!
//! ## Error Categories
//! - **Frame Errors**: truncated or malformed byte buffers, oversized frames
//! - **Protocol Errors**: unknown request codes, requests that parse but cannot be served
//! - **Cryptographic Errors**: unusable public keys, wrap/unwrap failures
//! - **Transport Errors**: socket I/O failures and early closes
//! - **Persistence Errors**: failures of the relational backing store
//! - **Fatal Errors**: startup failures that terminate the process
//!
//! Domain outcomes such as a duplicate registration name are *not* errors; they are
//! ordinary response messages (see [`crate::core::message::Response`]).
//!
//! ## Example Usage
//! ```rust
//! use backup_protocol::error::{ProtocolError, Result};
//! use backup_protocol::core::frame::RequestHeader;
//!
//! fn peek_code(buf: &[u8]) -> Result<u16> {
//!     let header = RequestHeader::decode(buf)?;
//!     Ok(header.code)
//! }
//!
//! assert!(matches!(peek_code(&[0u8; 3]), Err(ProtocolError::InvalidHeader)));
//! ```

use std::io;
use thiserror::Error;

/// Static error messages, borrowed on the hot error paths.
pub mod constants {
    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";

    /// Cryptographic errors
    pub const ERR_ENCRYPTION_FAILED: &str = "Encryption failed";
    pub const ERR_DECRYPTION_FAILED: &str = "Decryption failed";
    pub const ERR_INVALID_PUBLIC_KEY: &str = "Public key is not a valid RSA key";

    /// Dispatcher errors
    pub const ERR_UNKNOWN_CLIENT: &str = "Client id is not registered";
    pub const ERR_MISSING_AES_KEY: &str = "Client has no symmetric key";
}

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid protocol header")]
    InvalidHeader,

    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Malformed payload: {0}")]
    MalformedPayload(&'static str),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Unknown request code: {0}")]
    UnknownRequestCode(u16),

    #[error("Unknown response code: {0}")]
    UnknownResponseCode(u16),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Client {0} is not registered")]
    UnknownClient(String),

    #[error("Client {0} has no symmetric key")]
    MissingSymmetricKey(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl ProtocolError {
    /// True for failures caused by the bytes a peer sent rather than by the server.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidHeader
                | ProtocolError::Truncated { .. }
                | ProtocolError::MalformedPayload(_)
                | ProtocolError::OversizedPacket(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_are_classified() {
        assert!(ProtocolError::InvalidHeader.is_frame_error());
        assert!(ProtocolError::Truncated {
            expected: 24,
            actual: 3
        }
        .is_frame_error());
        assert!(!ProtocolError::UnknownRequestCode(9).is_frame_error());
        assert!(!ProtocolError::DecryptionFailure.is_frame_error());
    }

    #[test]
    fn messages_render_context() {
        let err = ProtocolError::Truncated {
            expected: 279,
            actual: 100,
        };
        assert_eq!(
            err.to_string(),
            "Truncated frame: expected 279 bytes, got 100"
        );
    }
}
