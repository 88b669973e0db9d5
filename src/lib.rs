//! # Backup Protocol
//!
//! Server and client for an encrypted file backup protocol over TCP.
//!
//! Clients register a name, hand over an RSA public key and receive an AES key wrapped
//! with RSA-OAEP. Files are then uploaded encrypted under that key; the server answers
//! with the CRC-32 of what it decrypted and the client either confirms the checksum or
//! retries the upload.
//!
//! ## Layers
//! - [`core`]: wire constants, headers, typed messages and the tokio codecs
//! - [`protocol`]: the request dispatcher
//! - [`store`]: metadata persistence, the client session cache and the file vault
//! - [`transport`]: the TCP accept loop
//! - [`service`]: the client library
//! - [`utils`]: crypto, logging and metrics
//!
//! ## Example
//! ```no_run
//! use backup_protocol::config::BackupConfig;
//! use backup_protocol::transport::tcp;
//!
//! # async fn run() -> backup_protocol::error::Result<()> {
//! let config = BackupConfig::from_env();
//! config.validate_strict()?;
//! tcp::start_server(&config).await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod store;
pub mod transport;
pub mod utils;

pub use crate::core::frame::{ClientId, PROTOCOL_VERSION};
pub use crate::core::message::{Request, RequestBody, Response};
pub use error::{ProtocolError, Result};
