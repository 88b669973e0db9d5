//! # Client Services
//!
//! Client side of the backup protocol.
//!
//! ## Components
//! - **Client**: [`client::BackupClient`], registration, key exchange and file backup
//!   with the checksum retry exchange
//!
//! ## Security
//! - RSA key pairs sized so the public key fits the fixed 160 byte field
//! - Symmetric keys arrive wrapped with RSA-OAEP and never leave the process unwrapped

pub mod client;

pub use client::{generate_client_key, BackupClient};
