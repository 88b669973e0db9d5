//! # Utility Modules
//!
//! Supporting utilities for cryptography, logging, and observability.
//!
//! ## Components
//! - **Crypto**: AES key generation, RSA-OAEP key wrap, file content decryption, CRC-32
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe observability counters
//!
//! ## Security
//! - Keys and client ids come from OS-seeded CSPRNGs
//! - Ciphertext lengths are checked before any block is decrypted

pub mod crypto;
pub mod logging;
pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
