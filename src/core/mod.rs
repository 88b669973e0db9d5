//! # Core Protocol Components
//!
//! Low-level frame handling: wire constants, headers, typed messages and the
//! tokio codecs that carry them over TCP.
//!
//! ## Components
//! - **Frame**: headers, request/response codes, client ids, fixed-width string fields
//! - **Message**: typed requests and responses with exact encode/decode
//! - **Codec**: tokio codecs for logical-length reads and padded block writes
//!
//! ## Wire Format
//! ```text
//! Request:  [ClientId(16)] [Version(2)] [Code(2)] [PayloadSize(4)] [Payload(N)]
//! Response: [Version(2)] [Code(2)] [PayloadSize(4)] [Payload(N)] [zero fill to 1024*k]
//! ```
//!
//! ## Security
//! - Every decoder checks lengths before slicing; malformed input yields an error, never a panic
//! - Request payloads above the configured maximum are rejected before allocation

pub mod codec;
pub mod frame;
pub mod message;
