//! # Transport Layer
//!
//! TCP serving for the backup protocol.
//!
//! ## Components
//! - **TCP**: single-task accept loop; each connection carries one request and is
//!   served inline before the next accept
//!
//! ## Framing
//! Requests are read by logical byte count, responses are written as zero-padded
//! 1024 byte blocks (see [`crate::core::codec`]).

pub mod tcp;
