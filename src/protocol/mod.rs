//! # Protocol Layer
//!
//! Request handling for the backup protocol.
//!
//! ## Components
//! - **Dispatcher**: routes each decoded request to its handler and produces at most
//!   one response
//!
//! ## Exchanges
//! ```text
//! REGISTER         -> REGISTER_SUCCEEDED | REGISTER_FAILED
//! PUBLIC_KEY       -> PUBLIC_KEY_RECEIVED (wrapped AES key)
//! RECONNECT        -> RECONNECT_ACCEPTED (wrapped AES key) | RECONNECT_FAILED
//! FILE_SEND        -> FILE_RECEIVED_CRC
//! CRC_GOOD         -> MESSAGE_RECEIVED
//! CRC_WRONG_AGAIN  -> (connection closed, no response)
//! CRC_WRONG_DONE   -> MESSAGE_RECEIVED
//! anything else    -> GENERAL_ERROR
//! ```

pub mod dispatcher;

#[cfg(test)]
mod tests;

pub use dispatcher::Dispatcher;
