//! Wire-level building blocks shared by every message: sizes, codes, headers,
//! client ids and the fixed-width string fields.
//!
//! All integers are little-endian. Requests start with a 24 byte header
//! `[ClientId(16)] [Version(2)] [Code(2)] [PayloadSize(4)]`, responses with an
//! 8 byte header `[Version(2)] [Code(2)] [PayloadSize(4)]`.

use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut};
use std::fmt;

/// Protocol version stamped on every response header
pub const PROTOCOL_VERSION: u16 = 3;

pub const CLIENT_ID_SIZE: usize = 16;
pub const REQUEST_HEADER_SIZE: usize = CLIENT_ID_SIZE + 2 + 2 + 4;
pub const RESPONSE_HEADER_SIZE: usize = 2 + 2 + 4;

/// Maximum length of a client name or filename, in bytes
pub const NAME_SIZE: usize = 255;
/// On-wire width of a NUL-terminated name field (name plus terminator byte)
pub const NAME_FIELD_SIZE: usize = NAME_SIZE + 1;
pub const PUBLIC_KEY_SIZE: usize = 160;
pub const SYMMETRIC_KEY_SIZE: usize = 16;

/// Transport block length; every response is written as zero-padded blocks of this size
pub const BLOCK_SIZE: usize = 1024;

/// 16 byte client identifier, assigned at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ClientId(pub [u8; CLIENT_ID_SIZE]);

impl ClientId {
    /// The all-zero id carried by failure responses
    pub const ZERO: ClientId = ClientId([0u8; CLIENT_ID_SIZE]);

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; CLIENT_ID_SIZE] = bytes.try_into().ok()?;
        Some(ClientId(arr))
    }

    pub fn as_bytes(&self) -> &[u8; CLIENT_ID_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; CLIENT_ID_SIZE]
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Request codes 1100-1106
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RequestCode {
    Register = 1100,
    PublicKey = 1101,
    Reconnect = 1102,
    FileSend = 1103,
    CrcGood = 1104,
    CrcWrongAgain = 1105,
    CrcWrongDone = 1106,
}

impl RequestCode {
    pub const ALL: [RequestCode; 7] = [
        RequestCode::Register,
        RequestCode::PublicKey,
        RequestCode::Reconnect,
        RequestCode::FileSend,
        RequestCode::CrcGood,
        RequestCode::CrcWrongAgain,
        RequestCode::CrcWrongDone,
    ];

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            RequestCode::Register => "REGISTER",
            RequestCode::PublicKey => "PUBLIC_KEY",
            RequestCode::Reconnect => "RECONNECT",
            RequestCode::FileSend => "FILE_SEND",
            RequestCode::CrcGood => "CRC_GOOD",
            RequestCode::CrcWrongAgain => "CRC_WRONG_AGAIN",
            RequestCode::CrcWrongDone => "CRC_WRONG_DONE",
        }
    }
}

impl TryFrom<u16> for RequestCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self> {
        RequestCode::ALL
            .into_iter()
            .find(|code| code.as_u16() == value)
            .ok_or(ProtocolError::UnknownRequestCode(value))
    }
}

/// Response codes 2100-2107
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseCode {
    RegisterSucceeded = 2100,
    RegisterFailed = 2101,
    PublicKeyReceived = 2102,
    FileReceivedCrc = 2103,
    MessageReceived = 2104,
    ReconnectAccepted = 2105,
    ReconnectFailed = 2106,
    GeneralError = 2107,
}

impl ResponseCode {
    pub const ALL: [ResponseCode; 8] = [
        ResponseCode::RegisterSucceeded,
        ResponseCode::RegisterFailed,
        ResponseCode::PublicKeyReceived,
        ResponseCode::FileReceivedCrc,
        ResponseCode::MessageReceived,
        ResponseCode::ReconnectAccepted,
        ResponseCode::ReconnectFailed,
        ResponseCode::GeneralError,
    ];

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for ResponseCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self> {
        ResponseCode::ALL
            .into_iter()
            .find(|code| code.as_u16() == value)
            .ok_or(ProtocolError::UnknownResponseCode(value))
    }
}

/// Header that prefixes every request.
///
/// `code` is kept raw: the dispatcher, not the codec, decides whether it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestHeader {
    pub client_id: ClientId,
    pub version: u16,
    pub code: u16,
    pub payload_size: u32,
}

impl RequestHeader {
    pub fn new(client_id: ClientId, code: RequestCode, payload_size: u32) -> Self {
        Self {
            client_id,
            version: PROTOCOL_VERSION,
            code: code.as_u16(),
            payload_size,
        }
    }

    /// Total frame length announced by this header
    pub fn frame_len(&self) -> usize {
        REQUEST_HEADER_SIZE + self.payload_size as usize
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_slice(self.client_id.as_bytes());
        dst.put_u16_le(self.version);
        dst.put_u16_le(self.code);
        dst.put_u32_le(self.payload_size);
    }

    /// Decode the first 24 bytes of `src`; anything shorter is `InvalidHeader`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < REQUEST_HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader);
        }
        let mut buf = &src[..REQUEST_HEADER_SIZE];
        let mut id = [0u8; CLIENT_ID_SIZE];
        buf.copy_to_slice(&mut id);
        Ok(Self {
            client_id: ClientId(id),
            version: buf.get_u16_le(),
            code: buf.get_u16_le(),
            payload_size: buf.get_u32_le(),
        })
    }
}

/// Header that prefixes every response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u16,
    pub code: u16,
    pub payload_size: u32,
}

impl ResponseHeader {
    pub fn new(code: ResponseCode, payload_size: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            code: code.as_u16(),
            payload_size,
        }
    }

    pub fn frame_len(&self) -> usize {
        RESPONSE_HEADER_SIZE + self.payload_size as usize
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u16_le(self.version);
        dst.put_u16_le(self.code);
        dst.put_u32_le(self.payload_size);
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < RESPONSE_HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader);
        }
        let mut buf = &src[..RESPONSE_HEADER_SIZE];
        Ok(Self {
            version: buf.get_u16_le(),
            code: buf.get_u16_le(),
            payload_size: buf.get_u32_le(),
        })
    }
}

/// Write `value` into a NUL-padded field of `width` bytes.
///
/// Values longer than the field are cut at a char boundary so the field stays valid UTF-8.
pub fn put_fixed_str<B: BufMut>(dst: &mut B, value: &str, width: usize) {
    let mut end = value.len().min(width);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    dst.put_slice(&value.as_bytes()[..end]);
    dst.put_bytes(0, width - end);
}

/// Read a NUL-padded string field: everything before the first NUL, as UTF-8.
pub fn read_fixed_str(field: &[u8]) -> Result<String> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec())
        .map_err(|_| ProtocolError::MalformedPayload("string field is not valid UTF-8"))
}
