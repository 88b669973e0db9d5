//! Typed request and response messages and their exact byte layouts.
//!
//! ## Request payloads
//! ```text
//! REGISTER / RECONNECT      [Name(255) + NUL(1)]
//! PUBLIC_KEY                [Name(255)] [PublicKey(160)]
//! FILE_SEND                 [ContentSize(4)] [Filename(255) + pad(1)] [Ciphertext(..)]
//! CRC_GOOD / CRC_WRONG_*    [Filename(255) + NUL(1)]
//! ```
//!
//! ## Response payloads
//! ```text
//! REGISTER_SUCCEEDED, MESSAGE_RECEIVED, RECONNECT_FAILED    [ClientId(16)]
//! REGISTER_FAILED, GENERAL_ERROR                            [zero ClientId(16)]
//! PUBLIC_KEY_RECEIVED, RECONNECT_ACCEPTED                   [ClientId(16)] [WrappedKey(..)]
//! FILE_RECEIVED_CRC                                         [ClientId(16)] [ContentSize(4)] [Filename(256)] [Checksum(4)]
//! ```
//!
//! The trailing byte of the 256 byte name fields doubles as the struct
//! alignment byte of deployed C clients, which is why senders that announce
//! a 255 byte payload for those requests are accepted.
//!
//! Decoding never panics: every length is checked before it is sliced.

use crate::core::frame::{
    put_fixed_str, read_fixed_str, ClientId, RequestCode, RequestHeader, ResponseCode,
    ResponseHeader, CLIENT_ID_SIZE, NAME_FIELD_SIZE, NAME_SIZE, PROTOCOL_VERSION,
    PUBLIC_KEY_SIZE, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
use crate::error::{ProtocolError, Result};
use bytes::BufMut;

/// `[ContentSize(4)] [Filename(255)] [pad(1)]`
pub const FILE_SEND_PREFIX_SIZE: usize = 4 + NAME_SIZE + 1;
pub const PUBLIC_KEY_PAYLOAD_SIZE: usize = NAME_SIZE + PUBLIC_KEY_SIZE;
pub const FILE_RECEIVED_PAYLOAD_SIZE: usize = CLIENT_ID_SIZE + 4 + NAME_FIELD_SIZE + 4;

/// One request frame, decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub client_id: ClientId,
    pub version: u16,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Register {
        name: String,
    },
    PublicKey {
        name: String,
        /// DER bytes exactly as sent; the field is zero-filled to 160 bytes on the wire
        public_key: Vec<u8>,
    },
    Reconnect {
        name: String,
    },
    FileSend {
        content_size: u32,
        filename: String,
        ciphertext: Vec<u8>,
    },
    CrcGood {
        filename: String,
    },
    CrcWrongAgain {
        filename: String,
    },
    CrcWrongDone {
        filename: String,
    },
}

impl RequestBody {
    pub fn code(&self) -> RequestCode {
        match self {
            RequestBody::Register { .. } => RequestCode::Register,
            RequestBody::PublicKey { .. } => RequestCode::PublicKey,
            RequestBody::Reconnect { .. } => RequestCode::Reconnect,
            RequestBody::FileSend { .. } => RequestCode::FileSend,
            RequestBody::CrcGood { .. } => RequestCode::CrcGood,
            RequestBody::CrcWrongAgain { .. } => RequestCode::CrcWrongAgain,
            RequestBody::CrcWrongDone { .. } => RequestCode::CrcWrongDone,
        }
    }

    fn encode_payload(&self, dst: &mut Vec<u8>) {
        match self {
            RequestBody::Register { name } | RequestBody::Reconnect { name } => {
                put_fixed_str(dst, name, NAME_FIELD_SIZE);
            }
            RequestBody::PublicKey { name, public_key } => {
                put_fixed_str(dst, name, NAME_SIZE);
                let len = public_key.len().min(PUBLIC_KEY_SIZE);
                dst.put_slice(&public_key[..len]);
                dst.put_bytes(0, PUBLIC_KEY_SIZE - len);
            }
            RequestBody::FileSend {
                content_size,
                filename,
                ciphertext,
            } => {
                dst.put_u32_le(*content_size);
                put_fixed_str(dst, filename, NAME_SIZE);
                dst.put_u8(0);
                dst.put_slice(ciphertext);
            }
            RequestBody::CrcGood { filename }
            | RequestBody::CrcWrongAgain { filename }
            | RequestBody::CrcWrongDone { filename } => {
                put_fixed_str(dst, filename, NAME_FIELD_SIZE);
            }
        }
    }

    /// Parse the payload of a request whose code is already known.
    pub fn decode(code: RequestCode, payload: &[u8]) -> Result<Self> {
        let body = match code {
            RequestCode::Register => RequestBody::Register {
                name: name_field(payload)?,
            },
            RequestCode::Reconnect => RequestBody::Reconnect {
                name: name_field(payload)?,
            },
            RequestCode::PublicKey => {
                require(payload, PUBLIC_KEY_PAYLOAD_SIZE)?;
                RequestBody::PublicKey {
                    name: read_fixed_str(&payload[..NAME_SIZE])?,
                    public_key: payload[NAME_SIZE..PUBLIC_KEY_PAYLOAD_SIZE].to_vec(),
                }
            }
            RequestCode::FileSend => {
                require(payload, FILE_SEND_PREFIX_SIZE)?;
                let content_size = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                let filename = read_fixed_str(&payload[4..4 + NAME_SIZE])?;
                let ciphertext = &payload[FILE_SEND_PREFIX_SIZE..];
                if ciphertext.len() < content_size as usize {
                    return Err(ProtocolError::MalformedPayload(
                        "file content shorter than its declared size",
                    ));
                }
                RequestBody::FileSend {
                    content_size,
                    filename,
                    ciphertext: ciphertext.to_vec(),
                }
            }
            RequestCode::CrcGood => RequestBody::CrcGood {
                filename: name_field(payload)?,
            },
            RequestCode::CrcWrongAgain => RequestBody::CrcWrongAgain {
                filename: name_field(payload)?,
            },
            RequestCode::CrcWrongDone => RequestBody::CrcWrongDone {
                filename: name_field(payload)?,
            },
        };
        Ok(body)
    }
}

impl Request {
    pub fn new(client_id: ClientId, body: RequestBody) -> Self {
        Self {
            client_id,
            version: PROTOCOL_VERSION,
            body,
        }
    }

    pub fn code(&self) -> RequestCode {
        self.body.code()
    }

    /// Serialize header and payload; `payloadSize` is the exact payload length.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.body.encode_payload(&mut payload);

        let mut header = RequestHeader::new(self.client_id, self.code(), payload.len() as u32);
        header.version = self.version;

        let mut out = Vec::with_capacity(REQUEST_HEADER_SIZE + payload.len());
        header.encode(&mut out);
        out.extend_from_slice(&payload);
        out
    }

    /// Decode a whole frame (header followed by at least `payloadSize` bytes).
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let header = RequestHeader::decode(frame)?;
        let payload = frame_payload(frame, REQUEST_HEADER_SIZE, header.payload_size)?;
        Self::from_parts(header, payload)
    }

    /// Build a request from an already split header and payload.
    pub fn from_parts(header: RequestHeader, payload: &[u8]) -> Result<Self> {
        let code = RequestCode::try_from(header.code)?;
        Ok(Self {
            client_id: header.client_id,
            version: header.version,
            body: RequestBody::decode(code, payload)?,
        })
    }
}

/// One response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    RegisterSucceeded {
        client_id: ClientId,
    },
    RegisterFailed,
    PublicKeyReceived {
        client_id: ClientId,
        wrapped_key: Vec<u8>,
    },
    FileReceived {
        client_id: ClientId,
        content_size: u32,
        filename: String,
        checksum: u32,
    },
    MessageReceived {
        client_id: ClientId,
    },
    ReconnectAccepted {
        client_id: ClientId,
        wrapped_key: Vec<u8>,
    },
    ReconnectFailed {
        client_id: ClientId,
    },
    GeneralError,
}

impl Response {
    pub fn code(&self) -> ResponseCode {
        match self {
            Response::RegisterSucceeded { .. } => ResponseCode::RegisterSucceeded,
            Response::RegisterFailed => ResponseCode::RegisterFailed,
            Response::PublicKeyReceived { .. } => ResponseCode::PublicKeyReceived,
            Response::FileReceived { .. } => ResponseCode::FileReceivedCrc,
            Response::MessageReceived { .. } => ResponseCode::MessageReceived,
            Response::ReconnectAccepted { .. } => ResponseCode::ReconnectAccepted,
            Response::ReconnectFailed { .. } => ResponseCode::ReconnectFailed,
            Response::GeneralError => ResponseCode::GeneralError,
        }
    }

    /// Client id carried in the payload; zero for the failure responses
    pub fn client_id(&self) -> ClientId {
        match self {
            Response::RegisterSucceeded { client_id }
            | Response::PublicKeyReceived { client_id, .. }
            | Response::FileReceived { client_id, .. }
            | Response::MessageReceived { client_id }
            | Response::ReconnectAccepted { client_id, .. }
            | Response::ReconnectFailed { client_id } => *client_id,
            Response::RegisterFailed | Response::GeneralError => ClientId::ZERO,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(FILE_RECEIVED_PAYLOAD_SIZE);
        payload.put_slice(self.client_id().as_bytes());
        match self {
            Response::PublicKeyReceived { wrapped_key, .. }
            | Response::ReconnectAccepted { wrapped_key, .. } => payload.put_slice(wrapped_key),
            Response::FileReceived {
                content_size,
                filename,
                checksum,
                ..
            } => {
                payload.put_u32_le(*content_size);
                put_fixed_str(&mut payload, filename, NAME_SIZE);
                payload.put_u8(0);
                payload.put_u32_le(*checksum);
            }
            _ => {}
        }

        let header = ResponseHeader::new(self.code(), payload.len() as u32);
        let mut out = Vec::with_capacity(RESPONSE_HEADER_SIZE + payload.len());
        header.encode(&mut out);
        out.extend_from_slice(&payload);
        out
    }

    /// Decode a response frame. Bytes past `payloadSize` (block padding) are ignored.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let header = ResponseHeader::decode(frame)?;
        let code = ResponseCode::try_from(header.code)?;
        let payload = frame_payload(frame, RESPONSE_HEADER_SIZE, header.payload_size)?;
        require(payload, CLIENT_ID_SIZE)?;
        let client_id = ClientId::from_slice(&payload[..CLIENT_ID_SIZE])
            .ok_or(ProtocolError::InvalidHeader)?;
        let rest = &payload[CLIENT_ID_SIZE..];

        let response = match code {
            ResponseCode::RegisterSucceeded => Response::RegisterSucceeded { client_id },
            ResponseCode::RegisterFailed => Response::RegisterFailed,
            ResponseCode::PublicKeyReceived => Response::PublicKeyReceived {
                client_id,
                wrapped_key: rest.to_vec(),
            },
            ResponseCode::FileReceivedCrc => {
                require(payload, FILE_RECEIVED_PAYLOAD_SIZE)?;
                let content_size = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
                let filename = read_fixed_str(&rest[4..4 + NAME_FIELD_SIZE])?;
                let tail = &rest[4 + NAME_FIELD_SIZE..4 + NAME_FIELD_SIZE + 4];
                Response::FileReceived {
                    client_id,
                    content_size,
                    filename,
                    checksum: u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]),
                }
            }
            ResponseCode::MessageReceived => Response::MessageReceived { client_id },
            ResponseCode::ReconnectAccepted => Response::ReconnectAccepted {
                client_id,
                wrapped_key: rest.to_vec(),
            },
            ResponseCode::ReconnectFailed => Response::ReconnectFailed { client_id },
            ResponseCode::GeneralError => Response::GeneralError,
        };
        Ok(response)
    }
}

fn require(payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() < expected {
        return Err(ProtocolError::Truncated {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Name-style field: at least the 255 name bytes, at most the 256 byte field.
fn name_field(payload: &[u8]) -> Result<String> {
    require(payload, NAME_SIZE)?;
    read_fixed_str(&payload[..payload.len().min(NAME_FIELD_SIZE)])
}

fn frame_payload(frame: &[u8], header_size: usize, payload_size: u32) -> Result<&[u8]> {
    let expected = header_size + payload_size as usize;
    if frame.len() < expected {
        return Err(ProtocolError::Truncated {
            expected,
            actual: frame.len(),
        });
    }
    Ok(&frame[header_size..expected])
}
