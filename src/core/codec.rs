//! Tokio codecs for framing the protocol over TCP byte streams.
//!
//! The two directions are framed differently:
//! - requests are read by **logical byte count**: 24 header bytes, then exactly
//!   `payloadSize` more bytes, regardless of how the peer chunks its writes;
//! - responses are written as **zero-padded fixed blocks** of [`BLOCK_SIZE`] bytes.
//!
//! Only the last block of a response can be short, so padding always trails the
//! logical message and a reader that honours `payloadSize` can strip it.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::frame::{
    RequestHeader, ResponseHeader, BLOCK_SIZE, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
use crate::core::message::{Request, Response};
use crate::error::{ProtocolError, Result};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// A request frame split into its header and raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub header: RequestHeader,
    pub payload: BytesMut,
}

impl RequestFrame {
    /// Decode the payload into a typed request.
    pub fn into_request(self) -> Result<Request> {
        Request::from_parts(self.header, &self.payload)
    }
}

/// Server side codec: decodes requests, encodes padded responses.
#[derive(Debug, Clone, Copy)]
pub struct ServerCodec {
    max_payload_size: usize,
    header: Option<RequestHeader>,
}

impl ServerCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            max_payload_size,
            header: None,
        }
    }

    /// Header of the most recent frame whose header decoded, complete or not.
    ///
    /// Still set after a `Truncated` or `OversizedPacket` error, so the caller can
    /// attribute the failed attempt to a client.
    pub fn last_header(&self) -> Option<RequestHeader> {
        self.header
    }
}

impl Default for ServerCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Decoder for ServerCodec {
    type Item = RequestFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RequestFrame>> {
        if src.len() < REQUEST_HEADER_SIZE {
            src.reserve(REQUEST_HEADER_SIZE - src.len());
            return Ok(None);
        }

        let header = RequestHeader::decode(&src[..])?;
        self.header = Some(header);
        let payload_len = header.payload_size as usize;
        if payload_len > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(payload_len));
        }

        let total = header.frame_len();
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total);
        let payload = frame.split_off(REQUEST_HEADER_SIZE);
        Ok(Some(RequestFrame { header, payload }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RequestFrame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let expected = RequestHeader::decode(&src[..])
                    .map(|h| h.frame_len())
                    .unwrap_or(REQUEST_HEADER_SIZE);
                Err(ProtocolError::Truncated {
                    expected,
                    actual: src.len(),
                })
            }
        }
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<()> {
        write_padded_blocks(&item.encode(), dst);
        Ok(())
    }
}

/// Client side codec: encodes requests unpadded, decodes padded responses.
#[derive(Debug, Clone, Copy)]
pub struct ClientCodec {
    max_payload_size: usize,
}

impl ClientCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Encoder<Request> for ClientCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&item.encode());
        Ok(())
    }
}

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>> {
        if src.len() < RESPONSE_HEADER_SIZE {
            return Ok(None);
        }
        let header = ResponseHeader::decode(&src[..])?;
        if header.payload_size as usize > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(header.payload_size as usize));
        }

        let padded = padded_len(header.frame_len());
        if src.len() < padded {
            src.reserve(padded - src.len());
            return Ok(None);
        }
        let frame = src.split_to(padded);
        Response::decode(&frame).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Response>> {
        if let Some(response) = self.decode(src)? {
            return Ok(Some(response));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // The peer closed before filling the last block: accept the logical frame if complete.
        let response = Response::decode(&src[..])?;
        src.clear();
        Ok(Some(response))
    }
}

/// Length of `len` bytes once padded to whole blocks.
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE).max(1) * BLOCK_SIZE
}

/// Append `data` to `dst` in [`BLOCK_SIZE`] blocks, zero-filling the final block.
pub fn write_padded_blocks(data: &[u8], dst: &mut BytesMut) {
    dst.reserve(padded_len(data.len()));
    for block in data.chunks(BLOCK_SIZE) {
        dst.put_slice(block);
        dst.put_bytes(0, BLOCK_SIZE - block.len());
    }
}
