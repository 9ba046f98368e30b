// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Wire frames
//!
//! Every unit on a connection is a length-prefixed frame (integers big-endian):
//!
//! ```text
//! [length u32][opcode u8][header][payload]
//! ```
//!
//! `length` counts the bytes after itself, and the header is the envelope header written by
//! [`actor::codec::encode_header`]. Payloads depend on the opcode:
//!
//! | opcode          | payload                                   |
//! |-----------------|-------------------------------------------|
//! | `0x00 Hello`    | magic `CTRL` + protocol version           |
//! | `0x01 Message`  | bincode message                           |
//! | `0x02 Request`  | request id u64 + bincode message          |
//! | `0x03 Response` | request id u64 + bincode response         |
//! | `0x04 Failure`  | request id u64 + bincode `Error`          |
//!

use actor::{
    ActorPath, ContextCodec, Error, Header,
    codec::{decode_header, encode_header, take_u8, take_u64},
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::codec::{Decoder, Encoder};

use std::sync::Arc;

/// Handshake magic.
pub const MAGIC: &[u8; 4] = b"CTRL";

/// Version sent in the handshake. Peers with another version are rejected.
pub const PROTOCOL_VERSION: u8 = 1;

const LENGTH_PREFIX: usize = 4;

/// Frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Hello = 0x00,
    Message = 0x01,
    Request = 0x02,
    Response = 0x03,
    Failure = 0x04,
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Opcode::Hello),
            0x01 => Ok(Opcode::Message),
            0x02 => Ok(Opcode::Request),
            0x03 => Ok(Opcode::Response),
            0x04 => Ok(Opcode::Failure),
            other => Err(Error::Protocol(format!("unknown opcode {:#04x}", other))),
        }
    }
}

/// One decoded frame. The payload is kept as raw bytes until the receiver knows its type.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub opcode: Opcode,
    pub header: Header,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, header: Header, payload: Bytes) -> Self {
        Self {
            opcode,
            header,
            payload,
        }
    }

    /// Handshake frame.
    pub fn hello(sender: ActorPath, recipient: ActorPath) -> Self {
        let mut payload = BytesMut::with_capacity(MAGIC.len() + 1);
        payload.put_slice(MAGIC);
        payload.put_u8(PROTOCOL_VERSION);
        Self::new(Opcode::Hello, Header::new(sender, recipient), payload.freeze())
    }

    /// Checks that this is a handshake of the same protocol version.
    pub fn check_hello(&self) -> Result<(), Error> {
        if self.opcode != Opcode::Hello {
            return Err(Error::Protocol(format!(
                "expected hello, got {:?}",
                self.opcode
            )));
        }
        let payload = self.payload.as_ref();
        if payload.len() != MAGIC.len() + 1 || &payload[..MAGIC.len()] != MAGIC {
            return Err(Error::Protocol("bad handshake magic".to_owned()));
        }
        let version = payload[MAGIC.len()];
        if version != PROTOCOL_VERSION {
            return Err(Error::Protocol(format!(
                "protocol version {} not supported, expected {}",
                version, PROTOCOL_VERSION
            )));
        }
        Ok(())
    }

    /// Frame whose payload is a request id followed by `body`.
    pub fn correlated(opcode: Opcode, header: Header, id: u64, body: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(8 + body.len());
        payload.put_u64(id);
        payload.put_slice(body);
        Self::new(opcode, header, payload.freeze())
    }

    /// Splits the request id off a `Request`, `Response` or `Failure` payload.
    pub fn split_id(&self) -> Result<(u64, Bytes), Error> {
        let mut payload = self.payload.clone();
        let id = take_u64(&mut payload)?;
        Ok((id, payload))
    }
}

/// Serializes a message or response with bincode.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Bytes, Error> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|e| Error::Serialization(e.to_string()))
}

pub fn from_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encoder and decoder of [`Frame`]s over a byte stream.
pub struct FrameCodec {
    codec: Arc<dyn ContextCodec>,
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(codec: Arc<dyn ContextCodec>, max_frame_size: usize) -> Self {
        Self {
            codec,
            max_frame_size,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }
        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_frame_size {
            return Err(Error::Protocol(format!(
                "frame of {} bytes exceeds limit of {}",
                len, self.max_frame_size
            )));
        }
        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let mut body = src.split_to(len).freeze();
        let opcode = Opcode::try_from(take_u8(&mut body)?)?;
        let header = decode_header(self.codec.as_ref(), &mut body)?;
        Ok(Some(Frame::new(opcode, header, body)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(Error::Serialization(format!(
                "truncated frame: stream ended with {} bytes pending",
                src.len()
            ))),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
        let mut body = BytesMut::new();
        body.put_u8(frame.opcode as u8);
        encode_header(self.codec.as_ref(), &frame.header, &mut body);
        body.put_slice(&frame.payload);
        if body.len() > self.max_frame_size {
            return Err(Error::Protocol(format!(
                "frame of {} bytes exceeds limit of {}",
                body.len(),
                self.max_frame_size
            )));
        }
        dst.reserve(LENGTH_PREFIX + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
