// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Codec
//!
//! Conversions of tracing contexts and envelope headers to and from bytes.
//!
//! The [`ContextCodec`] registered with the actor system decides how a [`TracingContext`] is
//! represented, in binary form for the wire and in textual form for logs. Each codec has a kind
//! tag; the tag is written ahead of the context bytes so that a peer using another codec keeps
//! the context opaque instead of misreading it.
//!
//! Binary layout of a header (all integers big-endian):
//!
//! ```text
//! [sender: u32 len + UTF-8][recipient: u32 len + UTF-8][has-context: u8]
//! [context, if present: kind u8, u32 len, bytes]
//! ```
//!
//! An encoded envelope is a header immediately followed by the payload bytes.
//!

use crate::{
    ActorPath, Error,
    context::{AttachedContext, TracingContext},
    envelope::{Envelope, Header, SendKind},
};

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Kind tag of [`TextContextCodec`].
pub const TEXT_CONTEXT_KIND: u8 = 1;

/// Encoder and decoder of tracing contexts. One instance is registered per actor system.
pub trait ContextCodec: Send + Sync + 'static {
    /// Tag identifying the representation produced by this codec.
    fn kind(&self) -> u8;

    /// Appends the binary form of `context` to `dst`. Never fails.
    fn encode_binary(&self, context: &TracingContext, dst: &mut BytesMut);

    /// Parses a context from exactly the bytes produced by `encode_binary`.
    fn decode_binary(&self, src: &[u8]) -> Result<TracingContext, Error>;

    /// Textual form, used for debug output only.
    fn encode_text(&self, context: &TracingContext) -> String;

    fn decode_text(&self, src: &str) -> Result<TracingContext, Error>;
}

/// Default codec: length-prefixed UTF-8 on the wire, a JSON string in text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextContextCodec;

impl ContextCodec for TextContextCodec {
    fn kind(&self) -> u8 {
        TEXT_CONTEXT_KIND
    }

    fn encode_binary(&self, context: &TracingContext, dst: &mut BytesMut) {
        put_bytes(dst, context.as_str().as_bytes());
    }

    fn decode_binary(&self, src: &[u8]) -> Result<TracingContext, Error> {
        let mut src = src;
        let value = take_string(&mut src)?;
        if src.has_remaining() {
            return Err(Error::Serialization(format!(
                "{} trailing bytes after tracing context",
                src.remaining()
            )));
        }
        Ok(TracingContext::from(value))
    }

    fn encode_text(&self, context: &TracingContext) -> String {
        serde_json::Value::String(context.as_str().to_owned()).to_string()
    }

    fn decode_text(&self, src: &str) -> Result<TracingContext, Error> {
        serde_json::from_str::<String>(src)
            .map(TracingContext::from)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Writes `bytes` with a `u32` length prefix.
pub fn put_bytes(dst: &mut BytesMut, bytes: &[u8]) {
    dst.put_u32(bytes.len() as u32);
    dst.put_slice(bytes);
}

fn truncated(what: &str, needed: usize, available: usize) -> Error {
    Error::Serialization(format!(
        "truncated input reading {}: need {} bytes, {} available",
        what, needed, available
    ))
}

pub fn take_u8(src: &mut impl Buf) -> Result<u8, Error> {
    if src.remaining() < 1 {
        return Err(truncated("u8", 1, src.remaining()));
    }
    Ok(src.get_u8())
}

pub fn take_u32(src: &mut impl Buf) -> Result<u32, Error> {
    if src.remaining() < 4 {
        return Err(truncated("u32", 4, src.remaining()));
    }
    Ok(src.get_u32())
}

pub fn take_u64(src: &mut impl Buf) -> Result<u64, Error> {
    if src.remaining() < 8 {
        return Err(truncated("u64", 8, src.remaining()));
    }
    Ok(src.get_u64())
}

/// Reads a `u32` length-prefixed byte block.
pub fn take_bytes(src: &mut impl Buf) -> Result<Bytes, Error> {
    let len = take_u32(src)? as usize;
    if src.remaining() < len {
        return Err(truncated("byte block", len, src.remaining()));
    }
    Ok(src.copy_to_bytes(len))
}

pub fn take_string(src: &mut impl Buf) -> Result<String, Error> {
    let bytes = take_bytes(src)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::Serialization(format!("invalid UTF-8: {}", e)))
}

/// Writes the kind tag and the length-prefixed context bytes.
pub fn encode_context(
    codec: &dyn ContextCodec,
    context: &AttachedContext,
    dst: &mut BytesMut,
) {
    match context {
        AttachedContext::Trace(context) => {
            let mut body = BytesMut::new();
            codec.encode_binary(context, &mut body);
            dst.put_u8(codec.kind());
            put_bytes(dst, &body);
        }
        AttachedContext::Foreign { kind, bytes } => {
            dst.put_u8(*kind);
            put_bytes(dst, bytes);
        }
    }
}

/// Reads a context written by [`encode_context`]. Contexts of another kind stay opaque.
pub fn decode_context(
    codec: &dyn ContextCodec,
    src: &mut impl Buf,
) -> Result<AttachedContext, Error> {
    let kind = take_u8(src)?;
    let bytes = take_bytes(src)?;
    if kind == codec.kind() {
        Ok(AttachedContext::Trace(codec.decode_binary(&bytes)?))
    } else {
        Ok(AttachedContext::Foreign {
            kind,
            bytes: bytes.to_vec(),
        })
    }
}

pub fn encode_header(codec: &dyn ContextCodec, header: &Header, dst: &mut BytesMut) {
    put_bytes(dst, header.sender().to_string().as_bytes());
    put_bytes(dst, header.recipient().to_string().as_bytes());
    match header.context() {
        None => dst.put_u8(0),
        Some(context) => {
            dst.put_u8(1);
            encode_context(codec, context, dst);
        }
    }
}

/// Reads a header. The send kind does not travel: decoded headers are immediate.
pub fn decode_header(
    codec: &dyn ContextCodec,
    src: &mut impl Buf,
) -> Result<Header, Error> {
    let sender = ActorPath::from(take_string(src)?);
    let recipient = ActorPath::from(take_string(src)?);
    let mut header = Header::new(sender, recipient);
    match take_u8(src)? {
        0 => {}
        1 => header.attach_raw(decode_context(codec, src)?),
        flag => {
            return Err(Error::Serialization(format!(
                "invalid context flag {}",
                flag
            )));
        }
    }
    Ok(header)
}

/// Writes a header followed by the payload bytes.
pub fn encode_envelope(
    codec: &dyn ContextCodec,
    envelope: &Envelope<impl AsRef<[u8]>>,
    dst: &mut BytesMut,
) {
    encode_header(codec, envelope.header(), dst);
    dst.put_slice(envelope.payload().as_ref());
}

/// Reads a header; whatever follows it is the payload.
pub fn decode_envelope(
    codec: &dyn ContextCodec,
    mut src: Bytes,
) -> Result<Envelope<Bytes>, Error> {
    let header = decode_header(codec, &mut src)?;
    Ok(Envelope::from_parts(header, src))
}

/// Textual form of a header, for debug logs.
pub fn header_to_text(codec: &dyn ContextCodec, header: &Header) -> String {
    let context = match header.context() {
        None => serde_json::Value::Null,
        Some(AttachedContext::Trace(context)) => {
            serde_json::Value::String(codec.encode_text(context))
        }
        Some(AttachedContext::Foreign { kind, bytes }) => serde_json::json!({
            "kind": kind,
            "len": bytes.len(),
        }),
    };
    let kind = match header.kind() {
        SendKind::Immediate => "immediate",
        SendKind::Scheduled { .. } => "scheduled",
    };
    serde_json::json!({
        "sender": header.sender().to_string(),
        "recipient": header.recipient().to_string(),
        "kind": kind,
        "context": context,
    })
    .to_string()
}
