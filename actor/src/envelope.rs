// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Envelope
//!
//! An [`Envelope`] is a payload plus a [`Header`]: sender and recipient identity, the attached
//! tracing context and the send kind. Instrumentation hooks only ever see the header, so they
//! can stamp or read the context but cannot touch the payload.
//!

use crate::{
    ActorPath,
    context::{AttachedContext, TracingContext},
};

use tokio::time::Instant;

/// How an envelope was sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendKind {
    /// Delivered as soon as it is sent.
    Immediate,
    /// Delivered once the deadline is reached.
    Scheduled {
        /// Instant at which the envelope is delivered.
        deadline: Instant,
    },
}

/// Envelope metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    sender: ActorPath,
    recipient: ActorPath,
    context: Option<AttachedContext>,
    kind: SendKind,
}

impl Header {
    /// Immediate header without context.
    pub fn new(sender: ActorPath, recipient: ActorPath) -> Self {
        Self {
            sender,
            recipient,
            context: None,
            kind: SendKind::Immediate,
        }
    }

    pub fn sender(&self) -> &ActorPath {
        &self.sender
    }

    pub fn recipient(&self) -> &ActorPath {
        &self.recipient
    }

    pub fn context(&self) -> Option<&AttachedContext> {
        self.context.as_ref()
    }

    /// The attached tracing context, if present and of the expected kind.
    pub fn tracing_context(&self) -> Option<&TracingContext> {
        self.context.as_ref().and_then(AttachedContext::trace)
    }

    pub fn kind(&self) -> SendKind {
        self.kind
    }

    /// Attaches a copy of `context`, replacing any previous one.
    pub fn attach(&mut self, context: TracingContext) {
        self.context = Some(AttachedContext::Trace(context));
    }

    pub fn attach_raw(&mut self, context: AttachedContext) {
        self.context = Some(context);
    }

    pub fn detach(&mut self) -> Option<AttachedContext> {
        self.context.take()
    }

    /// Marks the envelope as scheduled for `deadline`.
    pub fn schedule(&mut self, deadline: Instant) {
        self.kind = SendKind::Scheduled { deadline };
    }

    /// Header of a reply to this envelope: sender and recipient swapped, no context.
    pub fn reply(&self) -> Header {
        Header::new(self.recipient.clone(), self.sender.clone())
    }
}

/// A payload together with its header.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope<M> {
    header: Header,
    payload: M,
}

impl<M> Envelope<M> {
    pub fn new(sender: ActorPath, recipient: ActorPath, payload: M) -> Self {
        Self {
            header: Header::new(sender, recipient),
            payload,
        }
    }

    pub fn from_parts(header: Header, payload: M) -> Self {
        Self { header, payload }
    }

    /// Builder-style attachment of a tracing context.
    pub fn with_context(mut self, context: impl Into<TracingContext>) -> Self {
        self.header.attach(context.into());
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn payload(&self) -> &M {
        &self.payload
    }

    pub fn tracing_context(&self) -> Option<&TracingContext> {
        self.header.tracing_context()
    }

    pub fn into_parts(self) -> (Header, M) {
        (self.header, self.payload)
    }

    pub fn into_payload(self) -> M {
        self.payload
    }

    /// Transforms the payload keeping the header.
    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> Envelope<N> {
        Envelope {
            header: self.header,
            payload: f(self.payload),
        }
    }
}
