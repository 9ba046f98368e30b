// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Tracing context
//!
//! The `context` module holds the value that travels with every envelope and the per-invocation
//! frame that makes it "active" while an actor processes a message.
//!
//! A [`TracingContext`] is an opaque, immutable text blob. Envelopes do not carry it bare: they
//! carry an [`AttachedContext`], a tagged value that is either a context the registered codec
//! understands (`Trace`) or the raw bytes of a context some other codec produced (`Foreign`).
//! The hooks match on that tag instead of attempting a downcast, so "the attached context is not
//! the kind I expect" is an ordinary match arm.
//!
//! The active context is not global state. Each actor owns an [`ExecutionFrame`] inside its
//! `ActorContext`; the runner hands that frame to the hooks before and after the behavior runs,
//! and the behavior reads or replaces the active context through it. Two actors running on two
//! workers therefore never share a binding.
//!

use crate::{ActorPath, Error, envelope::Header};

use serde::{Deserialize, Serialize};

use std::fmt::{Display, Formatter};

/// Opaque correlation metadata propagated from a processed message to every message sent
/// while processing it.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TracingContext(String);

impl TracingContext {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the default context an actor starts with.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for TracingContext {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TracingContext {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for TracingContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Context value attached to an envelope, tagged with its kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachedContext {
    /// A context of the kind produced by the registered codec.
    Trace(TracingContext),
    /// A context of another kind, kept as received so it can be forwarded unchanged.
    Foreign {
        /// Kind tag read from the wire.
        kind: u8,
        /// Encoded context, as produced by the foreign codec.
        bytes: Vec<u8>,
    },
}

impl AttachedContext {
    /// The tracing context, if this is the expected kind.
    pub fn trace(&self) -> Option<&TracingContext> {
        match self {
            AttachedContext::Trace(context) => Some(context),
            AttachedContext::Foreign { .. } => None,
        }
    }
}

impl From<TracingContext> for AttachedContext {
    fn from(context: TracingContext) -> Self {
        AttachedContext::Trace(context)
    }
}

/// Processing state of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// No message is being processed.
    Idle,
    /// Between `before_processing` and `after_processing`.
    Processing,
}

/// Execution frame of one actor: its identity and its active tracing context.
#[derive(Debug, Clone)]
pub struct ExecutionFrame {
    actor: ActorPath,
    active: TracingContext,
    state: FrameState,
    expected_kind: u8,
}

impl ExecutionFrame {
    /// Creates an idle frame with an empty active context.
    ///
    /// `expected_kind` is the kind tag of the registered codec; attached contexts of any other
    /// kind are rejected by [`ExecutionFrame::enter`].
    pub fn new(actor: ActorPath, expected_kind: u8) -> Self {
        Self {
            actor,
            active: TracingContext::default(),
            state: FrameState::Idle,
            expected_kind,
        }
    }

    pub fn actor(&self) -> &ActorPath {
        &self.actor
    }

    /// The active tracing context.
    pub fn active(&self) -> &TracingContext {
        &self.active
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_processing(&self) -> bool {
        self.state == FrameState::Processing
    }

    /// Replaces the active context. Subsequent sends carry the new value.
    pub fn set_active(&mut self, context: TracingContext) {
        self.active = context;
    }

    /// Enters the processing state and installs the context carried by `header`.
    ///
    /// When the header carries no context, or a context of an unexpected kind, the frame is still
    /// entered, the active context is reset to its default and the condition is returned so the
    /// caller can report it.
    pub fn enter(&mut self, header: &Header) -> Result<(), Error> {
        self.state = FrameState::Processing;
        match header.context() {
            Some(AttachedContext::Trace(context)) => {
                self.active = context.clone();
                Ok(())
            }
            Some(AttachedContext::Foreign { kind, .. }) => {
                self.active = TracingContext::default();
                Err(Error::ContextTypeMismatch {
                    expected: self.expected_kind,
                    found: *kind,
                })
            }
            None => {
                self.active = TracingContext::default();
                Err(Error::MissingContext(header.sender().clone()))
            }
        }
    }

    /// Leaves the processing state and releases the active context.
    pub fn leave(&mut self) {
        self.state = FrameState::Idle;
        self.active = TracingContext::default();
    }
}
