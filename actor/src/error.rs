// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! A single error type is shared by the local runtime and the remote registry, so a failure
//! raised on a network connection can travel through the same `Result` that a local send
//! returns. Instrumentation conditions (`MissingContext`, `ContextTypeMismatch`) are never
//! returned to callers; the hooks log them and processing goes on with an empty context.
//!

use crate::ActorPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor system.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// An error occurred while sending a message to an actor.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// An error occurred while creating an actor.
    #[error("An error occurred while creating an actor: {0}.")]
    Create(String),
    /// The actor already exists.
    #[error("Actor {0} exist.")]
    Exists(ActorPath),
    /// An error occurred while stopping an actor.
    #[error("An error occurred while stopping an actor.")]
    Stop,
    /// An error occurred while starting an actor.
    #[error("An error occurred while starting the actor: {0}.")]
    Start(String),
    /// The envelope being processed carries no tracing context.
    #[error("Envelope from {0} carries no tracing context.")]
    MissingContext(ActorPath),
    /// The attached tracing context is not of the kind the registered codec produces.
    #[error("Tracing context of kind {found} does not match expected kind {expected}.")]
    ContextTypeMismatch {
        /// Kind tag of the registered codec.
        expected: u8,
        /// Kind tag found on the envelope.
        found: u8,
    },
    /// Encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A network endpoint could not be published.
    #[error("Can't publish actor on {0}")]
    Publish(String),
    /// A remote endpoint could not be reached.
    #[error("Can't connect to {0}")]
    Connect(String),
    /// Unexpected content on the wire.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// No reply arrived within the requested bound.
    #[error("No reply after {0} ms.")]
    Timeout(u64),
    /// The connection or mailbox was closed before completion.
    #[error("Channel closed: {0}")]
    Closed(String),
    /// Socket level failure.
    #[error("I/O error: {0}")]
    Io(String),
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error.to_string())
    }
}

impl Error {
    /// True for the conditions the instrumentation recovers from locally.
    pub fn is_instrumentation(&self) -> bool {
        matches!(
            self,
            Error::MissingContext(_) | Error::ContextTypeMismatch { .. }
        )
    }
}
