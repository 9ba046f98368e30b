// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Instrumentation hooks
//!
//! The runtime calls an [`Instrumentation`] implementation at fixed points of every actor's life:
//!
//! - `on_actor_created` / `on_actor_destroyed` around the actor's registration in the system.
//! - `before_processing` when a message is popped from the mailbox, before the behavior runs, and
//!   when a reply resumes a requester. It moves the frame into the processing state and installs
//!   the envelope's context as the active context.
//! - `after_processing` once the behavior returned. It moves the frame back to idle and releases
//!   the active context.
//! - `before_sending` / `before_sending_scheduled` on every outgoing envelope. They attach a copy
//!   of the sender's active context.
//!
//! One implementation is registered per actor system. Every method has a default that performs
//! context propagation, so [`ContextPropagation`] is simply the trait with nothing overridden,
//! and an implementation that only wants lifecycle notifications keeps propagation for free.
//! Overriding implementations can reuse [`install`], [`release`] and [`stamp`].
//!
//! The hooks never see the payload and never decide whether a send or a processing step happens.
//! Conditions such as a missing context are logged and processing continues.
//!

use crate::{
    ActorPath, Error,
    context::ExecutionFrame,
    envelope::Header,
};

use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of one processing invocation, as seen by `after_processing`.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// The behavior returned a response.
    Completed,
    /// The behavior returned an error.
    Failed(&'a Error),
}

/// Capability set invoked by the runtime around message processing and sending.
pub trait Instrumentation: Send + Sync + 'static {
    /// An actor was registered in the system.
    fn on_actor_created(&self, actor: &ActorPath, parent: Option<&ActorPath>) {
        debug!(actor = %actor, parent = ?parent, "Actor created.");
    }

    /// An actor terminated and left the system.
    fn on_actor_destroyed(&self, actor: &ActorPath) {
        debug!(actor = %actor, "Actor destroyed.");
    }

    /// Idle -> Processing. Installs the context carried by `header`.
    fn before_processing(&self, frame: &mut ExecutionFrame, header: &Header) {
        install(frame, header);
    }

    /// Processing -> Idle. Releases the active context.
    fn after_processing(&self, frame: &mut ExecutionFrame, outcome: Outcome<'_>) {
        release(frame, outcome);
    }

    /// Attaches the active context to an immediate send.
    fn before_sending(&self, frame: &ExecutionFrame, header: &mut Header) {
        stamp(frame, header);
    }

    /// Attaches the active context to a send delivered at `deadline`.
    fn before_sending_scheduled(
        &self,
        frame: &ExecutionFrame,
        deadline: Instant,
        header: &mut Header,
    ) {
        debug!(
            actor = %frame.actor(),
            delay_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
            "Stamping scheduled send."
        );
        stamp(frame, header);
    }
}

/// Propagates the active context from processed messages to sent messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextPropagation;

impl Instrumentation for ContextPropagation {}

/// Enters `frame` and installs the context of `header`, logging a missing or foreign context.
pub fn install(frame: &mut ExecutionFrame, header: &Header) {
    match frame.enter(header) {
        Ok(()) => {
            debug!(
                actor = %frame.actor(),
                context = %frame.active(),
                "Installed tracing context."
            );
        }
        Err(error) => {
            warn!(actor = %frame.actor(), "{}", error);
        }
    }
}

/// Leaves `frame`, releasing its active context.
pub fn release(frame: &mut ExecutionFrame, outcome: Outcome<'_>) {
    if let Outcome::Failed(error) = outcome {
        debug!(actor = %frame.actor(), "Processing failed: {}", error);
    }
    frame.leave();
}

/// Attaches a copy of the frame's active context. The frame is left untouched.
pub fn stamp(frame: &ExecutionFrame, header: &mut Header) {
    header.attach(frame.active().clone());
}
