// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Actor runtime with tracing context propagation.
//! Every message an actor sends while processing another one carries the context that message
//! arrived with, inside one process through the `actor` crate and across processes through the
//! `remote` crate.

pub use actor::{
    Actor, ActorContext, ActorPath, ActorRef, ActorSystem, AttachedContext,
    ContextCodec, ContextPropagation, Envelope, Error, Handler, Header,
    Instrumentation, Message, Recipient, RequestTimeout, Response,
    RuntimeConfig, SystemBuilder, SystemEvent, SystemRef, SystemRunner,
    TextContextCodec, TracingContext,
};

pub use remote::{PublishedEndpoint, RemoteConfig, RemoteHandle, RemoteRegistry};
