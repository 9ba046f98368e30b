// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runtime with tracing context propagation
//!
//! An actor runtime in which every message carries a tracing context, and that context flows
//! automatically from each processed message to every message sent while processing it.
//!
//! ## Overview
//!
//! Actors communicate exclusively through envelopes: a typed payload plus a [`Header`] naming the
//! sender and the recipient and holding an optional attached context. Each actor owns a
//! [`Mailbox`]; any number of producers append to it through a [`LocalDispatcher`] and the
//! actor's runner processes the queue one envelope at a time.
//!
//! Around every processing step the runtime calls the [`Instrumentation`] registered with the
//! system:
//!
//! 1. `before_processing` installs the context carried by the envelope as the actor's active
//!    context.
//! 2. The behavior runs. Every `tell`, `ask` or `tell_after` made through its
//!    [`ActorContext`] goes through `before_sending`, which attaches a copy of the active
//!    context to the outgoing envelope.
//! 3. `after_processing` releases the active context.
//!
//! The active context lives in the actor's [`ExecutionFrame`], owned by its `ActorContext`. It is
//! never shared between actors, so actors running concurrently on different workers cannot see
//! each other's context.
//!
//! ## Propagation law
//!
//! If actor A processes an envelope carrying context `T` and, without replacing its active
//! context, sends envelope E, then E carries `T`. If A replaced its active context with `T2`
//! before sending, E carries `T2`. Scheduled sends carry the context active when they were
//! scheduled, not when they fire.
//!
//! ## Getting started
//!
//! ```ignore
//! use actor::{Actor, ActorContext, ActorPath, ActorSystem, Error, Handler};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Actor for Echo {
//!     type Message = String;
//!     type Response = String;
//! }
//!
//! #[async_trait]
//! impl Handler<Echo> for Echo {
//!     async fn handle_message(
//!         &mut self,
//!         _sender: ActorPath,
//!         msg: String,
//!         ctx: &mut ActorContext<Echo>,
//!     ) -> Result<String, Error> {
//!         Ok(format!("{} ({})", msg, ctx.tracing_context()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let (system, mut runner) = ActorSystem::create(CancellationToken::new());
//!     tokio::spawn(async move { runner.run().await });
//!
//!     let echo = system.create_root_actor("echo", Echo).await?;
//!     let reply = echo.ask("hello".to_owned()).await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Custom instrumentation
//!
//! Every [`Instrumentation`] method has a default that performs context propagation. An
//! implementation overrides only what it needs, for example lifecycle notifications, and
//! registers itself once with [`ActorSystem::builder`]. The [`ContextCodec`] used to write
//! contexts on the wire and in logs is registered the same way.
//!

mod actor;
pub mod codec;
mod config;
mod context;
mod dispatcher;
mod envelope;
mod error;
mod instrumentation;
mod path;
mod runner;
mod system;

//
// Core Actor System Types
//

pub use actor::Actor;

pub use actor::ActorContext;

pub use actor::ActorLifecycle;

pub use actor::ActorRef;

pub use actor::Handler;

pub use actor::Message;

pub use actor::Recipient;

pub use actor::Response;

//
// Tracing context
//

pub use context::AttachedContext;

pub use context::ExecutionFrame;

pub use context::FrameState;

pub use context::TracingContext;

pub use codec::ContextCodec;

pub use codec::TextContextCodec;

//
// Envelopes and delivery
//

pub use envelope::Envelope;

pub use envelope::Header;

pub use envelope::SendKind;

pub use dispatcher::LocalDispatcher;

pub use dispatcher::Mailbox;

pub use dispatcher::PendingReply;

pub use dispatcher::ReplySender;

pub use dispatcher::RequestTimeout;

pub use dispatcher::mailbox;

//
// Instrumentation
//

pub use instrumentation::ContextPropagation;

pub use instrumentation::Instrumentation;

pub use instrumentation::Outcome;

pub use instrumentation::install;

pub use instrumentation::release;

pub use instrumentation::stamp;

//
// Error Handling
//

pub use error::Error;

//
// Actor Addressing
//

pub use path::ActorPath;

//
// System Management
//

pub use config::RuntimeConfig;

pub use runner::StopSender;

pub use system::ActorSystem;

pub use system::SystemBuilder;

pub use system::SystemEvent;

pub use system::SystemRef;

pub use system::SystemRunner;
