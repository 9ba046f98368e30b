// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Remote actors
//!
//! Extends tracing context propagation across process boundaries. A [`RemoteRegistry`] can
//! publish a local actor on a TCP endpoint, and connect to an endpoint published elsewhere,
//! yielding a [`RemoteHandle`] that sends to the remote actor exactly like a local `ActorRef`.
//!
//! Envelopes cross the network as length-prefixed [`Frame`]s. The tracing context travels in the
//! frame header, encoded by the [`ContextCodec`](actor::ContextCodec) registered with the
//! sending actor system, and is installed on the receiving side by the usual
//! `before_processing` hook. Replies to requests travel back the same way, so a requester
//! resumes with the context the remote actor attached to its reply.
//!
//! ```ignore
//! let registry = RemoteRegistry::new(system_a);
//! registry.publish(&actor1, "0.0.0.0", 1337).await?;
//!
//! let remote = RemoteRegistry::new(system_b);
//! let actor1: RemoteHandle<Actor1> = remote.connect("127.0.0.1", 1337).await?;
//! ```
//!

mod config;
mod connector;
pub mod frame;
mod publisher;
mod registry;

use serde::{Serialize, de::DeserializeOwned};

pub use config::RemoteConfig;

pub use connector::RemoteHandle;

pub use frame::{Frame, FrameCodec, Opcode};

pub use publisher::PublishedEndpoint;

pub use registry::RemoteRegistry;

/// Types that can cross the network as message or response payloads.
pub trait Wire: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Wire for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}
