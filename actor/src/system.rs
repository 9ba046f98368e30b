// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` type, responsible for creating and managing
//! actors. A system owns the process-wide collaborators every actor shares: the registered
//! [`Instrumentation`] and the registered [`ContextCodec`]. Both are chosen once, when the
//! system is built, and never change afterwards.
//!

use crate::{
    Actor, ActorPath, ActorRef, Error, Handler,
    codec::{ContextCodec, TextContextCodec},
    config::RuntimeConfig,
    instrumentation::{ContextPropagation, Instrumentation},
    runner::{ActorRunner, StopSender},
};

use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use tracing::{Instrument, debug, error};

use std::{any::Any, collections::HashMap, sync::Arc};

/// Actor system.
///
pub struct ActorSystem {}

impl ActorSystem {
    /// Create a new actor system with default instrumentation, codec and configuration.
    ///
    /// # Returns
    ///
    /// Returns a tuple with the system reference and the system runner.
    pub fn create(token: CancellationToken) -> (SystemRef, SystemRunner) {
        Self::builder().token(token).build()
    }

    /// Starts configuring an actor system.
    pub fn builder() -> SystemBuilder {
        SystemBuilder::default()
    }
}

/// Builder of an actor system.
pub struct SystemBuilder {
    token: CancellationToken,
    instrumentation: Arc<dyn Instrumentation>,
    codec: Arc<dyn ContextCodec>,
    config: RuntimeConfig,
}

impl Default for SystemBuilder {
    fn default() -> Self {
        Self {
            token: CancellationToken::new(),
            instrumentation: Arc::new(ContextPropagation),
            codec: Arc::new(TextContextCodec),
            config: RuntimeConfig::default(),
        }
    }
}

impl SystemBuilder {
    /// Token whose cancellation stops the system.
    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Hooks invoked for every actor of the system.
    pub fn instrumentation(mut self, hooks: impl Instrumentation) -> Self {
        self.instrumentation = Arc::new(hooks);
        self
    }

    /// Codec used to represent tracing contexts on the wire and in logs.
    pub fn codec(mut self, codec: impl ContextCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the system. Must be called within a tokio runtime.
    pub fn build(self) -> (SystemRef, SystemRunner) {
        let (event_sender, event_receiver) =
            mpsc::channel(self.config.system_event_buffer.max(1));
        let system = SystemRef::new(
            event_sender,
            self.token,
            self.instrumentation,
            self.codec,
            self.config,
        );
        let runner = SystemRunner::new(event_receiver);
        (system, runner)
    }
}

/// System event.
///
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Stop the actor system.
    StopSystem,
}

/// System reference.
///
#[derive(Clone)]
pub struct SystemRef {
    /// The actors running in this actor system.
    actors:
        Arc<RwLock<HashMap<ActorPath, Box<dyn Any + Send + Sync + 'static>>>>,

    /// The root actor sender.
    root_senders: Arc<RwLock<Vec<StopSender>>>,

    token: CancellationToken,

    instrumentation: Arc<dyn Instrumentation>,

    codec: Arc<dyn ContextCodec>,

    config: RuntimeConfig,
}

impl SystemRef {
    fn new(
        event_sender: mpsc::Sender<SystemEvent>,
        token: CancellationToken,
        instrumentation: Arc<dyn Instrumentation>,
        codec: Arc<dyn ContextCodec>,
        config: RuntimeConfig,
    ) -> Self {
        let root_senders = Arc::new(RwLock::new(Vec::<StopSender>::new()));
        let root_sender_clone = root_senders.clone();
        let token_clone = token.clone();

        tokio::spawn(async move {
            token_clone.cancelled().await;
            debug!("Stopping actor system...");
            let mut root_senders = root_sender_clone.write().await;
            while let Some(sender) = root_senders.pop() {
                let (stop_sender, stop_receiver) = oneshot::channel();
                if sender.send(Some(stop_sender)).await.is_ok() {
                    let _ = stop_receiver.await;
                }
            }

            let _ = event_sender.send(SystemEvent::StopSystem).await;
        }.in_current_span());

        SystemRef {
            actors: Arc::new(RwLock::new(HashMap::new())),
            token,
            root_senders,
            instrumentation,
            codec,
            config,
        }
    }

    /// The registered instrumentation.
    pub fn instrumentation(&self) -> Arc<dyn Instrumentation> {
        self.instrumentation.clone()
    }

    /// The registered context codec.
    pub fn codec(&self) -> Arc<dyn ContextCodec> {
        self.codec.clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Retrieves an actor running in this actor system. If actor does not exist, a None
    /// is returned instead.
    ///
    /// # Arguments
    ///
    /// * `path` - The path of the actor to retrieve.
    ///
    /// # Returns
    ///
    /// Returns the actor reference.
    ///
    pub async fn get_actor<A>(&self, path: &ActorPath) -> Option<ActorRef<A>>
    where
        A: Actor + Handler<A>,
    {
        let actors = self.actors.read().await;
        actors
            .get(path)
            .and_then(|any| any.downcast_ref::<ActorRef<A>>().cloned())
    }

    /// Creates an actor in this actor system with the given path and actor type.
    /// If the actor already exists, an error is returned.
    pub(crate) async fn create_actor_path<A>(
        &self,
        path: ActorPath,
        actor: A,
        parent: Option<ActorPath>,
    ) -> Result<(ActorRef<A>, StopSender), Error>
    where
        A: Actor + Handler<A>,
    {
        let (mut runner, actor_ref, stop_sender) =
            ActorRunner::create(path.clone(), actor, self.config.stop_buffer);

        // Check and register under the same lock.
        {
            let mut actors = self.actors.write().await;
            if actors.contains_key(&path) {
                error!("Actor '{}' already exists!", &path);
                return Err(Error::Exists(path));
            }
            actors.insert(path.clone(), Box::new(actor_ref.clone()));
        }
        self.instrumentation.on_actor_created(&path, parent.as_ref());

        let system = self.clone();
        let (sender, receiver) = oneshot::channel::<bool>();
        let stop_sender_clone = stop_sender.clone();
        tokio::spawn(async move {
            runner.init(system, stop_sender_clone, Some(sender)).await;
        }.in_current_span());

        if receiver.await.map_err(|e| Error::Start(e.to_string()))? {
            Ok((actor_ref, stop_sender))
        } else {
            Err(Error::Start(format!("Runner can not init {}", path)))
        }
    }

    /// Launches a new top level actor on this actor system at the '/user'
    /// actor path. If another actor with the same name already exists,
    /// an `Err(Error::Exists(ActorPath))` is returned instead.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the actor to create.
    /// * `actor` - The type with `Actor` trait to create.
    ///
    /// # Returns
    ///
    /// Returns the actor reference.
    ///
    /// # Error
    ///
    /// Returns an error if the actor already exists or fails to start.
    ///
    pub async fn create_root_actor<A>(
        &self,
        name: &str,
        actor: A,
    ) -> Result<ActorRef<A>, Error>
    where
        A: Actor + Handler<A>,
    {
        let path = ActorPath::from("/user") / name;
        let (actor_ref, stop_sender) =
            self.create_actor_path::<A>(path, actor, None).await?;
        let mut senders = self.root_senders.write().await;
        senders.push(stop_sender);
        Ok(actor_ref)
    }

    /// Remove an actor from this actor system.
    /// If the actor does not exist, nothing happens.
    pub(crate) async fn remove_actor(&self, path: &ActorPath) {
        let mut actors = self.actors.write().await;
        actors.remove(path);
    }

    pub fn stop_system(&self) {
        self.token.cancel();
    }

    /// Get the actor's children.
    pub async fn children(&self, path: &ActorPath) -> Vec<ActorPath> {
        let actors = self.actors.read().await;
        actors
            .keys()
            .filter(|actor| actor.is_child_of(path))
            .cloned()
            .collect()
    }
}

/// System runner.
pub struct SystemRunner {
    /// The event receiver.
    event_receiver: mpsc::Receiver<SystemEvent>,
}

impl SystemRunner {
    /// Create a new system runner.
    pub(crate) fn new(event_receiver: mpsc::Receiver<SystemEvent>) -> Self {
        Self { event_receiver }
    }

    /// Run the actor system until it is stopped.
    pub async fn run(&mut self) {
        debug!("Running actor system...");
        if let Some(SystemEvent::StopSystem) = self.event_receiver.recv().await
        {
            debug!("Actor system stopped.");
        }
    }
}
