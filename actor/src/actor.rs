// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` and `Handler` traits, the `ActorContext` handed to
//! every behavior call and the `ActorRef` used to reach an actor.
//!
//! The context is the actor's execution frame. It carries the active tracing context of the
//! invocation in progress, and every send made through it (`tell`, `ask`, `tell_after`) is
//! stamped with that context by the registered instrumentation before it leaves. Targets are
//! anything implementing [`Recipient`]: a local `ActorRef` or a handle to a remote actor.
//!

use crate::{
    ActorPath, Error,
    context::{ExecutionFrame, TracingContext},
    dispatcher::{LocalDispatcher, PendingReply, RequestTimeout},
    envelope::Envelope,
    runner::StopSender,
    system::SystemRef,
};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};

use async_trait::async_trait;

use tracing::{Instrument, debug, error};

use std::time::Duration;

/// Execution context of an actor.
///
/// Passed by mutable reference to lifecycle hooks and to [`Handler::handle_message`]. Between
/// `before_processing` and `after_processing` its frame holds the context of the envelope being
/// processed; outside of that span the active context is empty unless the actor set one.
pub struct ActorContext<A: Actor + Handler<A>> {
    /// Stop sender of this actor.
    stop: StopSender,
    /// Path of the actor.
    path: ActorPath,
    /// The actor system.
    system: SystemRef,
    /// Active tracing context and processing state.
    frame: ExecutionFrame,
    /// Stop senders of the children.
    child_senders: Vec<StopSender>,
    _actor: std::marker::PhantomData<fn() -> A>,
}

impl<A> ActorContext<A>
where
    A: Actor + Handler<A>,
{
    pub(crate) fn new(stop: StopSender, path: ActorPath, system: SystemRef) -> Self {
        let frame = ExecutionFrame::new(path.clone(), system.codec().kind());
        Self {
            stop,
            path,
            system,
            frame,
            child_senders: Vec::new(),
            _actor: std::marker::PhantomData,
        }
    }

    /// Context for driving a mailbox by hand with [`crate::Mailbox::drain_one`].
    ///
    /// Stop requests issued through it go nowhere.
    pub fn detached(path: ActorPath, system: SystemRef) -> Self {
        let (stop, _) = mpsc::channel(1);
        Self::new(stop, path, system)
    }

    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    pub fn frame(&self) -> &ExecutionFrame {
        &self.frame
    }

    pub(crate) fn frame_mut(&mut self) -> &mut ExecutionFrame {
        &mut self.frame
    }

    /// The active tracing context.
    pub fn tracing_context(&self) -> &TracingContext {
        self.frame.active()
    }

    /// Replaces the active tracing context for the rest of this invocation.
    pub fn set_tracing_context(&mut self, context: impl Into<TracingContext>) {
        self.frame.set_active(context.into());
    }

    fn outgoing<R>(
        &self,
        target: &R,
        message: <R::Target as Actor>::Message,
    ) -> Envelope<<R::Target as Actor>::Message>
    where
        R: Recipient + ?Sized,
    {
        Envelope::new(self.path.clone(), target.path(), message)
    }

    /// Sends `message` to `target` carrying the active context.
    pub async fn tell<R>(
        &self,
        target: &R,
        message: <R::Target as Actor>::Message,
    ) -> Result<(), Error>
    where
        R: Recipient + ?Sized,
    {
        let mut envelope = self.outgoing(target, message);
        self.system
            .instrumentation()
            .before_sending(&self.frame, envelope.header_mut());
        target.deliver(envelope).await
    }

    /// Sends a request to `target` carrying the active context and waits for the reply.
    ///
    /// The reply resumes this invocation, so it goes through `before_processing`: afterwards the
    /// active context is the one the replier attached.
    pub async fn ask<R>(
        &mut self,
        target: &R,
        message: <R::Target as Actor>::Message,
        timeout: RequestTimeout,
    ) -> Result<<R::Target as Actor>::Response, Error>
    where
        R: Recipient + ?Sized,
    {
        let mut envelope = self.outgoing(target, message);
        let hooks = self.system.instrumentation();
        hooks.before_sending(&self.frame, envelope.header_mut());
        let reply = target.request(envelope, timeout).await?;
        let (header, response) = reply.into_parts();
        hooks.before_processing(&mut self.frame, &header);
        Ok(response)
    }

    /// Schedules `message` for delivery to `target` after `delay`.
    ///
    /// The envelope is stamped now, with the context active at the time of the call.
    pub fn tell_after<R>(
        &self,
        target: R,
        message: <R::Target as Actor>::Message,
        delay: Duration,
    ) -> JoinHandle<Result<(), Error>>
    where
        R: Recipient + Clone + 'static,
    {
        let deadline = Instant::now() + delay;
        let mut envelope = self.outgoing(&target, message);
        envelope.header_mut().schedule(deadline);
        self.system.instrumentation().before_sending_scheduled(
            &self.frame,
            deadline,
            envelope.header_mut(),
        );
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let result = target.deliver(envelope).await;
            if let Err(error) = &result {
                error!("Scheduled send to {} failed: {}", target.path(), error);
            }
            result
        }.in_current_span())
    }

    /// Creates a child actor under this actor's path.
    pub async fn create_child<C>(
        &mut self,
        name: &str,
        actor: C,
    ) -> Result<ActorRef<C>, Error>
    where
        C: Actor + Handler<C>,
    {
        let path = self.path.clone() / name;
        let (actor_ref, stop_sender) = self
            .system
            .create_actor_path(path, actor, Some(self.path.clone()))
            .await?;
        self.child_senders.push(stop_sender);
        Ok(actor_ref)
    }

    pub(crate) async fn stop_childs(&mut self) {
        while let Some(sender) = self.child_senders.pop() {
            let (stop_sender, stop_receiver) = oneshot::channel();
            if sender.send(Some(stop_sender)).await.is_ok() {
                let _ = stop_receiver.await;
            }
        }
    }

    pub(crate) async fn remove_actor(&self) {
        self.system.remove_actor(&self.path).await;
    }

    /// Asks the runner to stop this actor once the current invocation returns.
    pub async fn stop(&self, sender: Option<oneshot::Sender<()>>) {
        debug!("Stopping actor {} from its context.", &self.path);
        let _ = self.stop.send(sender).await;
    }
}

/// Lifecycle of an actor runner.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorLifecycle {
    /// The runner exists, `pre_start` has not run yet.
    Created,
    /// `pre_start` succeeded; the mailbox is being processed.
    Started,
    /// A stop was requested and `pre_stop` ran.
    Stopped,
    /// `pre_start` failed.
    Failed,
    /// The actor left the system.
    Terminated,
}

/// The `Actor` trait is the main trait that actors must implement.
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static + Handler<Self> {
    /// The type of messages this actor handles.
    type Message: Message;

    /// The type of responses this actor produces.
    type Response: Response;

    /// Called before the actor starts processing its mailbox.
    async fn pre_start(
        &mut self,
        _context: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called when a stop was requested, before children are stopped.
    async fn pre_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called once the actor stopped.
    async fn post_stop(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Marker for message payloads.
pub trait Message: Clone + Send + Sync + 'static {}

/// Marker for response payloads.
pub trait Response: Send + Sync + 'static {}

impl Message for String {}

impl Response for String {}

impl Response for () {}

/// Behavior of an actor.
#[async_trait]
pub trait Handler<A: Actor + Handler<A>>: Send + Sync {
    /// Handles one message. The active context of `ctx` is the one the envelope carried.
    async fn handle_message(
        &mut self,
        sender: ActorPath,
        msg: A::Message,
        ctx: &mut ActorContext<A>,
    ) -> Result<A::Response, Error>;
}

/// Something envelopes can be sent to: a local actor or a remote one.
#[async_trait]
pub trait Recipient: Send + Sync {
    /// Actor type on the receiving end.
    type Target: Actor + Handler<Self::Target>;

    /// Identity of the receiving actor.
    fn path(&self) -> ActorPath;

    /// Hands `envelope` over for delivery, keeping its header as is.
    async fn deliver(
        &self,
        envelope: Envelope<<Self::Target as Actor>::Message>,
    ) -> Result<(), Error>;

    /// Hands a request over and waits for the reply envelope.
    async fn request(
        &self,
        envelope: Envelope<<Self::Target as Actor>::Message>,
        timeout: RequestTimeout,
    ) -> Result<Envelope<<Self::Target as Actor>::Response>, Error>;
}

/// Reference to a local actor.
pub struct ActorRef<A>
where
    A: Actor + Handler<A>,
{
    /// Path of the actor.
    path: ActorPath,
    /// Producing side of the actor's mailbox.
    dispatcher: LocalDispatcher<A>,
    /// Stop sender of the actor.
    stop_sender: StopSender,
}

impl<A> ActorRef<A>
where
    A: Actor + Handler<A>,
{
    pub(crate) fn new(
        path: ActorPath,
        dispatcher: LocalDispatcher<A>,
        stop_sender: StopSender,
    ) -> Self {
        Self {
            path,
            dispatcher,
            stop_sender,
        }
    }

    fn anonymous<M>(&self, message: M) -> Envelope<M> {
        Envelope::new(ActorPath::anonymous(), self.path.clone(), message)
    }

    /// Sends a message from outside any actor. It carries no tracing context.
    pub async fn tell(&self, message: A::Message) -> Result<(), Error> {
        self.dispatcher.deliver(self.anonymous(message))
    }

    /// Sends a request from outside any actor and waits for the response.
    pub async fn ask(&self, message: A::Message) -> Result<A::Response, Error> {
        self.ask_timeout(message, RequestTimeout::Infinite).await
    }

    pub async fn ask_timeout(
        &self,
        message: A::Message,
        timeout: RequestTimeout,
    ) -> Result<A::Response, Error> {
        let reply = self
            .dispatcher
            .request(self.anonymous(message), timeout)
            .await?;
        Ok(reply.into_payload())
    }

    /// Appends an already built envelope to the mailbox.
    pub fn deliver(&self, envelope: Envelope<A::Message>) -> Result<(), Error> {
        self.dispatcher.deliver(envelope)
    }

    /// Appends an already built request envelope and returns the pending reply.
    pub fn submit(
        &self,
        envelope: Envelope<A::Message>,
    ) -> Result<PendingReply<A::Response>, Error> {
        self.dispatcher.submit(envelope)
    }

    /// Stops the actor and waits until it is stopped.
    pub async fn ask_stop(&self) -> Result<(), Error> {
        debug!("Stopping actor from handle reference.");
        let (response_sender, response_receiver) = oneshot::channel();
        if self.stop_sender.send(Some(response_sender)).await.is_err() {
            Ok(())
        } else {
            response_receiver
                .await
                .map_err(|error| Error::Send(error.to_string()))
        }
    }

    /// Stops the actor without waiting.
    pub async fn tell_stop(&self) {
        debug!("Stopping actor from handle reference.");
        let _ = self.stop_sender.send(None).await;
    }

    pub fn path(&self) -> ActorPath {
        self.path.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }
}

#[async_trait]
impl<A> Recipient for ActorRef<A>
where
    A: Actor + Handler<A>,
{
    type Target = A;

    fn path(&self) -> ActorPath {
        self.path.clone()
    }

    async fn deliver(&self, envelope: Envelope<A::Message>) -> Result<(), Error> {
        self.dispatcher.deliver(envelope)
    }

    async fn request(
        &self,
        envelope: Envelope<A::Message>,
        timeout: RequestTimeout,
    ) -> Result<Envelope<A::Response>, Error> {
        self.dispatcher.request(envelope, timeout).await
    }
}

impl<A> Clone for ActorRef<A>
where
    A: Actor + Handler<A>,
{
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            dispatcher: self.dispatcher.clone(),
            stop_sender: self.stop_sender.clone(),
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::ActorSystem;

    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone)]
    enum RelayMessage {
        /// Forward the text to the sink, optionally replacing the context first.
        Forward(String, Option<String>),
        /// Schedule the text to the sink.
        Later(String),
    }

    impl Message for RelayMessage {}

    #[derive(Debug, Clone, PartialEq)]
    struct Observed {
        text: String,
        context: String,
    }

    struct Relay {
        sink: ActorRef<Sink>,
    }

    #[async_trait]
    impl Actor for Relay {
        type Message = RelayMessage;
        type Response = ();
    }

    #[async_trait]
    impl Handler<Relay> for Relay {
        async fn handle_message(
            &mut self,
            _sender: ActorPath,
            msg: RelayMessage,
            ctx: &mut ActorContext<Relay>,
        ) -> Result<(), Error> {
            match msg {
                RelayMessage::Forward(text, replacement) => {
                    ctx.tell(&self.sink, SinkMessage::Record(text.clone())).await?;
                    if let Some(replacement) = replacement {
                        ctx.set_tracing_context(replacement);
                        ctx.tell(&self.sink, SinkMessage::Record(text)).await?;
                    }
                }
                RelayMessage::Later(text) => {
                    ctx.tell_after(
                        self.sink.clone(),
                        SinkMessage::Record(text),
                        Duration::from_millis(50),
                    );
                    // Changing the context after scheduling does not affect the scheduled send.
                    ctx.set_tracing_context("changed after scheduling");
                }
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone)]
    enum SinkMessage {
        Record(String),
        Dump,
    }

    impl Message for SinkMessage {}

    #[derive(Debug, Clone, PartialEq)]
    enum SinkResponse {
        Recorded,
        Dump(Vec<Observed>),
    }

    impl Response for SinkResponse {}

    #[derive(Default)]
    struct Sink {
        observed: Vec<Observed>,
    }

    #[async_trait]
    impl Actor for Sink {
        type Message = SinkMessage;
        type Response = SinkResponse;
    }

    #[async_trait]
    impl Handler<Sink> for Sink {
        async fn handle_message(
            &mut self,
            _sender: ActorPath,
            msg: SinkMessage,
            ctx: &mut ActorContext<Sink>,
        ) -> Result<SinkResponse, Error> {
            match msg {
                SinkMessage::Record(text) => {
                    self.observed.push(Observed {
                        text,
                        context: ctx.tracing_context().to_string(),
                    });
                    Ok(SinkResponse::Recorded)
                }
                SinkMessage::Dump => Ok(SinkResponse::Dump(self.observed.clone())),
            }
        }
    }

    async fn setup() -> (SystemRef, ActorRef<Relay>, ActorRef<Sink>) {
        let (system, _) = ActorSystem::create(CancellationToken::new());
        let sink = system
            .create_root_actor("sink", Sink::default())
            .await
            .unwrap();
        let relay = system
            .create_root_actor("relay", Relay { sink: sink.clone() })
            .await
            .unwrap();
        (system, relay, sink)
    }

    async fn dump(sink: &ActorRef<Sink>) -> Vec<Observed> {
        match sink.ask(SinkMessage::Dump).await.unwrap() {
            SinkResponse::Dump(observed) => observed,
            SinkResponse::Recorded => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_context_propagates_and_is_replaced() {
        let (_system, relay, sink) = setup().await;

        let envelope = Envelope::new(
            ActorPath::from("/user/client"),
            relay.path(),
            RelayMessage::Forward("hello".to_owned(), Some("T2".to_owned())),
        )
        .with_context("T");
        relay.deliver(envelope).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            dump(&sink).await,
            vec![
                Observed {
                    text: "hello".to_owned(),
                    context: "T".to_owned()
                },
                Observed {
                    text: "hello".to_owned(),
                    context: "T2".to_owned()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_scheduled_send_keeps_context_of_call() {
        let (_system, relay, sink) = setup().await;

        let envelope = Envelope::new(
            ActorPath::from("/user/client"),
            relay.path(),
            RelayMessage::Later("later".to_owned()),
        )
        .with_context("scheduled ctx");
        relay.deliver(envelope).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(dump(&sink).await.is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            dump(&sink).await,
            vec![Observed {
                text: "later".to_owned(),
                context: "scheduled ctx".to_owned()
            }]
        );
    }

    #[tokio::test]
    async fn test_external_tell_has_no_context() {
        let (_system, _relay, sink) = setup().await;
        sink.tell(SinkMessage::Record("outside".to_owned()))
            .await
            .unwrap();
        assert_eq!(
            dump(&sink).await,
            vec![Observed {
                text: "outside".to_owned(),
                context: String::new()
            }]
        );
    }

    #[tokio::test]
    async fn test_ask_stop() {
        let (system, relay, _sink) = setup().await;
        relay.ask_stop().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(system.get_actor::<Relay>(&relay.path()).await.is_none());
    }
}
