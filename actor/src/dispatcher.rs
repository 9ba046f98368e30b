// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Local dispatcher
//!
//! Every actor owns a [`Mailbox`]: the consuming half of an unbounded channel of envelopes.
//! The producing half is wrapped in a [`LocalDispatcher`], which every `ActorRef` clones. Any
//! number of producers (other actors, network readers) may deliver concurrently; the channel
//! keeps the order of each producer's envelopes and never loses or duplicates one.
//!
//! Processing an envelope follows the hook protocol:
//!
//! ```text
//! before_processing -> behavior -> (reply stamped with before_sending) -> after_processing
//! ```
//!
//! after which the frame is cleared whatever the registered hooks did.
//!

use crate::{
    Error,
    actor::{Actor, ActorContext, Handler},
    codec::header_to_text,
    envelope::{Envelope, Header},
    instrumentation::Outcome,
};

use async_trait::async_trait;

use tokio::sync::{mpsc, oneshot};

use tracing::{debug, error};

use std::time::Duration;

/// How long a requester waits for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestTimeout {
    /// Wait until a reply arrives or the channel closes.
    #[default]
    Infinite,
    /// Fail with `Error::Timeout` once the duration elapsed.
    Bounded(Duration),
}

/// Sending half of a pending reply.
pub type ReplySender<R> = oneshot::Sender<Result<Envelope<R>, Error>>;

/// Receiving half of a request: resolves to the reply envelope.
#[derive(Debug)]
pub struct PendingReply<R> {
    receiver: oneshot::Receiver<Result<Envelope<R>, Error>>,
}

impl<R> PendingReply<R> {
    /// Creates a connected sender and pending reply.
    pub fn channel() -> (ReplySender<R>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self { receiver })
    }

    /// Waits for the reply. On timeout the receiver is dropped, so a late reply is discarded.
    pub async fn wait(self, timeout: RequestTimeout) -> Result<Envelope<R>, Error> {
        match timeout {
            RequestTimeout::Infinite => self
                .receiver
                .await
                .map_err(|e| Error::Closed(e.to_string()))?,
            RequestTimeout::Bounded(duration) => {
                match tokio::time::timeout(duration, self.receiver).await {
                    Ok(reply) => reply.map_err(|e| Error::Closed(e.to_string()))?,
                    Err(_) => Err(Error::Timeout(duration.as_millis() as u64)),
                }
            }
        }
    }
}

/// A mailbox entry that knows how to process itself against its actor.
#[async_trait]
pub trait MessageHandler<A: Actor>: Send + Sync {
    /// Header of the queued envelope.
    fn header(&self) -> &Header;

    /// Runs one processing invocation.
    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>);
}

/// Internal actor message: an envelope and, for requests, where the reply goes.
struct ActorMessage<A>
where
    A: Actor + Handler<A>,
{
    header: Header,
    message: Option<A::Message>,
    rsvp: Option<ReplySender<A::Response>>,
}

impl<A> ActorMessage<A>
where
    A: Actor + Handler<A>,
{
    fn new(
        envelope: Envelope<A::Message>,
        rsvp: Option<ReplySender<A::Response>>,
    ) -> Self {
        let (header, message) = envelope.into_parts();
        Self {
            header,
            message: Some(message),
            rsvp,
        }
    }
}

#[async_trait]
impl<A> MessageHandler<A> for ActorMessage<A>
where
    A: Actor + Handler<A>,
{
    fn header(&self) -> &Header {
        &self.header
    }

    async fn handle(&mut self, actor: &mut A, ctx: &mut ActorContext<A>) {
        let Some(message) = self.message.take() else {
            return;
        };
        let hooks = ctx.system().instrumentation();
        debug!(
            "Processing {}",
            header_to_text(ctx.system().codec().as_ref(), &self.header)
        );

        hooks.before_processing(ctx.frame_mut(), &self.header);
        let result = actor
            .handle_message(self.header.sender().clone(), message, ctx)
            .await;

        let failure = result.as_ref().err().cloned();
        if let Some(rsvp) = self.rsvp.take() {
            debug!("Sending back response (if any).");
            let reply = result.map(|response| {
                let mut header = self.header.reply();
                hooks.before_sending(ctx.frame(), &mut header);
                Envelope::from_parts(header, response)
            });
            rsvp.send(reply).unwrap_or_else(|_failed| {
                debug!("Requester is gone, response dropped.");
            });
        }

        let outcome = match &failure {
            Some(error) => Outcome::Failed(error),
            None => Outcome::Completed,
        };
        hooks.after_processing(ctx.frame_mut(), outcome);
        ctx.frame_mut().leave();
    }
}

pub type BoxedMessageHandler<A> = Box<dyn MessageHandler<A>>;

pub type MailboxReceiver<A> = mpsc::UnboundedReceiver<BoxedMessageHandler<A>>;

pub type MailboxSender<A> = mpsc::UnboundedSender<BoxedMessageHandler<A>>;

/// Creates the two halves of an actor mailbox.
pub fn mailbox<A>() -> (LocalDispatcher<A>, Mailbox<A>)
where
    A: Actor + Handler<A>,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    (LocalDispatcher::new(sender), Mailbox { receiver })
}

/// Producing side of a mailbox.
pub struct LocalDispatcher<A> {
    sender: MailboxSender<A>,
}

impl<A> LocalDispatcher<A>
where
    A: Actor + Handler<A>,
{
    pub(crate) fn new(sender: MailboxSender<A>) -> Self {
        Self { sender }
    }

    /// Appends `envelope` to the mailbox. The attached context is kept as is.
    pub fn deliver(&self, envelope: Envelope<A::Message>) -> Result<(), Error> {
        let msg = ActorMessage::<A>::new(envelope, None);
        self.sender.send(Box::new(msg)).map_err(|error| {
            error!("Failed to deliver message! {}", error);
            Error::Send(error.to_string())
        })
    }

    /// Appends a request to the mailbox and returns the pending reply.
    pub fn submit(
        &self,
        envelope: Envelope<A::Message>,
    ) -> Result<PendingReply<A::Response>, Error> {
        let (rsvp, pending) = PendingReply::channel();
        let msg = ActorMessage::<A>::new(envelope, Some(rsvp));
        self.sender.send(Box::new(msg)).map_err(|error| {
            error!("Failed to submit request! {}", error);
            Error::Send(error.to_string())
        })?;
        Ok(pending)
    }

    /// Submits a request and waits for its reply.
    pub async fn request(
        &self,
        envelope: Envelope<A::Message>,
        timeout: RequestTimeout,
    ) -> Result<Envelope<A::Response>, Error> {
        self.submit(envelope)?.wait(timeout).await
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<A> Clone for LocalDispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Consuming side of a mailbox, owned by the actor's runner.
pub struct Mailbox<A> {
    receiver: MailboxReceiver<A>,
}

impl<A> Mailbox<A>
where
    A: Actor + Handler<A>,
{
    /// Waits for the next entry.
    pub(crate) async fn recv(&mut self) -> Option<BoxedMessageHandler<A>> {
        self.receiver.recv().await
    }

    /// Processes the head of the mailbox, if any, without waiting.
    ///
    /// Returns whether a message was processed.
    pub async fn drain_one(
        &mut self,
        actor: &mut A,
        ctx: &mut ActorContext<A>,
    ) -> bool {
        match self.receiver.try_recv() {
            Ok(mut msg) => {
                msg.handle(actor, ctx).await;
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub(crate) fn close(&mut self) {
        self.receiver.close();
    }
}
