// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! Each actor is driven by its own `ActorRunner`, a task that owns the actor instance, its
//! [`Mailbox`] and its [`ActorContext`]. The runner walks the actor through its lifecycle:
//!
//! ```text
//! Created --pre_start ok--> Started --stop--> Stopped --post_stop--> Terminated
//!    |                                                                   ^
//!    +--pre_start err--> Failed -----------------------------------------+
//! ```
//!
//! While started, a select loop waits on the stop channel and the mailbox. Messages are
//! processed one at a time, so the execution frame of the actor is only ever used by the
//! invocation in progress.
//!

use crate::{
    ActorPath,
    actor::{Actor, ActorContext, ActorLifecycle, ActorRef, Handler},
    dispatcher::{Mailbox, mailbox},
    system::SystemRef,
};

use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, error};

/// Channel receiver for actor stop signals.
///
/// Each signal optionally carries a oneshot sender the requester waits on until the actor
/// has stopped.
pub type StopReceiver = mpsc::Receiver<Option<oneshot::Sender<()>>>;

/// Channel sender for actor stop signals.
pub type StopSender = mpsc::Sender<Option<oneshot::Sender<()>>>;

/// Execution engine of a single actor.
pub(crate) struct ActorRunner<A: Actor> {
    /// Path of the actor.
    path: ActorPath,
    /// The actor instance.
    actor: A,
    /// Current lifecycle state.
    lifecycle: ActorLifecycle,
    /// Consuming side of the mailbox.
    mailbox: Mailbox<A>,
    /// Stop signals from the parent, the system or a handle.
    stop_receiver: StopReceiver,
    /// Set once no more messages are accepted.
    stop_signal: bool,
    /// Requester waiting for the actor to terminate.
    stop_ack: Option<oneshot::Sender<()>>,
}

impl<A> ActorRunner<A>
where
    A: Actor + Handler<A>,
{
    /// Creates a runner together with the reference and stop sender of its actor.
    pub(crate) fn create(
        path: ActorPath,
        actor: A,
        stop_buffer: usize,
    ) -> (Self, ActorRef<A>, StopSender) {
        debug!("Creating new actor runner.");
        let (dispatcher, mailbox) = mailbox();
        let (stop_sender, stop_receiver) = mpsc::channel(stop_buffer.max(1));
        let actor_ref =
            ActorRef::new(path.clone(), dispatcher, stop_sender.clone());
        let runner: ActorRunner<A> = ActorRunner {
            path,
            actor,
            lifecycle: ActorLifecycle::Created,
            mailbox,
            stop_receiver,
            stop_signal: false,
            stop_ack: None,
        };
        (runner, actor_ref, stop_sender)
    }

    /// Runs the actor from creation to termination.
    ///
    /// `sender` is told `true` once the actor started, `false` if it terminated before that.
    pub(crate) async fn init(
        &mut self,
        system: SystemRef,
        stop_sender: StopSender,
        mut sender: Option<oneshot::Sender<bool>>,
    ) {
        debug!("Initializing actor {} runner.", &self.path);

        debug!("Creating actor {} context.", &self.path);
        let mut ctx: ActorContext<A> =
            ActorContext::new(stop_sender, self.path.clone(), system.clone());

        loop {
            match self.lifecycle {
                // State: CREATED
                ActorLifecycle::Created => {
                    debug!("Actor {} is created.", &self.path);
                    match self.actor.pre_start(&mut ctx).await {
                        Ok(_) => {
                            debug!(
                                "Actor '{}' has started successfully.",
                                &self.path
                            );
                            self.lifecycle = ActorLifecycle::Started;
                        }
                        Err(err) => {
                            error!(
                                "Actor {} failed to start: {:?}",
                                &self.path, err
                            );
                            self.lifecycle = ActorLifecycle::Failed;
                        }
                    }
                }
                // State: STARTED
                ActorLifecycle::Started => {
                    debug!("Actor {} is started.", &self.path);
                    if let Some(sender) = sender.take() {
                        sender.send(true).unwrap_or_else(|err| {
                            error!("Failed to send signal: {:?}", err);
                        });
                    }
                    self.run(&mut ctx).await;
                }
                // State: STOPPED
                ActorLifecycle::Stopped => {
                    debug!("Actor {} is stopped.", &self.path);
                    if self.actor.post_stop(&mut ctx).await.is_err() {
                        error!("Actor '{}' failed to stop!", &self.path);
                    }
                    self.lifecycle = ActorLifecycle::Terminated;
                }
                // State: FAILED
                ActorLifecycle::Failed => {
                    debug!("Actor {} is faulty.", &self.path);
                    ctx.stop_childs().await;
                    self.lifecycle = ActorLifecycle::Terminated;
                }
                // State: TERMINATED
                ActorLifecycle::Terminated => {
                    debug!("Actor {} is terminated.", &self.path);
                    ctx.remove_actor().await;
                    system.instrumentation().on_actor_destroyed(&self.path);
                    if let Some(ack) = self.stop_ack.take() {
                        let _ = ack.send(());
                    }
                    if let Some(sender) = sender.take() {
                        sender.send(false).unwrap_or_else(|err| {
                            error!("Failed to send signal: {:?}", err);
                        });
                    }
                    break;
                }
            }
        }
        self.mailbox.close();
    }

    /// Processes the mailbox until a stop signal arrives.
    pub(crate) async fn run(&mut self, ctx: &mut ActorContext<A>) {
        debug!("Running actor {}.", &self.path);

        loop {
            select! {
                stop = self.stop_receiver.recv() => {
                    debug!("Stopping actor.");
                    if let Err(err) = self.actor.pre_stop(ctx).await {
                        error!("Failed to stop actor {}: {}", &self.path, err);
                    }

                    ctx.stop_childs().await;
                    ctx.remove_actor().await;

                    self.stop_ack = stop.flatten();

                    if let ActorLifecycle::Started = self.lifecycle {
                        self.lifecycle = ActorLifecycle::Stopped;
                    }
                    break;
                }
                msg = self.mailbox.recv(), if !self.stop_signal => {
                    if let Some(mut msg) = msg {
                        msg.handle(&mut self.actor, ctx).await;
                    } else {
                        ctx.stop(None).await;
                        self.stop_signal = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::{ActorSystem, Error, Message};

    use async_trait::async_trait;

    use tokio_util::sync::CancellationToken;
    use tracing::Instrument;
    use tracing_test::traced_test;

    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub enum TestMessage {
        Stop,
    }

    impl Message for TestMessage {}

    #[derive(Debug, Clone)]
    pub struct TestActor {
        failed: bool,
    }

    #[async_trait]
    impl Actor for TestActor {
        type Message = TestMessage;
        type Response = ();

        async fn pre_start(
            &mut self,
            _ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            if self.failed {
                Err(Error::Start("PreStart failed".to_owned()))
            } else {
                Ok(())
            }
        }

        async fn post_stop(
            &mut self,
            _ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            debug!("Post stop");
            Ok(())
        }
    }

    #[async_trait]
    impl Handler<TestActor> for TestActor {
        async fn handle_message(
            &mut self,
            _sender: ActorPath,
            msg: TestMessage,
            ctx: &mut ActorContext<Self>,
        ) -> Result<(), Error> {
            match msg {
                TestMessage::Stop => {
                    ctx.stop(None).await;
                    debug!("Actor stopped");
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_actor_lifecycle() {
        let (system, _) = ActorSystem::create(CancellationToken::new());

        let (mut runner, actor_ref, stop_sender) = ActorRunner::create(
            ActorPath::from("/user/test"),
            TestActor { failed: false },
            10,
        );
        let inner_system = system.clone();
        let (started_sender, started_receiver) = oneshot::channel();
        tokio::spawn(async move {
            runner
                .init(inner_system, stop_sender, Some(started_sender))
                .await;
        }.in_current_span());
        assert!(started_receiver.await.unwrap());

        actor_ref.tell(TestMessage::Stop).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(logs_contain("Actor /user/test is created"));
        assert!(logs_contain("Actor /user/test is started"));
        assert!(logs_contain("Running actor /user/test"));
        assert!(logs_contain("Post stop"));
        assert!(logs_contain("Actor /user/test is terminated"));
        assert!(logs_contain("Actor destroyed."));
        assert!(actor_ref.is_closed());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_start_terminates() {
        let (system, _) = ActorSystem::create(CancellationToken::new());

        let result = system
            .create_root_actor("broken", TestActor { failed: true })
            .await;
        assert!(matches!(result, Err(Error::Start(_))));
        assert!(logs_contain("Actor /user/broken failed to start"));
        assert!(logs_contain("Actor /user/broken is faulty"));
        assert!(
            system
                .get_actor::<TestActor>(&ActorPath::from("/user/broken"))
                .await
                .is_none()
        );
    }
}
