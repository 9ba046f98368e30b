// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Connector
//!
//! A [`RemoteHandle`] represents an actor published by another process. It owns one persistent
//! connection for as long as any clone of the handle lives:
//!
//! - Sends are queued on an unbounded channel drained by a writer task, so sending never waits
//!   for the network. Frames leave in the order they were queued. When the last handle is
//!   dropped the writer flushes what is still queued before closing the connection.
//! - Requests are correlated by id. A reader task resolves them as responses arrive and fails
//!   every outstanding one with `Error::Closed` when the connection drops.
//!
//! The handle implements [`Recipient`], so an actor sends to it through its context exactly as
//! it would to a local `ActorRef`, and the context is stamped the same way.
//!

use crate::{
    Wire,
    config::RemoteConfig,
    frame::{Frame, FrameCodec, Opcode, from_payload, to_payload},
};

use actor::{
    Actor, ActorPath, ContextCodec, Envelope, Error, Handler, PendingReply,
    Recipient, ReplySender, RequestTimeout,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use parking_lot::Mutex;
use tokio::{net::TcpStream, select, sync::mpsc};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{Instrument, debug, error, info, warn};

use std::{
    collections::HashMap,
    marker::PhantomData,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

type PendingMap = Arc<Mutex<HashMap<u64, ReplySender<Bytes>>>>;

/// Shared state of one connection. Dropping the last handle closes the outbound queue.
struct Connection {
    peer: SocketAddr,
    outbound: mpsc::UnboundedSender<Frame>,
    pending: PendingMap,
    next_id: AtomicU64,
    token: CancellationToken,
}

/// Removes a pending request when its caller stops waiting, however that happens.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Handle to an actor published on a remote endpoint.
pub struct RemoteHandle<A> {
    path: ActorPath,
    connection: Arc<Connection>,
    _actor: PhantomData<fn() -> A>,
}

impl<A> Clone for RemoteHandle<A> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            connection: self.connection.clone(),
            _actor: PhantomData,
        }
    }
}

/// Dials `address:port` and performs the handshake.
///
/// Cancelling `token` closes the connection.
pub(crate) async fn connect<A>(
    address: &str,
    port: u16,
    codec: Arc<dyn ContextCodec>,
    config: &RemoteConfig,
    token: CancellationToken,
) -> Result<RemoteHandle<A>, Error>
where
    A: Actor + Handler<A>,
    A::Message: Wire,
    A::Response: Wire,
{
    let target = format!("{}:{}", address, port);
    let stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((address, port)),
    )
    .await
    .map_err(|_| {
        Error::Connect(format!(
            "{}: timed out after {} ms",
            target,
            config.connect_timeout.as_millis()
        ))
    })?
    .map_err(|e| Error::Connect(format!("{}: {}", target, e)))?;

    if let Err(e) = stream.set_nodelay(config.nodelay) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }
    let peer = stream
        .peer_addr()
        .map_err(|e| Error::Connect(format!("{}: {}", target, e)))?;

    let mut framed =
        Framed::new(stream, FrameCodec::new(codec, config.max_frame_size));
    let path = tokio::time::timeout(config.connect_timeout, handshake(&mut framed))
        .await
        .map_err(|_| Error::Connect(format!("{}: handshake timed out", target)))?
        .map_err(|e| Error::Connect(format!("{}: {}", target, e)))?;
    info!("Connected to actor {} at {}.", path, peer);

    let (sink, frames) = framed.split();
    let (outbound, queue) = mpsc::unbounded_channel();
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(write_loop(sink, queue, token.clone()).in_current_span());
    tokio::spawn(
        read_loop(frames, pending.clone(), peer, token.clone()).in_current_span(),
    );

    Ok(RemoteHandle {
        path,
        connection: Arc::new(Connection {
            peer,
            outbound,
            pending,
            next_id: AtomicU64::new(0),
            token,
        }),
        _actor: PhantomData,
    })
}

/// Sends our hello and returns the path of the published actor from the answer.
async fn handshake(
    framed: &mut Framed<TcpStream, FrameCodec>,
) -> Result<ActorPath, Error> {
    framed
        .send(Frame::hello(ActorPath::anonymous(), ActorPath::anonymous()))
        .await?;
    let answer = match framed.next().await {
        Some(frame) => frame?,
        None => {
            return Err(Error::Protocol(
                "connection closed during handshake".to_owned(),
            ));
        }
    };
    answer.check_hello()?;
    Ok(answer.header.sender().clone())
}

/// Writes queued frames until every handle is gone, then closes the connection.
async fn write_loop(
    mut sink: SplitSink<Framed<TcpStream, FrameCodec>, Frame>,
    mut queue: mpsc::UnboundedReceiver<Frame>,
    token: CancellationToken,
) {
    loop {
        select! {
            biased;
            frame = queue.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(frame).await {
                    error!("Failed to write frame: {}", e);
                    break;
                }
            }
            _ = token.cancelled() => break,
        }
    }
    let _ = sink.close().await;
    token.cancel();
}

async fn read_loop(
    mut frames: SplitStream<Framed<TcpStream, FrameCodec>>,
    pending: PendingMap,
    peer: SocketAddr,
    token: CancellationToken,
) {
    let reason = loop {
        select! {
            _ = token.cancelled() => break "connection closed locally".to_owned(),
            next = frames.next() => {
                match next {
                    None => break "peer closed the connection".to_owned(),
                    Some(Err(e)) => break e.to_string(),
                    Some(Ok(frame)) => {
                        if let Err(e) = resolve(&pending, frame) {
                            break e.to_string();
                        }
                    }
                }
            }
        }
    };
    debug!("Connection to {} closed: {}", peer, reason);
    token.cancel();

    let abandoned: Vec<_> = pending.lock().drain().collect();
    for (_, rsvp) in abandoned {
        let _ = rsvp.send(Err(Error::Closed(format!(
            "connection to {} closed: {}",
            peer, reason
        ))));
    }
}

/// Completes the request a response or failure frame answers.
fn resolve(pending: &PendingMap, frame: Frame) -> Result<(), Error> {
    let (id, body) = match frame.opcode {
        Opcode::Response | Opcode::Failure => frame.split_id()?,
        other => {
            return Err(Error::Protocol(format!(
                "unexpected {:?} frame from a server",
                other
            )));
        }
    };
    let Some(rsvp) = pending.lock().remove(&id) else {
        debug!("Reply to request {} arrived after it was abandoned.", id);
        return Ok(());
    };
    let reply = match frame.opcode {
        Opcode::Response => Ok(Envelope::from_parts(frame.header, body)),
        _ => Err(from_payload::<Error>(&body).unwrap_or_else(|e| e)),
    };
    let _ = rsvp.send(reply);
    Ok(())
}

impl<A> RemoteHandle<A>
where
    A: Actor + Handler<A>,
    A::Message: Wire,
    A::Response: Wire,
{
    /// Address of the remote endpoint.
    pub fn peer_addr(&self) -> SocketAddr {
        self.connection.peer
    }

    pub fn is_closed(&self) -> bool {
        self.connection.token.is_cancelled()
    }

    /// Number of requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.connection.pending.lock().len()
    }

    /// Sends a message from outside any actor. It carries no tracing context.
    pub async fn tell(&self, message: A::Message) -> Result<(), Error> {
        self.deliver(Envelope::new(ActorPath::anonymous(), self.path.clone(), message))
            .await
    }

    /// Sends a request from outside any actor and waits for the response.
    pub async fn ask(
        &self,
        message: A::Message,
        timeout: RequestTimeout,
    ) -> Result<A::Response, Error> {
        let envelope =
            Envelope::new(ActorPath::anonymous(), self.path.clone(), message);
        Ok(self.request(envelope, timeout).await?.into_payload())
    }

    fn enqueue(&self, frame: Frame) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed(format!(
                "connection to {} is closed",
                self.connection.peer
            )));
        }
        self.connection.outbound.send(frame).map_err(|_| {
            Error::Closed(format!("connection to {} is closed", self.connection.peer))
        })
    }
}

#[async_trait]
impl<A> Recipient for RemoteHandle<A>
where
    A: Actor + Handler<A>,
    A::Message: Wire,
    A::Response: Wire,
{
    type Target = A;

    fn path(&self) -> ActorPath {
        self.path.clone()
    }

    async fn deliver(&self, envelope: Envelope<A::Message>) -> Result<(), Error> {
        let (header, message) = envelope.into_parts();
        let payload = to_payload(&message)?;
        self.enqueue(Frame::new(Opcode::Message, header, payload))
    }

    async fn request(
        &self,
        envelope: Envelope<A::Message>,
        timeout: RequestTimeout,
    ) -> Result<Envelope<A::Response>, Error> {
        let (header, message) = envelope.into_parts();
        let body = to_payload(&message)?;
        let id = self.connection.next_id.fetch_add(1, Ordering::Relaxed);

        let (rsvp, reply) = PendingReply::channel();
        self.connection.pending.lock().insert(id, rsvp);
        let _guard = PendingGuard {
            pending: &self.connection.pending,
            id,
        };
        self.enqueue(Frame::correlated(Opcode::Request, header, id, &body))?;

        let (header, body) = reply.wait(timeout).await?.into_parts();
        let response: A::Response = from_payload(&body)?;
        Ok(Envelope::from_parts(header, response))
    }
}
