// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Publisher
//!
//! Binds a local actor to a TCP endpoint. One accept loop runs per endpoint and each accepted
//! connection gets its own reader and writer:
//!
//! - The reader performs the handshake, then decodes frames and hands them to the actor's
//!   mailbox in the order they arrived.
//! - Requests are submitted to the mailbox and answered from a spawned task, so a slow reply
//!   never stalls the reading of later frames.
//! - The writer drains an unbounded queue of outgoing frames.
//!
//! Any decoding or protocol error closes the offending connection only. A peer that does not
//! complete the handshake within `connect_timeout` is dropped.
//!

use crate::{
    Wire,
    config::RemoteConfig,
    frame::{Frame, FrameCodec, Opcode, from_payload, to_payload},
};

use actor::{
    Actor, ActorPath, ActorRef, ContextCodec, Envelope, Error, Handler,
    RequestTimeout,
};

use futures::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{Instrument, debug, error, info, warn};

use std::{net::SocketAddr, sync::Arc, time::Duration};

/// A listening endpoint bound to one actor.
#[derive(Debug, Clone)]
pub struct PublishedEndpoint {
    path: ActorPath,
    local_addr: SocketAddr,
    token: CancellationToken,
}

impl PublishedEndpoint {
    /// Path of the published actor.
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// Address the endpoint is bound to. With port `0` this carries the port actually chosen.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and closes the open ones.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Binds `address:port` and starts serving `actor` on it.
pub(crate) async fn publish<A>(
    actor: ActorRef<A>,
    address: &str,
    port: u16,
    codec: Arc<dyn ContextCodec>,
    config: RemoteConfig,
    token: CancellationToken,
) -> Result<PublishedEndpoint, Error>
where
    A: Actor + Handler<A>,
    A::Message: Wire,
    A::Response: Wire,
{
    let listener = TcpListener::bind((address, port))
        .await
        .map_err(|e| Error::Publish(format!("{}:{}: {}", address, port, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| Error::Publish(format!("{}:{}: {}", address, port, e)))?;
    info!("Actor {} published on {}.", actor.path(), local_addr);

    let endpoint = PublishedEndpoint {
        path: actor.path(),
        local_addr,
        token: token.clone(),
    };
    tokio::spawn(
        accept_loop(listener, actor, codec, config, token).in_current_span(),
    );
    Ok(endpoint)
}

async fn accept_loop<A>(
    listener: TcpListener,
    actor: ActorRef<A>,
    codec: Arc<dyn ContextCodec>,
    config: RemoteConfig,
    token: CancellationToken,
) where
    A: Actor + Handler<A>,
    A::Message: Wire,
    A::Response: Wire,
{
    loop {
        select! {
            _ = token.cancelled() => {
                debug!("Endpoint of {} closed.", actor.path());
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {} for {}.", peer, actor.path());
                        if let Err(e) = stream.set_nodelay(config.nodelay) {
                            warn!("Failed to set TCP_NODELAY: {}", e);
                        }
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            actor.clone(),
                            FrameCodec::new(codec.clone(), config.max_frame_size),
                            config.connect_timeout,
                            token.child_token(),
                        ).in_current_span());
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }
    }
}

async fn serve_connection<A>(
    stream: TcpStream,
    peer: SocketAddr,
    actor: ActorRef<A>,
    codec: FrameCodec,
    handshake_timeout: Duration,
    token: CancellationToken,
) where
    A: Actor + Handler<A>,
    A::Message: Wire,
    A::Response: Wire,
{
    match handle_connection(stream, &actor, codec, handshake_timeout, token).await {
        Ok(()) => debug!("Connection from {} closed.", peer),
        Err(e) => warn!(peer = %peer, actor = %actor.path(), "Closing connection: {}", e),
    }
}

async fn handle_connection<A>(
    stream: TcpStream,
    actor: &ActorRef<A>,
    codec: FrameCodec,
    handshake_timeout: Duration,
    token: CancellationToken,
) -> Result<(), Error>
where
    A: Actor + Handler<A>,
    A::Message: Wire,
    A::Response: Wire,
{
    let (mut sink, mut frames) = Framed::new(stream, codec).split();

    let hello = select! {
        _ = token.cancelled() => return Ok(()),
        first = tokio::time::timeout(handshake_timeout, frames.next()) => {
            match first {
                Err(_) => {
                    return Err(Error::Protocol(format!(
                        "no handshake within {} ms",
                        handshake_timeout.as_millis()
                    )));
                }
                Ok(None) => return Ok(()),
                Ok(Some(frame)) => frame?,
            }
        }
    };
    hello.check_hello()?;
    sink.send(Frame::hello(actor.path(), hello.header.sender().clone()))
        .await?;

    let (outbound, mut queue) = mpsc::unbounded_channel::<Frame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if let Err(e) = sink.send(frame).await {
                error!("Failed to write frame: {}", e);
                break;
            }
        }
    }.in_current_span());

    let result = loop {
        select! {
            _ = token.cancelled() => break Ok(()),
            next = frames.next() => {
                match next {
                    None => break Ok(()),
                    Some(Err(e)) => break Err(e),
                    Some(Ok(frame)) => {
                        if let Err(e) = dispatch(actor, frame, &outbound) {
                            break Err(e);
                        }
                    }
                }
            }
        }
    };
    writer.abort();
    result
}

/// Hands one inbound frame to the actor.
fn dispatch<A>(
    actor: &ActorRef<A>,
    frame: Frame,
    outbound: &mpsc::UnboundedSender<Frame>,
) -> Result<(), Error>
where
    A: Actor + Handler<A>,
    A::Message: Wire,
    A::Response: Wire,
{
    if frame.header.recipient() != &actor.path() {
        return Err(Error::Protocol(format!(
            "frame for {} reached the endpoint of {}",
            frame.header.recipient(),
            actor.path()
        )));
    }
    match frame.opcode {
        Opcode::Message => {
            let message: A::Message = from_payload(&frame.payload)?;
            actor.deliver(Envelope::from_parts(frame.header, message))
        }
        Opcode::Request => {
            let (id, body) = frame.split_id()?;
            let message: A::Message = from_payload(&body)?;
            let failure_header = frame.header.reply();
            let pending = actor.submit(Envelope::from_parts(frame.header, message))?;
            let outbound = outbound.clone();
            tokio::spawn(async move {
                let reply = match pending.wait(RequestTimeout::Infinite).await {
                    Ok(envelope) => {
                        let (header, response) = envelope.into_parts();
                        match to_payload(&response) {
                            Ok(body) => Frame::correlated(Opcode::Response, header, id, &body),
                            Err(e) => failure(failure_header, id, &e),
                        }
                    }
                    Err(e) => failure(failure_header, id, &e),
                };
                if outbound.send(reply).is_err() {
                    debug!("Connection gone, reply to request {} dropped.", id);
                }
            }.in_current_span());
            Ok(())
        }
        Opcode::Hello | Opcode::Response | Opcode::Failure => Err(Error::Protocol(
            format!("unexpected {:?} frame from a client", frame.opcode),
        )),
    }
}

fn failure(header: actor::Header, id: u64, error: &Error) -> Frame {
    let body = to_payload(error).unwrap_or_default();
    Frame::correlated(Opcode::Failure, header, id, &body)
}
