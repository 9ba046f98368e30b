// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integration tests for context propagation between actor systems over TCP.

use actor::{
    Actor, ActorContext, ActorPath, ActorSystem, Error, Handler, Message,
    Recipient, RequestTimeout, Response, SystemRef, TextContextCodec,
};
use remote::{Frame, FrameCodec, RemoteConfig, RemoteHandle, RemoteRegistry};

use async_trait::async_trait;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_util::{
    codec::{Decoder, Encoder},
    sync::CancellationToken,
};
use tracing_test::traced_test;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

type Seen = Arc<Mutex<Vec<(String, String)>>>;

// Defines actor1: answers greetings and records the context they arrived with.
pub struct Actor1 {
    seen: Seen,
}

#[async_trait]
impl Actor for Actor1 {
    type Message = String;
    type Response = String;
}

#[async_trait]
impl Handler<Actor1> for Actor1 {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: String,
        ctx: &mut ActorContext<Actor1>,
    ) -> Result<String, Error> {
        self.seen
            .lock()
            .unwrap()
            .push((msg.clone(), ctx.tracing_context().to_string()));
        if msg == "fail" {
            return Err(Error::Functional("refused".to_owned()));
        }
        ctx.set_tracing_context("actor1 put this here");
        Ok(format!("Thanks for sending: \"{}\"!", msg))
    }
}

// Defines actor2: talks to actor1 through a remote handle.
pub struct Actor2 {
    actor1: RemoteHandle<Actor1>,
    outcome: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub enum Actor2Command {
    Greet,
    Notify(String),
    Outcome,
}

impl Message for Actor2Command {}

#[derive(Debug, Clone, PartialEq)]
pub enum Actor2Response {
    Done,
    Outcome(Option<(String, String)>),
}

impl Response for Actor2Response {}

#[async_trait]
impl Actor for Actor2 {
    type Message = Actor2Command;
    type Response = Actor2Response;
}

#[async_trait]
impl Handler<Actor2> for Actor2 {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: Actor2Command,
        ctx: &mut ActorContext<Actor2>,
    ) -> Result<Actor2Response, Error> {
        match msg {
            Actor2Command::Greet => {
                ctx.set_tracing_context("actor2 put this here");
                let reply = ctx
                    .ask(
                        &self.actor1,
                        "Hi, I'm actor2.".to_owned(),
                        RequestTimeout::Bounded(Duration::from_secs(5)),
                    )
                    .await?;
                self.outcome =
                    Some((reply, ctx.tracing_context().to_string()));
                Ok(Actor2Response::Done)
            }
            Actor2Command::Notify(text) => {
                ctx.set_tracing_context("notify ctx");
                ctx.tell(&self.actor1, text).await?;
                Ok(Actor2Response::Done)
            }
            Actor2Command::Outcome => {
                Ok(Actor2Response::Outcome(self.outcome.clone()))
            }
        }
    }
}

// Defines a slow actor used to hold requests open.
pub struct Sleeper;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nap(u64);

impl Message for Nap {}

#[async_trait]
impl Actor for Sleeper {
    type Message = Nap;
    type Response = String;
}

#[async_trait]
impl Handler<Sleeper> for Sleeper {
    async fn handle_message(
        &mut self,
        _sender: ActorPath,
        msg: Nap,
        _ctx: &mut ActorContext<Sleeper>,
    ) -> Result<String, Error> {
        tokio::time::sleep(Duration::from_millis(msg.0)).await;
        Ok("awake".to_owned())
    }
}

async fn system() -> SystemRef {
    let (system, mut runner) = ActorSystem::create(CancellationToken::new());
    tokio::spawn(async move { runner.run().await });
    system
}

async fn wait_for(seen: &Seen, count: usize) -> Vec<(String, String)> {
    for _ in 0..200 {
        {
            let seen = seen.lock().unwrap();
            if seen.len() >= count {
                return seen.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("actor1 did not receive {} messages", count);
}

async fn publish_sleeper(system: &SystemRef) -> (RemoteRegistry, u16) {
    let sleeper = system.create_root_actor("sleeper", Sleeper).await.unwrap();
    let registry = RemoteRegistry::new(system.clone());
    let endpoint = registry.publish(&sleeper, "127.0.0.1", 0).await.unwrap();
    (registry, endpoint.local_addr().port())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_context_crosses_systems() {
    let system_a = system().await;
    let system_b = system().await;
    let seen = Seen::default();

    let actor1 = system_a
        .create_root_actor("actor1", Actor1 { seen: seen.clone() })
        .await
        .unwrap();
    let registry_a = RemoteRegistry::new(system_a.clone());
    let endpoint = registry_a.publish(&actor1, "0.0.0.0", 1337).await.unwrap();
    assert_eq!(endpoint.local_addr().port(), 1337);

    let registry_b = RemoteRegistry::new(system_b.clone());
    let handle: RemoteHandle<Actor1> =
        registry_b.connect("127.0.0.1", 1337).await.unwrap();
    assert_eq!(handle.path(), ActorPath::from("/user/actor1"));

    let actor2 = system_b
        .create_root_actor(
            "actor2",
            Actor2 {
                actor1: handle,
                outcome: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        actor2.ask(Actor2Command::Greet).await.unwrap(),
        Actor2Response::Done
    );
    assert_eq!(
        wait_for(&seen, 1).await,
        vec![(
            "Hi, I'm actor2.".to_owned(),
            "actor2 put this here".to_owned()
        )]
    );
    assert_eq!(
        actor2.ask(Actor2Command::Outcome).await.unwrap(),
        Actor2Response::Outcome(Some((
            "Thanks for sending: \"Hi, I'm actor2.\"!".to_owned(),
            "actor1 put this here".to_owned()
        )))
    );

    actor2
        .tell(Actor2Command::Notify("fire and forget".to_owned()))
        .await
        .unwrap();
    assert_eq!(
        wait_for(&seen, 2).await[1],
        ("fire and forget".to_owned(), "notify ctx".to_owned())
    );

    registry_a.unpublish(&actor1.path()).await;
}

#[tokio::test]
async fn test_remote_failure_reaches_requester() {
    let system_a = system().await;
    let actor1 = system_a
        .create_root_actor(
            "actor1",
            Actor1 {
                seen: Seen::default(),
            },
        )
        .await
        .unwrap();
    let registry = RemoteRegistry::new(system_a.clone());
    let port = registry
        .publish(&actor1, "127.0.0.1", 0)
        .await
        .unwrap()
        .local_addr()
        .port();

    let handle: RemoteHandle<Actor1> = RemoteRegistry::new(system().await)
        .connect("127.0.0.1", port)
        .await
        .unwrap();
    let result = handle
        .ask("fail".to_owned(), RequestTimeout::Bounded(Duration::from_secs(2)))
        .await;
    assert_eq!(result, Err(Error::Functional("refused".to_owned())));

    // The connection survives a failed request.
    let reply = handle
        .ask("again".to_owned(), RequestTimeout::Infinite)
        .await
        .unwrap();
    assert_eq!(reply, "Thanks for sending: \"again\"!");
}

#[tokio::test]
async fn test_remote_request_times_out() {
    let system_a = system().await;
    let (_registry, port) = publish_sleeper(&system_a).await;

    let handle: RemoteHandle<Sleeper> = RemoteRegistry::new(system().await)
        .connect("127.0.0.1", port)
        .await
        .unwrap();
    let result = handle
        .ask(Nap(2_000), RequestTimeout::Bounded(Duration::from_millis(100)))
        .await;
    assert_eq!(result, Err(Error::Timeout(100)));
    assert_eq!(handle.pending_requests(), 0);
}

#[tokio::test]
async fn test_unpublish_fails_pending_requests() {
    let system_a = system().await;
    let (registry, port) = publish_sleeper(&system_a).await;
    let path = ActorPath::from("/user/sleeper");
    assert_eq!(registry.published(&path).await.len(), 1);

    let handle: RemoteHandle<Sleeper> = RemoteRegistry::new(system().await)
        .connect("127.0.0.1", port)
        .await
        .unwrap();
    let waiting = handle.clone();
    let request = tokio::spawn(async move {
        waiting.ask(Nap(5_000), RequestTimeout::Infinite).await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.pending_requests(), 1);

    assert_eq!(registry.unpublish(&path).await, 1);
    assert!(registry.published(&path).await.is_empty());

    let result = tokio::time::timeout(Duration::from_secs(2), request)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(Error::Closed(_))));
    assert!(handle.is_closed());
    assert!(matches!(
        handle.tell(Nap(1)).await,
        Err(Error::Closed(_))
    ));
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = RemoteRegistry::new(system().await)
        .connect::<Sleeper>("127.0.0.1", port)
        .await;
    assert!(matches!(result, Err(Error::Connect(_))));
}

#[tokio::test]
async fn test_publish_on_used_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let system = system().await;
    let sleeper = system.create_root_actor("sleeper", Sleeper).await.unwrap();
    let registry = RemoteRegistry::new(system);
    let result = registry.publish(&sleeper, "127.0.0.1", port).await;
    assert!(matches!(result, Err(Error::Publish(_))));
    assert!(registry.published(&sleeper.path()).await.is_empty());
}

#[tokio::test]
async fn test_connect_to_foreign_protocol() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let result = RemoteRegistry::new(system().await)
        .connect::<Sleeper>("127.0.0.1", port)
        .await;
    assert!(matches!(result, Err(Error::Connect(_))));
}

// Opens a raw connection to an endpoint and completes the handshake by hand.
async fn raw_session(port: u16) -> (TcpStream, Frame) {
    let mut codec = FrameCodec::new(Arc::new(TextContextCodec), 1024);
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut out = BytesMut::new();
    codec
        .encode(
            Frame::hello(ActorPath::anonymous(), ActorPath::anonymous()),
            &mut out,
        )
        .unwrap();
    stream.write_all(&out).await.unwrap();

    let mut inbound = BytesMut::new();
    let hello = loop {
        if let Some(frame) = codec.decode(&mut inbound).unwrap() {
            break frame;
        }
        assert!(stream.read_buf(&mut inbound).await.unwrap() > 0);
    };
    (stream, hello)
}

// Waits until the server closes `stream`.
async fn closed_by_server(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}

#[tokio::test]
#[traced_test]
async fn test_unknown_opcode_closes_connection() {
    let system_a = system().await;
    let (_registry, port) = publish_sleeper(&system_a).await;

    let (mut stream, hello) = raw_session(port).await;
    hello.check_hello().unwrap();
    assert_eq!(hello.header.sender(), &ActorPath::from("/user/sleeper"));

    stream.write_all(&[0, 0, 0, 1, 0x7f]).await.unwrap();
    assert!(closed_by_server(&mut stream).await);
    assert!(logs_contain("unknown opcode 0x7f"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[traced_test]
async fn test_bad_connections_leave_others_working() {
    let system_a = system().await;
    let actor1 = system_a
        .create_root_actor(
            "actor1",
            Actor1 {
                seen: Seen::default(),
            },
        )
        .await
        .unwrap();
    let registry = RemoteRegistry::new(system_a.clone());
    let port = registry
        .publish(&actor1, "127.0.0.1", 0)
        .await
        .unwrap()
        .local_addr()
        .port();

    let handle: RemoteHandle<Actor1> = RemoteRegistry::new(system().await)
        .connect("127.0.0.1", port)
        .await
        .unwrap();
    assert_eq!(
        handle
            .ask("before".to_owned(), RequestTimeout::Infinite)
            .await
            .unwrap(),
        "Thanks for sending: \"before\"!"
    );

    let (mut unknown, _) = raw_session(port).await;
    unknown.write_all(&[0, 0, 0, 1, 0x7f]).await.unwrap();
    assert!(closed_by_server(&mut unknown).await);

    // Length prefix announces 100 bytes, only 10 arrive before EOF.
    let (mut truncated, _) = raw_session(port).await;
    truncated.write_all(&[0, 0, 0, 100]).await.unwrap();
    truncated.write_all(&[1; 10]).await.unwrap();
    truncated.shutdown().await.unwrap();
    assert!(closed_by_server(&mut truncated).await);
    assert!(logs_contain("truncated frame"));

    assert!(!handle.is_closed());
    assert_eq!(
        handle
            .ask("after".to_owned(), RequestTimeout::Bounded(Duration::from_secs(2)))
            .await
            .unwrap(),
        "Thanks for sending: \"after\"!"
    );
}

#[tokio::test]
async fn test_queued_tells_survive_dropping_the_handle() {
    let system_a = system().await;
    let seen = Seen::default();
    let actor1 = system_a
        .create_root_actor("actor1", Actor1 { seen: seen.clone() })
        .await
        .unwrap();
    let registry = RemoteRegistry::new(system_a.clone());
    let port = registry
        .publish(&actor1, "127.0.0.1", 0)
        .await
        .unwrap()
        .local_addr()
        .port();

    let handle: RemoteHandle<Actor1> = RemoteRegistry::new(system().await)
        .connect("127.0.0.1", port)
        .await
        .unwrap();
    for i in 0..50 {
        handle.tell(format!("note {}", i)).await.unwrap();
    }
    drop(handle);

    let received: Vec<String> = wait_for(&seen, 50)
        .await
        .into_iter()
        .map(|(text, _)| text)
        .collect();
    let expected: Vec<String> = (0..50).map(|i| format!("note {}", i)).collect();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_abandoned_request_is_forgotten() {
    let system_a = system().await;
    let (_registry, port) = publish_sleeper(&system_a).await;

    let handle: RemoteHandle<Sleeper> = RemoteRegistry::new(system().await)
        .connect("127.0.0.1", port)
        .await
        .unwrap();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        handle.ask(Nap(2_000), RequestTimeout::Infinite),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(handle.pending_requests(), 0);
    assert!(!handle.is_closed());
}

#[tokio::test]
async fn test_stopping_system_closes_outbound_connections() {
    let system_a = system().await;
    let (_registry, port) = publish_sleeper(&system_a).await;

    let system_b = system().await;
    let handle: RemoteHandle<Sleeper> = RemoteRegistry::new(system_b.clone())
        .connect("127.0.0.1", port)
        .await
        .unwrap();
    system_b.stop_system();

    for _ in 0..200 {
        if handle.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(handle.is_closed());
    assert!(matches!(handle.tell(Nap(1)).await, Err(Error::Closed(_))));
}

#[tokio::test]
async fn test_unpublish_closes_connection_before_handshake() {
    let system_a = system().await;
    let (registry, port) = publish_sleeper(&system_a).await;

    let mut silent = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        registry.unpublish(&ActorPath::from("/user/sleeper")).await,
        1
    );
    assert!(closed_by_server(&mut silent).await);
}

#[tokio::test]
#[traced_test]
async fn test_silent_peer_is_dropped_after_handshake_timeout() {
    let system_a = system().await;
    let sleeper = system_a.create_root_actor("sleeper", Sleeper).await.unwrap();
    let registry = RemoteRegistry::with_config(
        system_a.clone(),
        RemoteConfig {
            connect_timeout: Duration::from_millis(200),
            ..RemoteConfig::default()
        },
    );
    let port = registry
        .publish(&sleeper, "127.0.0.1", 0)
        .await
        .unwrap()
        .local_addr()
        .port();

    let mut silent = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    assert!(closed_by_server(&mut silent).await);
    assert!(logs_contain("no handshake within 200 ms"));
}
