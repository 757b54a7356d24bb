extern crate bep_peer;
extern crate bep_proto;
extern crate futures;
extern crate tokio_core;

use std::time::Duration;

use bep_peer::{spawn_session, ISessionMessage, OSessionMessage, SessionConfig};
use bep_proto::message::hello::HelloMessage;
use bep_proto::message::{CloseMessage, IndexMessage, Message};
use bep_proto::BepFrame;
use futures::future::Future;
use futures::sink::Sink;
use futures::stream::Stream;
use futures::sync::mpsc::Receiver;
use tokio_core::net::{TcpListener, TcpStream};
use tokio_core::reactor::{Core, Timeout};

fn tcp_pair(core: &mut Core) -> (TcpStream, TcpStream) {
    let handle = core.handle();
    let listener = TcpListener::bind(&"127.0.0.1:0".parse().unwrap(), &handle).unwrap();
    let addr = listener.local_addr().unwrap();

    let accept = listener
        .incoming()
        .into_future()
        .map(|(stream, _)| stream.unwrap().0)
        .map_err(|_| ());
    let connect = TcpStream::connect(&addr, &handle).map_err(|_| ());

    core.run(accept.join(connect)).unwrap()
}

fn next_message(
    core: &mut Core,
    recv: Receiver<OSessionMessage>,
    timeout_ms: u64,
) -> (OSessionMessage, Receiver<OSessionMessage>) {
    let timeout = Timeout::new(Duration::from_millis(timeout_ms), &core.handle())
        .unwrap()
        .then(|_| Err(()));

    let (opt_message, recv) = core
        .run(recv.into_future().map_err(|_| ()).select(timeout).map(|(item, _)| item))
        .unwrap_or_else(|_| panic!("Session Message Timed Out"));

    (opt_message.expect("Session Stream Ended"), recv)
}

fn hello(name: &str) -> HelloMessage {
    HelloMessage::new(name, "bep-rs", "0.1.0")
}

#[test]
fn positive_establish_exchange_and_close() {
    let mut core = Core::new().unwrap();
    let (sock_a, sock_b) = tcp_pair(&mut core);
    let handle = core.handle();

    let config = SessionConfig::default();
    let (a_send, a_recv) = spawn_session(sock_a, hello("device-a"), config, &handle);
    let (_b_send, b_recv) = spawn_session(sock_b, hello("device-b"), config, &handle);

    // Both sides come up with the other's hello
    let (message, a_recv) = next_message(&mut core, a_recv, 2_000);
    match message {
        OSessionMessage::Established(peer) => assert_eq!("device-b", peer.device_name),
        other => panic!("Unexpected Message {:?}", other),
    }
    let (message, b_recv) = next_message(&mut core, b_recv, 2_000);
    match message {
        OSessionMessage::Established(peer) => assert_eq!("device-a", peer.device_name),
        other => panic!("Unexpected Message {:?}", other),
    }

    // A controlled message makes it across
    let index = Message::Index(IndexMessage {
        folder: "default".to_owned(),
        files: Vec::new(),
    });
    let a_send = core
        .run(a_send.send(ISessionMessage::Send(BepFrame::from(index.clone()))))
        .unwrap();

    let (message, b_recv) = next_message(&mut core, b_recv, 2_000);
    match message {
        OSessionMessage::Received(received) => assert_eq!(index, received),
        other => panic!("Unexpected Message {:?}", other),
    }

    // Local shutdown sends a close frame to the peer
    let _a_send = core
        .run(a_send.send(ISessionMessage::Shutdown(CloseMessage::new("done"))))
        .unwrap();

    let (message, _b_recv) = next_message(&mut core, b_recv, 2_000);
    match message {
        OSessionMessage::Closed(Some(reason)) => assert_eq!("done", reason),
        other => panic!("Unexpected Message {:?}", other),
    }

    let (message, _a_recv) = next_message(&mut core, a_recv, 2_000);
    match message {
        OSessionMessage::Closed(Some(reason)) => assert_eq!("done", reason),
        other => panic!("Unexpected Message {:?}", other),
    }
}

#[test]
fn negative_hello_timeout_fails_session() {
    let mut core = Core::new().unwrap();
    let (sock_a, _sock_b) = tcp_pair(&mut core);
    let handle = core.handle();

    let config = SessionConfig::default().with_hello_timeout(Duration::from_millis(100));
    let (_a_send, a_recv) = spawn_session(sock_a, hello("device-a"), config, &handle);

    let (message, _a_recv) = next_message(&mut core, a_recv, 2_000);
    match message {
        OSessionMessage::Failed(error) => {
            assert_eq!(::std::io::ErrorKind::TimedOut, error.kind())
        }
        other => panic!("Unexpected Message {:?}", other),
    }
}

#[test]
fn positive_keepalive_ping_resets_peer_rx() {
    let mut core = Core::new().unwrap();
    let (sock_a, sock_b) = tcp_pair(&mut core);
    let handle = core.handle();

    // A pings every 100ms; B tears down after 2s of silence. The pings
    // must keep B alive even though no controlled traffic flows.
    let a_config = SessionConfig::default().with_keepalive(Duration::from_millis(100));
    let b_config = SessionConfig::default().with_rx_timeout(Duration::from_millis(2_000));

    let (_a_send, _a_recv) = spawn_session(sock_a, hello("device-a"), a_config, &handle);
    let (_b_send, b_recv) = spawn_session(sock_b, hello("device-b"), b_config, &handle);

    let (message, b_recv) = next_message(&mut core, b_recv, 2_000);
    match message {
        OSessionMessage::Established(_) => (),
        other => panic!("Unexpected Message {:?}", other),
    }

    // No Closed/TimedOut may arrive while pings flow; wait out more
    // than the rx timeout
    let quiet = Timeout::new(Duration::from_millis(3_000), &core.handle())
        .unwrap()
        .map_err(|_| ());
    let outcome = core
        .run(
            b_recv
                .into_future()
                .map_err(|_| ())
                .map(|(message, _)| message)
                .select2(quiet),
        )
        .unwrap_or_else(|_| panic!("Core Loop Failed"));

    match outcome {
        futures::future::Either::A((message, _)) => {
            panic!("Unexpected Session Message {:?}", message)
        }
        futures::future::Either::B(_) => (),
    }
}
