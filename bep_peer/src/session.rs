//! Session task: one spawned future per established connection.

use std::io;
use std::time::Duration;

use bep_proto::message::hello::HelloMessage;
use bep_proto::message::{CloseMessage, Message};
use bep_proto::{BepCodec, BepFrame, DEFAULT_MAX_PAYLOAD};
use futures::future::{self, Future, Loop};
use futures::stream::Stream;
use futures::sync::mpsc::{self, Receiver, Sender};
use futures::{Async, Poll, Sink};
use tokio_core::reactor::Handle;
use tokio_io::{AsyncRead, AsyncWrite};
use tokio_timer::{self, Timer};

use crate::future::{
    PersistentError, PersistentStream, RecurringTimeoutError, RecurringTimeoutStream,
};
use crate::hello;

const DEFAULT_HELLO_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_RX_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_TX_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_KEEPALIVE_MS: u64 = 60_000;
const DEFAULT_BUFFER_CAPACITY: usize = 32;

/// Timing and buffering knobs for a session.
#[derive(Copy, Clone, Debug)]
pub struct SessionConfig {
    hello_timeout: Duration,
    rx_timeout: Duration,
    tx_timeout: Duration,
    keepalive: Duration,
    buffer_capacity: usize,
    max_payload: usize,
}

impl SessionConfig {
    pub fn with_hello_timeout(mut self, timeout: Duration) -> SessionConfig {
        self.hello_timeout = timeout;
        self
    }

    pub fn with_rx_timeout(mut self, timeout: Duration) -> SessionConfig {
        self.rx_timeout = timeout;
        self
    }

    pub fn with_tx_timeout(mut self, timeout: Duration) -> SessionConfig {
        self.tx_timeout = timeout;
        self
    }

    pub fn with_keepalive(mut self, interval: Duration) -> SessionConfig {
        self.keepalive = interval;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> SessionConfig {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> SessionConfig {
        self.max_payload = max_payload;
        self
    }

    pub fn hello_timeout(&self) -> Duration {
        self.hello_timeout
    }

    pub fn rx_timeout(&self) -> Duration {
        self.rx_timeout
    }

    pub fn tx_timeout(&self) -> Duration {
        self.tx_timeout
    }

    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            hello_timeout: Duration::from_millis(DEFAULT_HELLO_TIMEOUT_MS),
            rx_timeout: Duration::from_millis(DEFAULT_RX_TIMEOUT_MS),
            tx_timeout: Duration::from_millis(DEFAULT_TX_TIMEOUT_MS),
            keepalive: Duration::from_millis(DEFAULT_KEEPALIVE_MS),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

//----------------------------------------------------------------------------//

/// Messages the session owner feeds into the session.
#[derive(Clone, Debug)]
pub enum ISessionMessage {
    /// Frame a message out to the peer.
    Send(BepFrame),
    /// Send a `Close` with the given reason and wind the session down.
    Shutdown(CloseMessage),
}

/// Messages the session reports back to its owner.
#[derive(Debug)]
pub enum OSessionMessage {
    /// Hello exchange finished; the session is up.
    Established(HelloMessage),
    /// A controlled message arrived (never a ping).
    Received(Message),
    /// The session ended in an orderly fashion; the reason is the
    /// peer's when it closed first, ours on local shutdown.
    Closed(Option<String>),
    /// Nothing was received within the rx timeout.
    TimedOut,
    /// The transport failed.
    Failed(io::Error),
}

/// Spawn a session task over a connected, authenticated byte stream.
///
/// Returns the channel pair its owner drives it through. The session
/// starts with the hello exchange; every later message is framed with
/// `BepCodec`.
pub fn spawn_session<T>(
    socket: T,
    local_hello: HelloMessage,
    config: SessionConfig,
    handle: &Handle,
) -> (Sender<ISessionMessage>, Receiver<OSessionMessage>)
where
    T: AsyncRead + AsyncWrite + 'static,
{
    let (i_send, i_recv) = mpsc::channel(config.buffer_capacity());
    let (o_send, o_recv) = mpsc::channel(config.buffer_capacity());

    let timer = tokio_timer::wheel().build();

    let task = timer
        .timeout(
            hello::exchange(socket, &local_hello).map_err(SessionError::Io),
            config.hello_timeout(),
        )
        .then(move |result| match result {
            Ok((socket, peer_hello)) => {
                Box::new(run_controlled(socket, peer_hello, config, timer, i_recv, o_send))
                    as Box<dyn Future<Item = (), Error = ()>>
            }
            Err(error) => report(o_send, error),
        });

    handle.spawn(task);

    (i_send, o_recv)
}

//----------------------------------------------------------------------------//

enum SessionError {
    Io(io::Error),
    HelloTimeout,
    TxTimeout,
    RxTimeout,
    Disconnected,
    OwnerGone,
    Closed(Option<String>),
}

impl<T> From<tokio_timer::TimeoutError<T>> for SessionError {
    fn from(error: tokio_timer::TimeoutError<T>) -> SessionError {
        match error {
            tokio_timer::TimeoutError::Timer(_, _) => {
                panic!("bep_peer: Timer Error In Session, Timer Capacity Is Probably Too Small...")
            }
            tokio_timer::TimeoutError::TimedOut(_) => SessionError::HelloTimeout,
        }
    }
}

/// Report a terminal session event to the owner and finish.
fn report(o_send: Sender<OSessionMessage>, error: SessionError) -> Box<dyn Future<Item = (), Error = ()>> {
    let message = match error {
        SessionError::Io(error) => OSessionMessage::Failed(error),
        SessionError::HelloTimeout => OSessionMessage::Failed(io::Error::new(
            io::ErrorKind::TimedOut,
            "Peer Did Not Complete Hello In Time",
        )),
        SessionError::TxTimeout => OSessionMessage::Failed(io::Error::new(
            io::ErrorKind::TimedOut,
            "Frame Could Not Be Sent In Time",
        )),
        SessionError::RxTimeout => OSessionMessage::TimedOut,
        SessionError::Disconnected => OSessionMessage::Closed(None),
        SessionError::OwnerGone => return Box::new(future::ok(())),
        SessionError::Closed(reason) => OSessionMessage::Closed(reason),
    };

    Box::new(o_send.send(message).map(|_| ()).map_err(|_| ()))
}

//----------------------------------------------------------------------------//

/// A single source of session events: owner commands, keepalive ticks,
/// and peer messages, so that the main loop is one match.
enum SessionEvent {
    Owner(ISessionMessage),
    KeepaliveTick,
    Peer(Message),
}

/// Adapts the owner channel: quiet periods surface as keepalive ticks,
/// a dropped owner ends the session silently.
struct OwnerEvents {
    inner: RecurringTimeoutStream<Receiver<ISessionMessage>>,
}

impl Stream for OwnerEvents {
    type Item = SessionEvent;
    type Error = SessionError;

    fn poll(&mut self) -> Poll<Option<SessionEvent>, SessionError> {
        match self.inner.poll() {
            Ok(Async::Ready(Some(message))) => Ok(Async::Ready(Some(SessionEvent::Owner(message)))),
            Ok(Async::Ready(None)) => Err(SessionError::OwnerGone),
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Err(RecurringTimeoutError::Timeout) => {
                Ok(Async::Ready(Some(SessionEvent::KeepaliveTick)))
            }
            Err(RecurringTimeoutError::Disconnect) => Err(SessionError::OwnerGone),
        }
    }
}

fn run_controlled<T>(
    socket: T,
    peer_hello: HelloMessage,
    config: SessionConfig,
    timer: Timer,
    i_recv: Receiver<ISessionMessage>,
    o_send: Sender<OSessionMessage>,
) -> impl Future<Item = (), Error = ()>
where
    T: AsyncRead + AsyncWrite + 'static,
{
    let framed = socket.framed(BepCodec::with_max_payload(config.max_payload()));
    let (p_send, p_recv) = framed.split();

    // Teardown (do not preserve) the peer stream when it goes quiet
    let p_stream = timer
        .timeout_stream(PersistentStream::new(p_recv), config.rx_timeout())
        .map(SessionEvent::Peer)
        .map_err(|error| match error {
            PersistentError::Disconnect => SessionError::Disconnected,
            PersistentError::Timeout => SessionError::RxTimeout,
            PersistentError::IoError(error) => SessionError::Io(error),
        });
    // Notify (but preserve) the owner stream when we have been quiet
    let m_stream = OwnerEvents {
        inner: RecurringTimeoutStream::new(i_recv, timer.clone(), config.keepalive()),
    };

    let events = m_stream.select(p_stream);
    let tx_timeout = config.tx_timeout();
    let final_send = o_send.clone();

    o_send
        .send(OSessionMessage::Established(peer_hello))
        .map_err(|_| SessionError::OwnerGone)
        .and_then(move |o_send| {
            future::loop_fn((events, o_send, p_send), move |(events, o_send, p_send)| {
                let timer = timer.clone();

                events.into_future().then(move |result| {
                    let (event, events) = match result {
                        Ok((Some(event), events)) => (event, events),
                        Ok((None, _)) => return boxed_err(SessionError::Disconnected),
                        Err((error, _)) => return boxed_err(error),
                    };

                    match event {
                        SessionEvent::Owner(ISessionMessage::Send(frame)) => Box::new(
                            send_frame(p_send, frame, &timer, tx_timeout).map(move |p_send| {
                                Loop::Continue((events, o_send, p_send))
                            }),
                        ),
                        SessionEvent::Owner(ISessionMessage::Shutdown(close)) => {
                            let reason = close.reason.clone();
                            let frame = BepFrame::from(Message::Close(close));

                            Box::new(send_frame(p_send, frame, &timer, tx_timeout).and_then(
                                move |_p_send| {
                                    future::err(SessionError::Closed(Some(reason)))
                                },
                            ))
                        }
                        SessionEvent::KeepaliveTick => {
                            debug!("session idle, sending keepalive ping");
                            let frame = BepFrame::from(Message::Ping);

                            Box::new(send_frame(p_send, frame, &timer, tx_timeout).map(
                                move |p_send| Loop::Continue((events, o_send, p_send)),
                            ))
                        }
                        SessionEvent::Peer(Message::Ping) => {
                            Box::new(future::ok(Loop::Continue((events, o_send, p_send))))
                        }
                        SessionEvent::Peer(Message::Close(close)) => {
                            Box::new(future::err(SessionError::Closed(Some(close.reason))))
                        }
                        SessionEvent::Peer(message) => Box::new(
                            o_send
                                .send(OSessionMessage::Received(message))
                                .map_err(|_| SessionError::OwnerGone)
                                .map(move |o_send| Loop::Continue((events, o_send, p_send))),
                        ),
                    }
                })
            })
        })
        .then(move |result: Result<(), SessionError>| match result {
            Ok(()) => Box::new(future::ok(())) as Box<dyn Future<Item = (), Error = ()>>,
            Err(error) => report(final_send, error),
        })
}

type LoopResult<S, O, P> = Box<dyn Future<Item = Loop<(), (S, O, P)>, Error = SessionError>>;

fn boxed_err<S, O, P>(error: SessionError) -> LoopResult<S, O, P>
where
    S: 'static,
    O: 'static,
    P: 'static,
{
    Box::new(future::err(error))
}

fn send_frame<S>(
    sink: S,
    frame: BepFrame,
    timer: &Timer,
    timeout: Duration,
) -> Box<dyn Future<Item = S, Error = SessionError>>
where
    S: Sink<SinkItem = BepFrame, SinkError = io::Error> + 'static,
{
    let send = sink.send(frame).map_err(SessionError::Io);

    Box::new(timer.timeout(send, timeout).map_err(|error| match error {
        SessionError::HelloTimeout => SessionError::TxTimeout,
        other => other,
    }))
}
