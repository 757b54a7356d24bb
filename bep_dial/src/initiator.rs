//! One connection attempt to one peer, across every dialable uri.
//!
//! Uris are tried in order (relay entries first, ties lexicographic);
//! each attempt resolves, connects, and runs the BEP TLS handshake,
//! after which the certificate-derived device id must match the dialed
//! peer. Relay uris go through the connect-request / session-invitation
//! dance before the peer handshake runs over the relayed socket.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use bep_proto::relay::{
    self, ConnectRequest, JoinSessionRequest, RelayMessage, SessionInvitation,
};
use bep_util::device::DeviceId;
use bytes::BytesMut;
use futures::future::{self, Future, Loop};
use tokio_core::net::TcpStream;
use tokio_core::reactor::Handle;
use tokio_io::io::{read, write_all};
use tokio_io::{AsyncRead, AsyncWrite};
use tokio_timer::{self, Timer};
use url::Url;

use crate::error::{DialError, DialErrorKind};
use crate::resolver::Resolver;
use crate::transport::{PeerStream, TlsContext};

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_TCP_PORT: u16 = 22000;
const RELAY_READ_CHUNK: usize = 1_400;

/// Knobs for one connection attempt.
#[derive(Clone)]
pub struct InitiatorConfig {
    pub connect_timeout: Duration,
    pub relay_enabled: bool,
}

impl Default for InitiatorConfig {
    fn default() -> InitiatorConfig {
        InitiatorConfig {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            relay_enabled: true,
        }
    }
}

/// A connected, authenticated stream to the dialed peer.
pub struct Established {
    pub stream: PeerStream,
    pub peer: DeviceId,
    pub proto: &'static str,
}

impl<T> From<tokio_timer::TimeoutError<T>> for DialError {
    fn from(error: tokio_timer::TimeoutError<T>) -> DialError {
        match error {
            tokio_timer::TimeoutError::Timer(_, _) => {
                panic!("bep_dial: Timer Error In Initiator, Timer Capacity Is Probably Too Small...")
            }
            tokio_timer::TimeoutError::TimedOut(_) => DialErrorKind::Timeout.into(),
        }
    }
}

/// Attempt to reach the peer over the given uris.
///
/// Passing a pre-existing socket runs the server side of the handshake
/// over it instead (passive mode); passing a relay session key joins
/// the already invited relay session at the first uri.
pub fn initiate(
    expected: DeviceId,
    uris: Vec<Url>,
    passive_socket: Option<TcpStream>,
    relay_key: Option<Vec<u8>>,
    resolver: Resolver,
    tls: TlsContext,
    config: InitiatorConfig,
    handle: Handle,
) -> Box<dyn Future<Item = Established, Error = DialError>> {
    let timer = tokio_timer::wheel().build();

    if let Some(socket) = passive_socket {
        let attempt = tls.accept(socket).and_then(move |stream| {
            let peer = stream.verify_device_id(&expected)?;

            Ok(Established {
                stream,
                peer,
                proto: "tcp",
            })
        });

        return Box::new(timer.timeout(attempt, config.connect_timeout));
    }

    if let Some(key) = relay_key {
        let uri = match uris.into_iter().next() {
            Some(uri) => uri,
            None => return Box::new(future::err(DialErrorKind::ConnectionImpossible.into())),
        };
        let attempt = join_invited_session(expected, uri, key, resolver, tls, handle);

        return Box::new(timer.timeout(attempt, config.connect_timeout));
    }

    let sorted = sort_uris(uris, config.relay_enabled);
    if sorted.is_empty() {
        return Box::new(future::err(DialErrorKind::ConnectionImpossible.into()));
    }

    let connect_timeout = config.connect_timeout;
    Box::new(future::loop_fn(
        (VecDeque::from(sorted), expected, resolver, tls, handle, timer),
        move |(mut remaining, expected, resolver, tls, handle, timer)| {
            let uri = match remaining.pop_front() {
                Some(uri) => uri,
                None => {
                    return Box::new(future::err(DialError::from(
                        DialErrorKind::ConnectionImpossible,
                    )))
                        as Box<dyn Future<Item = _, Error = DialError>>
                }
            };

            debug!("trying '{}' for {:?}", uri, expected);
            let attempt = timer.timeout(
                attempt_uri(
                    uri.clone(),
                    expected,
                    resolver.clone(),
                    tls.clone(),
                    handle.clone(),
                ),
                connect_timeout,
            );

            Box::new(attempt.then(move |result| match result {
                Ok(established) => Ok(Loop::Break(established)),
                Err(error) => {
                    info!("attempt via '{}' failed: {}", uri, error);

                    Ok(Loop::Continue((
                        remaining, expected, resolver, tls, handle, timer,
                    )))
                }
            }))
        },
    ))
}

/// Sort dialable uris: relay entries first, ties in lexicographic
/// order of the full uri.
fn sort_uris(uris: Vec<Url>, relay_enabled: bool) -> Vec<Url> {
    let mut kept: Vec<Url> = uris
        .into_iter()
        .filter(|uri| match uri.scheme() {
            "tcp" => true,
            "relay" => {
                if !relay_enabled {
                    debug!("'relay' is not enabled, skipping '{}'", uri);
                }
                relay_enabled
            }
            scheme => {
                debug!("unsupported scheme '{}' in '{}'", scheme, uri);
                false
            }
        })
        .collect();

    kept.sort_by(|left, right| {
        let left_relay = left.scheme() == "relay";
        let right_relay = right.scheme() == "relay";

        right_relay
            .cmp(&left_relay)
            .then_with(|| left.as_str().cmp(right.as_str()))
    });

    kept
}

fn attempt_uri(
    uri: Url,
    expected: DeviceId,
    resolver: Resolver,
    tls: TlsContext,
    handle: Handle,
) -> Box<dyn Future<Item = Established, Error = DialError>> {
    match uri.scheme() {
        "tcp" => attempt_tcp(uri, expected, resolver, tls, handle),
        "relay" => attempt_relay(uri, expected, resolver, tls, handle),
        _ => Box::new(future::err(
            DialErrorKind::UnparsableUri {
                uri: uri.into_string(),
            }
            .into(),
        )),
    }
}

fn attempt_tcp(
    uri: Url,
    expected: DeviceId,
    resolver: Resolver,
    tls: TlsContext,
    handle: Handle,
) -> Box<dyn Future<Item = Established, Error = DialError>> {
    Box::new(
        connect_uri(&uri, resolver, handle)
            .and_then(move |socket| tls.connect(socket))
            .and_then(move |stream| {
                let peer = stream.verify_device_id(&expected)?;

                Ok(Established {
                    stream,
                    peer,
                    proto: "tcp",
                })
            }),
    )
}

/// Resolve the uri's host and race through its addresses in order.
fn connect_uri(
    uri: &Url,
    resolver: Resolver,
    handle: Handle,
) -> Box<dyn Future<Item = TcpStream, Error = DialError>> {
    let host = match uri.host_str() {
        Some(host) => host.to_owned(),
        None => {
            return Box::new(future::err(
                DialErrorKind::UnparsableUri {
                    uri: uri.as_str().to_owned(),
                }
                .into(),
            ))
        }
    };
    let port = uri.port().unwrap_or(DEFAULT_TCP_PORT);

    Box::new(
        resolver
            .resolve(&host, port)
            .map_err(DialError::from)
            .and_then(move |addrs| connect_any(addrs, handle)),
    )
}

fn connect_any(
    addrs: Vec<SocketAddr>,
    handle: Handle,
) -> Box<dyn Future<Item = TcpStream, Error = DialError>> {
    Box::new(future::loop_fn(
        (VecDeque::from(addrs), handle),
        |(mut remaining, handle)| {
            let addr = match remaining.pop_front() {
                Some(addr) => addr,
                None => {
                    return Box::new(future::err(DialError::from(
                        DialErrorKind::ConnectionImpossible,
                    )))
                        as Box<dyn Future<Item = _, Error = DialError>>
                }
            };

            Box::new(
                TcpStream::connect(&addr, &handle).then(move |result| match result {
                    Ok(socket) => Ok(Loop::Break(socket)),
                    Err(error) => {
                        debug!("connect to {} failed: {}", addr, error);

                        Ok(Loop::Continue((remaining, handle)))
                    }
                }),
            )
        },
    ))
}

//----------------------------------------------------------------------------//

fn attempt_relay(
    uri: Url,
    expected: DeviceId,
    resolver: Resolver,
    tls: TlsContext,
    handle: Handle,
) -> Box<dyn Future<Item = Established, Error = DialError>> {
    let relay_device = match relay::parse_relay_device(&uri) {
        Some(device) => device,
        None => {
            return Box::new(future::err(
                DialErrorKind::UnparsableUri {
                    uri: uri.into_string(),
                }
                .into(),
            ))
        }
    };

    let relay_host = match uri.host_str() {
        Some(host) => host.to_owned(),
        None => {
            return Box::new(future::err(
                DialErrorKind::UnparsableUri {
                    uri: uri.into_string(),
                }
                .into(),
            ))
        }
    };

    let session_resolver = resolver.clone();
    let session_tls = tls.clone();
    let session_handle = handle.clone();

    Box::new(
        connect_uri(&uri, resolver, handle)
            .and_then(move |socket| tls.connect(socket))
            .and_then(move |stream| {
                stream.verify_device_id(&relay_device)?;

                Ok(stream)
            })
            .and_then(move |stream| {
                let request = RelayMessage::ConnectRequest(ConnectRequest {
                    device_id: expected,
                });

                send_relay(stream, request)
                    .and_then(|stream| await_invitation(stream, BytesMut::new()))
            })
            .and_then(move |invitation| {
                let host = if invitation.address.is_empty() {
                    relay_host
                } else {
                    String::from_utf8(invitation.address.clone()).map_err(|_| {
                        DialError::from(DialErrorKind::RelayFailure {
                            detail: "Invitation Address Is Not Utf8".to_owned(),
                        })
                    })?
                };

                Ok((host, invitation))
            })
            .and_then(move |(host, invitation)| {
                join_session(
                    expected,
                    host,
                    invitation,
                    session_resolver,
                    session_tls,
                    session_handle,
                )
            }),
    )
}

/// Join a relay session we were invited into, then run the peer
/// handshake over the relayed socket.
fn join_session(
    expected: DeviceId,
    host: String,
    invitation: SessionInvitation,
    resolver: Resolver,
    tls: TlsContext,
    handle: Handle,
) -> Box<dyn Future<Item = Established, Error = DialError>> {
    let server_socket = invitation.server_socket;

    Box::new(
        resolver
            .resolve(&host, invitation.port as u16)
            .map_err(DialError::from)
            .and_then(move |addrs| connect_any(addrs, handle))
            .and_then(move |socket| {
                let join = RelayMessage::JoinSessionRequest(JoinSessionRequest {
                    key: invitation.key,
                });

                send_relay(socket, join).and_then(|socket| await_response(socket, BytesMut::new()))
            })
            .and_then(move |socket| {
                // The invitation tells us which side of the relayed
                // session speaks first in the TLS handshake
                if server_socket {
                    tls.accept(socket)
                } else {
                    tls.connect(socket)
                }
            })
            .and_then(move |stream| {
                let peer = stream.verify_device_id(&expected)?;

                Ok(Established {
                    stream,
                    peer,
                    proto: "relay",
                })
            }),
    )
}

/// Join an already invited session: the caller got the key out of a
/// listener-side invitation, the uri names the session endpoint.
fn join_invited_session(
    expected: DeviceId,
    uri: Url,
    key: Vec<u8>,
    resolver: Resolver,
    tls: TlsContext,
    handle: Handle,
) -> Box<dyn Future<Item = Established, Error = DialError>> {
    let invitation = SessionInvitation {
        from: Vec::new(),
        key,
        address: uri.host_str().map(|host| host.as_bytes().to_vec()).unwrap_or_default(),
        port: uri.port().unwrap_or(DEFAULT_TCP_PORT) as u32,
        server_socket: true,
    };
    let host = match uri.host_str() {
        Some(host) => host.to_owned(),
        None => {
            return Box::new(future::err(
                DialErrorKind::UnparsableUri {
                    uri: uri.into_string(),
                }
                .into(),
            ))
        }
    };

    join_session(expected, host, invitation, resolver, tls, handle)
}

//----------------------------------------------------------------------------//

fn send_relay<S>(stream: S, message: RelayMessage) -> Box<dyn Future<Item = S, Error = DialError>>
where
    S: AsyncRead + AsyncWrite + 'static,
{
    let mut buffer = Vec::new();
    message
        .write_bytes(&mut buffer)
        .expect("bep_dial: Failed To Serialize Relay Message Into Memory");

    Box::new(
        write_all(stream, buffer)
            .map(|(stream, _)| stream)
            .map_err(DialError::from),
    )
}

/// Read relay messages until a session invitation shows up.
///
/// Status responses with a zero code and keepalive pings are skipped;
/// anything else is a relay failure.
fn await_invitation<S>(
    stream: S,
    buffer: BytesMut,
) -> Box<dyn Future<Item = SessionInvitation, Error = DialError>>
where
    S: AsyncRead + AsyncWrite + 'static,
{
    Box::new(future::loop_fn((stream, buffer), |(stream, buffer)| {
        recv_relay(stream, buffer).and_then(|(stream, buffer, message)| match message {
            RelayMessage::SessionInvitation(invitation) => Ok(Loop::Break(invitation)),
            RelayMessage::Ping | RelayMessage::Pong => Ok(Loop::Continue((stream, buffer))),
            RelayMessage::Response(ref response) if response.code == 0 => {
                Ok(Loop::Continue((stream, buffer)))
            }
            RelayMessage::Response(response) => Err(DialErrorKind::RelayFailure {
                detail: response.details,
            }
            .into()),
            other => Err(DialErrorKind::RelayFailure {
                detail: format!("Unexpected Relay Message {:?}", other),
            }
            .into()),
        })
    }))
}

/// Read relay messages until a success response confirms the join.
fn await_response<S>(stream: S, buffer: BytesMut) -> Box<dyn Future<Item = S, Error = DialError>>
where
    S: AsyncRead + AsyncWrite + 'static,
{
    Box::new(future::loop_fn((stream, buffer), |(stream, buffer)| {
        recv_relay(stream, buffer).and_then(|(stream, buffer, message)| match message {
            RelayMessage::Response(ref response) if response.code == 0 => Ok(Loop::Break(stream)),
            RelayMessage::Response(response) => Err(DialErrorKind::RelayFailure {
                detail: response.details,
            }
            .into()),
            RelayMessage::Ping | RelayMessage::Pong => Ok(Loop::Continue((stream, buffer))),
            other => Err(DialErrorKind::RelayFailure {
                detail: format!("Unexpected Relay Message {:?}", other),
            }
            .into()),
        })
    }))
}

/// Read one relay message off the stream, buffering partial frames.
fn recv_relay<S>(
    stream: S,
    buffer: BytesMut,
) -> Box<dyn Future<Item = (S, BytesMut, RelayMessage), Error = DialError>>
where
    S: AsyncRead + 'static,
{
    Box::new(future::loop_fn((stream, buffer), |(stream, mut buffer)| {
        match relay::parse(&buffer) {
            relay::ParseResult::Wrapped(consumed, message) => {
                let _ = buffer.split_to(consumed);

                return Box::new(future::ok(Loop::Break((stream, buffer, message))))
                    as Box<dyn Future<Item = _, Error = DialError>>;
            }
            relay::ParseResult::ProtocolError => {
                return Box::new(future::err(
                    DialErrorKind::RelayFailure {
                        detail: "Relay Sent An Unparsable Message".to_owned(),
                    }
                    .into(),
                ));
            }
            relay::ParseResult::Incomplete => (),
        }

        Box::new(
            read(stream, vec![0u8; RELAY_READ_CHUNK])
                .map_err(DialError::from)
                .and_then(move |(stream, chunk, count)| {
                    if count == 0 {
                        return Err(DialErrorKind::RelayFailure {
                            detail: "Relay Closed The Connection".to_owned(),
                        }
                        .into());
                    }
                    buffer.extend_from_slice(&chunk[..count]);

                    Ok(Loop::Continue((stream, buffer)))
                }),
        )
    }))
}
