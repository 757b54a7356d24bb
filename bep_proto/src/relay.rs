//! Relay protocol messages, used to reach peers behind NAT through a
//! third party relay server.
//!
//! Each message is a 12 byte header (magic, type, payload length, all
//! big-endian u32) followed by the payload. Strings and byte blobs are
//! u32 length prefixed; booleans are a full u32.

use std::io::{self, Write};
use std::str::FromStr;

use bep_util::device::DeviceId;
use byteorder::{BigEndian, WriteBytesExt};
use nom::{be_u32, IResult};
use url::Url;

use crate::message::{parse_blob, parse_string};

/// Magic constant prefixed to every relay message.
pub const RELAY_MAGIC: u32 = 0x9E79_BC40;

/// Length of the relay message header.
pub const RELAY_HEADER_LEN: usize = 12;

const PING_TYPE: u32 = 0;
const PONG_TYPE: u32 = 1;
const JOIN_RELAY_REQUEST_TYPE: u32 = 2;
const JOIN_SESSION_REQUEST_TYPE: u32 = 3;
const RESPONSE_TYPE: u32 = 4;
const CONNECT_REQUEST_TYPE: u32 = 5;
const SESSION_INVITATION_TYPE: u32 = 6;

/// Enumeration of relay protocol messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayMessage {
    Ping,
    Pong,
    JoinRelayRequest,
    JoinSessionRequest(JoinSessionRequest),
    Response(RelayResponse),
    ConnectRequest(ConnectRequest),
    SessionInvitation(SessionInvitation),
}

/// Request to join a previously invited session, keyed by the session key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinSessionRequest {
    pub key: Vec<u8>,
}

/// Status reply from the relay; code zero means success.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayResponse {
    pub code: u32,
    pub details: String,
}

/// Ask the relay to invite the given device into a session with us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    pub device_id: DeviceId,
}

/// Invitation to a relayed session with another device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInvitation {
    pub from: Vec<u8>,
    pub key: Vec<u8>,
    /// Address to connect to; empty means "reuse the relay's address".
    pub address: Vec<u8>,
    pub port: u32,
    pub server_socket: bool,
}

/// Result of feeding buffered bytes to the relay parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// More bytes are needed before a full message is available.
    Incomplete,
    /// The buffer does not hold a valid relay message.
    ProtocolError,
    /// A message and the total number of bytes it consumed.
    Wrapped(usize, RelayMessage),
}

impl RelayMessage {
    /// Serialize the message, returning the number of bytes written.
    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<usize>
    where
        W: Write,
    {
        let (message_type, payload) = match *self {
            RelayMessage::Ping => (PING_TYPE, Vec::new()),
            RelayMessage::Pong => (PONG_TYPE, Vec::new()),
            RelayMessage::JoinRelayRequest => (JOIN_RELAY_REQUEST_TYPE, Vec::new()),
            RelayMessage::JoinSessionRequest(ref message) => {
                let mut payload = Vec::new();
                write_blob(&mut payload, &message.key)?;

                (JOIN_SESSION_REQUEST_TYPE, payload)
            }
            RelayMessage::Response(ref message) => {
                let mut payload = Vec::new();
                payload.write_u32::<BigEndian>(message.code)?;
                write_blob(&mut payload, message.details.as_bytes())?;

                (RESPONSE_TYPE, payload)
            }
            RelayMessage::ConnectRequest(ref message) => {
                let mut payload = Vec::new();
                write_blob(&mut payload, message.device_id.as_ref())?;

                (CONNECT_REQUEST_TYPE, payload)
            }
            RelayMessage::SessionInvitation(ref message) => {
                let mut payload = Vec::new();
                write_blob(&mut payload, &message.from)?;
                write_blob(&mut payload, &message.key)?;
                write_blob(&mut payload, &message.address)?;
                payload.write_u32::<BigEndian>(message.port)?;
                payload.write_u32::<BigEndian>(if message.server_socket { 1 } else { 0 })?;

                (SESSION_INVITATION_TYPE, payload)
            }
        };

        writer.write_u32::<BigEndian>(RELAY_MAGIC)?;
        writer.write_u32::<BigEndian>(message_type)?;
        writer.write_u32::<BigEndian>(payload.len() as u32)?;
        writer.write_all(&payload)?;

        Ok(RELAY_HEADER_LEN + payload.len())
    }
}

/// Attempt to parse a relay message from the front of the given buffer.
pub fn parse(bytes: &[u8]) -> ParseResult {
    if bytes.len() < RELAY_HEADER_LEN {
        return ParseResult::Incomplete;
    }

    let header = match parse_header(bytes) {
        IResult::Done(_, header) => header,
        _ => return ParseResult::ProtocolError,
    };

    if header.magic != RELAY_MAGIC || header.message_type > SESSION_INVITATION_TYPE {
        return ParseResult::ProtocolError;
    }

    let total = RELAY_HEADER_LEN + header.length as usize;
    if bytes.len() < total {
        return ParseResult::Incomplete;
    }

    let payload = &bytes[RELAY_HEADER_LEN..total];
    let parsed = match header.message_type {
        PING_TYPE => IResult::Done(payload, RelayMessage::Ping),
        PONG_TYPE => IResult::Done(payload, RelayMessage::Pong),
        JOIN_RELAY_REQUEST_TYPE => IResult::Done(payload, RelayMessage::JoinRelayRequest),
        JOIN_SESSION_REQUEST_TYPE => parse_join_session(payload),
        RESPONSE_TYPE => parse_response(payload),
        CONNECT_REQUEST_TYPE => parse_connect_request(payload),
        SESSION_INVITATION_TYPE => parse_session_invitation(payload),
        _ => return ParseResult::ProtocolError,
    };

    match parsed {
        IResult::Done(_, message) => ParseResult::Wrapped(total, message),
        _ => ParseResult::ProtocolError,
    }
}

/// Extract the relay's device id from a `relay://` uri `id` parameter.
pub fn parse_relay_device(uri: &Url) -> Option<DeviceId> {
    uri.query_pairs()
        .find(|&(ref key, _)| key == "id")
        .and_then(|(_, value)| DeviceId::from_str(&value).ok())
}

// ----------------------------------------------------------------------------//

struct RelayHeader {
    magic: u32,
    message_type: u32,
    length: u32,
}

named!(parse_header<RelayHeader>, do_parse!(
    magic:        be_u32 >>
    message_type: be_u32 >>
    length:       be_u32 >>
    (RelayHeader { magic, message_type, length })
));

named!(parse_join_session<RelayMessage>, do_parse!(
    key: parse_blob >>
    (RelayMessage::JoinSessionRequest(JoinSessionRequest { key }))
));

named!(parse_response<RelayMessage>, do_parse!(
    code:    be_u32 >>
    details: parse_string >>
    (RelayMessage::Response(RelayResponse { code, details }))
));

named!(parse_connect_request<RelayMessage>, do_parse!(
    device_id: map_res!(length_bytes!(be_u32), DeviceId::from_hash) >>
    (RelayMessage::ConnectRequest(ConnectRequest { device_id }))
));

named!(parse_session_invitation<RelayMessage>, do_parse!(
    from:          parse_blob >>
    key:           parse_blob >>
    address:       parse_blob >>
    port:          be_u32 >>
    server_socket: map!(be_u32, |value| value != 0) >>
    (RelayMessage::SessionInvitation(SessionInvitation { from, key, address, port, server_socket }))
));

fn write_blob<W>(writer: &mut W, value: &[u8]) -> io::Result<()>
where
    W: Write,
{
    writer.write_u32::<BigEndian>(value.len() as u32)?;
    writer.write_all(value)
}
