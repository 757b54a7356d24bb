//! Hello frame, the first message sent each way on a new session.
//!
//! The hello frame has its own magic-prefixed framing so that it can be
//! recognized before any session state exists: a 4 byte magic, a 2 byte
//! payload length, then the payload.

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use nom::{be_u16, be_u32, IResult};

use crate::message::{self, parse_string};

/// Magic constant announcing a BEP v1 hello frame.
pub const HELLO_MAGIC: u32 = 0x2EA7_D90B;

/// Length of the fixed hello frame header (magic + payload length).
pub const HELLO_HEADER_LEN: usize = 6;

/// First message exchanged on a connection, before any other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelloMessage {
    pub device_name: String,
    pub client_name: String,
    pub client_version: String,
}

impl HelloMessage {
    pub fn new<D, C, V>(device_name: D, client_name: C, client_version: V) -> HelloMessage
    where
        D: Into<String>,
        C: Into<String>,
        V: Into<String>,
    {
        HelloMessage {
            device_name: device_name.into(),
            client_name: client_name.into(),
            client_version: client_version.into(),
        }
    }

    /// Parse a complete hello frame (header plus payload).
    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], HelloMessage> {
        parse_hello(bytes)
    }

    /// Parse a hello payload whose header was already consumed.
    pub fn from_payload(bytes: &[u8]) -> io::Result<HelloMessage> {
        message::run_parser(bytes, parse_hello_payload)
    }

    /// Write a complete hello frame out to the given writer.
    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        writer.write_u32::<BigEndian>(HELLO_MAGIC)?;
        writer.write_u16::<BigEndian>(self.payload_size() as u16)?;

        self.write_payload(writer)
    }

    pub fn write_payload<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        message::write_string(&mut writer, &self.device_name)?;
        message::write_string(&mut writer, &self.client_name)?;
        message::write_string(&mut writer, &self.client_version)
    }

    pub fn payload_size(&self) -> usize {
        message::string_size(&self.device_name)
            + message::string_size(&self.client_name)
            + message::string_size(&self.client_version)
    }

    pub fn message_size(&self) -> usize {
        HELLO_HEADER_LEN + self.payload_size()
    }
}

named!(parse_hello_payload<HelloMessage>, do_parse!(
    device_name:    parse_string >>
    client_name:    parse_string >>
    client_version: parse_string >>
    (HelloMessage { device_name, client_name, client_version })
));

named!(parse_hello<HelloMessage>, do_parse!(
    verify!(be_u32, |magic| magic == HELLO_MAGIC) >>
    payload: length_bytes!(be_u16) >>
    hello:   expr_res!(HelloMessage::from_payload(payload)) >>
    (hello)
));

#[cfg(test)]
mod tests {
    use nom::IResult;

    use super::HelloMessage;

    #[test]
    fn positive_hello_round_trip() {
        let hello = HelloMessage::new("basement", "bep-rs", "0.1.0");

        let mut buffer = Vec::new();
        hello.write_bytes(&mut buffer).unwrap();
        assert_eq!(buffer.len(), hello.message_size());

        match HelloMessage::from_bytes(&buffer) {
            IResult::Done(rest, parsed) => {
                assert!(rest.is_empty());
                assert_eq!(hello, parsed);
            }
            _ => panic!("Failed To Parse Hello"),
        }
    }

    #[test]
    fn negative_bad_magic() {
        let hello = HelloMessage::new("basement", "bep-rs", "0.1.0");

        let mut buffer = Vec::new();
        hello.write_bytes(&mut buffer).unwrap();
        buffer[0] = buffer[0].wrapping_add(1);

        match HelloMessage::from_bytes(&buffer) {
            IResult::Done(..) => panic!("Parsed A Hello With Bad Magic"),
            _ => (),
        }
    }
}
