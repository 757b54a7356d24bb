//! BEP wire message parsing and serializing.
//!
//! Every frame is a 4 byte big-endian length, a 1 byte message type, a
//! 1 byte compression flag, and the payload. The hello frame is the one
//! exception, recognized by its magic constant before any session state
//! exists (see the `hello` module).

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use nom::{be_u32, be_u8, IResult};

pub mod hello;

mod file_info;
mod standard;

pub use self::file_info::{BlockInfo, Counter, FileInfo, FileInfoType, Version};
pub use self::hello::HelloMessage;
pub use self::standard::{
    ClusterConfigMessage, CloseMessage, DeviceEntry, DownloadProgressMessage, ErrorCode,
    FolderEntry, IndexMessage, ProgressUpdate, RequestMessage, ResponseMessage,
};

pub const CLUSTER_CONFIG_MESSAGE_ID: u8 = 0;
pub const INDEX_MESSAGE_ID: u8 = 1;
pub const INDEX_UPDATE_MESSAGE_ID: u8 = 2;
pub const REQUEST_MESSAGE_ID: u8 = 3;
pub const RESPONSE_MESSAGE_ID: u8 = 4;
pub const DOWNLOAD_PROGRESS_MESSAGE_ID: u8 = 5;
pub const PING_MESSAGE_ID: u8 = 6;
pub const CLOSE_MESSAGE_ID: u8 = 7;

/// Compression preference advertised per device.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Compression {
    Never,
    Metadata,
    Always,
}

impl Compression {
    pub fn from_u8(value: u8) -> Result<Compression, u8> {
        match value {
            0 => Ok(Compression::Never),
            1 => Ok(Compression::Metadata),
            2 => Ok(Compression::Always),
            other => Err(other),
        }
    }

    pub fn to_u8(&self) -> u8 {
        match *self {
            Compression::Never => 0,
            Compression::Metadata => 1,
            Compression::Always => 2,
        }
    }
}

/// Enumeration of controlled BEP messages (everything after hello).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    ClusterConfig(ClusterConfigMessage),
    Index(IndexMessage),
    IndexUpdate(IndexMessage),
    Request(RequestMessage),
    Response(ResponseMessage),
    DownloadProgress(DownloadProgressMessage),
    Ping,
    Close(CloseMessage),
}

impl Message {
    /// Parse a message from its type id and payload bytes.
    pub fn from_parts(message_id: u8, payload: &[u8]) -> io::Result<Message> {
        match message_id {
            CLUSTER_CONFIG_MESSAGE_ID => {
                run_parser(payload, ClusterConfigMessage::from_bytes).map(Message::ClusterConfig)
            }
            INDEX_MESSAGE_ID => run_parser(payload, IndexMessage::from_bytes).map(Message::Index),
            INDEX_UPDATE_MESSAGE_ID => {
                run_parser(payload, IndexMessage::from_bytes).map(Message::IndexUpdate)
            }
            REQUEST_MESSAGE_ID => {
                run_parser(payload, RequestMessage::from_bytes).map(Message::Request)
            }
            RESPONSE_MESSAGE_ID => {
                run_parser(payload, ResponseMessage::from_bytes).map(Message::Response)
            }
            DOWNLOAD_PROGRESS_MESSAGE_ID => {
                run_parser(payload, DownloadProgressMessage::from_bytes)
                    .map(Message::DownloadProgress)
            }
            PING_MESSAGE_ID => Ok(Message::Ping),
            CLOSE_MESSAGE_ID => run_parser(payload, CloseMessage::from_bytes).map(Message::Close),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unrecognized BEP Message Id {}", other),
            )),
        }
    }

    /// Type id of the message.
    pub fn message_id(&self) -> u8 {
        match *self {
            Message::ClusterConfig(_) => CLUSTER_CONFIG_MESSAGE_ID,
            Message::Index(_) => INDEX_MESSAGE_ID,
            Message::IndexUpdate(_) => INDEX_UPDATE_MESSAGE_ID,
            Message::Request(_) => REQUEST_MESSAGE_ID,
            Message::Response(_) => RESPONSE_MESSAGE_ID,
            Message::DownloadProgress(_) => DOWNLOAD_PROGRESS_MESSAGE_ID,
            Message::Ping => PING_MESSAGE_ID,
            Message::Close(_) => CLOSE_MESSAGE_ID,
        }
    }

    /// Write the payload (no frame header) out to the given writer.
    pub fn write_payload<W>(&self, writer: W) -> io::Result<()>
    where
        W: Write,
    {
        match *self {
            Message::ClusterConfig(ref message) => message.write_bytes(writer),
            Message::Index(ref message) | Message::IndexUpdate(ref message) => {
                message.write_bytes(writer)
            }
            Message::Request(ref message) => message.write_bytes(writer),
            Message::Response(ref message) => message.write_bytes(writer),
            Message::DownloadProgress(ref message) => message.write_bytes(writer),
            Message::Ping => Ok(()),
            Message::Close(ref message) => message.write_bytes(writer),
        }
    }

    /// Size of the payload in bytes.
    pub fn payload_size(&self) -> usize {
        match *self {
            Message::ClusterConfig(ref message) => message.message_size(),
            Message::Index(ref message) | Message::IndexUpdate(ref message) => {
                message.message_size()
            }
            Message::Request(ref message) => message.message_size(),
            Message::Response(ref message) => message.message_size(),
            Message::DownloadProgress(ref message) => message.message_size(),
            Message::Ping => 0,
            Message::Close(ref message) => message.message_size(),
        }
    }

    /// Whether this message is a keep alive ping.
    pub fn is_ping(&self) -> bool {
        match *self {
            Message::Ping => true,
            _ => false,
        }
    }
}

// ----------------------------------------------------------------------------//

pub(crate) fn run_parser<T, F>(bytes: &[u8], parser: F) -> io::Result<T>
where
    F: Fn(&[u8]) -> IResult<&[u8], T>,
{
    match parser(bytes) {
        IResult::Done(_, value) => Ok(value),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Failed To Parse BEP Message Payload",
        )),
    }
}

named!(pub parse_string<String>, map_res!(length_bytes!(be_u32), bytes_to_string));

named!(pub parse_blob<Vec<u8>>, map!(length_bytes!(be_u32), |bytes| bytes.to_vec()));

named!(pub parse_bool<bool>, map!(be_u8, |value| value != 0));

fn bytes_to_string(bytes: &[u8]) -> Result<String, ::std::string::FromUtf8Error> {
    String::from_utf8(bytes.to_vec())
}

pub(crate) fn write_string<W>(writer: &mut W, value: &str) -> io::Result<()>
where
    W: Write,
{
    writer.write_u32::<BigEndian>(value.len() as u32)?;
    writer.write_all(value.as_bytes())
}

pub(crate) fn write_blob<W>(writer: &mut W, value: &[u8]) -> io::Result<()>
where
    W: Write,
{
    writer.write_u32::<BigEndian>(value.len() as u32)?;
    writer.write_all(value)
}

pub(crate) fn write_bool<W>(writer: &mut W, value: bool) -> io::Result<()>
where
    W: Write,
{
    writer.write_u8(if value { 1 } else { 0 })
}

pub(crate) fn string_size(value: &str) -> usize {
    4 + value.len()
}

pub(crate) fn blob_size(value: &[u8]) -> usize {
    4 + value.len()
}
