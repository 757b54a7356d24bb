//! Codec framing controlled BEP messages over a byte stream.

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use tokio_io::codec::{Decoder, Encoder};

use crate::message::Message;

/// Length of the frame header (frame length + type + compression flag).
const HEADER_LEN: usize = 6;

const COMPRESSION_NONE: u8 = 0;
const COMPRESSION_DEFLATE: u8 = 1;

/// Outgoing frame: a message plus its compression decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BepFrame {
    pub message: Message,
    pub compress: bool,
}

impl BepFrame {
    pub fn new(message: Message, compress: bool) -> BepFrame {
        BepFrame { message, compress }
    }
}

impl From<Message> for BepFrame {
    fn from(message: Message) -> BepFrame {
        BepFrame {
            message,
            compress: false,
        }
    }
}

/// Codec for controlled BEP messages.
///
/// It is strongly recommended to construct this via `with_max_payload`,
/// as the default will not enforce a limit on received payload length.
pub struct BepCodec {
    max_payload: Option<usize>,
}

impl BepCodec {
    /// Create a new `BepCodec` without a payload limit.
    pub fn new() -> BepCodec {
        BepCodec { max_payload: None }
    }

    /// Create a new `BepCodec` which will yield an error if receiving a
    /// payload larger than the specified `max_payload`.
    pub fn with_max_payload(max_payload: usize) -> BepCodec {
        BepCodec {
            max_payload: Some(max_payload),
        }
    }
}

impl Decoder for BepCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Message>> {
        if src.len() < 4 {
            return Ok(None);
        }

        let frame_len = BigEndian::read_u32(&src[..4]) as usize;
        if frame_len < 2 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "BepCodec Received Frame Shorter Than Its Header",
            ));
        }
        if self
            .max_payload
            .map(|max_payload| frame_len - 2 > max_payload)
            .unwrap_or(false)
        {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "BepCodec Enforced Maximum Payload Check For Peer",
            ));
        }

        if src.len() < 4 + frame_len {
            return Ok(None);
        }

        let frame = src.split_to(4 + frame_len).freeze();
        let message_id = frame[4];
        let compression = frame[5];
        let payload = &frame[HEADER_LEN..];

        match compression {
            COMPRESSION_NONE => Message::from_parts(message_id, payload).map(Some),
            COMPRESSION_DEFLATE => {
                let limit = self.max_payload.unwrap_or(::std::usize::MAX);
                let inflated = inflate(payload, limit)?;

                Message::from_parts(message_id, &inflated).map(Some)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "BepCodec Received Unknown Compression Flag",
            )),
        }
    }
}

impl Encoder for BepCodec {
    type Item = BepFrame;
    type Error = io::Error;

    fn encode(&mut self, item: BepFrame, dst: &mut BytesMut) -> io::Result<()> {
        let (payload, flag) = if item.compress {
            (deflate(&item.message)?, COMPRESSION_DEFLATE)
        } else {
            let mut payload = Vec::with_capacity(item.message.payload_size());
            item.message.write_payload(&mut payload)?;

            (payload, COMPRESSION_NONE)
        };

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u32_be((2 + payload.len()) as u32);
        dst.put_u8(item.message.message_id());
        dst.put_u8(flag);
        dst.put_slice(&payload);

        Ok(())
    }
}

fn deflate(message: &Message) -> io::Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(message.payload_size());
    message.write_payload(&mut raw)?;

    let mut compressed = Vec::new();
    DeflateEncoder::new(&raw[..], Compression::default()).read_to_end(&mut compressed)?;

    Ok(compressed)
}

fn inflate(payload: &[u8], limit: usize) -> io::Result<Vec<u8>> {
    let mut inflated = Vec::new();
    let read = DeflateDecoder::new(payload)
        .take(limit as u64 + 1)
        .read_to_end(&mut inflated)?;

    if read > limit {
        Err(io::Error::new(
            io::ErrorKind::Other,
            "BepCodec Enforced Maximum Payload Check For Compressed Frame",
        ))
    } else {
        Ok(inflated)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use tokio_io::codec::{Decoder, Encoder};

    use super::{BepCodec, BepFrame};
    use crate::message::{CloseMessage, Message};

    #[test]
    fn positive_encode_decode() {
        let mut codec = BepCodec::with_max_payload(1024);
        let message = Message::Close(CloseMessage::new("bye"));

        let mut buffer = BytesMut::new();
        codec.encode(BepFrame::from(message.clone()), &mut buffer).unwrap();

        assert_eq!(Some(message), codec.decode(&mut buffer).unwrap());
        assert_eq!(0, buffer.len());
    }

    #[test]
    fn positive_compressed_round_trip() {
        let mut codec = BepCodec::with_max_payload(1024);
        let message = Message::Close(CloseMessage::new("a reason that deflates"));

        let mut buffer = BytesMut::new();
        codec
            .encode(BepFrame::new(message.clone(), true), &mut buffer)
            .unwrap();

        assert_eq!(Some(message), codec.decode(&mut buffer).unwrap());
    }

    #[test]
    fn positive_partial_frame_waits() {
        let mut codec = BepCodec::with_max_payload(1024);
        let message = Message::Ping;

        let mut buffer = BytesMut::new();
        codec.encode(BepFrame::from(message.clone()), &mut buffer).unwrap();

        let mut partial = buffer.clone();
        let tail = partial.split_off(3);

        assert_eq!(None, codec.decode(&mut partial).unwrap());

        partial.extend_from_slice(&tail);
        assert_eq!(Some(message), codec.decode(&mut partial).unwrap());
    }

    #[test]
    fn negative_oversized_payload() {
        let mut codec = BepCodec::with_max_payload(4);
        let message = Message::Close(CloseMessage::new("a reason that is too long"));

        let mut buffer = BytesMut::new();
        codec.encode(BepFrame::from(message), &mut buffer).unwrap();

        assert!(codec.decode(&mut buffer).is_err());
    }
}
