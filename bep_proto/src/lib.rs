//! BEP v1 wire messages, framing, and the relay protocol.

extern crate bep_util;
extern crate byteorder;
extern crate bytes;
extern crate flate2;
#[macro_use]
extern crate nom;
extern crate tokio_io;
extern crate url;

pub mod message;
pub mod relay;

mod codec;

pub use crate::codec::{BepCodec, BepFrame};
pub use crate::message::Message;

/// Default maximum accepted frame payload (16 MiB block + headroom).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024 + 1024;
