//! Per-connection BEP session handling.
//!
//! A session owns one authenticated byte stream from hello to close:
//! it exchanges the hello frames under a short timeout, frames
//! controlled messages with `BepCodec`, pings the peer when the line
//! has been quiet, and tears the connection down when nothing has been
//! received for the rx timeout.

extern crate bep_proto;
extern crate byteorder;
extern crate futures;
#[macro_use]
extern crate log;
extern crate tokio_core;
extern crate tokio_io;
extern crate tokio_timer;

pub mod future;
pub mod hello;
pub mod session;

pub use crate::session::{spawn_session, ISessionMessage, OSessionMessage, SessionConfig};
