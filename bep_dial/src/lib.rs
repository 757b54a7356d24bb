//! Connection establishment: DNS resolution, per-attempt initiation
//! across TLS-direct and relay-mediated uris, and the redial timers
//! that keep trying offline peers.

extern crate bep_model;
extern crate bep_proto;
extern crate bep_util;
extern crate bytes;
#[macro_use]
extern crate error_chain;
extern crate futures;
extern crate futures_cpupool;
#[macro_use]
extern crate log;
extern crate rustls;
extern crate tokio_core;
extern crate tokio_io;
extern crate tokio_rustls;
extern crate tokio_timer;
extern crate url;
extern crate webpki;

pub mod dialer;
pub mod error;
pub mod initiator;
pub mod resolver;
pub mod transport;

pub use crate::dialer::{Dialer, DialerConfig};
pub use crate::error::{DialError, DialErrorKind, DialResult};
pub use crate::initiator::{initiate, Established, InitiatorConfig};
pub use crate::resolver::Resolver;
pub use crate::transport::{PeerStream, TlsContext};

/// ALPN protocol announced on every BEP TLS handshake.
pub const BEP_ALPN: &str = "bep/1.0";
