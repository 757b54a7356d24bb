//! Asynchronous hello frame exchange.

use std::io;

use bep_proto::message::hello::{HelloMessage, HELLO_HEADER_LEN, HELLO_MAGIC};
use byteorder::{BigEndian, ByteOrder};
use futures::Future;
use tokio_io::io::{read_exact, write_all};
use tokio_io::{AsyncRead, AsyncWrite};

/// Send our hello, then receive and parse the peer's hello.
///
/// Both frames must land before the caller's hello timeout fires; the
/// returned socket has consumed exactly the two hello frames.
pub fn exchange<T>(socket: T, hello: &HelloMessage) -> Box<dyn Future<Item = (T, HelloMessage), Error = io::Error>>
where
    T: AsyncRead + AsyncWrite + 'static,
{
    let mut buffer = Vec::with_capacity(hello.message_size());
    hello
        .write_bytes(&mut buffer)
        .expect("bep_peer: Failed To Serialize Hello Into Memory");

    Box::new(
        write_all(socket, buffer)
            .and_then(|(socket, _)| recv(socket))
    )
}

/// Receive and parse the peer's hello frame.
pub fn recv<T>(socket: T) -> Box<dyn Future<Item = (T, HelloMessage), Error = io::Error>>
where
    T: AsyncRead + 'static,
{
    Box::new(
        read_exact(socket, [0u8; HELLO_HEADER_LEN])
            .and_then(|(socket, header)| {
                let magic = BigEndian::read_u32(&header[..4]);
                let length = BigEndian::read_u16(&header[4..6]) as usize;

                if magic != HELLO_MAGIC {
                    Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Peer Did Not Announce A Hello Frame",
                    ))
                } else {
                    Ok((socket, length))
                }
            })
            .and_then(|(socket, length)| read_exact(socket, vec![0u8; length]))
            .and_then(|(socket, payload)| {
                HelloMessage::from_payload(&payload).map(|hello| (socket, hello))
            }),
    )
}
