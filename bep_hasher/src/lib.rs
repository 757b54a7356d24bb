//! CPU bound SHA-256 validation pool.
//!
//! Hashing is the only CPU heavy work in the sync core, so it runs on
//! its own worker pool (one worker per core by default) instead of the
//! event loop. Requests go in as messages, results come back as
//! messages in completion order.

extern crate bep_util;
extern crate bytes;
extern crate futures;
extern crate futures_cpupool;
#[macro_use]
extern crate log;

use bep_util::sha::Sha256Hash;
use bep_util::BlockHash;
use bytes::Bytes;
use futures::sink::Wait;
use futures::sync::mpsc::{self, Receiver, Sender};
use futures::{Async, AsyncSink, Poll, Sink, StartSend, Stream};
use futures_cpupool::{Builder, CpuPool};

const DEFAULT_COMPLETED_SIZE: usize = 64;

/// Messages that can be sent to the `HasherPool`.
#[derive(Clone, Debug)]
pub enum IHashMessage {
    /// Hash the bytes and compare against the expected block hash.
    Verify {
        id: u64,
        data: Bytes,
        expected: BlockHash,
    },
    /// Hash the bytes and return the digest.
    Digest { id: u64, data: Bytes },
}

/// Messages that can be received from the `HasherPool`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OHashMessage {
    /// The bytes hashed to the expected value.
    Verified { id: u64 },
    /// The bytes did not hash to the expected value.
    Mismatch { id: u64, actual: BlockHash },
    /// The digest of the bytes.
    Digested { id: u64, hash: BlockHash },
}

impl OHashMessage {
    pub fn id(&self) -> u64 {
        match *self {
            OHashMessage::Verified { id }
            | OHashMessage::Mismatch { id, .. }
            | OHashMessage::Digested { id, .. } => id,
        }
    }
}

/// Pool of hash workers; `Sink` for requests, `Stream` of results.
pub struct HasherPool {
    sink: HasherSink,
    stream: HasherStream,
}

impl HasherPool {
    /// Create a pool with one worker per core.
    pub fn new() -> HasherPool {
        HasherPool::with_pool(CpuPool::new_num_cpus())
    }

    /// Create a pool with the given number of workers.
    pub fn with_workers(workers: usize) -> HasherPool {
        HasherPool::with_pool(Builder::new().pool_size(workers).create())
    }

    fn with_pool(pool: CpuPool) -> HasherPool {
        let (out_send, out_recv) = mpsc::channel(DEFAULT_COMPLETED_SIZE);

        HasherPool {
            sink: HasherSink {
                pool,
                out: out_send,
            },
            stream: HasherStream { recv: out_recv },
        }
    }

    /// Break the `HasherPool` into a sink and stream.
    ///
    /// The returned sink implements `Clone`.
    pub fn into_parts(self) -> (HasherSink, HasherStream) {
        (self.sink, self.stream)
    }
}

impl Sink for HasherPool {
    type SinkItem = IHashMessage;
    type SinkError = ();

    fn start_send(&mut self, item: IHashMessage) -> StartSend<IHashMessage, ()> {
        self.sink.start_send(item)
    }

    fn poll_complete(&mut self) -> Poll<(), ()> {
        self.sink.poll_complete()
    }
}

impl Stream for HasherPool {
    type Item = OHashMessage;
    type Error = ();

    fn poll(&mut self) -> Poll<Option<OHashMessage>, ()> {
        self.stream.poll()
    }
}

//----------------------------------------------------------------------------//

/// Sink half of a `HasherPool`.
#[derive(Clone)]
pub struct HasherSink {
    pool: CpuPool,
    out: Sender<OHashMessage>,
}

impl Sink for HasherSink {
    type SinkItem = IHashMessage;
    type SinkError = ();

    fn start_send(&mut self, item: IHashMessage) -> StartSend<IHashMessage, ()> {
        let mut blocking_sender = self.out.clone().wait();

        self.pool
            .spawn_fn(move || {
                let out_msg = execute(item);

                send_result(&mut blocking_sender, out_msg);

                Ok::<(), ()>(())
            })
            .forget();

        Ok(AsyncSink::Ready)
    }

    fn poll_complete(&mut self) -> Poll<(), ()> {
        Ok(Async::Ready(()))
    }
}

fn execute(msg: IHashMessage) -> OHashMessage {
    match msg {
        IHashMessage::Verify { id, data, expected } => {
            let actual = Sha256Hash::from_bytes(&data);

            if actual == expected {
                OHashMessage::Verified { id }
            } else {
                info!("hash mismatch for request {}", id);

                OHashMessage::Mismatch { id, actual }
            }
        }
        IHashMessage::Digest { id, data } => OHashMessage::Digested {
            id,
            hash: Sha256Hash::from_bytes(&data),
        },
    }
}

fn send_result(sender: &mut Wait<Sender<OHashMessage>>, msg: OHashMessage) {
    sender
        .send(msg)
        .expect("bep_hasher: Failed To Send Out Message From Worker");
    sender
        .flush()
        .expect("bep_hasher: Failed To Flush Out Messages From Worker");
}

//----------------------------------------------------------------------------//

/// Stream half of a `HasherPool`.
pub struct HasherStream {
    recv: Receiver<OHashMessage>,
}

impl Stream for HasherStream {
    type Item = OHashMessage;
    type Error = ();

    fn poll(&mut self) -> Poll<Option<OHashMessage>, ()> {
        self.recv.poll()
    }
}
