extern crate bep_hasher;
extern crate bep_util;
extern crate bytes;
extern crate futures;
extern crate tokio_core;

use std::time::Duration;

use bep_hasher::{HasherPool, IHashMessage, OHashMessage};
use bep_util::sha::Sha256Hash;
use bytes::Bytes;
use futures::future::Future;
use futures::sink::Sink;
use futures::stream::Stream;
use tokio_core::reactor::{Core, Timeout};

fn collect_results(pool: HasherPool, requests: Vec<IHashMessage>, count: usize) -> Vec<OHashMessage> {
    let (send, recv) = pool.into_parts();

    let mut blocking_send = send.wait();
    for request in requests {
        blocking_send.send(request).unwrap();
    }

    let mut core = Core::new().unwrap();
    let timeout = Timeout::new(Duration::from_millis(500), &core.handle())
        .unwrap()
        .then(|_| Err(()));

    core.run(recv.take(count as u64).collect().select(timeout).map(|(items, _)| items))
        .unwrap_or_else(|_| panic!("Hasher Results Timed Out"))
}

#[test]
fn positive_verify_matching_block() {
    let results = collect_results(
        HasherPool::with_workers(1),
        vec![IHashMessage::Verify {
            id: 1,
            data: Bytes::from(&b"12345"[..]),
            expected: Sha256Hash::from_bytes(b"12345"),
        }],
        1,
    );

    assert_eq!(vec![OHashMessage::Verified { id: 1 }], results);
}

#[test]
fn positive_mismatch_reports_actual() {
    let results = collect_results(
        HasherPool::with_workers(1),
        vec![IHashMessage::Verify {
            id: 2,
            data: Bytes::from(&b"corrupted"[..]),
            expected: Sha256Hash::from_bytes(b"12345"),
        }],
        1,
    );

    match results[0] {
        OHashMessage::Mismatch { id: 2, ref actual } => {
            assert_eq!(*actual, Sha256Hash::from_bytes(b"corrupted"));
        }
        ref other => panic!("Unexpected Message {:?}", other),
    }
}

#[test]
fn positive_digest_batch() {
    let requests = (0..8u64)
        .map(|id| IHashMessage::Digest {
            id,
            data: Bytes::from(vec![id as u8; 16]),
        })
        .collect();

    let mut results = collect_results(HasherPool::new(), requests, 8);
    results.sort_by_key(|result| result.id());

    for (id, result) in results.iter().enumerate() {
        match *result {
            OHashMessage::Digested { id: got, ref hash } => {
                assert_eq!(id as u64, got);
                assert_eq!(*hash, Sha256Hash::from_bytes(&vec![id as u8; 16]));
            }
            ref other => panic!("Unexpected Message {:?}", other),
        }
    }
}
