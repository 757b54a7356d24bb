use bep_disk::{FsManagerBuilder, IFsMessage, OFsMessage};
use futures::future::Loop;
use futures::sink::Sink;
use tokio_core::reactor::Core;

use crate::{core_loop_with_timeout, expect_ack, InMemoryFileSystem};

#[test]
fn positive_read_block_at_offset() {
    let fs = InMemoryFileSystem::new();
    fs.seed_file("served", b"aaaaabbbbbccccc");

    let manager = FsManagerBuilder::new().build(fs.clone());
    let (send, recv) = manager.into_parts();

    let mut blocking_send = send.wait();
    blocking_send
        .send(IFsMessage::ReadBlock {
            token: 3,
            path: "served".into(),
            offset: 5,
            size: 5,
        })
        .unwrap();

    let mut core = Core::new().unwrap();
    let data = core_loop_with_timeout(&mut core, 500, ((), recv), |_, _, msg| {
        match expect_ack(msg) {
            OFsMessage::BlockRead(3, data) => Loop::Break(data),
            other => panic!("Unexpected Message {:?}", other),
        }
    });

    assert_eq!(&b"bbbbb"[..], &data[..]);
}

#[test]
fn negative_read_missing_file() {
    let fs = InMemoryFileSystem::new();
    let manager = FsManagerBuilder::new().build(fs);
    let (send, recv) = manager.into_parts();

    let mut blocking_send = send.wait();
    blocking_send
        .send(IFsMessage::ReadBlock {
            token: 4,
            path: "missing".into(),
            offset: 0,
            size: 5,
        })
        .unwrap();

    let mut core = Core::new().unwrap();
    core_loop_with_timeout(&mut core, 500, ((), recv), |_, _, msg| match msg {
        OFsMessage::FsFailed(4, _) => Loop::Break(()),
        other => panic!("Unexpected Message {:?}", other),
    });
}
