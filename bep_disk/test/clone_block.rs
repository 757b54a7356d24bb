use bep_disk::{FsManagerBuilder, IFsMessage, OFsMessage};
use futures::future::Loop;
use futures::sink::Sink;
use tokio_core::reactor::Core;

use crate::{core_loop_with_timeout, expect_ack, InMemoryFileSystem};

#[test]
fn positive_clone_copies_from_finished_file() {
    let fs = InMemoryFileSystem::new();
    fs.seed_file("source", b"aaaaabbbbb");

    let manager = FsManagerBuilder::new().build(fs.clone());
    let (send, recv) = manager.into_parts();

    let mut blocking_send = send.wait();
    blocking_send
        .send(IFsMessage::CloneBlock {
            token: 7,
            target: "target".into(),
            target_size: 5,
            target_offset: 0,
            source: "source".into(),
            source_offset: 5,
            block_size: 5,
        })
        .unwrap();

    let mut core = Core::new().unwrap();
    core_loop_with_timeout(&mut core, 500, ((), recv), |_, _, msg| match expect_ack(msg) {
        OFsMessage::BlockCloned(7) => Loop::Break(()),
        other => panic!("Unexpected Message {:?}", other),
    });

    assert_eq!(
        b"bbbbb".to_vec(),
        fs.file_contents("target.syncspirit-tmp").unwrap()
    );
}

#[test]
fn negative_clone_from_short_source_fails() {
    let fs = InMemoryFileSystem::new();
    fs.seed_file("source", b"aaa");

    let manager = FsManagerBuilder::new().build(fs.clone());
    let (send, recv) = manager.into_parts();

    let mut blocking_send = send.wait();
    blocking_send
        .send(IFsMessage::CloneBlock {
            token: 8,
            target: "target".into(),
            target_size: 5,
            target_offset: 0,
            source: "source".into(),
            source_offset: 0,
            block_size: 5,
        })
        .unwrap();

    let mut core = Core::new().unwrap();
    core_loop_with_timeout(&mut core, 500, ((), recv), |_, _, msg| match msg {
        OFsMessage::FsFailed(8, _) => Loop::Break(()),
        other => panic!("Unexpected Message {:?}", other),
    });
}
