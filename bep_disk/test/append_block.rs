use bep_disk::{FsManagerBuilder, IFsMessage, OFsMessage};
use bytes::Bytes;
use futures::future::Loop;
use futures::sink::Sink;
use futures::stream::Stream;
use tokio_core::reactor::Core;

use crate::{core_loop_with_timeout, expect_ack, random_buffer, InMemoryFileSystem};

#[test]
fn positive_append_creates_sized_tmp() {
    let fs = InMemoryFileSystem::new();
    let manager = FsManagerBuilder::new().build(fs.clone());

    let data = random_buffer(5);
    let (send, recv) = manager.into_parts();

    let mut blocking_send = send.wait();
    blocking_send
        .send(IFsMessage::AppendBlock {
            token: 1,
            path: "dir/some-file".into(),
            file_size: 10,
            offset: 5,
            data: Bytes::from(data.clone()),
        })
        .unwrap();

    let mut core = Core::new().unwrap();
    core_loop_with_timeout(&mut core, 500, ((), recv), |_, _, msg| {
        match expect_ack(msg) {
            OFsMessage::BlockAppended(1) => Loop::Break(()),
            other => panic!("Unexpected Message {:?}", other),
        }
    });

    let contents = fs
        .file_contents("dir/some-file.syncspirit-tmp")
        .expect("Tmp File Missing");
    assert_eq!(10, contents.len());
    assert_eq!(&data[..], &contents[5..]);
}

#[test]
fn positive_appends_share_one_handle() {
    let fs = InMemoryFileSystem::new();
    let manager = FsManagerBuilder::new().with_handle_capacity(1).build(fs.clone());

    let (send, recv) = manager.into_parts();
    let mut blocking_send = send.wait();

    for (index, offset) in [0u64, 5, 10].iter().enumerate() {
        blocking_send
            .send(IFsMessage::AppendBlock {
                token: index as u64,
                path: "stacked".into(),
                file_size: 15,
                offset: *offset,
                data: Bytes::from(vec![index as u8; 5]),
            })
            .unwrap();
    }

    let mut core = Core::new().unwrap();
    core_loop_with_timeout(&mut core, 500, (0usize, recv), |count, recv, msg| {
        match expect_ack(msg) {
            OFsMessage::BlockAppended(_) if count == 2 => Loop::Break(()),
            OFsMessage::BlockAppended(_) => Loop::Continue((count + 1, recv)),
            other => panic!("Unexpected Message {:?}", other),
        }
    });

    let contents = fs.file_contents("stacked.syncspirit-tmp").unwrap();
    assert_eq!(vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2], contents);
}
