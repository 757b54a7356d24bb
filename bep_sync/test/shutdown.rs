use bep_disk::{IFsMessage, OFsMessage};
use bep_hasher::{IHashMessage, OHashMessage};
use bep_proto::message::{ErrorCode, IndexMessage, Message, ResponseMessage};
use bep_sync::{IControllerMessage, OControllerMessage};

use crate::{fs_commands, hash_commands, sent_messages, wire_file_blocks, Fixture, FOLDER};

fn shutdown_complete(outputs: &[OControllerMessage]) -> bool {
    outputs.iter().any(|output| match *output {
        OControllerMessage::ShutdownComplete(_) => true,
        _ => false,
    })
}

#[test]
fn positive_shutdown_drains_in_flight_write() {
    let mut fixture = Fixture::new();
    let initial_pool = fixture.controller.request_pool();
    fixture.establish();

    // Two blocks requested
    let index = Message::Index(IndexMessage {
        folder: FOLDER.to_owned(),
        files: vec![wire_file_blocks(
            "big-file",
            &[b"aaaaa", b"bbbbb"],
            1,
            &[(2, 1)],
        )],
    });
    let outputs = fixture.drive(IControllerMessage::Received(index));

    let requests: Vec<_> = sent_messages(&outputs)
        .into_iter()
        .filter_map(|message| match *message {
            Message::Request(ref request) => Some(request.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(2, requests.len());

    // One response arrives and reaches the file actor; the other stays
    // outstanding
    let response = Message::Response(ResponseMessage {
        id: requests[0].id,
        data: b"aaaaa".to_vec(),
        code: ErrorCode::NoError,
    });
    let outputs = fixture.drive(IControllerMessage::Received(response));
    let verify_id = match hash_commands(&outputs).first() {
        Some(&&IHashMessage::Verify { id, .. }) => id,
        other => panic!("Expected Hash Verify, Got {:?}", other),
    };
    let outputs = fixture.drive(IControllerMessage::HashResult(OHashMessage::Verified {
        id: verify_id,
    }));
    let append_token = match fs_commands(&outputs).first() {
        Some(&&IFsMessage::AppendBlock { token, .. }) => token,
        other => panic!("Expected Fs AppendBlock, Got {:?}", other),
    };

    // Shutdown with the write still in flight: no completion yet
    let outputs = fixture.drive(IControllerMessage::Shutdown);
    assert!(!shutdown_complete(&outputs));
    assert_eq!(1, fixture.controller.pending_writes());

    // The write is acknowledged, then (and only then) shutdown
    // completes and the pool is whole again
    let outputs = fixture.drive(IControllerMessage::FsResult(OFsMessage::BlockAppended(
        append_token,
    )));
    assert!(shutdown_complete(&outputs));
    assert_eq!(0, fixture.controller.pending_writes());
    assert_eq!(initial_pool, fixture.controller.request_pool());
}

#[test]
fn positive_remote_close_reports_reason() {
    let mut fixture = Fixture::new();
    fixture.establish();

    let close = Message::Close(bep_proto::message::CloseMessage::new("going away"));
    let outputs = fixture.drive(IControllerMessage::Received(close));

    let reason = outputs
        .iter()
        .filter_map(|output| match *output {
            OControllerMessage::ShutdownComplete(ref reason) => Some(reason.clone()),
            _ => None,
        })
        .next()
        .expect("No Shutdown Reason");

    assert_eq!("remote-close", reason.kind);
    assert_eq!(Some("going away".to_owned()), reason.cause);
}
