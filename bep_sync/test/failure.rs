use bep_hasher::{IHashMessage, OHashMessage};
use bep_model::diff::ClusterDiff;
use bep_proto::message::{ErrorCode, IndexMessage, Message, ResponseMessage};
use bep_sync::{IControllerMessage, OControllerMessage};
use bep_util::sha::Sha256Hash;

use crate::{
    complete_block, complete_finish, first_request, hash_commands, wire_file, Fixture, FOLDER,
};

#[test]
fn positive_hash_mismatch_then_recovery() {
    let mut fixture = Fixture::new();
    let initial_pool = fixture.controller.request_pool();
    fixture.establish();

    let index = Message::Index(IndexMessage {
        folder: FOLDER.to_owned(),
        files: vec![wire_file("some-file", b"12345", 1, &[(2, 1)])],
    });
    let outputs = fixture.drive(IControllerMessage::Received(index));
    let request = first_request(&outputs).expect("No Request Sent");

    // The peer responds with corrupted bytes
    let response = Message::Response(ResponseMessage {
        id: request.id,
        data: b"shady".to_vec(),
        code: ErrorCode::NoError,
    });
    let outputs = fixture.drive(IControllerMessage::Received(response));
    let verify_id = match hash_commands(&outputs).first() {
        Some(&&IHashMessage::Verify { id, .. }) => id,
        other => panic!("Expected Hash Verify, Got {:?}", other),
    };

    let outputs = fixture.drive(IControllerMessage::HashResult(OHashMessage::Mismatch {
        id: verify_id,
        actual: Sha256Hash::from_bytes(b"shady"),
    }));

    // The block is rejected, the pool refilled, the session alive
    assert!(outputs.iter().any(|output| match *output {
        OControllerMessage::Apply(ClusterDiff::BlockRej { .. }) => true,
        _ => false,
    }));
    assert_eq!(initial_pool, fixture.controller.request_pool());
    assert_eq!(0, fixture.controller.in_flight_blocks());

    let peer = fixture.peer;
    assert!(fixture
        .cluster
        .file(FOLDER, &peer, "some-file")
        .unwrap()
        .unreachable);

    // A fresh version of the file resumes the download
    let index = Message::IndexUpdate(IndexMessage {
        folder: FOLDER.to_owned(),
        files: vec![wire_file("some-file", b"12345", 2, &[(2, 2)])],
    });
    let outputs = fixture.drive(IControllerMessage::Received(index));
    let request = first_request(&outputs).expect("No Request After Recovery");

    let outputs = complete_block(&mut fixture, &request, b"12345");
    complete_finish(&mut fixture, &outputs);

    let local = fixture.local;
    assert!(fixture
        .cluster
        .file(FOLDER, &local, "some-file")
        .unwrap()
        .is_locally_available());
}

#[test]
fn positive_request_timeout_retries_then_parks() {
    let mut fixture = Fixture::new();
    let initial_pool = fixture.controller.request_pool();
    fixture.establish();

    let index = Message::Index(IndexMessage {
        folder: FOLDER.to_owned(),
        files: vec![wire_file("slow-file", b"12345", 1, &[(2, 1)])],
    });
    let mut outputs = fixture.drive(IControllerMessage::Received(index));

    // Two timeouts retry against the same peer, the third parks the
    // file as unreachable
    for attempt in 0..3 {
        let request = first_request(&outputs)
            .unwrap_or_else(|| panic!("No Request On Attempt {}", attempt));

        outputs = fixture.drive(IControllerMessage::RequestTimeout(request.id));
    }

    assert!(first_request(&outputs).is_none());
    assert_eq!(initial_pool, fixture.controller.request_pool());
    let peer = fixture.peer;
    assert!(fixture
        .cluster
        .file(FOLDER, &peer, "slow-file")
        .unwrap()
        .unreachable);
}

#[test]
fn negative_unsolicited_response_is_fatal() {
    let mut fixture = Fixture::new();
    fixture.establish();

    let response = Message::Response(ResponseMessage {
        id: 4242,
        data: Vec::new(),
        code: ErrorCode::NoError,
    });

    assert!(fixture
        .controller
        .handle(
            &mut fixture.cluster,
            IControllerMessage::Received(response)
        )
        .is_err());
}

#[test]
fn negative_index_sequence_regression_is_fatal() {
    let mut fixture = Fixture::new();
    fixture.establish();

    let index = Message::Index(IndexMessage {
        folder: FOLDER.to_owned(),
        files: vec![wire_file("some-file", b"12345", 5, &[(2, 1)])],
    });
    fixture.drive(IControllerMessage::Received(index));

    // An update that does not advance past sequence 5 must kill the
    // session
    let update = Message::IndexUpdate(IndexMessage {
        folder: FOLDER.to_owned(),
        files: vec![wire_file("some-file", b"54321", 5, &[(2, 2)])],
    });

    assert!(fixture
        .controller
        .handle(&mut fixture.cluster, IControllerMessage::Received(update))
        .is_err());
}

#[test]
fn negative_unshared_folder_index_is_fatal() {
    let mut fixture = Fixture::new();
    fixture.establish();

    let index = Message::Index(IndexMessage {
        folder: "sneaky-folder".to_owned(),
        files: Vec::new(),
    });

    assert!(fixture
        .controller
        .handle(&mut fixture.cluster, IControllerMessage::Received(index))
        .is_err());
}
