use bep_disk::IFsMessage;
use bep_proto::message::{IndexMessage, Message};
use bep_sync::IControllerMessage;
use bep_util::sha::Sha256Hash;

use crate::{complete_block, first_request, fs_commands, wire_file, Fixture, FOLDER};

#[test]
fn positive_concurrent_remote_win_parks_conflict_copy() {
    let mut fixture = Fixture::new();
    let me = fixture.local.short_id();
    let peer_short = fixture.peer.short_id();

    // Local copy: authored here at 1734680000
    fixture.seed_local_file("f.txt", b"local", &[(me, 2)]);
    fixture.establish();

    // Remote copy: concurrent, newer modification time
    let mut remote = wire_file("f.txt", b"peers", 3, &[(peer_short, 3)]);
    remote.modified_s = 1734690000;
    let outputs = fixture.drive(IControllerMessage::Received(Message::Index(IndexMessage {
        folder: FOLDER.to_owned(),
        files: vec![remote],
    })));

    let request = first_request(&outputs).expect("No Request Sent");
    let outputs = complete_block(&mut fixture, &request, b"peers");

    // The finish carries the conflict path named after the loser's
    // modification time and the winner's short id
    let finish_token = match fs_commands(&outputs).first() {
        Some(&&IFsMessage::FinishFile {
            token,
            ref path,
            ref conflict_path,
            ..
        }) => {
            assert!(path.ends_with("f.txt"));
            let conflict = conflict_path.clone().expect("No Conflict Path");
            let conflict_name = conflict.file_name().unwrap().to_string_lossy().into_owned();
            assert!(
                conflict_name.starts_with("f.sync-conflict-20241220-"),
                "Unexpected Conflict Name {:?}",
                conflict_name
            );
            assert!(
                conflict_name.ends_with(&format!("-{}.txt", fixture.peer.short_str())),
                "Conflict Name {:?} Does Not Carry The Winner's Short Id",
                conflict_name
            );
            token
        }
        other => panic!("Expected Fs FinishFile, Got {:?}", other),
    };

    fixture.drive(IControllerMessage::FsResult(
        bep_disk::OFsMessage::FileFinished(finish_token),
    ));

    // Canonical path holds the winner, the conflict copy the loser
    let local = fixture.local;
    let canonical = fixture.cluster.file(FOLDER, &local, "f.txt").unwrap().clone();
    assert_eq!(Sha256Hash::from_bytes(b"peers"), canonical.blocks[0].hash);

    let folder_info = fixture.cluster.folder_info(FOLDER, &local).unwrap();
    let conflict_entry = folder_info
        .files
        .keys()
        .find(|name| name.starts_with("f.sync-conflict-"))
        .cloned()
        .expect("No Conflict Copy In The Model");
    let parked = folder_info.files.get(&conflict_entry).unwrap();
    assert_eq!(Sha256Hash::from_bytes(b"local"), parked.blocks[0].hash);

    // Both contents are alive in the block table
    assert_eq!(2, fixture.cluster.blocks.len());
}

#[test]
fn positive_losing_remote_is_not_pulled() {
    let mut fixture = Fixture::new();
    let me = fixture.local.short_id();
    let peer_short = fixture.peer.short_id();

    // Local copy is newer than the concurrent remote one
    fixture.seed_local_file("f.txt", b"local", &[(me, 2)]);
    let local = fixture.local;
    fixture
        .cluster
        .file_mut(FOLDER, &local, "f.txt")
        .unwrap()
        .modified_s = 1734690000;
    fixture.establish();

    let mut remote = wire_file("f.txt", b"peers", 3, &[(peer_short, 3)]);
    remote.modified_s = 1734680000;
    let outputs = fixture.drive(IControllerMessage::Received(Message::Index(IndexMessage {
        folder: FOLDER.to_owned(),
        files: vec![remote],
    })));

    assert!(first_request(&outputs).is_none());
    assert!(fs_commands(&outputs).is_empty());
}

#[test]
fn positive_dirty_local_file_is_not_overwritten() {
    let mut fixture = Fixture::new();
    let me = fixture.local.short_id();
    let peer_short = fixture.peer.short_id();

    // Local copy carries an edit the scan has not announced yet; it
    // must hold its ground even against a newer concurrent remote
    fixture.seed_local_file("f.txt", b"local", &[(me, 2)]);
    let local = fixture.local;
    fixture
        .cluster
        .file_mut(FOLDER, &local, "f.txt")
        .unwrap()
        .local_modified = true;
    fixture.establish();

    let mut remote = wire_file("f.txt", b"peers", 3, &[(peer_short, 3)]);
    remote.modified_s = 1734690000;
    let outputs = fixture.drive(IControllerMessage::Received(Message::Index(IndexMessage {
        folder: FOLDER.to_owned(),
        files: vec![remote],
    })));

    assert!(first_request(&outputs).is_none());
    assert!(fs_commands(&outputs).is_empty());
}
