use bep_proto::message::{Compression, DeviceEntry, FolderEntry, Message};
use bep_sync::IControllerMessage;

use crate::{sent_messages, Fixture, FOLDER};

#[test]
fn positive_establish_sends_cluster_config_and_initial_index() {
    let mut fixture = Fixture::new();

    let hello = bep_proto::message::hello::HelloMessage::new("peer", "bep-rs", "0.1.0");
    let outputs = fixture.drive(IControllerMessage::Established(hello));

    // Our view of the shared folders goes out first
    let config = sent_messages(&outputs)
        .into_iter()
        .filter_map(|message| match *message {
            Message::ClusterConfig(ref config) => Some(config.clone()),
            _ => None,
        })
        .next()
        .expect("No ClusterConfig Sent");
    assert_eq!(1, config.folders.len());
    assert_eq!(FOLDER, config.folders[0].id);
    assert_eq!(2, config.folders[0].devices.len());

    // The peer comes online in the model
    let peer = fixture.peer;
    assert!(fixture.cluster.device(&peer).unwrap().is_online());

    // Receiving the peer's config triggers the (empty) initial index
    let peer_config = fixture.peer_cluster_config(0, 0);
    let outputs = fixture.drive(IControllerMessage::Received(Message::ClusterConfig(
        peer_config,
    )));
    assert!(sent_messages(&outputs).iter().any(|message| match **message {
        Message::Index(ref index) => index.folder == FOLDER && index.files.is_empty(),
        _ => false,
    }));
}

#[test]
fn positive_resent_cluster_config_merges() {
    let mut fixture = Fixture::new();
    fixture.establish();

    // The peer re-sends its config with an advanced max sequence
    let config = fixture.peer_cluster_config(17, 0);
    fixture.drive(IControllerMessage::Received(Message::ClusterConfig(config)));

    let peer = fixture.peer;
    let info = fixture.cluster.folder_info(FOLDER, &peer).unwrap();
    assert_eq!(17, info.announced_max_sequence);
    assert_eq!(2, info.index_id);
}

#[test]
fn positive_unknown_folder_becomes_pending() {
    let mut fixture = Fixture::new();
    fixture.establish();

    let mut config = fixture.peer_cluster_config(0, 0);
    config.folders.push(FolderEntry {
        id: "brand-new".to_owned(),
        label: "Brand New".to_owned(),
        devices: vec![DeviceEntry {
            id: fixture.peer,
            max_sequence: 3,
            index_id: 9,
            compression: Compression::Metadata,
        }],
    });
    fixture.drive(IControllerMessage::Received(Message::ClusterConfig(config)));

    let peer = fixture.peer;
    assert!(fixture
        .cluster
        .pending_folders
        .contains_key(&(peer, "brand-new".to_owned())));
    // Nothing was applied for the unknown folder
    assert!(fixture.cluster.folder_info("brand-new", &peer).is_none());
}

#[test]
fn negative_known_unshared_folder_is_fatal() {
    let mut fixture = Fixture::new();

    // A second folder exists locally but is not shared with the peer
    fixture.cluster.folders.insert(
        "private".to_owned(),
        bep_model::Folder::new("private", "Private", "/private"),
    );
    fixture.establish();

    let mut config = fixture.peer_cluster_config(0, 0);
    config.folders.push(FolderEntry {
        id: "private".to_owned(),
        label: "Private".to_owned(),
        devices: Vec::new(),
    });

    assert!(fixture
        .controller
        .handle(
            &mut fixture.cluster,
            IControllerMessage::Received(Message::ClusterConfig(config))
        )
        .is_err());
}

#[test]
fn positive_cluster_config_positions_update_stream() {
    let mut fixture = Fixture::new();
    fixture.seed_local_file("f1", b"aaaaa", &[(1, 1)]);
    fixture.seed_local_file("f2", b"bbbbb", &[(1, 2)]);

    let hello = bep_proto::message::hello::HelloMessage::new("peer", "bep-rs", "0.1.0");
    fixture.drive(IControllerMessage::Established(hello));

    // The peer already holds our file at sequence 1, so only f2 goes
    // out
    let config = fixture.peer_cluster_config(0, 1);
    let outputs = fixture.drive(IControllerMessage::Received(Message::ClusterConfig(config)));

    let indexed: Vec<String> = sent_messages(&outputs)
        .into_iter()
        .filter_map(|message| match *message {
            Message::Index(ref index) | Message::IndexUpdate(ref index) => Some(index),
            _ => None,
        })
        .flat_map(|index| index.files.iter().map(|file| file.name.clone()))
        .collect();

    assert_eq!(vec!["f2".to_owned()], indexed);
}
