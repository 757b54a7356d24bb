extern crate bep_disk;
extern crate bep_hasher;
extern crate bep_model;
extern crate bep_proto;
extern crate bep_sync;
extern crate bep_util;
extern crate bytes;

use bep_disk::{IFsMessage, OFsMessage};
use bep_hasher::{IHashMessage, OHashMessage};
use bep_model::{Cluster, Device, FileInfo, Folder};
use bep_proto::message::hello::HelloMessage;
use bep_proto::message::{
    BlockInfo, ClusterConfigMessage, Compression, Counter, DeviceEntry, FileInfo as WireFileInfo,
    FileInfoType, FolderEntry, Message, Version,
};
use bep_sync::{BlockLocks, Controller, ControllerConfig, IControllerMessage, OControllerMessage};
use bep_util::device::DeviceId;
use bep_util::seq::Sequencer;
use bep_util::sha::Sha256Hash;

mod config;
mod conflict;
mod failure;
mod shutdown;

pub const FOLDER: &str = "default";

pub struct Fixture {
    pub cluster: Cluster,
    pub controller: Controller,
    pub local: DeviceId,
    pub peer: DeviceId,
}

impl Fixture {
    pub fn new() -> Fixture {
        Fixture::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Fixture {
        let local = DeviceId::from_der_cert(b"local cert");
        let peer = DeviceId::from_der_cert(b"peer cert");

        let mut cluster = Cluster::new(Device::new(local, "local"));
        cluster.devices.insert(peer, Device::new(peer, "peer"));

        let mut folder = Folder::new(FOLDER, "Default", "/sync");
        folder.shared_with.insert(peer);
        cluster.folders.insert(FOLDER.to_owned(), folder);
        cluster.ensure_folder_info(FOLDER, &local, 1).unwrap();
        cluster.ensure_folder_info(FOLDER, &peer, 2).unwrap();

        let controller = Controller::new(
            peer,
            "tcp/test".to_owned(),
            Sequencer::new(0),
            BlockLocks::new(),
            config,
        );

        Fixture {
            cluster,
            controller,
            local,
            peer,
        }
    }

    /// Feed one input and return every output it produced.
    pub fn drive(&mut self, message: IControllerMessage) -> Vec<OControllerMessage> {
        self.controller
            .handle(&mut self.cluster, message)
            .unwrap_or_else(|error| panic!("Controller Failed: {}", error));

        self.drain()
    }

    pub fn drain(&mut self) -> Vec<OControllerMessage> {
        let mut outputs = Vec::new();
        while let Some(output) = self.controller.poll_output() {
            outputs.push(output);
        }

        outputs
    }

    /// Run the hello + cluster config exchange; discards the outputs.
    pub fn establish(&mut self) {
        let hello = HelloMessage::new("peer", "bep-rs", "0.1.0");
        self.drive(IControllerMessage::Established(hello));

        let config = self.peer_cluster_config(0, 0);
        self.drive(IControllerMessage::Received(Message::ClusterConfig(config)));
    }

    /// The peer's view of the shared folder.
    pub fn peer_cluster_config(&self, peer_max: u64, local_max: u64) -> ClusterConfigMessage {
        ClusterConfigMessage {
            folders: vec![FolderEntry {
                id: FOLDER.to_owned(),
                label: "Default".to_owned(),
                devices: vec![
                    DeviceEntry {
                        id: self.peer,
                        max_sequence: peer_max,
                        index_id: 2,
                        compression: Compression::Metadata,
                    },
                    DeviceEntry {
                        id: self.local,
                        max_sequence: local_max,
                        index_id: 1,
                        compression: Compression::Metadata,
                    },
                ],
            }],
        }
    }

    /// Install a fully available local file built from the given data.
    pub fn seed_local_file(&mut self, name: &str, data: &[u8], counters: &[(u64, u64)]) {
        let sequence = self
            .cluster
            .folder_info(FOLDER, &self.local)
            .unwrap()
            .next_sequence();
        let mut file = FileInfo::from_wire(wire_file(name, data, sequence, counters)).unwrap();
        file.mark_all_available();
        let local = self.local;
        self.cluster.insert_file(FOLDER, &local, file).unwrap();
    }
}

/// Wire file whose whole content is one block.
pub fn wire_file(name: &str, data: &[u8], sequence: u64, counters: &[(u64, u64)]) -> WireFileInfo {
    wire_file_blocks(name, &[data], sequence, counters)
}

/// Wire file with one block per data slice.
pub fn wire_file_blocks(
    name: &str,
    blocks: &[&[u8]],
    sequence: u64,
    counters: &[(u64, u64)],
) -> WireFileInfo {
    let block_size = blocks.first().map(|data| data.len()).unwrap_or(0) as u32;
    let mut offset = 0u64;
    let mut block_infos = Vec::new();
    for data in blocks.iter() {
        block_infos.push(BlockInfo::new(
            offset,
            data.len() as u32,
            Sha256Hash::from_bytes(data),
        ));
        offset += data.len() as u64;
    }

    WireFileInfo {
        name: name.to_owned(),
        file_type: FileInfoType::File,
        size: offset,
        permissions: 0o644,
        modified_s: 1734680000,
        modified_ns: 0,
        sequence,
        version: Version::new(
            counters
                .iter()
                .map(|&(id, value)| Counter::new(id, value))
                .collect(),
        ),
        block_size,
        deleted: false,
        invalid: false,
        no_permissions: false,
        symlink_target: String::new(),
        blocks: block_infos,
    }
}

//----------------------------------------------------------------------------//

pub fn sent_messages(outputs: &[OControllerMessage]) -> Vec<&Message> {
    outputs
        .iter()
        .filter_map(|output| match *output {
            OControllerMessage::Send(ref frame) => Some(&frame.message),
            _ => None,
        })
        .collect()
}

pub fn fs_commands(outputs: &[OControllerMessage]) -> Vec<&IFsMessage> {
    outputs
        .iter()
        .filter_map(|output| match *output {
            OControllerMessage::Fs(ref command) => Some(command),
            _ => None,
        })
        .collect()
}

pub fn hash_commands(outputs: &[OControllerMessage]) -> Vec<&IHashMessage> {
    outputs
        .iter()
        .filter_map(|output| match *output {
            OControllerMessage::Hash(ref command) => Some(command),
            _ => None,
        })
        .collect()
}

pub fn first_request(outputs: &[OControllerMessage]) -> Option<bep_proto::message::RequestMessage> {
    sent_messages(outputs)
        .into_iter()
        .filter_map(|message| match *message {
            Message::Request(ref request) => Some(request.clone()),
            _ => None,
        })
        .next()
}

/// Drive one fetched block through response, validation, and append;
/// returns the outputs of the append acknowledgement.
pub fn complete_block(
    fixture: &mut Fixture,
    request: &bep_proto::message::RequestMessage,
    data: &[u8],
) -> Vec<OControllerMessage> {
    let response = Message::Response(bep_proto::message::ResponseMessage {
        id: request.id,
        data: data.to_vec(),
        code: bep_proto::message::ErrorCode::NoError,
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

    fixture.drive(IControllerMessage::FsResult(OFsMessage::BlockAppended(
        append_token,
    )))
}

/// Acknowledge a finish command found in the given outputs; returns
/// the outputs of the acknowledgement.
pub fn complete_finish(fixture: &mut Fixture, outputs: &[OControllerMessage]) -> Vec<OControllerMessage> {
    let finish_token = fs_commands(outputs)
        .into_iter()
        .filter_map(|command| match *command {
            IFsMessage::FinishFile { token, .. } => Some(token),
            _ => None,
        })
        .next()
        .unwrap_or_else(|| panic!("Expected Fs FinishFile In {:?}", outputs));

    fixture.drive(IControllerMessage::FsResult(OFsMessage::FileFinished(
        finish_token,
    )))
}
