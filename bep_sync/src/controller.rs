//! The per-peer controller state machine.
//!
//! Inputs arrive as messages (session frames, hasher verdicts, file
//! actor acknowledgements, model updates, timer expiries); outputs are
//! queued and drained by the owner. The controller never touches the
//! network or the disk itself.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use bep_disk::{FsToken, IFsMessage, OFsMessage, RemoteCopyKind};
use bep_hasher::{IHashMessage, OHashMessage};
use bep_model::diff::ClusterDiff;
use bep_model::misc::{pull_decision, BlockIterator, BlockPull, BlockSource, FileIterator, UpdatesStreamer};
use bep_model::version::Decision;
use bep_model::{Cluster, ConnectionState};
use bep_proto::message::{
    hello::HelloMessage, ClusterConfigMessage, Compression, DeviceEntry, ErrorCode, FolderEntry,
    IndexMessage, Message, RequestMessage, ResponseMessage,
};
use bep_proto::BepFrame;
use bep_util::device::DeviceId;
use bep_util::seq::Sequencer;
use bep_util::BlockHash;
use bytes::Bytes;

use crate::error::{SyncErrorKind, SyncResult};
use crate::locks::BlockLocks;
use crate::record::FolderSyncRecord;

const DEFAULT_REQUEST_POOL: i64 = 32 * 1024 * 1024;
const DEFAULT_MAX_IN_FLIGHT: usize = 8;
const DEFAULT_OUTGOING_BUFFER_MAX: u64 = 16 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 90_000;
const DEFAULT_INDEX_BATCH: usize = 64;
const MAX_BLOCK_RETRIES: u32 = 3;

/// Knobs for one controller.
#[derive(Clone)]
pub struct ControllerConfig {
    pub request_pool: i64,
    pub max_in_flight: usize,
    pub outgoing_buffer_max: u64,
    pub request_timeout: Duration,
    pub index_batch: usize,
}

impl Default for ControllerConfig {
    fn default() -> ControllerConfig {
        ControllerConfig {
            request_pool: DEFAULT_REQUEST_POOL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            outgoing_buffer_max: DEFAULT_OUTGOING_BUFFER_MAX,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            index_batch: DEFAULT_INDEX_BATCH,
        }
    }
}

/// Messages the owner feeds into the controller.
#[derive(Debug)]
pub enum IControllerMessage {
    /// The session came up; the peer's hello is attached.
    Established(HelloMessage),
    /// A controlled message arrived from the peer.
    Received(Message),
    /// A hasher verdict for a previously submitted block.
    HashResult(OHashMessage),
    /// A file actor acknowledgement.
    FsResult(OFsMessage),
    /// A diff was applied to the cluster by someone else.
    ModelUpdate(ClusterDiff),
    /// The request timer for the given id expired.
    RequestTimeout(u64),
    /// Wind the controller down.
    Shutdown,
}

/// Messages the controller asks its owner to act on.
#[derive(Debug)]
pub enum OControllerMessage {
    /// Frame a message to the peer.
    Send(BepFrame),
    /// Run a filesystem command.
    Fs(IFsMessage),
    /// Run a hash validation.
    Hash(IHashMessage),
    /// Persist and fan out a diff the controller already applied.
    Apply(ClusterDiff),
    /// Arm a timer for an outstanding block request.
    StartRequestTimer { id: u64, timeout: Duration },
    /// The controller finished winding down.
    ShutdownComplete(ShutdownReason),
}

/// Structured reason a controller stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownReason {
    pub kind: &'static str,
    pub cause: Option<String>,
}

impl ShutdownReason {
    fn normal() -> ShutdownReason {
        ShutdownReason {
            kind: "shutdown",
            cause: None,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum ControllerState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

struct PendingRequest {
    folder: String,
    name: String,
    block_index: usize,
    offset: u64,
    size: u32,
    hash: BlockHash,
    data: Option<Bytes>,
}

enum WriteKind {
    Append { size: u32, hash: BlockHash },
    Clone,
    Finish { conflict: Option<String> },
    RemoteCopy,
}

struct WriteOp {
    kind: WriteKind,
    folder: String,
    name: String,
    block_index: usize,
}

struct UploadRead {
    request: RequestMessage,
}

/// The controller proper. Owns the request pool, the outgoing buffer
/// budget, the in-flight map, and the per-folder synchronization
/// records for one peer session.
pub struct Controller {
    peer: DeviceId,
    connection_id: String,
    config: ControllerConfig,
    sequencer: Sequencer,
    locks: BlockLocks,

    state: ControllerState,
    request_pool: i64,
    in_flight: HashMap<u64, PendingRequest>,
    write_ops: HashMap<FsToken, WriteOp>,
    retries: HashMap<(String, String), u32>,

    outgoing_buffer: u64,
    upload_queue: VecDeque<RequestMessage>,
    upload_reads: HashMap<FsToken, UploadRead>,

    file_iterator: Option<FileIterator>,
    block_iterator: Option<BlockIterator>,
    sync_records: HashMap<String, FolderSyncRecord>,
    streamer: UpdatesStreamer,

    shutdown_reason: Option<ShutdownReason>,
    outputs: VecDeque<OControllerMessage>,
}

impl Controller {
    pub fn new(
        peer: DeviceId,
        connection_id: String,
        sequencer: Sequencer,
        locks: BlockLocks,
        config: ControllerConfig,
    ) -> Controller {
        let request_pool = config.request_pool;

        Controller {
            peer,
            connection_id,
            config,
            sequencer,
            locks,
            state: ControllerState::Starting,
            request_pool,
            in_flight: HashMap::new(),
            write_ops: HashMap::new(),
            retries: HashMap::new(),
            outgoing_buffer: 0,
            upload_queue: VecDeque::new(),
            upload_reads: HashMap::new(),
            file_iterator: None,
            block_iterator: None,
            sync_records: HashMap::new(),
            streamer: UpdatesStreamer::new(peer),
            shutdown_reason: None,
            outputs: VecDeque::new(),
        }
    }

    pub fn peer(&self) -> &DeviceId {
        &self.peer
    }

    pub fn request_pool(&self) -> i64 {
        self.request_pool
    }

    pub fn in_flight_blocks(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_writes(&self) -> usize {
        self.write_ops.len()
    }

    /// Drain the next queued output.
    pub fn poll_output(&mut self) -> Option<OControllerMessage> {
        self.outputs.pop_front()
    }

    /// Feed one input through the state machine. A returned error is
    /// fatal to the session.
    pub fn handle(&mut self, cluster: &mut Cluster, message: IControllerMessage) -> SyncResult<()> {
        if self.state == ControllerState::Stopped {
            return Ok(());
        }

        match message {
            IControllerMessage::Established(hello) => self.on_established(cluster, hello),
            IControllerMessage::Received(message) => self.on_received(cluster, message),
            IControllerMessage::HashResult(result) => self.on_hash_result(cluster, result),
            IControllerMessage::FsResult(result) => self.on_fs_result(cluster, result),
            IControllerMessage::ModelUpdate(diff) => self.on_model_update(cluster, diff),
            IControllerMessage::RequestTimeout(id) => self.on_request_timeout(cluster, id),
            IControllerMessage::Shutdown => self.on_shutdown(cluster),
        }
    }

    //------------------------------------------------------------------//

    fn on_established(&mut self, cluster: &mut Cluster, hello: HelloMessage) -> SyncResult<()> {
        info!(
            "session {} up with {:?} ({})",
            self.connection_id, self.peer, hello.device_name
        );

        self.apply(
            cluster,
            ClusterDiff::PeerState {
                device: self.peer,
                state: ConnectionState::Online,
                connection_id: Some(self.connection_id.clone()),
            },
        )?;

        let config = self.build_cluster_config(cluster);
        self.send(Message::ClusterConfig(config));
        self.state = ControllerState::Running;

        Ok(())
    }

    fn build_cluster_config(&self, cluster: &Cluster) -> ClusterConfigMessage {
        let mut folders = Vec::new();

        for folder in cluster.shared_folders(&self.peer) {
            let mut devices = Vec::new();
            let mut sharing: Vec<DeviceId> = folder.shared_with.iter().cloned().collect();
            sharing.push(cluster.local_id());
            sharing.sort();
            sharing.dedup();

            for device_id in sharing {
                let info = cluster.folder_info(&folder.id, &device_id);
                let compression = cluster
                    .device(&device_id)
                    .map(|device| device.compression)
                    .unwrap_or(Compression::Metadata);

                devices.push(DeviceEntry {
                    id: device_id,
                    max_sequence: info.map(|info| info.max_sequence).unwrap_or(0),
                    index_id: info.map(|info| info.index_id).unwrap_or(0),
                    compression,
                });
            }

            folders.push(FolderEntry {
                id: folder.id.clone(),
                label: folder.label.clone(),
                devices,
            });
        }

        ClusterConfigMessage { folders }
    }

    fn on_received(&mut self, cluster: &mut Cluster, message: Message) -> SyncResult<()> {
        match message {
            Message::ClusterConfig(config) => self.on_cluster_config(cluster, config),
            Message::Index(index) => self.on_index(cluster, index, true),
            Message::IndexUpdate(index) => self.on_index(cluster, index, false),
            Message::Request(request) => self.on_request(cluster, request),
            Message::Response(response) => self.on_response(cluster, response),
            Message::DownloadProgress(progress) => {
                debug!("peer reports progress in {:?}", progress.folder);

                Ok(())
            }
            Message::Ping => Ok(()),
            Message::Close(close) => {
                info!("peer closed the session: {}", close.reason);
                self.wind_down(
                    cluster,
                    ShutdownReason {
                        kind: "remote-close",
                        cause: Some(close.reason),
                    },
                )
            }
        }
    }

    /// Merge the peer's view of the shared folders, then kick both
    /// directions: our indexes out, missing files in.
    fn on_cluster_config(
        &mut self,
        cluster: &mut Cluster,
        config: ClusterConfigMessage,
    ) -> SyncResult<()> {
        // A folder we know and the peer names, but which is not shared
        // with it, is a protocol violation; unknown folders merely
        // become pending records during the merge.
        for folder in config.folders.iter() {
            let known_unshared = cluster
                .folder(&folder.id)
                .map(|entry| !entry.is_shared_with(&self.peer))
                .unwrap_or(false);
            if known_unshared {
                return Err(SyncErrorKind::FolderNotShared {
                    folder: folder.id.clone(),
                }
                .into());
            }
        }

        let local_id = cluster.local_id();
        for folder in config.folders.iter() {
            for entry in folder.devices.iter() {
                if entry.id != local_id {
                    continue;
                }

                // Position our index stream where the peer says it is,
                // unless it talks about some other incarnation of the
                // folder
                let local_index_id = cluster
                    .folder_info(&folder.id, &local_id)
                    .map(|info| info.index_id)
                    .unwrap_or(0);
                let position = if entry.index_id == local_index_id {
                    entry.max_sequence
                } else {
                    0
                };
                self.streamer.set_position(&folder.id, position);
            }
        }

        self.apply(
            cluster,
            ClusterDiff::ClusterUpdate {
                device: self.peer,
                config,
            },
        )?;

        self.push_indices(cluster);

        // Folders with nothing fresh still get their (empty) snapshot
        // announced exactly once, so later changes go out as updates
        let announce: Vec<String> = cluster
            .shared_folders(&self.peer)
            .iter()
            .filter(|folder| folder.serves_local())
            .map(|folder| folder.id.clone())
            .collect();
        for folder in announce {
            if self.streamer.mark_announced(&folder) {
                self.send(Message::Index(IndexMessage {
                    folder,
                    files: Vec::new(),
                }));
            }
        }

        self.wake_puller(cluster);

        Ok(())
    }

    fn on_index(
        &mut self,
        cluster: &mut Cluster,
        index: IndexMessage,
        full: bool,
    ) -> SyncResult<()> {
        let shared = cluster
            .folder(&index.folder)
            .map(|folder| folder.is_shared_with(&self.peer))
            .unwrap_or(false);
        if !shared {
            return Err(SyncErrorKind::FolderNotShared {
                folder: index.folder.clone(),
            }
            .into());
        }

        let mut previous = cluster
            .folder_info(&index.folder, &self.peer)
            .map(|info| info.max_sequence)
            .unwrap_or(0);
        if full {
            // A full index restarts the folder's sequence space
            previous = 0;
        }

        for file in index.files.iter() {
            if file.sequence <= previous {
                return Err(SyncErrorKind::IndexSequenceRegression {
                    folder: index.folder.clone(),
                    previous,
                    received: file.sequence,
                }
                .into());
            }
            previous = file.sequence;
        }

        debug!(
            "{} files in {} for folder {:?}",
            index.files.len(),
            if full { "index" } else { "index update" },
            index.folder
        );

        self.apply(
            cluster,
            ClusterDiff::UpdateFolder {
                folder: index.folder,
                device: self.peer,
                files: index.files,
            },
        )?;

        self.wake_puller(cluster);

        Ok(())
    }

    //------------------------------------------------------------------//

    /// The puller: request or clone missing blocks while budget lasts.
    fn pull_next(&mut self, cluster: &mut Cluster) {
        if self.state != ControllerState::Running {
            return;
        }
        let online = cluster
            .device(&self.peer)
            .map(|device| device.is_online())
            .unwrap_or(false);
        if !online {
            return;
        }

        loop {
            if self.in_flight.len() >= self.config.max_in_flight {
                return;
            }

            let pull = match self.advance_block(cluster) {
                Some(pull) => pull,
                None => return,
            };
            let (folder, name) = {
                let iterator = self
                    .block_iterator
                    .as_ref()
                    .expect("bep_sync: Block Iterator Vanished During Pull");

                (iterator.folder().to_owned(), iterator.name().to_owned())
            };

            match pull.source {
                BlockSource::Clone(ref source) => {
                    // A wake between the command and its ack must not
                    // clone the same block twice
                    let already_writing = self.write_ops.values().any(|op| {
                        op.folder == folder && op.name == name && op.block_index == pull.index
                    });
                    if already_writing {
                        continue;
                    }

                    let target_path = match self.final_path(cluster, &folder, &name) {
                        Some(path) => path,
                        None => continue,
                    };
                    let source_path = match self.final_path(cluster, &source.folder, &source.name) {
                        Some(path) => path,
                        None => continue,
                    };
                    let file_size = cluster
                        .file(&folder, &self.peer, &name)
                        .map(|file| file.size)
                        .unwrap_or(0);

                    let diff = ClusterDiff::CloneBlock {
                        folder: folder.clone(),
                        device: self.peer,
                        name: name.clone(),
                        block_index: pull.index,
                        source: source.clone(),
                    };
                    if self.apply(cluster, diff).is_err() {
                        continue;
                    }

                    let token = self.sequencer.next_id();
                    self.write_ops.insert(
                        token,
                        WriteOp {
                            kind: WriteKind::Clone,
                            folder,
                            name,
                            block_index: pull.index,
                        },
                    );
                    self.outputs.push_back(OControllerMessage::Fs(IFsMessage::CloneBlock {
                        token,
                        target: target_path,
                        target_size: file_size,
                        target_offset: pull.offset,
                        source: source_path,
                        source_offset: source.offset,
                        block_size: pull.size,
                    }));
                }
                BlockSource::Fetch => {
                    if self.request_pool < pull.size as i64 {
                        return;
                    }
                    if !self.locks.try_lock(&pull.hash) {
                        // Another controller is already fetching this
                        // block; we pick it up locally once it lands
                        continue;
                    }

                    let id = self.sequencer.next_id();
                    self.request_pool -= pull.size as i64;

                    if self
                        .sync_record(&folder)
                        .start_fetch(pull.hash)
                    {
                        let diff = ClusterDiff::SynchronizationStart {
                            folder: folder.clone(),
                        };
                        let _ = self.apply(cluster, diff);
                    }

                    self.in_flight.insert(
                        id,
                        PendingRequest {
                            folder: folder.clone(),
                            name: name.clone(),
                            block_index: pull.index,
                            offset: pull.offset,
                            size: pull.size,
                            hash: pull.hash,
                            data: None,
                        },
                    );

                    self.send(Message::Request(RequestMessage {
                        id,
                        folder,
                        name,
                        offset: pull.offset,
                        size: pull.size,
                        hash: pull.hash,
                    }));
                    self.outputs.push_back(OControllerMessage::StartRequestTimer {
                        id,
                        timeout: self.config.request_timeout,
                    });
                }
            }
        }
    }

    /// Advance the block iterator, moving the file iterator along when
    /// the current file runs out of missing blocks. Contentless files
    /// are materialized on the spot and produce no block pulls.
    fn advance_block(&mut self, cluster: &mut Cluster) -> Option<BlockPull> {
        loop {
            if let Some(pull) = self
                .block_iterator
                .as_mut()
                .and_then(|iterator| iterator.next(cluster))
            {
                // In-folder dedup: a hash this controller is already
                // fetching for another file will be cloned later
                let folder = self
                    .block_iterator
                    .as_ref()
                    .map(|iterator| iterator.folder().to_owned())
                    .expect("bep_sync: Block Iterator Vanished During Advance");
                let already_fetching = self
                    .sync_records
                    .get(&folder)
                    .map(|record| record.is_fetching(&pull.hash))
                    .unwrap_or(false);
                if already_fetching {
                    continue;
                }

                return Some(pull);
            }
            if let Some(iterator) = self.block_iterator.take() {
                // A file can arrive with every block already on disk
                // (resume, pure dedup); it still has to be finished
                let folder = iterator.folder().to_owned();
                let name = iterator.name().to_owned();
                self.maybe_finish_file(cluster, &folder, &name);
            }

            let (folder, name) = {
                let iterator = match self.file_iterator.as_mut() {
                    Some(iterator) => iterator,
                    None => return None,
                };
                match iterator.next(cluster) {
                    Some(next) => next,
                    None => return None,
                }
            };

            let contentless = cluster
                .file(&folder, &self.peer, &name)
                .map(|file| file.is_contentless())
                .unwrap_or(true);
            if contentless {
                self.materialize_contentless(cluster, &folder, &name);
                continue;
            }

            self.block_iterator = Some(BlockIterator::new(folder, self.peer, name));
        }
    }

    fn materialize_contentless(&mut self, cluster: &mut Cluster, folder: &str, name: &str) {
        use bep_proto::message::FileInfoType;

        let already_writing = self
            .write_ops
            .values()
            .any(|op| op.folder == folder && op.name == name);
        if already_writing {
            return;
        }

        let file = match cluster.file(folder, &self.peer, name) {
            Some(file) => file.clone(),
            None => return,
        };
        let path = match self.final_path(cluster, folder, name) {
            Some(path) => path,
            None => return,
        };

        let kind = if file.deleted {
            RemoteCopyKind::Delete
        } else {
            match file.file_type {
                FileInfoType::Directory => RemoteCopyKind::Directory,
                FileInfoType::Symlink => RemoteCopyKind::Symlink {
                    target: file.symlink_target.clone(),
                },
                FileInfoType::File => RemoteCopyKind::EmptyFile,
            }
        };

        let ignore_permissions = cluster
            .folder(folder)
            .map(|entry| entry.ignore_permissions)
            .unwrap_or(false);
        let permissions = if ignore_permissions || file.no_permissions {
            None
        } else {
            Some(file.permissions)
        };

        let token = self.sequencer.next_id();
        self.write_ops.insert(
            token,
            WriteOp {
                kind: WriteKind::RemoteCopy,
                folder: folder.to_owned(),
                name: name.to_owned(),
                block_index: 0,
            },
        );
        self.outputs.push_back(OControllerMessage::Fs(IFsMessage::RemoteCopy {
            token,
            path,
            kind,
            permissions,
            modified_s: file.modified_s,
        }));
    }

    fn final_path(&self, cluster: &Cluster, folder: &str, name: &str) -> Option<PathBuf> {
        cluster.folder(folder).map(|entry| entry.path.join(name))
    }

    //------------------------------------------------------------------//

    fn on_response(&mut self, cluster: &mut Cluster, response: ResponseMessage) -> SyncResult<()> {
        let mut pending = match self.in_flight.remove(&response.id) {
            Some(pending) => pending,
            None => {
                return Err(SyncErrorKind::UnsolicitedResponse { id: response.id }.into());
            }
        };

        if response.code != ErrorCode::NoError {
            info!(
                "peer failed request {} with {:?}",
                response.id, response.code
            );
            self.fail_block(cluster, &pending, true);

            return Ok(());
        }

        let data = Bytes::from(response.data);
        pending.data = Some(data.clone());
        let expected = pending.hash;
        self.in_flight.insert(response.id, pending);

        self.outputs.push_back(OControllerMessage::Hash(IHashMessage::Verify {
            id: response.id,
            data,
            expected,
        }));

        Ok(())
    }

    fn on_hash_result(&mut self, cluster: &mut Cluster, result: OHashMessage) -> SyncResult<()> {
        match result {
            OHashMessage::Verified { id } => {
                let pending = match self.in_flight.remove(&id) {
                    Some(pending) => pending,
                    None => return Ok(()),
                };
                let data = pending
                    .data
                    .clone()
                    .expect("bep_sync: Validated Block Lost Its Data");

                let path = match self.final_path(cluster, &pending.folder, &pending.name) {
                    Some(path) => path,
                    None => {
                        self.fail_block(cluster, &pending, true);
                        return Ok(());
                    }
                };
                let file_size = cluster
                    .file(&pending.folder, &self.peer, &pending.name)
                    .map(|file| file.size)
                    .unwrap_or(0);

                let token = self.sequencer.next_id();
                self.write_ops.insert(
                    token,
                    WriteOp {
                        kind: WriteKind::Append {
                            size: pending.size,
                            hash: pending.hash,
                        },
                        folder: pending.folder.clone(),
                        name: pending.name.clone(),
                        block_index: pending.block_index,
                    },
                );
                self.outputs.push_back(OControllerMessage::Fs(IFsMessage::AppendBlock {
                    token,
                    path,
                    file_size,
                    offset: pending.offset,
                    data,
                }));

                Ok(())
            }
            OHashMessage::Mismatch { id, .. } => {
                let pending = match self.in_flight.remove(&id) {
                    Some(pending) => pending,
                    None => return Ok(()),
                };

                warn!(
                    "hash mismatch for block {} of {:?}; marking unreachable",
                    pending.block_index, pending.name
                );
                self.fail_block(cluster, &pending, true);

                Ok(())
            }
            OHashMessage::Digested { .. } => Ok(()),
        }
    }

    /// Release everything a failed fetch held. With `unreachable` the
    /// file is parked until a fresh version shows up; the session
    /// stays up either way.
    fn fail_block(&mut self, cluster: &mut Cluster, pending: &PendingRequest, unreachable: bool) {
        self.request_pool += pending.size as i64;
        self.locks.unlock(&pending.hash);
        if self
            .sync_record(&pending.folder)
            .finish_fetch(&pending.hash)
        {
            let diff = ClusterDiff::SynchronizationFinish {
                folder: pending.folder.clone(),
            };
            let _ = self.apply(cluster, diff);
        }

        if unreachable {
            let diff = ClusterDiff::BlockRej {
                folder: pending.folder.clone(),
                device: self.peer,
                name: pending.name.clone(),
                block_index: pending.block_index,
            };
            let _ = self.apply(cluster, diff);
        }

        self.wake_puller(cluster);
    }

    //------------------------------------------------------------------//

    fn on_fs_result(&mut self, cluster: &mut Cluster, result: OFsMessage) -> SyncResult<()> {
        match result {
            OFsMessage::BlockAppended(token) | OFsMessage::BlockCloned(token) => {
                let op = match self.write_ops.remove(&token) {
                    Some(op) => op,
                    None => return Ok(()),
                };

                if let WriteKind::Append { size, hash } = op.kind {
                    self.request_pool += size as i64;
                    self.locks.unlock(&hash);
                    if self.sync_record(&op.folder).finish_fetch(&hash) {
                        let diff = ClusterDiff::SynchronizationFinish {
                            folder: op.folder.clone(),
                        };
                        self.apply(cluster, diff)?;
                    }
                }

                self.apply(
                    cluster,
                    ClusterDiff::BlockAck {
                        folder: op.folder.clone(),
                        device: self.peer,
                        name: op.name.clone(),
                        block_index: op.block_index,
                    },
                )?;

                self.maybe_finish_file(cluster, &op.folder, &op.name);
                self.wake_puller(cluster);
                self.maybe_complete_shutdown();

                Ok(())
            }
            OFsMessage::FileFinished(token) => {
                let op = match self.write_ops.remove(&token) {
                    Some(op) => op,
                    None => return Ok(()),
                };
                let conflict = match op.kind {
                    WriteKind::Finish { conflict } => conflict,
                    _ => None,
                };

                self.apply(
                    cluster,
                    ClusterDiff::AdvanceFile {
                        folder: op.folder.clone(),
                        device: self.peer,
                        name: op.name.clone(),
                        conflict_name: conflict,
                    },
                )?;
                self.retries.remove(&(op.folder.clone(), op.name.clone()));

                self.push_indices(cluster);
                self.wake_puller(cluster);
                self.maybe_complete_shutdown();

                Ok(())
            }
            OFsMessage::RemoteCopied(token) => {
                let op = match self.write_ops.remove(&token) {
                    Some(op) => op,
                    None => return Ok(()),
                };

                self.apply(
                    cluster,
                    ClusterDiff::AdvanceFile {
                        folder: op.folder.clone(),
                        device: self.peer,
                        name: op.name.clone(),
                        conflict_name: None,
                    },
                )?;

                self.push_indices(cluster);
                self.wake_puller(cluster);
                self.maybe_complete_shutdown();

                Ok(())
            }
            OFsMessage::BlockRead(token, data) => {
                let upload = match self.upload_reads.remove(&token) {
                    Some(upload) => upload,
                    None => return Ok(()),
                };

                let compress = cluster
                    .device(&self.peer)
                    .map(|device| device.compression == Compression::Always)
                    .unwrap_or(false);
                let size = upload.request.size as u64;

                self.outputs.push_back(OControllerMessage::Send(BepFrame::new(
                    Message::Response(ResponseMessage {
                        id: upload.request.id,
                        data: data.to_vec(),
                        code: ErrorCode::NoError,
                    }),
                    compress,
                )));

                self.outgoing_buffer = self.outgoing_buffer.saturating_sub(size);
                self.drain_upload_queue(cluster);
                self.maybe_complete_shutdown();

                Ok(())
            }
            OFsMessage::FsFailed(token, error) => {
                if let Some(upload) = self.upload_reads.remove(&token) {
                    warn!("upload read failed: {}", error);

                    self.outputs.push_back(OControllerMessage::Send(BepFrame::from(
                        Message::Response(ResponseMessage {
                            id: upload.request.id,
                            data: Vec::new(),
                            code: ErrorCode::Generic,
                        }),
                    )));
                    self.outgoing_buffer =
                        self.outgoing_buffer.saturating_sub(upload.request.size as u64);
                    self.drain_upload_queue(cluster);
                    self.maybe_complete_shutdown();

                    return Ok(());
                }

                let op = match self.write_ops.remove(&token) {
                    Some(op) => op,
                    None => return Ok(()),
                };
                warn!("write for {:?} failed: {}", op.name, error);

                if let WriteKind::Append { size, hash } = op.kind {
                    self.request_pool += size as i64;
                    self.locks.unlock(&hash);
                    if self.sync_record(&op.folder).finish_fetch(&hash) {
                        let diff = ClusterDiff::SynchronizationFinish {
                            folder: op.folder.clone(),
                        };
                        self.apply(cluster, diff)?;
                    }
                }

                self.apply(
                    cluster,
                    ClusterDiff::IoFailure {
                        folder: op.folder.clone(),
                        device: self.peer,
                        name: op.name.clone(),
                        detail: error.to_string(),
                    },
                )?;

                self.wake_puller(cluster);
                self.maybe_complete_shutdown();

                Ok(())
            }
        }
    }

    /// Once every block of the peer's file is locally available and no
    /// write against it is still in flight, close the temporary out to
    /// its final name, parking the losing local copy first if the
    /// transfer resolves a conflict.
    fn maybe_finish_file(&mut self, cluster: &mut Cluster, folder: &str, name: &str) {
        let complete = cluster
            .file(folder, &self.peer, name)
            .map(|file| file.is_locally_available() && !file.is_contentless())
            .unwrap_or(false);
        if !complete {
            return;
        }

        let writes_pending = self
            .write_ops
            .values()
            .any(|op| op.folder == folder && op.name == name);
        if writes_pending {
            return;
        }

        let file = cluster
            .file(folder, &self.peer, name)
            .expect("bep_sync: Completed File Vanished")
            .clone();
        let path = match self.final_path(cluster, folder, name) {
            Some(path) => path,
            None => return,
        };

        let conflict = match pull_decision(cluster, &self.peer, folder, name) {
            Some(Decision::ConflictRemoteWins { conflict_name }) => Some(conflict_name),
            Some(_) => None,
            // The local copy caught up or changed mid transfer; the
            // next model update re-evaluates this file
            None => return,
        };
        let conflict_path = conflict
            .as_ref()
            .and_then(|conflict_name| self.final_path(cluster, folder, conflict_name));

        let ignore_permissions = cluster
            .folder(folder)
            .map(|entry| entry.ignore_permissions)
            .unwrap_or(false);
        let permissions = if ignore_permissions || file.no_permissions {
            None
        } else {
            Some(file.permissions)
        };

        let token = self.sequencer.next_id();
        self.write_ops.insert(
            token,
            WriteOp {
                kind: WriteKind::Finish { conflict },
                folder: folder.to_owned(),
                name: name.to_owned(),
                block_index: 0,
            },
        );
        self.outputs.push_back(OControllerMessage::Fs(IFsMessage::FinishFile {
            token,
            path,
            file_size: file.size,
            modified_s: file.modified_s,
            permissions,
            conflict_path,
        }));
    }

    //------------------------------------------------------------------//

    /// Serve a block to the peer, subject to the outgoing budget.
    fn on_request(&mut self, cluster: &mut Cluster, request: RequestMessage) -> SyncResult<()> {
        let serves = cluster
            .folder(&request.folder)
            .map(|folder| folder.is_shared_with(&self.peer) && folder.serves_local())
            .unwrap_or(false);
        if !serves {
            self.send(Message::Response(ResponseMessage {
                id: request.id,
                data: Vec::new(),
                code: ErrorCode::Generic,
            }));

            return Ok(());
        }

        let local_id = cluster.local_id();
        let code = match cluster.file(&request.folder, &local_id, &request.name) {
            None => Some(ErrorCode::NoSuchFile),
            Some(file) if file.deleted => Some(ErrorCode::NoSuchFile),
            Some(file) if file.invalid => Some(ErrorCode::InvalidFile),
            Some(_) => None,
        };
        if let Some(code) = code {
            self.send(Message::Response(ResponseMessage {
                id: request.id,
                data: Vec::new(),
                code,
            }));

            return Ok(());
        }

        // Budget exhausted: park the request, never drop it
        let size = request.size as u64;
        if self.outgoing_buffer > 0 && self.outgoing_buffer + size > self.config.outgoing_buffer_max
        {
            debug!("outgoing buffer full, queueing request {}", request.id);
            self.upload_queue.push_back(request);

            return Ok(());
        }

        self.start_upload(cluster, request);

        Ok(())
    }

    fn start_upload(&mut self, cluster: &Cluster, request: RequestMessage) {
        let path = match self.final_path(cluster, &request.folder, &request.name) {
            Some(path) => path,
            None => return,
        };

        let token = self.sequencer.next_id();
        self.outgoing_buffer += request.size as u64;
        self.outputs.push_back(OControllerMessage::Fs(IFsMessage::ReadBlock {
            token,
            path,
            offset: request.offset,
            size: request.size,
        }));
        self.upload_reads.insert(token, UploadRead { request });
    }

    fn drain_upload_queue(&mut self, cluster: &Cluster) {
        while let Some(request) = self.upload_queue.pop_front() {
            let size = request.size as u64;
            if self.outgoing_buffer > 0
                && self.outgoing_buffer + size > self.config.outgoing_buffer_max
            {
                self.upload_queue.push_front(request);
                return;
            }

            self.start_upload(cluster, request);
        }
    }

    //------------------------------------------------------------------//

    fn on_model_update(&mut self, cluster: &mut Cluster, diff: ClusterDiff) -> SyncResult<()> {
        match diff {
            ClusterDiff::RemovePeer { ref device } if *device == self.peer => {
                return Err(SyncErrorKind::PeerRemoved.into());
            }
            _ => (),
        }

        self.push_indices(cluster);
        self.wake_puller(cluster);

        Ok(())
    }

    fn on_request_timeout(&mut self, cluster: &mut Cluster, id: u64) -> SyncResult<()> {
        let pending = match self.in_flight.remove(&id) {
            Some(pending) => pending,
            // The response won the race; nothing to reclaim
            None => return Ok(()),
        };

        let key = (pending.folder.clone(), pending.name.clone());
        let attempts = self.retries.entry(key).or_insert(0);
        *attempts += 1;
        let give_up = *attempts >= MAX_BLOCK_RETRIES;

        warn!(
            "request {} for {:?} timed out (attempt {})",
            id, pending.name, attempts
        );

        // Give the same peer another try until the file is parked
        self.fail_block(cluster, &pending, give_up);

        Ok(())
    }

    //------------------------------------------------------------------//

    fn on_shutdown(&mut self, cluster: &mut Cluster) -> SyncResult<()> {
        self.wind_down(cluster, ShutdownReason::normal())
    }

    fn wind_down(&mut self, cluster: &mut Cluster, reason: ShutdownReason) -> SyncResult<()> {
        if self.state == ControllerState::ShuttingDown || self.state == ControllerState::Stopped {
            return Ok(());
        }
        self.state = ControllerState::ShuttingDown;
        self.shutdown_reason = Some(reason);
        info!("controller for {:?} winding down", self.peer);

        // Cancel pulls: reclaim every outstanding network request, but
        // leave in-flight file actor work to drain for write integrity
        self.file_iterator = None;
        self.block_iterator = None;

        let outstanding: Vec<u64> = self.in_flight.keys().cloned().collect();
        for id in outstanding {
            if let Some(pending) = self.in_flight.remove(&id) {
                self.request_pool += pending.size as i64;
                self.locks.unlock(&pending.hash);
                if self
                    .sync_record(&pending.folder)
                    .finish_fetch(&pending.hash)
                {
                    let diff = ClusterDiff::SynchronizationFinish {
                        folder: pending.folder.clone(),
                    };
                    self.apply(cluster, diff)?;
                }
            }
        }
        self.upload_queue.clear();

        self.apply(
            cluster,
            ClusterDiff::PeerState {
                device: self.peer,
                state: ConnectionState::Offline,
                connection_id: None,
            },
        )?;

        self.maybe_complete_shutdown();

        Ok(())
    }

    fn maybe_complete_shutdown(&mut self) {
        if self.state != ControllerState::ShuttingDown {
            return;
        }
        if !self.write_ops.is_empty() || !self.upload_reads.is_empty() {
            return;
        }

        let reason = self
            .shutdown_reason
            .take()
            .unwrap_or_else(ShutdownReason::normal);
        self.finish_shutdown(reason);
    }

    fn finish_shutdown(&mut self, reason: ShutdownReason) {
        if self.state == ControllerState::Stopped {
            return;
        }
        self.state = ControllerState::Stopped;

        self.outputs
            .push_back(OControllerMessage::ShutdownComplete(reason));
    }

    //------------------------------------------------------------------//

    fn sync_record(&mut self, folder: &str) -> &mut FolderSyncRecord {
        self.sync_records
            .entry(folder.to_owned())
            .or_insert_with(FolderSyncRecord::new)
    }

    fn wake_puller(&mut self, cluster: &mut Cluster) {
        if self.state != ControllerState::Running {
            return;
        }

        self.file_iterator = Some(FileIterator::new(cluster, &self.peer));
        self.block_iterator = None;
        self.pull_next(cluster);
    }

    fn push_indices(&mut self, cluster: &Cluster) {
        while let Some(batch) = self.streamer.next_batch(cluster, self.config.index_batch) {
            let message = IndexMessage {
                folder: batch.folder,
                files: batch.files,
            };

            if batch.initial {
                self.send(Message::Index(message));
            } else {
                self.send(Message::IndexUpdate(message));
            }
        }
    }

    fn send(&mut self, message: Message) {
        self.outputs
            .push_back(OControllerMessage::Send(BepFrame::from(message)));
    }

    fn apply(&mut self, cluster: &mut Cluster, diff: ClusterDiff) -> SyncResult<()> {
        diff.apply(cluster)?;
        self.outputs.push_back(OControllerMessage::Apply(diff));

        Ok(())
    }
}
