//! Composable state deltas applied to the cluster.
//!
//! Every model mutation is expressed as a `ClusterDiff`. Applying a
//! diff twice is equivalent to applying it once, which lets observers
//! and persistence replay them safely. Observers receive diffs through
//! the `ClusterVisitor` trait: implement only the variants you care
//! about and let the rest fall through to `visit_next`.

use bep_proto::message::{ClusterConfigMessage, FileInfo as WireFileInfo};
use bep_util::device::DeviceId;

use crate::block::BlockRef;
use crate::cluster::Cluster;
use crate::device::ConnectionState;
use crate::error::{ErrorKind, Result};
use crate::file_info::FileInfo;
use crate::pending::{PendingDevice, PendingFolder};
use crate::version;

/// Enumeration of every delta the model understands.
#[derive(Clone, Debug, PartialEq)]
pub enum ClusterDiff {
    /// A device's connection state changed.
    PeerState {
        device: DeviceId,
        state: ConnectionState,
        connection_id: Option<String>,
    },
    /// A peer (re)announced its view of the shared folders; merged.
    ClusterUpdate {
        device: DeviceId,
        config: ClusterConfigMessage,
    },
    /// Create or update a folder info record.
    UpsertFolderInfo {
        folder: String,
        device: DeviceId,
        index_id: u64,
        announced_max_sequence: u64,
    },
    /// Apply an index or index update from a peer.
    UpdateFolder {
        folder: String,
        device: DeviceId,
        files: Vec<WireFileInfo>,
    },
    /// A block was validated and persisted; mark it available.
    BlockAck {
        folder: String,
        device: DeviceId,
        name: String,
        block_index: usize,
    },
    /// A block failed validation; the file cannot be completed for now.
    BlockRej {
        folder: String,
        device: DeviceId,
        name: String,
        block_index: usize,
    },
    /// Satisfy a block from a local copy instead of the network. Pure
    /// routing: the model changes when the resulting ack arrives.
    CloneBlock {
        folder: String,
        device: DeviceId,
        name: String,
        block_index: usize,
        source: BlockRef,
    },
    /// Promote the peer's file to be the canonical local file, after
    /// optionally parking the previous copy under a conflict name.
    AdvanceFile {
        folder: String,
        device: DeviceId,
        name: String,
        conflict_name: Option<String>,
    },
    /// Flip the reachability marker of a file.
    MarkReachable {
        folder: String,
        device: DeviceId,
        name: String,
        reachable: bool,
    },
    /// Operator removed a device; cascades.
    RemovePeer { device: DeviceId },
    /// Remove folder infos of the given devices for a folder.
    RemoveFolderInfos {
        folder: String,
        devices: Vec<DeviceId>,
    },
    /// Remove the named files.
    RemoveFiles {
        folder: String,
        device: DeviceId,
        names: Vec<String>,
    },
    /// Drop file records that failed validation during load.
    RemoveCorruptedFiles {
        records: Vec<(String, DeviceId, String)>,
    },
    /// Record a device that contacted us but is not yet accepted.
    AddPendingDevice {
        device: DeviceId,
        name: String,
        last_seen_s: i64,
    },
    /// Record a folder offered by a peer but not yet accepted.
    AddPendingFolder {
        device: DeviceId,
        folder: String,
        label: String,
    },
    /// Ask the dial machinery to contact the device.
    DialRequest { device: DeviceId },
    /// Ask the discovery collaborators to resolve the device's uris.
    DiscoveryNotification { device: DeviceId },
    /// The first block of the folder was locked for fetch.
    SynchronizationStart { folder: String },
    /// The last locked block of the folder was released.
    SynchronizationFinish { folder: String },
    /// A filesystem operation against a file failed.
    IoFailure {
        folder: String,
        device: DeviceId,
        name: String,
        detail: String,
    },
}

impl ClusterDiff {
    /// Apply the diff to the model. Idempotent.
    pub fn apply(&self, cluster: &mut Cluster) -> Result<()> {
        match *self {
            ClusterDiff::PeerState {
                ref device,
                state,
                ref connection_id,
            } => {
                let entry = cluster
                    .device_mut(device)
                    .ok_or_else(|| ErrorKind::UnknownPeer { device: *device })?;
                entry.state = state;
                entry.connection_id = connection_id.clone();

                Ok(())
            }
            ClusterDiff::ClusterUpdate { ref device, ref config } => {
                apply_cluster_update(cluster, device, config)
            }
            ClusterDiff::UpsertFolderInfo {
                ref folder,
                ref device,
                index_id,
                announced_max_sequence,
            } => {
                let folder_info = cluster.ensure_folder_info(folder, device, index_id)?;
                folder_info.index_id = index_id;
                if announced_max_sequence > folder_info.announced_max_sequence {
                    folder_info.announced_max_sequence = announced_max_sequence;
                }

                Ok(())
            }
            ClusterDiff::UpdateFolder {
                ref folder,
                ref device,
                ref files,
            } => apply_update_folder(cluster, folder, device, files),
            ClusterDiff::BlockAck {
                ref folder,
                ref device,
                ref name,
                block_index,
            } => {
                if let Some(file) = cluster.file_mut(folder, device, name) {
                    file.available.insert(block_index);
                }

                Ok(())
            }
            ClusterDiff::BlockRej {
                ref folder,
                ref device,
                ref name,
                ..
            } => {
                if let Some(file) = cluster.file_mut(folder, device, name) {
                    file.unreachable = true;
                }

                Ok(())
            }
            ClusterDiff::CloneBlock { .. } => Ok(()),
            ClusterDiff::AdvanceFile {
                ref folder,
                ref device,
                ref name,
                ref conflict_name,
            } => apply_advance_file(cluster, folder, device, name, conflict_name.as_ref()),
            ClusterDiff::MarkReachable {
                ref folder,
                ref device,
                ref name,
                reachable,
            } => {
                if let Some(file) = cluster.file_mut(folder, device, name) {
                    file.unreachable = !reachable;
                }

                Ok(())
            }
            ClusterDiff::RemovePeer { ref device } => {
                cluster.remove_device(device);

                Ok(())
            }
            ClusterDiff::RemoveFolderInfos { ref folder, ref devices } => {
                for device in devices.iter() {
                    cluster.remove_folder_info(folder, device);
                }

                Ok(())
            }
            ClusterDiff::RemoveFiles {
                ref folder,
                ref device,
                ref names,
            } => {
                for name in names.iter() {
                    cluster.remove_file(folder, device, name);
                }

                Ok(())
            }
            ClusterDiff::RemoveCorruptedFiles { ref records } => {
                for &(ref folder, ref device, ref name) in records.iter() {
                    cluster.remove_file(folder, device, name);
                }

                Ok(())
            }
            ClusterDiff::AddPendingDevice {
                ref device,
                ref name,
                last_seen_s,
            } => {
                if !cluster.ignored_devices.contains_key(device)
                    && !cluster.devices.contains_key(device)
                {
                    cluster.pending_devices.insert(
                        *device,
                        PendingDevice {
                            id: *device,
                            name: name.clone(),
                            last_seen_s,
                        },
                    );
                }

                Ok(())
            }
            ClusterDiff::AddPendingFolder {
                ref device,
                ref folder,
                ref label,
            } => {
                let key = (*device, folder.clone());
                if !cluster.ignored_folders.contains_key(&key) {
                    cluster.pending_folders.insert(
                        key,
                        PendingFolder {
                            device: *device,
                            folder: folder.clone(),
                            label: label.clone(),
                        },
                    );
                }

                Ok(())
            }
            ClusterDiff::DialRequest { ref device } => {
                if let Some(entry) = cluster.device_mut(device) {
                    entry.state = ConnectionState::Dialing;
                }

                Ok(())
            }
            ClusterDiff::DiscoveryNotification { ref device } => {
                if let Some(entry) = cluster.device_mut(device) {
                    entry.state = ConnectionState::Discovering;
                }

                Ok(())
            }
            ClusterDiff::SynchronizationStart { ref folder } => {
                if let Some(entry) = cluster.folder_mut(folder) {
                    entry.synchronizing = true;
                }

                Ok(())
            }
            ClusterDiff::SynchronizationFinish { ref folder } => {
                if let Some(entry) = cluster.folder_mut(folder) {
                    entry.synchronizing = false;
                }

                Ok(())
            }
            ClusterDiff::IoFailure {
                ref folder,
                ref device,
                ref name,
                ref detail,
            } => {
                warn!("io failure on {:?}/{:?}: {}", folder, name, detail);
                if let Some(file) = cluster.file_mut(folder, device, name) {
                    file.unreachable = true;
                }

                Ok(())
            }
        }
    }

    /// Dispatch the diff to the matching visitor method.
    pub fn visit<V>(&self, visitor: &mut V) -> Result<()>
    where
        V: ClusterVisitor,
    {
        match *self {
            ClusterDiff::PeerState { .. } => visitor.peer_state(self),
            ClusterDiff::ClusterUpdate { .. } => visitor.cluster_update(self),
            ClusterDiff::UpsertFolderInfo { .. } => visitor.upsert_folder_info(self),
            ClusterDiff::UpdateFolder { .. } => visitor.update_folder(self),
            ClusterDiff::BlockAck { .. } => visitor.block_ack(self),
            ClusterDiff::BlockRej { .. } => visitor.block_rej(self),
            ClusterDiff::CloneBlock { .. } => visitor.clone_block(self),
            ClusterDiff::AdvanceFile { .. } => visitor.advance_file(self),
            ClusterDiff::MarkReachable { .. } => visitor.mark_reachable(self),
            ClusterDiff::RemovePeer { .. } => visitor.remove_peer(self),
            ClusterDiff::RemoveFolderInfos { .. } => visitor.remove_folder_infos(self),
            ClusterDiff::RemoveFiles { .. } => visitor.remove_files(self),
            ClusterDiff::RemoveCorruptedFiles { .. } => visitor.remove_corrupted_files(self),
            ClusterDiff::AddPendingDevice { .. } => visitor.add_pending_device(self),
            ClusterDiff::AddPendingFolder { .. } => visitor.add_pending_folder(self),
            ClusterDiff::DialRequest { .. } => visitor.dial_request(self),
            ClusterDiff::DiscoveryNotification { .. } => visitor.discovery_notification(self),
            ClusterDiff::SynchronizationStart { .. } => visitor.synchronization_start(self),
            ClusterDiff::SynchronizationFinish { .. } => visitor.synchronization_finish(self),
            ClusterDiff::IoFailure { .. } => visitor.io_failure(self),
        }
    }
}

/// Observer of applied diffs. Every method falls through to
/// `visit_next` unless overridden.
pub trait ClusterVisitor {
    fn visit_next(&mut self, _diff: &ClusterDiff) -> Result<()> {
        Ok(())
    }

    fn peer_state(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn cluster_update(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn upsert_folder_info(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn update_folder(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn block_ack(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn block_rej(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn clone_block(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn advance_file(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn mark_reachable(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn remove_peer(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn remove_folder_infos(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn remove_files(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn remove_corrupted_files(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn add_pending_device(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn add_pending_folder(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn dial_request(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn discovery_notification(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn synchronization_start(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn synchronization_finish(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
    fn io_failure(&mut self, diff: &ClusterDiff) -> Result<()> {
        self.visit_next(diff)
    }
}

// ----------------------------------------------------------------------------//

fn apply_cluster_update(
    cluster: &mut Cluster,
    device: &DeviceId,
    config: &ClusterConfigMessage,
) -> Result<()> {
    if cluster.device(device).is_none() {
        return Err(ErrorKind::UnknownPeer { device: *device }.into());
    }

    for folder in config.folders.iter() {
        let known_and_shared = cluster
            .folder(&folder.id)
            .map(|entry| entry.is_shared_with(device))
            .unwrap_or(false);

        if !known_and_shared {
            // Merge semantics: unknown folders are recorded, not applied
            ClusterDiff::AddPendingFolder {
                device: *device,
                folder: folder.id.clone(),
                label: folder.label.clone(),
            }
            .apply(cluster)?;
            continue;
        }

        for entry in folder.devices.iter() {
            if entry.id == *device {
                let folder_info = cluster.ensure_folder_info(&folder.id, device, entry.index_id)?;
                folder_info.index_id = entry.index_id;
                if entry.max_sequence > folder_info.announced_max_sequence {
                    folder_info.announced_max_sequence = entry.max_sequence;
                }

                let peer = cluster
                    .device_mut(device)
                    .expect("bep_model: Peer Vanished During Cluster Update");
                peer.compression = entry.compression;
            }
        }
    }

    Ok(())
}

fn apply_update_folder(
    cluster: &mut Cluster,
    folder: &str,
    device: &DeviceId,
    files: &[WireFileInfo],
) -> Result<()> {
    cluster.ensure_folder_info(folder, device, 0)?;

    for wire in files.iter() {
        let incoming = FileInfo::from_wire(wire.clone())?;

        let stale = cluster
            .file(folder, device, &incoming.name)
            .map(|existing| existing.sequence >= incoming.sequence)
            .unwrap_or(false);
        if stale {
            continue;
        }

        cluster.insert_file(folder, device, incoming)?;
    }

    Ok(())
}

fn apply_advance_file(
    cluster: &mut Cluster,
    folder: &str,
    device: &DeviceId,
    name: &str,
    conflict_name: Option<&String>,
) -> Result<()> {
    let local_id = cluster.local_id();
    let local_short = cluster.local_short_id();

    let peer_file = match cluster.file(folder, device, name) {
        Some(file) => file.clone(),
        None => return Ok(()),
    };

    // Re-applying after the local copy already caught up is a no-op
    let already_current = cluster
        .file(folder, &local_id, name)
        .map(|local| {
            let relation = version::compare(&local.version, &peer_file.version);
            relation == version::VersionOrdering::Equal
                || relation == version::VersionOrdering::Descendant
        })
        .unwrap_or(false);
    if already_current {
        return Ok(());
    }

    cluster.ensure_folder_info(folder, &local_id, 0)?;

    if let Some(conflict_name) = conflict_name {
        if let Some(previous) = cluster.file(folder, &local_id, name).cloned() {
            let mut parked = previous;
            parked.name = conflict_name.clone();
            parked.version = version::advance(&parked.version, local_short);
            parked.sequence = cluster
                .folder_info(folder, &local_id)
                .expect("bep_model: Local Folder Info Vanished During Advance")
                .next_sequence();
            parked.unreachable = false;

            cluster.insert_file(folder, &local_id, parked)?;
        }
    }

    let mut advanced = peer_file;
    advanced.sequence = cluster
        .folder_info(folder, &local_id)
        .expect("bep_model: Local Folder Info Vanished During Advance")
        .next_sequence();
    advanced.mark_all_available();
    advanced.unreachable = false;

    cluster.insert_file(folder, &local_id, advanced)?;

    Ok(())
}
