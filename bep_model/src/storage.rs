//! Contract the core drives against the persistent key-value engine.
//!
//! The engine itself is an external collaborator; the model only needs
//! transactional puts and deletes of its record types plus a bulk load
//! at startup. `MemoryStorage` backs the tests.

use std::collections::HashMap;

use bep_util::device::DeviceId;
use bep_util::BlockHash;

use crate::block::BlockRecord;
use crate::cluster::Cluster;
use crate::device::Device;
use crate::diff::ClusterDiff;
use crate::error::{ErrorKind, Result};
use crate::file_info::FileInfo;
use crate::folder::Folder;
use crate::folder_info::FolderInfo;
use crate::pending::{IgnoredDevice, IgnoredFolder, PendingDevice, PendingFolder};

/// Everything the engine holds, reloaded at startup.
#[derive(Clone, Debug, Default)]
pub struct StoredState {
    pub devices: Vec<Device>,
    pub folders: Vec<Folder>,
    pub folder_infos: Vec<FolderInfo>,
    pub files: Vec<(String, DeviceId, FileInfo)>,
    pub pending_devices: Vec<PendingDevice>,
    pub ignored_devices: Vec<IgnoredDevice>,
    pub pending_folders: Vec<PendingFolder>,
    pub ignored_folders: Vec<IgnoredFolder>,
    pub applied_marker: u64,
}

/// Transactional persistence interface the diff engine drives.
pub trait Storage {
    fn put_device(&mut self, device: &Device) -> Result<()>;
    fn remove_device(&mut self, id: &DeviceId) -> Result<()>;

    fn put_folder(&mut self, folder: &Folder) -> Result<()>;
    fn remove_folder(&mut self, id: &str) -> Result<()>;

    fn put_folder_info(&mut self, info: &FolderInfo) -> Result<()>;
    fn remove_folder_info(&mut self, folder: &str, device: &DeviceId) -> Result<()>;

    fn put_file(&mut self, folder: &str, device: &DeviceId, file: &FileInfo) -> Result<()>;
    fn remove_file(&mut self, folder: &str, device: &DeviceId, name: &str) -> Result<()>;

    fn put_block(&mut self, hash: &BlockHash, record: &BlockRecord) -> Result<()>;
    fn remove_block(&mut self, hash: &BlockHash) -> Result<()>;

    fn put_pending_device(&mut self, record: &PendingDevice) -> Result<()>;
    fn remove_pending_device(&mut self, id: &DeviceId) -> Result<()>;
    fn put_pending_folder(&mut self, record: &PendingFolder) -> Result<()>;
    fn remove_pending_folder(&mut self, device: &DeviceId, folder: &str) -> Result<()>;

    fn set_applied_marker(&mut self, marker: u64) -> Result<()>;

    fn load(&self) -> Result<StoredState>;
}

// ----------------------------------------------------------------------------//

/// Applies diffs to the cluster and mirrors the outcome into storage,
/// advancing the applied-diff marker once per diff.
pub struct Persister<S> {
    storage: S,
    marker: u64,
}

impl<S> Persister<S>
where
    S: Storage,
{
    pub fn new(storage: S, marker: u64) -> Persister<S> {
        Persister { storage, marker }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Apply the diff to the model and persist what it touched.
    pub fn apply(&mut self, diff: &ClusterDiff, cluster: &mut Cluster) -> Result<()> {
        diff.apply(cluster)?;
        self.mirror(diff, cluster)?;

        self.marker += 1;
        self.storage.set_applied_marker(self.marker)
    }

    fn mirror(&mut self, diff: &ClusterDiff, cluster: &Cluster) -> Result<()> {
        match *diff {
            ClusterDiff::PeerState { ref device, .. }
            | ClusterDiff::DialRequest { ref device }
            | ClusterDiff::DiscoveryNotification { ref device } => {
                if let Some(entry) = cluster.device(device) {
                    self.storage.put_device(entry)?;
                }

                Ok(())
            }
            ClusterDiff::ClusterUpdate { ref device, ref config } => {
                if let Some(entry) = cluster.device(device) {
                    self.storage.put_device(entry)?;
                }
                for folder in config.folders.iter() {
                    if let Some(info) = cluster.folder_info(&folder.id, device) {
                        self.storage.put_folder_info(info)?;
                    }
                    let key = (*device, folder.id.clone());
                    if let Some(pending) = cluster.pending_folders.get(&key) {
                        self.storage.put_pending_folder(pending)?;
                    }
                }

                Ok(())
            }
            ClusterDiff::UpsertFolderInfo { ref folder, ref device, .. } => {
                if let Some(info) = cluster.folder_info(folder, device) {
                    self.storage.put_folder_info(info)?;
                }

                Ok(())
            }
            ClusterDiff::UpdateFolder { ref folder, ref device, ref files } => {
                if let Some(info) = cluster.folder_info(folder, device) {
                    self.storage.put_folder_info(info)?;
                }
                for wire in files.iter() {
                    if let Some(file) = cluster.file(folder, device, &wire.name) {
                        self.storage.put_file(folder, device, file)?;
                    }
                    for block in wire.blocks.iter() {
                        if let Some(record) = cluster.blocks.get(&block.hash) {
                            self.storage.put_block(&block.hash, record)?;
                        }
                    }
                }

                Ok(())
            }
            ClusterDiff::BlockAck { ref folder, ref device, ref name, .. }
            | ClusterDiff::BlockRej { ref folder, ref device, ref name, .. }
            | ClusterDiff::MarkReachable { ref folder, ref device, ref name, .. }
            | ClusterDiff::IoFailure { ref folder, ref device, ref name, .. } => {
                if let Some(file) = cluster.file(folder, device, name) {
                    self.storage.put_file(folder, device, file)?;
                }

                Ok(())
            }
            ClusterDiff::CloneBlock { .. } => Ok(()),
            ClusterDiff::AdvanceFile { ref folder, ref name, ref conflict_name, .. } => {
                let local_id = cluster.local_id();
                if let Some(info) = cluster.folder_info(folder, &local_id) {
                    self.storage.put_folder_info(info)?;
                }
                for stored in Some(name).into_iter().chain(conflict_name.iter()) {
                    if let Some(file) = cluster.file(folder, &local_id, stored) {
                        self.storage.put_file(folder, &local_id, file)?;
                        for block in file.blocks.iter() {
                            if let Some(record) = cluster.blocks.get(&block.hash) {
                                self.storage.put_block(&block.hash, record)?;
                            }
                        }
                    }
                }

                Ok(())
            }
            ClusterDiff::RemovePeer { ref device } => {
                self.storage.remove_device(device)?;
                self.storage.remove_pending_device(device)?;

                Ok(())
            }
            ClusterDiff::RemoveFolderInfos { ref folder, ref devices } => {
                for device in devices.iter() {
                    self.storage.remove_folder_info(folder, device)?;
                }

                Ok(())
            }
            ClusterDiff::RemoveFiles { ref folder, ref device, ref names } => {
                for name in names.iter() {
                    self.storage.remove_file(folder, device, name)?;
                }

                Ok(())
            }
            ClusterDiff::RemoveCorruptedFiles { ref records } => {
                for &(ref folder, ref device, ref name) in records.iter() {
                    self.storage.remove_file(folder, device, name)?;
                }

                Ok(())
            }
            ClusterDiff::AddPendingDevice { ref device, .. } => {
                if let Some(record) = cluster.pending_devices.get(device) {
                    self.storage.put_pending_device(record)?;
                }

                Ok(())
            }
            ClusterDiff::AddPendingFolder { ref device, ref folder, .. } => {
                let key = (*device, folder.clone());
                if let Some(record) = cluster.pending_folders.get(&key) {
                    self.storage.put_pending_folder(record)?;
                }

                Ok(())
            }
            ClusterDiff::SynchronizationStart { ref folder }
            | ClusterDiff::SynchronizationFinish { ref folder } => {
                if let Some(entry) = cluster.folder(folder) {
                    self.storage.put_folder(entry)?;
                }

                Ok(())
            }
        }
    }
}

// ----------------------------------------------------------------------------//

/// Rebuild the cluster from storage. File records whose block lists are
/// inconsistent are removed with a `RemoveCorruptedFiles` diff before
/// the cluster is handed out.
pub fn load_cluster<S>(storage: S, local_id: DeviceId) -> Result<(Cluster, Persister<S>)>
where
    S: Storage,
{
    let state = storage.load()?;
    let mut persister = Persister::new(storage, state.applied_marker);

    let local_device = state
        .devices
        .iter()
        .find(|device| device.id == local_id)
        .cloned()
        .ok_or_else(|| ErrorKind::UnknownPeer { device: local_id })?;
    let mut cluster = Cluster::new(local_device);

    for device in state.devices {
        cluster.devices.entry(device.id).or_insert(device);
    }
    for folder in state.folders {
        cluster.folders.insert(folder.id.clone(), folder);
    }
    for info in state.folder_infos {
        cluster.install_folder_info(FolderInfo {
            files: Default::default(),
            ..info
        });
    }

    let mut corrupted = Vec::new();
    for (folder, device, file) in state.files {
        // Round-tripping through the wire form re-runs the block list
        // consistency checks
        let available = file.available.clone();
        let unreachable = file.unreachable;
        let local_modified = file.local_modified;
        match FileInfo::from_wire(file.to_wire()) {
            Ok(mut validated) => {
                validated.available = available;
                validated.unreachable = unreachable;
                validated.local_modified = local_modified;
                cluster.insert_file(&folder, &device, validated)?;
            }
            Err(_) => corrupted.push((folder, device, file.name)),
        }
    }

    for record in state.pending_devices {
        cluster.pending_devices.insert(record.id, record);
    }
    for record in state.ignored_devices {
        cluster.ignored_devices.insert(record.id, record);
    }
    for record in state.pending_folders {
        cluster
            .pending_folders
            .insert((record.device, record.folder.clone()), record);
    }
    for record in state.ignored_folders {
        cluster
            .ignored_folders
            .insert((record.device, record.folder.clone()), record);
    }

    if !corrupted.is_empty() {
        warn!("removing {} corrupted file records", corrupted.len());
        let diff = ClusterDiff::RemoveCorruptedFiles { records: corrupted };
        persister.apply(&diff, &mut cluster)?;
    }

    Ok((cluster, persister))
}

// ----------------------------------------------------------------------------//

/// In-memory storage used by tests and as the reference behavior.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    pub devices: HashMap<DeviceId, Device>,
    pub folders: HashMap<String, Folder>,
    pub folder_infos: HashMap<(String, DeviceId), FolderInfo>,
    pub files: HashMap<(String, DeviceId, String), FileInfo>,
    pub blocks: HashMap<BlockHash, BlockRecord>,
    pub pending_devices: HashMap<DeviceId, PendingDevice>,
    pub pending_folders: HashMap<(DeviceId, String), PendingFolder>,
    pub applied_marker: u64,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        Default::default()
    }
}

impl Storage for MemoryStorage {
    fn put_device(&mut self, device: &Device) -> Result<()> {
        self.devices.insert(device.id, device.clone());
        Ok(())
    }

    fn remove_device(&mut self, id: &DeviceId) -> Result<()> {
        self.devices.remove(id);
        Ok(())
    }

    fn put_folder(&mut self, folder: &Folder) -> Result<()> {
        self.folders.insert(folder.id.clone(), folder.clone());
        Ok(())
    }

    fn remove_folder(&mut self, id: &str) -> Result<()> {
        self.folders.remove(id);
        Ok(())
    }

    fn put_folder_info(&mut self, info: &FolderInfo) -> Result<()> {
        let mut stored = info.clone();
        stored.files.clear();
        self.folder_infos
            .insert((info.folder.clone(), info.device), stored);
        Ok(())
    }

    fn remove_folder_info(&mut self, folder: &str, device: &DeviceId) -> Result<()> {
        self.folder_infos.remove(&(folder.to_owned(), *device));
        self.files
            .retain(|&(ref f, ref d, _), _| !(f == folder && d == device));
        Ok(())
    }

    fn put_file(&mut self, folder: &str, device: &DeviceId, file: &FileInfo) -> Result<()> {
        self.files
            .insert((folder.to_owned(), *device, file.name.clone()), file.clone());
        Ok(())
    }

    fn remove_file(&mut self, folder: &str, device: &DeviceId, name: &str) -> Result<()> {
        self.files
            .remove(&(folder.to_owned(), *device, name.to_owned()));
        Ok(())
    }

    fn put_block(&mut self, hash: &BlockHash, record: &BlockRecord) -> Result<()> {
        self.blocks.insert(*hash, record.clone());
        Ok(())
    }

    fn remove_block(&mut self, hash: &BlockHash) -> Result<()> {
        self.blocks.remove(hash);
        Ok(())
    }

    fn put_pending_device(&mut self, record: &PendingDevice) -> Result<()> {
        self.pending_devices.insert(record.id, record.clone());
        Ok(())
    }

    fn remove_pending_device(&mut self, id: &DeviceId) -> Result<()> {
        self.pending_devices.remove(id);
        Ok(())
    }

    fn put_pending_folder(&mut self, record: &PendingFolder) -> Result<()> {
        self.pending_folders
            .insert((record.device, record.folder.clone()), record.clone());
        Ok(())
    }

    fn remove_pending_folder(&mut self, device: &DeviceId, folder: &str) -> Result<()> {
        self.pending_folders.remove(&(*device, folder.to_owned()));
        Ok(())
    }

    fn set_applied_marker(&mut self, marker: u64) -> Result<()> {
        self.applied_marker = marker;
        Ok(())
    }

    fn load(&self) -> Result<StoredState> {
        Ok(StoredState {
            devices: self.devices.values().cloned().collect(),
            folders: self.folders.values().cloned().collect(),
            folder_infos: self.folder_infos.values().cloned().collect(),
            files: self
                .files
                .iter()
                .map(|(&(ref folder, device, _), file)| (folder.clone(), device, file.clone()))
                .collect(),
            pending_devices: self.pending_devices.values().cloned().collect(),
            ignored_devices: Vec::new(),
            pending_folders: self.pending_folders.values().cloned().collect(),
            ignored_folders: Vec::new(),
            applied_marker: self.applied_marker,
        })
    }
}
