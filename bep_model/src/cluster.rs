use std::collections::HashMap;

use bep_util::device::{DeviceId, ShortId};
use bep_util::BlockHash;

use crate::block::{BlockRecord, BlockRef};
use crate::device::Device;
use crate::error::{ErrorKind, Result};
use crate::file_info::FileInfo;
use crate::folder::Folder;
use crate::folder_info::FolderInfo;
use crate::pending::{IgnoredDevice, IgnoredFolder, PendingDevice, PendingFolder};

/// The in-memory device/folder/file/block graph.
///
/// All entities are owned here, keyed by stable identity; nothing in
/// the model holds pointers into it. The cluster is only ever touched
/// from the event loop thread.
pub struct Cluster {
    local: DeviceId,
    pub devices: HashMap<DeviceId, Device>,
    pub folders: HashMap<String, Folder>,
    folder_infos: HashMap<(String, DeviceId), FolderInfo>,
    pub blocks: HashMap<BlockHash, BlockRecord>,
    pub pending_devices: HashMap<DeviceId, PendingDevice>,
    pub ignored_devices: HashMap<DeviceId, IgnoredDevice>,
    pub pending_folders: HashMap<(DeviceId, String), PendingFolder>,
    pub ignored_folders: HashMap<(DeviceId, String), IgnoredFolder>,
}

impl Cluster {
    /// Create a cluster around the given local device.
    pub fn new(local_device: Device) -> Cluster {
        let local = local_device.id;
        let mut devices = HashMap::new();
        devices.insert(local, local_device);

        Cluster {
            local,
            devices,
            folders: HashMap::new(),
            folder_infos: HashMap::new(),
            blocks: HashMap::new(),
            pending_devices: HashMap::new(),
            ignored_devices: HashMap::new(),
            pending_folders: HashMap::new(),
            ignored_folders: HashMap::new(),
        }
    }

    pub fn local_id(&self) -> DeviceId {
        self.local
    }

    pub fn local_short_id(&self) -> ShortId {
        self.local.short_id()
    }

    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn device_mut(&mut self, id: &DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(id)
    }

    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.folders.get(id)
    }

    pub fn folder_mut(&mut self, id: &str) -> Option<&mut Folder> {
        self.folders.get_mut(id)
    }

    /// Folders shared with the given device, in id order.
    pub fn shared_folders(&self, device: &DeviceId) -> Vec<&Folder> {
        let mut shared: Vec<&Folder> = self
            .folders
            .values()
            .filter(|folder| folder.is_shared_with(device))
            .collect();
        shared.sort_by(|left, right| left.id.cmp(&right.id));

        shared
    }

    pub fn folder_info(&self, folder: &str, device: &DeviceId) -> Option<&FolderInfo> {
        self.folder_infos.get(&(folder.to_owned(), *device))
    }

    pub fn folder_info_mut(&mut self, folder: &str, device: &DeviceId) -> Option<&mut FolderInfo> {
        self.folder_infos.get_mut(&(folder.to_owned(), *device))
    }

    /// Fetch or create the folder info for (folder, device).
    pub fn ensure_folder_info(
        &mut self,
        folder: &str,
        device: &DeviceId,
        index_id: u64,
    ) -> Result<&mut FolderInfo> {
        if !self.folders.contains_key(folder) {
            return Err(ErrorKind::UnknownFolder {
                folder: folder.to_owned(),
            }
            .into());
        }

        Ok(self
            .folder_infos
            .entry((folder.to_owned(), *device))
            .or_insert_with(|| FolderInfo::new(folder, *device, index_id)))
    }

    /// Install a folder info record wholesale (startup load).
    pub fn install_folder_info(&mut self, info: FolderInfo) {
        self.folder_infos
            .insert((info.folder.clone(), info.device), info);
    }

    /// Insert or replace a file, keeping the block table in step.
    pub fn insert_file(&mut self, folder: &str, device: &DeviceId, file: FileInfo) -> Result<()> {
        let name = file.name.clone();
        {
            let folder_info = self.folder_infos.get(&(folder.to_owned(), *device));
            if folder_info.is_none() {
                return Err(ErrorKind::UnknownFolder {
                    folder: folder.to_owned(),
                }
                .into());
            }
        }

        self.unregister_file_blocks(folder, device, &name);

        for (index, block) in file.blocks.iter().enumerate() {
            let record = self
                .blocks
                .entry(block.hash)
                .or_insert_with(|| BlockRecord::new(block.size));
            record.add_ref(BlockRef {
                folder: folder.to_owned(),
                device: *device,
                name: name.clone(),
                index,
                offset: block.offset,
            });
        }

        self.folder_infos
            .get_mut(&(folder.to_owned(), *device))
            .expect("bep_model: Folder Info Vanished During Insert")
            .upsert_file(file);

        Ok(())
    }

    /// Remove a file and garbage collect blocks it alone referenced.
    pub fn remove_file(&mut self, folder: &str, device: &DeviceId, name: &str) {
        self.unregister_file_blocks(folder, device, name);

        if let Some(folder_info) = self.folder_infos.get_mut(&(folder.to_owned(), *device)) {
            folder_info.files.remove(name);
        }
    }

    pub fn file(&self, folder: &str, device: &DeviceId, name: &str) -> Option<&FileInfo> {
        self.folder_info(folder, device)
            .and_then(|folder_info| folder_info.files.get(name))
    }

    pub fn file_mut(&mut self, folder: &str, device: &DeviceId, name: &str) -> Option<&mut FileInfo> {
        self.folder_infos
            .get_mut(&(folder.to_owned(), *device))
            .and_then(|folder_info| folder_info.files.get_mut(name))
    }

    /// Find a verified local copy of the given block for cloning.
    pub fn find_local_block(&self, hash: &BlockHash) -> Option<BlockRef> {
        self.blocks.get(hash).and_then(|record| {
            record
                .refs
                .iter()
                .find(|block_ref| {
                    if block_ref.device != self.local {
                        return false;
                    }
                    self.file(&block_ref.folder, &block_ref.device, &block_ref.name)
                        .map(|file| file.available.contains(block_ref.index))
                        .unwrap_or(false)
                })
                .cloned()
        })
    }

    /// Whether any verified local copy of the block exists.
    pub fn has_local_block(&self, hash: &BlockHash) -> bool {
        self.find_local_block(hash).is_some()
    }

    /// Remove a device and everything hanging off it.
    pub fn remove_device(&mut self, device: &DeviceId) {
        let folder_keys: Vec<(String, DeviceId)> = self
            .folder_infos
            .keys()
            .filter(|&&(_, ref owner)| owner == device)
            .cloned()
            .collect();

        for (folder, owner) in folder_keys {
            self.remove_folder_info(&folder, &owner);
        }

        for folder in self.folders.values_mut() {
            folder.shared_with.remove(device);
        }

        self.devices.remove(device);
        self.pending_folders
            .retain(|&(ref owner, _), _| owner != device);
        self.ignored_folders
            .retain(|&(ref owner, _), _| owner != device);
    }

    /// Remove a folder info with all of its files.
    pub fn remove_folder_info(&mut self, folder: &str, device: &DeviceId) {
        let names: Vec<String> = self
            .folder_info(folder, device)
            .map(|folder_info| folder_info.files.keys().cloned().collect())
            .unwrap_or_else(Vec::new);

        for name in names {
            self.unregister_file_blocks(folder, device, &name);
        }

        self.folder_infos.remove(&(folder.to_owned(), *device));
    }

    fn unregister_file_blocks(&mut self, folder: &str, device: &DeviceId, name: &str) {
        let hashes: Vec<BlockHash> = self
            .file(folder, device, name)
            .map(|file| file.blocks.iter().map(|block| block.hash).collect())
            .unwrap_or_else(Vec::new);

        for hash in hashes {
            let orphaned = {
                let record = match self.blocks.get_mut(&hash) {
                    Some(record) => record,
                    None => continue,
                };
                record.remove_refs_of(folder, device, name);

                record.is_orphaned()
            };

            if orphaned {
                self.blocks.remove(&hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bep_proto::message::{BlockInfo, FileInfo as WireFileInfo, FileInfoType, Version};
    use bep_util::device::DeviceId;
    use bep_util::sha::Sha256Hash;

    use crate::device::Device;
    use crate::file_info::FileInfo;
    use crate::folder::Folder;

    use super::Cluster;

    fn wire_file(name: &str, data: &[u8]) -> WireFileInfo {
        WireFileInfo {
            name: name.to_owned(),
            file_type: FileInfoType::File,
            size: data.len() as u64,
            permissions: 0o644,
            modified_s: 1000,
            modified_ns: 0,
            sequence: 1,
            version: Version::default(),
            block_size: data.len() as u32,
            deleted: false,
            invalid: false,
            no_permissions: false,
            symlink_target: String::new(),
            blocks: vec![BlockInfo::new(0, data.len() as u32, Sha256Hash::from_bytes(data))],
        }
    }

    fn cluster_with_folder() -> (Cluster, DeviceId) {
        let local = DeviceId::from_der_cert(b"local cert");
        let mut cluster = Cluster::new(Device::new(local, "local"));

        cluster
            .folders
            .insert("default".to_owned(), Folder::new("default", "Default", "/tmp/sync"));
        cluster.ensure_folder_info("default", &local, 1).unwrap();

        (cluster, local)
    }

    #[test]
    fn positive_block_interning_and_gc() {
        let (mut cluster, local) = cluster_with_folder();
        let hash = Sha256Hash::from_bytes(b"12345");

        let file = FileInfo::from_wire(wire_file("f1", b"12345")).unwrap();
        cluster.insert_file("default", &local, file).unwrap();
        assert!(cluster.blocks.contains_key(&hash));

        // A second file sharing the block keeps it alive
        let file = FileInfo::from_wire(wire_file("f2", b"12345")).unwrap();
        cluster.insert_file("default", &local, file).unwrap();

        cluster.remove_file("default", &local, "f1");
        assert!(cluster.blocks.contains_key(&hash));

        cluster.remove_file("default", &local, "f2");
        assert!(!cluster.blocks.contains_key(&hash));
    }

    #[test]
    fn positive_find_local_block_requires_availability() {
        let (mut cluster, local) = cluster_with_folder();
        let hash = Sha256Hash::from_bytes(b"12345");

        let mut file = FileInfo::from_wire(wire_file("f1", b"12345")).unwrap();
        cluster.insert_file("default", &local, file.clone()).unwrap();
        assert!(!cluster.has_local_block(&hash));

        file.mark_all_available();
        cluster.insert_file("default", &local, file).unwrap();
        assert!(cluster.has_local_block(&hash));
    }

    #[test]
    fn positive_max_sequence_tracks_files() {
        let (mut cluster, local) = cluster_with_folder();

        let mut wire = wire_file("f1", b"12345");
        wire.sequence = 4;
        let file = FileInfo::from_wire(wire).unwrap();
        cluster.insert_file("default", &local, file).unwrap();

        assert_eq!(4, cluster.folder_info("default", &local).unwrap().max_sequence);
    }

    #[test]
    fn positive_remove_device_cascades() {
        let (mut cluster, _) = cluster_with_folder();
        let peer = DeviceId::from_der_cert(b"peer cert");

        cluster.devices.insert(peer, Device::new(peer, "peer"));
        cluster.folder_mut("default").unwrap().shared_with.insert(peer);
        cluster.ensure_folder_info("default", &peer, 7).unwrap();
        let file = FileInfo::from_wire(wire_file("f1", b"12345")).unwrap();
        cluster.insert_file("default", &peer, file).unwrap();

        cluster.remove_device(&peer);

        assert!(cluster.device(&peer).is_none());
        assert!(cluster.folder_info("default", &peer).is_none());
        assert!(cluster.blocks.is_empty());
        assert!(!cluster.folder("default").unwrap().is_shared_with(&peer));
    }
}
