use bep_util::device::DeviceId;
use bep_util::BlockHash;

use crate::block::BlockRef;
use crate::cluster::Cluster;

/// Where the bytes of a missing block should come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockSource {
    /// Request the block from the peer.
    Fetch,
    /// Copy the block out of a verified local file.
    Clone(BlockRef),
}

/// One missing block of a file being pulled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockPull {
    pub index: usize,
    pub offset: u64,
    pub size: u32,
    pub hash: BlockHash,
    pub source: BlockSource,
}

/// Walks the not-yet-available blocks of one remote file, deciding for
/// each whether it must be fetched or can be cloned from data already
/// on local disk.
pub struct BlockIterator {
    folder: String,
    peer: DeviceId,
    name: String,
    next_index: usize,
}

impl BlockIterator {
    pub fn new<F, N>(folder: F, peer: DeviceId, name: N) -> BlockIterator
    where
        F: Into<String>,
        N: Into<String>,
    {
        BlockIterator {
            folder: folder.into(),
            peer,
            name: name.into(),
            next_index: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Advance to the next block that still needs action.
    pub fn next(&mut self, cluster: &Cluster) -> Option<BlockPull> {
        let file = cluster.file(&self.folder, &self.peer, &self.name)?;

        while self.next_index < file.blocks.len() {
            let index = self.next_index;
            self.next_index += 1;

            if file.available.contains(index) {
                continue;
            }

            let block = &file.blocks[index];
            let source = match cluster.find_local_block(&block.hash) {
                Some(local) => BlockSource::Clone(local),
                None => BlockSource::Fetch,
            };

            return Some(BlockPull {
                index,
                offset: block.offset,
                size: block.size,
                hash: block.hash,
                source,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use bep_proto::message::{BlockInfo, Counter, FileInfo as WireFileInfo, FileInfoType, Version};
    use bep_util::device::DeviceId;
    use bep_util::sha::Sha256Hash;

    use crate::cluster::Cluster;
    use crate::device::Device;
    use crate::file_info::FileInfo;
    use crate::folder::Folder;

    use super::{BlockIterator, BlockSource};

    #[test]
    fn positive_fetch_then_clone_then_skip() {
        let local = DeviceId::from_der_cert(b"local cert");
        let peer = DeviceId::from_der_cert(b"peer cert");

        let mut cluster = Cluster::new(Device::new(local, "local"));
        cluster.devices.insert(peer, Device::new(peer, "peer"));
        let mut folder = Folder::new("default", "Default", "/tmp/sync");
        folder.shared_with.insert(peer);
        cluster.folders.insert("default".to_owned(), folder);
        cluster.ensure_folder_info("default", &local, 1).unwrap();
        cluster.ensure_folder_info("default", &peer, 2).unwrap();

        // Local file providing the "bbbbb" block
        let mut have = FileInfo::from_wire(WireFileInfo {
            name: "existing".to_owned(),
            file_type: FileInfoType::File,
            size: 5,
            permissions: 0o644,
            modified_s: 1,
            modified_ns: 0,
            sequence: 1,
            version: Version::new(vec![Counter::new(1, 1)]),
            block_size: 5,
            deleted: false,
            invalid: false,
            no_permissions: false,
            symlink_target: String::new(),
            blocks: vec![BlockInfo::new(0, 5, Sha256Hash::from_bytes(b"bbbbb"))],
        })
        .unwrap();
        have.mark_all_available();
        cluster.insert_file("default", &local, have).unwrap();

        // Peer file: one fresh block, one cloneable block, one already
        // available block
        let mut wanted = FileInfo::from_wire(WireFileInfo {
            name: "wanted".to_owned(),
            file_type: FileInfoType::File,
            size: 15,
            permissions: 0o644,
            modified_s: 2,
            modified_ns: 0,
            sequence: 1,
            version: Version::new(vec![Counter::new(2, 1)]),
            block_size: 5,
            deleted: false,
            invalid: false,
            no_permissions: false,
            symlink_target: String::new(),
            blocks: vec![
                BlockInfo::new(0, 5, Sha256Hash::from_bytes(b"aaaaa")),
                BlockInfo::new(5, 5, Sha256Hash::from_bytes(b"bbbbb")),
                BlockInfo::new(10, 5, Sha256Hash::from_bytes(b"ccccc")),
            ],
        })
        .unwrap();
        wanted.available.insert(2);
        cluster.insert_file("default", &peer, wanted).unwrap();

        let mut iterator = BlockIterator::new("default", peer, "wanted");

        let first = iterator.next(&cluster).unwrap();
        assert_eq!(0, first.index);
        assert_eq!(BlockSource::Fetch, first.source);

        let second = iterator.next(&cluster).unwrap();
        assert_eq!(1, second.index);
        match second.source {
            BlockSource::Clone(ref source) => {
                assert_eq!("existing", source.name);
                assert_eq!(local, source.device);
            }
            ref other => panic!("Expected Clone Source, Got {:?}", other),
        }

        assert_eq!(None, iterator.next(&cluster));
    }
}
