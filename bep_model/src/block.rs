use bep_util::device::DeviceId;

/// One place a block appears inside the cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub folder: String,
    pub device: DeviceId,
    pub name: String,
    pub index: usize,
    pub offset: u64,
}

/// Cluster-wide record of a content block, deduplicated by hash.
///
/// The record is live while at least one file references it; garbage
/// collection removes it once the last reference is dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRecord {
    pub size: u32,
    pub refs: Vec<BlockRef>,
}

impl BlockRecord {
    pub fn new(size: u32) -> BlockRecord {
        BlockRecord {
            size,
            refs: Vec::new(),
        }
    }

    pub fn add_ref(&mut self, block_ref: BlockRef) {
        if !self.refs.contains(&block_ref) {
            self.refs.push(block_ref);
        }
    }

    pub fn remove_refs_of(&mut self, folder: &str, device: &DeviceId, name: &str) {
        self.refs
            .retain(|r| !(r.folder == folder && &r.device == device && r.name == name));
    }

    pub fn is_orphaned(&self) -> bool {
        self.refs.is_empty()
    }
}
