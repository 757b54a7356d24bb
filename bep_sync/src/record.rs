use std::collections::HashSet;

use bep_util::BlockHash;

/// Per-folder synchronization bookkeeping for one controller.
///
/// Tracks which block hashes are currently being fetched (so two files
/// in the folder sharing a block produce one request) and whether the
/// folder counts as synchronizing at all: it does from the first locked
/// block until the last one is released.
pub struct FolderSyncRecord {
    fetching: HashSet<BlockHash>,
}

impl FolderSyncRecord {
    pub fn new() -> FolderSyncRecord {
        FolderSyncRecord {
            fetching: HashSet::new(),
        }
    }

    /// Record an in-flight fetch; true when the folder just went from
    /// idle to synchronizing.
    pub fn start_fetch(&mut self, hash: BlockHash) -> bool {
        let was_idle = self.fetching.is_empty();
        self.fetching.insert(hash);

        was_idle && !self.fetching.is_empty()
    }

    /// Release an in-flight fetch; true when the folder just went from
    /// synchronizing to idle.
    pub fn finish_fetch(&mut self, hash: &BlockHash) -> bool {
        let was_busy = !self.fetching.is_empty();
        self.fetching.remove(hash);

        was_busy && self.fetching.is_empty()
    }

    pub fn is_fetching(&self, hash: &BlockHash) -> bool {
        self.fetching.contains(hash)
    }

    pub fn locked_blocks(&self) -> usize {
        self.fetching.len()
    }
}
