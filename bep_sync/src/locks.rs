use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bep_util::BlockHash;

/// Process wide per-hash fetch locks.
///
/// A block may only be fetched by one controller at a time; other
/// controllers skip the hash and pick it up from local disk (or retry
/// the fetch) once the holder releases it.
#[derive(Clone)]
pub struct BlockLocks {
    inner: Arc<Mutex<HashSet<BlockHash>>>,
}

impl BlockLocks {
    pub fn new() -> BlockLocks {
        BlockLocks {
            inner: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Take the lock for a hash; false when another holder has it.
    pub fn try_lock(&self, hash: &BlockHash) -> bool {
        self.inner
            .lock()
            .expect("bep_sync: Failed To Lock Block Lock Map")
            .insert(*hash)
    }

    /// Release the lock for a hash. Releasing an unheld hash is a no-op.
    pub fn unlock(&self, hash: &BlockHash) {
        self.inner
            .lock()
            .expect("bep_sync: Failed To Lock Block Lock Map")
            .remove(hash);
    }

    pub fn is_locked(&self, hash: &BlockHash) -> bool {
        self.inner
            .lock()
            .expect("bep_sync: Failed To Lock Block Lock Map")
            .contains(hash)
    }
}
