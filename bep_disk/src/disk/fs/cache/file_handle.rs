use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lru_cache::LruCache;

use crate::disk::fs::FileSystem;

/// Caches file handles to prevent going to the OS for every call to
/// open a file.
///
/// Successive writes against the same in-progress file reuse one
/// read-write handle; read-only handles live in a separate slot so a
/// served upload does not evict a download in progress. Eviction syncs
/// the handle before it is closed.
pub struct FileHandleCache<F>
where
    F: FileSystem,
{
    rw: Mutex<LruCache<PathBuf, Arc<Mutex<F::File>>>>,
    ro: Mutex<LruCache<PathBuf, Arc<Mutex<F::File>>>>,
    inner: F,
}

impl<F> FileHandleCache<F>
where
    F: FileSystem,
{
    /// Create a new `FileHandleCache` with the given handle capacity
    /// per slot and an inner `FileSystem` which will be called for
    /// handles not in the cache.
    pub fn new(inner: F, capacity: usize) -> FileHandleCache<F> {
        FileHandleCache {
            rw: Mutex::new(LruCache::new(capacity)),
            ro: Mutex::new(LruCache::new(capacity)),
            inner,
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Fetch or open the read-write handle for the given path; the
    /// file is created and sized to `file_size` on first open.
    pub fn open_rw(&self, path: &Path, file_size: u64) -> io::Result<Arc<Mutex<F::File>>> {
        let mut cache = self
            .rw
            .lock()
            .expect("bep_disk: Failed To Lock Cache In FileHandleCache::open_rw");

        if let Some(entry) = cache.get_mut(path) {
            return Ok(entry.clone());
        }

        let mut file = self.inner.open_file(path.to_path_buf())?;
        if self.inner.file_size(&file)? != file_size {
            self.inner.set_file_size(&mut file, file_size)?;
        }
        let entry = Arc::new(Mutex::new(file));

        self.evict_for_insert(&mut cache);
        cache.insert(path.to_path_buf(), entry.clone());

        Ok(entry)
    }

    /// Fetch or open a read-only handle for the given path.
    pub fn open_ro(&self, path: &Path) -> io::Result<Arc<Mutex<F::File>>> {
        let mut cache = self
            .ro
            .lock()
            .expect("bep_disk: Failed To Lock Cache In FileHandleCache::open_ro");

        if let Some(entry) = cache.get_mut(path) {
            return Ok(entry.clone());
        }

        let file = self.inner.open_read_only(path.to_path_buf())?;
        let entry = Arc::new(Mutex::new(file));

        self.evict_for_insert(&mut cache);
        cache.insert(path.to_path_buf(), entry.clone());

        Ok(entry)
    }

    /// Drop any cached handles for the path, syncing the read-write
    /// handle so that a following rename observes its contents.
    pub fn close(&self, path: &Path) -> io::Result<()> {
        {
            let mut cache = self
                .ro
                .lock()
                .expect("bep_disk: Failed To Lock Cache In FileHandleCache::close");
            cache.remove(path);
        }

        let handle = {
            let mut cache = self
                .rw
                .lock()
                .expect("bep_disk: Failed To Lock Cache In FileHandleCache::close");
            cache.remove(path)
        };

        if let Some(handle) = handle {
            let mut file = handle
                .lock()
                .expect("bep_disk: Failed To Lock File In FileHandleCache::close");
            self.inner.sync_file(&mut file)?;
        }

        Ok(())
    }

    fn evict_for_insert(&self, cache: &mut LruCache<PathBuf, Arc<Mutex<F::File>>>) {
        while cache.len() >= cache.capacity() {
            match cache.remove_lru() {
                Some((_, handle)) => {
                    let mut file = handle
                        .lock()
                        .expect("bep_disk: Failed To Lock File In FileHandleCache::evict");
                    // Close with sync so evicted progress is durable
                    if let Err(error) = self.inner.sync_file(&mut file) {
                        warn!("failed to sync evicted handle: {}", error);
                    }
                }
                None => break,
            }
        }
    }

    pub fn run_with_file<C, R>(&self, handle: &Arc<Mutex<F::File>>, call: C) -> R
    where
        C: FnOnce(&F, &mut F::File) -> R,
    {
        let mut file = handle
            .lock()
            .expect("bep_disk: Failed To Lock File In FileHandleCache::run_with_file");

        call(&self.inner, &mut file)
    }
}
