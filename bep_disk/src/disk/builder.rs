use futures_cpupool::Builder;

use crate::disk::fs::FileSystem;
use crate::disk::manager::FsManager;

const DEFAULT_PENDING_SIZE: usize = 10;
const DEFAULT_COMPLETED_SIZE: usize = 10;
const DEFAULT_HANDLE_CAPACITY: usize = 4;

/// `FsManagerBuilder` for building `FsManager`s with different settings.
pub struct FsManagerBuilder {
    builder: Builder,
    pending_size: usize,
    completed_size: usize,
    handle_capacity: usize,
}

impl FsManagerBuilder {
    /// Create a new `FsManagerBuilder`.
    pub fn new() -> FsManagerBuilder {
        FsManagerBuilder {
            builder: Builder::new(),
            pending_size: DEFAULT_PENDING_SIZE,
            completed_size: DEFAULT_COMPLETED_SIZE,
            handle_capacity: DEFAULT_HANDLE_CAPACITY,
        }
    }

    /// Specify the cluster wide write-request budget: commands admitted
    /// before senders are backpressured.
    pub fn with_sink_buffer_capacity(mut self, size: usize) -> FsManagerBuilder {
        self.pending_size = size;
        self
    }

    /// Specify the buffer capacity for completed `OFsMessage`s.
    pub fn with_stream_buffer_capacity(mut self, size: usize) -> FsManagerBuilder {
        self.completed_size = size;
        self
    }

    /// Specify how many open file handles are cached per slot.
    pub fn with_handle_capacity(mut self, capacity: usize) -> FsManagerBuilder {
        self.handle_capacity = capacity;
        self
    }

    pub fn sink_buffer_capacity(&self) -> usize {
        self.pending_size
    }

    pub fn stream_buffer_capacity(&self) -> usize {
        self.completed_size
    }

    pub fn handle_capacity(&self) -> usize {
        self.handle_capacity
    }

    pub(crate) fn into_worker_config(self) -> Builder {
        self.builder
    }

    /// Build an `FsManager` with the given `FileSystem`.
    pub fn build<F>(self, fs: F) -> FsManager<F>
    where
        F: FileSystem + Send + Sync + 'static,
    {
        FsManager::from_builder(self, fs)
    }
}
