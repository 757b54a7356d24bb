//! Serialized filesystem mutations for the synchronization core.
//!
//! Every component that touches the disk goes through the `FsManager`:
//! commands are queued as messages and executed one at a time on a
//! dedicated worker, so commands against the same path always apply in
//! enqueue order and concurrent same-range writes cannot exist.

extern crate bytes;
#[macro_use]
extern crate error_chain;
extern crate filetime;
extern crate futures;
extern crate futures_cpupool;
#[macro_use]
extern crate log;
extern crate lru_cache;

mod disk;

pub mod error;

pub use crate::disk::builder::FsManagerBuilder;
pub use crate::disk::manager::{FsManager, FsManagerSink, FsManagerStream};
pub use crate::disk::{tmp_path, FsToken, IFsMessage, OFsMessage, RemoteCopyKind};
pub use crate::disk::fs::FileSystem;

/// Built in objects implementing `FileSystem`.
pub mod fs {
    pub use crate::disk::fs::native::{NativeFile, NativeFileSystem};
}

/// Built in objects implementing `FileSystem` for caching.
pub mod fs_cache {
    pub use crate::disk::fs::cache::file_handle::FileHandleCache;
}

/// Suffix applied to in-progress files until they are finished.
pub const TMP_SUFFIX: &str = ".syncspirit-tmp";
