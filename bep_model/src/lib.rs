//! In-memory cluster model, diff engine, and version logic.
//!
//! The cluster owns every entity through stable identity-keyed maps;
//! entities refer to each other by id and are resolved through the
//! cluster on demand. All mutation happens by applying `ClusterDiff`
//! values, which keeps the model, its persistence, and its observers in
//! step.

extern crate bep_proto;
extern crate bep_util;
extern crate bit_set;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate url;

pub mod diff;
pub mod misc;
pub mod storage;
pub mod version;

mod block;
mod cluster;
mod device;
mod error;
mod file_info;
mod folder;
mod folder_info;
mod pending;

pub use crate::block::{BlockRecord, BlockRef};
pub use crate::cluster::Cluster;
pub use crate::device::{ConnectionState, Device};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::file_info::FileInfo;
pub use crate::folder::{Folder, FolderType, PullOrder};
pub use crate::folder_info::FolderInfo;
pub use crate::pending::{IgnoredDevice, IgnoredFolder, PendingDevice, PendingFolder};
