use std::collections::HashSet;
use std::path::PathBuf;

use bep_util::device::DeviceId;

/// Direction a folder synchronizes in.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum FolderType {
    SendOnly,
    ReceiveOnly,
    SendAndReceive,
}

/// Order in which missing files of a folder are pulled.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum PullOrder {
    Default,
    LargestFirst,
    SmallestFirst,
    OldestFirst,
    NewestFirst,
    Alphabetic,
}

/// A named set of files synchronized among a set of devices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub label: String,
    pub path: PathBuf,
    pub folder_type: FolderType,
    pub rescan_interval_s: u32,
    pub pull_order: PullOrder,
    pub ignore_delete: bool,
    pub ignore_permissions: bool,
    pub suspended: bool,
    pub shared_with: HashSet<DeviceId>,
    /// Whether any of the folder's files has a block locked for fetch.
    pub synchronizing: bool,
}

impl Folder {
    pub fn new<I, L, P>(id: I, label: L, path: P) -> Folder
    where
        I: Into<String>,
        L: Into<String>,
        P: Into<PathBuf>,
    {
        Folder {
            id: id.into(),
            label: label.into(),
            path: path.into(),
            folder_type: FolderType::SendAndReceive,
            rescan_interval_s: 3600,
            pull_order: PullOrder::Default,
            ignore_delete: false,
            ignore_permissions: false,
            suspended: false,
            shared_with: HashSet::new(),
            synchronizing: false,
        }
    }

    pub fn is_shared_with(&self, device: &DeviceId) -> bool {
        self.shared_with.contains(device)
    }

    /// Whether the folder accepts remote changes.
    pub fn accepts_remote(&self) -> bool {
        !self.suspended && self.folder_type != FolderType::SendOnly
    }

    /// Whether the folder serves local data to peers.
    pub fn serves_local(&self) -> bool {
        !self.suspended && self.folder_type != FolderType::ReceiveOnly
    }
}
