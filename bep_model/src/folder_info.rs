use std::collections::BTreeMap;

use bep_util::device::DeviceId;

use crate::file_info::FileInfo;

/// A folder as seen by one device: its index id, the highest sequence
/// observed, and the files themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderInfo {
    pub folder: String,
    pub device: DeviceId,
    pub index_id: u64,
    pub max_sequence: u64,
    /// Highest sequence the device itself has announced for this
    /// folder; the upper bound a downloader can expect to reach.
    pub announced_max_sequence: u64,
    pub files: BTreeMap<String, FileInfo>,
}

impl FolderInfo {
    pub fn new<F>(folder: F, device: DeviceId, index_id: u64) -> FolderInfo
    where
        F: Into<String>,
    {
        FolderInfo {
            folder: folder.into(),
            device,
            index_id,
            max_sequence: 0,
            announced_max_sequence: 0,
            files: BTreeMap::new(),
        }
    }

    /// Insert or replace a file, keeping `max_sequence` in step.
    pub fn upsert_file(&mut self, file: FileInfo) {
        if file.sequence > self.max_sequence {
            self.max_sequence = file.sequence;
        }
        self.files.insert(file.name.clone(), file);
    }

    /// Allocate the next sequence number for a locally advanced file.
    pub fn next_sequence(&self) -> u64 {
        self.max_sequence + 1
    }
}
