use bep_proto::message::{BlockInfo, FileInfo as WireFileInfo, FileInfoType, Version};
use bit_set::BitSet;

use crate::error::{ErrorKind, Result};

/// File metadata held by the model, one per (folder, device, name).
///
/// The availability bitmap tracks which of the file's blocks exist,
/// verified, on the local disk. For files owned by the local device the
/// bitmap is full by construction; for a remote device's files it is
/// the download progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub file_type: FileInfoType,
    pub size: u64,
    pub block_size: u32,
    pub permissions: u32,
    pub modified_s: i64,
    pub modified_ns: u32,
    pub sequence: u64,
    pub version: Version,
    pub deleted: bool,
    pub invalid: bool,
    pub no_permissions: bool,
    pub symlink_target: String,
    pub blocks: Vec<BlockInfo>,
    pub available: BitSet,
    /// Set when pulling the file keeps failing; cleared by a new version.
    pub unreachable: bool,
    /// Set by the local scan path while an edit has not yet been
    /// announced; such a copy holds its ground against concurrent
    /// remote edits. Replaced copies drop the flag with the record.
    pub local_modified: bool,
}

impl FileInfo {
    /// Build a model file from its wire form, validating that the block
    /// list is consistent with (size, block_size).
    pub fn from_wire(wire: WireFileInfo) -> Result<FileInfo> {
        if !blocks_consistent(&wire) {
            return Err(ErrorKind::MalformedFile { name: wire.name }.into());
        }

        Ok(FileInfo {
            name: wire.name,
            file_type: wire.file_type,
            size: wire.size,
            block_size: wire.block_size,
            permissions: wire.permissions,
            modified_s: wire.modified_s,
            modified_ns: wire.modified_ns,
            sequence: wire.sequence,
            version: wire.version,
            deleted: wire.deleted,
            invalid: wire.invalid,
            no_permissions: wire.no_permissions,
            symlink_target: wire.symlink_target,
            blocks: wire.blocks,
            available: BitSet::new(),
            unreachable: false,
            local_modified: false,
        })
    }

    /// Render the wire form of this file.
    pub fn to_wire(&self) -> WireFileInfo {
        WireFileInfo {
            name: self.name.clone(),
            file_type: self.file_type,
            size: self.size,
            permissions: self.permissions,
            modified_s: self.modified_s,
            modified_ns: self.modified_ns,
            sequence: self.sequence,
            version: self.version.clone(),
            block_size: self.block_size,
            deleted: self.deleted,
            invalid: self.invalid,
            no_permissions: self.no_permissions,
            symlink_target: self.symlink_target.clone(),
            blocks: self.blocks.clone(),
        }
    }

    /// Whether every referenced block is verified present on local disk.
    pub fn is_locally_available(&self) -> bool {
        (0..self.blocks.len()).all(|index| self.available.contains(index))
    }

    /// Mark every block as locally present.
    pub fn mark_all_available(&mut self) {
        for index in 0..self.blocks.len() {
            self.available.insert(index);
        }
    }

    /// Whether the file carries no block content at all (directories,
    /// symlinks, deletions, and empty files).
    pub fn is_contentless(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn expected_blocks(file_type: FileInfoType, deleted: bool, size: u64, block_size: u32) -> usize {
    if file_type != FileInfoType::File || deleted || size == 0 || block_size == 0 {
        0
    } else {
        ((size + block_size as u64 - 1) / block_size as u64) as usize
    }
}

fn blocks_consistent(wire: &WireFileInfo) -> bool {
    let expected = expected_blocks(wire.file_type, wire.deleted, wire.size, wire.block_size);
    if wire.blocks.len() != expected {
        return false;
    }

    let tail = wire.size % wire.block_size.max(1) as u64;
    wire.blocks.iter().enumerate().all(|(index, block)| {
        let last = index + 1 == expected;
        if last && tail != 0 {
            block.size as u64 == tail
        } else {
            block.size as u64 == wire.block_size as u64
        }
    })
}

#[cfg(test)]
mod tests {
    use bep_proto::message::{BlockInfo, FileInfo as WireFileInfo, FileInfoType, Version};
    use bep_util::sha::Sha256Hash;

    use super::FileInfo;

    fn wire_file(size: u64, block_size: u32, blocks: Vec<BlockInfo>) -> WireFileInfo {
        WireFileInfo {
            name: "some-file".to_owned(),
            file_type: FileInfoType::File,
            size,
            permissions: 0o644,
            modified_s: 1734680000,
            modified_ns: 0,
            sequence: 1,
            version: Version::default(),
            block_size,
            deleted: false,
            invalid: false,
            no_permissions: false,
            symlink_target: String::new(),
            blocks,
        }
    }

    #[test]
    fn positive_block_list_consistent() {
        let file = FileInfo::from_wire(wire_file(
            12,
            5,
            vec![
                BlockInfo::new(0, 5, Sha256Hash::from_bytes(b"aaaaa")),
                BlockInfo::new(5, 5, Sha256Hash::from_bytes(b"bbbbb")),
                BlockInfo::new(10, 2, Sha256Hash::from_bytes(b"cc")),
            ],
        ))
        .unwrap();

        assert!(!file.is_locally_available());
    }

    #[test]
    fn positive_availability_tracks_blocks() {
        let mut file = FileInfo::from_wire(wire_file(
            5,
            5,
            vec![BlockInfo::new(0, 5, Sha256Hash::from_bytes(b"12345"))],
        ))
        .unwrap();

        assert!(!file.is_locally_available());
        file.available.insert(0);
        assert!(file.is_locally_available());
    }

    #[test]
    fn positive_empty_file_has_no_blocks() {
        let file = FileInfo::from_wire(wire_file(0, 5, Vec::new())).unwrap();

        assert!(file.is_contentless());
        assert!(file.is_locally_available());
    }

    #[test]
    fn negative_wrong_block_count() {
        assert!(FileInfo::from_wire(wire_file(
            12,
            5,
            vec![BlockInfo::new(0, 5, Sha256Hash::from_bytes(b"aaaaa"))],
        ))
        .is_err());
    }

    #[test]
    fn negative_wrong_tail_size() {
        assert!(FileInfo::from_wire(wire_file(
            12,
            5,
            vec![
                BlockInfo::new(0, 5, Sha256Hash::from_bytes(b"aaaaa")),
                BlockInfo::new(5, 5, Sha256Hash::from_bytes(b"bbbbb")),
                BlockInfo::new(10, 3, Sha256Hash::from_bytes(b"ccc")),
            ],
        ))
        .is_err());
    }
}
