use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::FsError;

pub mod builder;
pub mod fs;
pub mod manager;

mod tasks;

/// Opaque token correlating a command with its acknowledgement.
pub type FsToken = u64;

/// Path of the in-progress temporary for a final path.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(crate::TMP_SUFFIX);

    path.with_file_name(name)
}

//----------------------------------------------------------------------------//

/// What a `RemoteCopy` command should materialize.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCopyKind {
    /// A regular file with no content.
    EmptyFile,
    /// A directory (parents created as needed).
    Directory,
    /// A symbolic link to the given target.
    Symlink { target: String },
    /// Remove the path; absent paths succeed as a no-op.
    Delete,
}

/// Messages that can be sent to the `FsManager`.
#[derive(Clone, Debug)]
pub enum IFsMessage {
    /// Write a block of data into the temporary of `path`.
    ///
    /// The temporary is created (with parents) and sized to
    /// `file_size` on first touch.
    AppendBlock {
        token: FsToken,
        path: PathBuf,
        file_size: u64,
        offset: u64,
        data: Bytes,
    },
    /// Copy a block out of an existing local file into the temporary
    /// of `target`. Source and target may be the same file.
    CloneBlock {
        token: FsToken,
        target: PathBuf,
        target_size: u64,
        target_offset: u64,
        source: PathBuf,
        source_offset: u64,
        block_size: u32,
    },
    /// Close the temporary of `path`, verify its size, optionally park
    /// the previous file under `conflict_path`, and rename the
    /// temporary over `path`.
    FinishFile {
        token: FsToken,
        path: PathBuf,
        file_size: u64,
        modified_s: i64,
        permissions: Option<u32>,
        conflict_path: Option<PathBuf>,
    },
    /// Materialize an entry that carries no block content.
    RemoteCopy {
        token: FsToken,
        path: PathBuf,
        kind: RemoteCopyKind,
        permissions: Option<u32>,
        modified_s: i64,
    },
    /// Read `size` bytes at `offset` from the finished file at `path`.
    ReadBlock {
        token: FsToken,
        path: PathBuf,
        offset: u64,
        size: u32,
    },
}

impl IFsMessage {
    pub fn token(&self) -> FsToken {
        match *self {
            IFsMessage::AppendBlock { token, .. }
            | IFsMessage::CloneBlock { token, .. }
            | IFsMessage::FinishFile { token, .. }
            | IFsMessage::RemoteCopy { token, .. }
            | IFsMessage::ReadBlock { token, .. } => token,
        }
    }
}

/// Messages that can be received from the `FsManager`.
#[derive(Debug)]
pub enum OFsMessage {
    BlockAppended(FsToken),
    BlockCloned(FsToken),
    FileFinished(FsToken),
    RemoteCopied(FsToken),
    BlockRead(FsToken, Bytes),
    /// A command failed; the temporary (if any) is left in place so
    /// the operation can be resumed after restart.
    FsFailed(FsToken, FsError),
}

impl OFsMessage {
    pub fn token(&self) -> FsToken {
        match *self {
            OFsMessage::BlockAppended(token)
            | OFsMessage::BlockCloned(token)
            | OFsMessage::FileFinished(token)
            | OFsMessage::RemoteCopied(token)
            | OFsMessage::BlockRead(token, _)
            | OFsMessage::FsFailed(token, _) => token,
        }
    }
}
