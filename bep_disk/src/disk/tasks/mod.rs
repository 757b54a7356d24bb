use std::path::Path;

use bytes::{Bytes, BytesMut};
use futures_cpupool::CpuPool;

use crate::disk::fs::cache::file_handle::FileHandleCache;
use crate::disk::fs::FileSystem;
use crate::disk::tasks::context::FsManagerContext;
use crate::disk::{tmp_path, IFsMessage, OFsMessage, RemoteCopyKind};
use crate::error::{classify, FsErrorKind, FsResult};

pub mod context;

pub fn execute_on_pool<F>(msg: IFsMessage, pool: &CpuPool, context: FsManagerContext<F>)
where
    F: FileSystem + Send + Sync + 'static,
    F::File: Send,
{
    pool.spawn_fn(move || {
        let mut blocking_sender = context.blocking_sender();

        let out_msg = execute(msg, &context);

        context.complete_work();
        blocking_sender
            .send(out_msg)
            .expect("bep_disk: Failed To Send Out Message In execute_on_pool");
        blocking_sender
            .flush()
            .expect("bep_disk: Failed To Flush Out Messages In execute_on_pool");

        Ok::<(), ()>(())
    })
    .forget()
}

fn execute<F>(msg: IFsMessage, context: &FsManagerContext<F>) -> OFsMessage
where
    F: FileSystem,
{
    let fs = context.filesystem();

    match msg {
        IFsMessage::AppendBlock {
            token,
            path,
            file_size,
            offset,
            data,
        } => match execute_append_block(fs, &path, file_size, offset, &data) {
            Ok(()) => OFsMessage::BlockAppended(token),
            Err(error) => OFsMessage::FsFailed(token, error),
        },
        IFsMessage::CloneBlock {
            token,
            target,
            target_size,
            target_offset,
            source,
            source_offset,
            block_size,
        } => match execute_clone_block(
            fs,
            &target,
            target_size,
            target_offset,
            &source,
            source_offset,
            block_size,
        ) {
            Ok(()) => OFsMessage::BlockCloned(token),
            Err(error) => OFsMessage::FsFailed(token, error),
        },
        IFsMessage::FinishFile {
            token,
            path,
            file_size,
            modified_s,
            permissions,
            conflict_path,
        } => match execute_finish_file(
            fs,
            &path,
            file_size,
            modified_s,
            permissions,
            conflict_path.as_ref().map(|p| p.as_path()),
        ) {
            Ok(()) => OFsMessage::FileFinished(token),
            Err(error) => OFsMessage::FsFailed(token, error),
        },
        IFsMessage::RemoteCopy {
            token,
            path,
            kind,
            permissions,
            modified_s,
        } => match execute_remote_copy(fs, &path, &kind, permissions, modified_s) {
            Ok(()) => OFsMessage::RemoteCopied(token),
            Err(error) => OFsMessage::FsFailed(token, error),
        },
        IFsMessage::ReadBlock {
            token,
            path,
            offset,
            size,
        } => match execute_read_block(fs, &path, offset, size) {
            Ok(data) => OFsMessage::BlockRead(token, data),
            Err(error) => OFsMessage::FsFailed(token, error),
        },
    }
}

fn execute_append_block<F>(
    fs: &FileHandleCache<F>,
    path: &Path,
    file_size: u64,
    offset: u64,
    data: &[u8],
) -> FsResult<()>
where
    F: FileSystem,
{
    let tmp = tmp_path(path);
    let handle = fs.open_rw(&tmp, file_size).map_err(|e| classify(&tmp, e))?;

    fs.run_with_file(&handle, |inner, file| {
        let mut written = 0;
        while written < data.len() {
            let count = inner
                .write_file(file, offset + written as u64, &data[written..])
                .map_err(|e| classify(&tmp, e))?;
            written += count;
        }

        Ok(())
    })
}

fn execute_clone_block<F>(
    fs: &FileHandleCache<F>,
    target: &Path,
    target_size: u64,
    target_offset: u64,
    source: &Path,
    source_offset: u64,
    block_size: u32,
) -> FsResult<()>
where
    F: FileSystem,
{
    let mut buffer = vec![0u8; block_size as usize];

    {
        let handle = fs.open_ro(source).map_err(|e| classify(source, e))?;
        fs.run_with_file(&handle, |inner, file| -> FsResult<()> {
            let mut read = 0;
            while read < buffer.len() {
                let count = inner
                    .read_file(file, source_offset + read as u64, &mut buffer[read..])
                    .map_err(|e| classify(source, e))?;
                if count == 0 {
                    return Err(FsErrorKind::SizeMismatch {
                        path: source.to_path_buf(),
                        expected_size: source_offset + block_size as u64,
                        actual_size: source_offset + read as u64,
                    }
                    .into());
                }
                read += count;
            }

            Ok(())
        })?;
    }

    execute_append_block(fs, target, target_size, target_offset, &buffer)
}

fn execute_finish_file<F>(
    fs: &FileHandleCache<F>,
    path: &Path,
    file_size: u64,
    modified_s: i64,
    permissions: Option<u32>,
    conflict_path: Option<&Path>,
) -> FsResult<()>
where
    F: FileSystem,
{
    let tmp = tmp_path(path);

    let actual_size = {
        let handle = fs.open_rw(&tmp, file_size).map_err(|e| classify(&tmp, e))?;
        fs.run_with_file(&handle, |inner, file| {
            inner.file_size(file).map_err(|e| classify(&tmp, e))
        })?
    };
    if actual_size != file_size {
        return Err(FsErrorKind::SizeMismatch {
            path: tmp,
            expected_size: file_size,
            actual_size,
        }
        .into());
    }

    // Handles must be closed (and synced) before the rename
    fs.close(&tmp).map_err(|e| classify(&tmp, e))?;
    fs.close(path).map_err(|e| classify(path, e))?;

    let inner = fs.inner();
    if let Some(conflict_path) = conflict_path {
        if inner.exists(path) {
            inner
                .rename(path, conflict_path)
                .map_err(|e| classify(path, e))?;
        }
    }

    inner.rename(&tmp, path).map_err(|e| classify(&tmp, e))?;

    if let Some(mode) = permissions {
        inner
            .set_permissions(path, mode)
            .map_err(|e| classify(path, e))?;
    }
    inner
        .set_modified(path, modified_s)
        .map_err(|e| classify(path, e))?;

    Ok(())
}

fn execute_remote_copy<F>(
    fs: &FileHandleCache<F>,
    path: &Path,
    kind: &RemoteCopyKind,
    permissions: Option<u32>,
    modified_s: i64,
) -> FsResult<()>
where
    F: FileSystem,
{
    let inner = fs.inner();

    match *kind {
        RemoteCopyKind::EmptyFile => {
            let handle = fs.open_rw(path, 0).map_err(|e| classify(path, e))?;
            fs.run_with_file(&handle, |inner, file| {
                inner.set_file_size(file, 0).map_err(|e| classify(path, e))
            })?;
            fs.close(path).map_err(|e| classify(path, e))?;

            if let Some(mode) = permissions {
                inner
                    .set_permissions(path, mode)
                    .map_err(|e| classify(path, e))?;
            }
            inner
                .set_modified(path, modified_s)
                .map_err(|e| classify(path, e))?;

            Ok(())
        }
        RemoteCopyKind::Directory => {
            inner.create_dir_all(path).map_err(|e| classify(path, e))?;
            if let Some(mode) = permissions {
                inner
                    .set_permissions(path, mode)
                    .map_err(|e| classify(path, e))?;
            }

            Ok(())
        }
        RemoteCopyKind::Symlink { ref target } => {
            if let Some(parent) = path.parent() {
                inner.create_dir_all(parent).map_err(|e| classify(path, e))?;
            }
            if inner.exists(path) {
                inner.remove_file(path).map_err(|e| classify(path, e))?;
            }

            inner.symlink(target, path).map_err(|e| classify(path, e))
        }
        RemoteCopyKind::Delete => {
            fs.close(path).map_err(|e| classify(path, e))?;

            // Removing an already absent path succeeds as a no-op
            if inner.exists(path) {
                inner.remove_file(path).map_err(|e| classify(path, e))?;
            }

            Ok(())
        }
    }
}

fn execute_read_block<F>(
    fs: &FileHandleCache<F>,
    path: &Path,
    offset: u64,
    size: u32,
) -> FsResult<Bytes>
where
    F: FileSystem,
{
    let handle = fs.open_ro(path).map_err(|e| classify(path, e))?;
    let mut buffer = BytesMut::with_capacity(size as usize);
    buffer.resize(size as usize, 0);

    fs.run_with_file(&handle, |inner, file| -> FsResult<()> {
        let mut read = 0;
        while read < buffer.len() {
            let count = inner
                .read_file(file, offset + read as u64, &mut buffer[read..])
                .map_err(|e| classify(path, e))?;
            if count == 0 {
                return Err(FsErrorKind::SizeMismatch {
                    path: path.to_path_buf(),
                    expected_size: offset + size as u64,
                    actual_size: offset + read as u64,
                }
                .into());
            }
            read += count;
        }

        Ok(())
    })?;

    Ok(buffer.freeze())
}
