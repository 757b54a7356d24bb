extern crate bep_disk;
extern crate bytes;
extern crate futures;
extern crate rand;
extern crate tokio_core;

use std::collections::{HashMap, HashSet};
use std::cmp;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bep_disk::{FileSystem, OFsMessage};
use futures::future::{self, Future, Loop};
use futures::stream::Stream;
use rand::Rng;
use tokio_core::reactor::{Core, Timeout};

mod append_block;
mod clone_block;
mod read_block;

/// Generate buffer of size random bytes.
fn random_buffer(size: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; size];

    let mut rng = rand::weak_rng();
    for byte in buffer.iter_mut() {
        *byte = rng.gen();
    }

    buffer
}

/// Initiate a core loop with the given timeout, state, and closure.
///
/// Returns R or panics if an error occurred in the loop (including a timeout).
fn core_loop_with_timeout<I, S, F, R>(core: &mut Core, timeout_ms: u64, state: (I, S), call: F) -> R
where
    F: FnMut(I, S, S::Item) -> Loop<R, (I, S)>,
    S: Stream,
{
    let timeout = Timeout::new(Duration::from_millis(timeout_ms), &core.handle())
        .unwrap()
        .then(|_| Err(()));

    // Have to stick the call in our init state so that we transfer ownership between loops
    core.run(
        future::loop_fn((call, state), |(mut call, (init, stream))| {
            stream.into_future().map(|(opt_msg, stream)| {
                let msg = opt_msg.unwrap_or_else(|| panic!("End Of Stream Reached"));

                match call(init, stream, msg) {
                    Loop::Continue((init, stream)) => Loop::Continue((call, (init, stream))),
                    Loop::Break(ret) => Loop::Break(ret),
                }
            })
        })
        .map_err(|_| ())
        .select(timeout)
        .map(|(item, _)| item),
    )
    .unwrap_or_else(|_| panic!("Core Loop Timed Out"))
}

/// Unwrap a success acknowledgement or panic with the failure.
fn expect_ack(message: OFsMessage) -> OFsMessage {
    match message {
        OFsMessage::FsFailed(token, error) => {
            panic!("Fs Command {} Failed: {}", token, error)
        }
        other => other,
    }
}

//----------------------------------------------------------------------------//

/// Allow us to mock out the file system.
#[derive(Clone)]
struct InMemoryFileSystem {
    state: Arc<Mutex<InMemoryState>>,
}

#[derive(Default)]
struct InMemoryState {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashSet<PathBuf>,
    symlinks: HashMap<PathBuf, String>,
    mtimes: HashMap<PathBuf, i64>,
    perms: HashMap<PathBuf, u32>,
}

struct InMemoryFile {
    path: PathBuf,
}

impl InMemoryFileSystem {
    pub fn new() -> InMemoryFileSystem {
        InMemoryFileSystem {
            state: Arc::new(Mutex::new(Default::default())),
        }
    }

    pub fn run_with_lock<C, R>(&self, call: C) -> R
    where
        C: FnOnce(&mut InMemoryState) -> R,
    {
        let mut lock_state = self.state.lock().unwrap();

        call(&mut *lock_state)
    }

    pub fn file_contents<P>(&self, path: P) -> Option<Vec<u8>>
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| state.files.get(path.as_ref()).cloned())
    }

    pub fn mtime<P>(&self, path: P) -> Option<i64>
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| state.mtimes.get(path.as_ref()).cloned())
    }

    pub fn symlink_target<P>(&self, path: P) -> Option<String>
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| state.symlinks.get(path.as_ref()).cloned())
    }

    pub fn is_dir<P>(&self, path: P) -> bool
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| state.dirs.contains(path.as_ref()))
    }

    pub fn seed_file<P>(&self, path: P, contents: &[u8])
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| {
            state
                .files
                .insert(path.as_ref().to_path_buf(), contents.to_vec());
        });
    }
}

impl FileSystem for InMemoryFileSystem {
    type File = InMemoryFile;

    fn open_file<P>(&self, path: P) -> io::Result<Self::File>
    where
        P: AsRef<Path> + Send + 'static,
    {
        let file_path = path.as_ref().to_path_buf();

        self.run_with_lock(|state| {
            if !state.files.contains_key(&file_path) {
                state.files.insert(file_path.clone(), Vec::new());
            }
        });

        Ok(InMemoryFile { path: file_path })
    }

    fn open_read_only<P>(&self, path: P) -> io::Result<Self::File>
    where
        P: AsRef<Path> + Send + 'static,
    {
        let file_path = path.as_ref().to_path_buf();

        self.run_with_lock(|state| {
            if state.files.contains_key(&file_path) {
                Ok(InMemoryFile { path: file_path })
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "File Not Found"))
            }
        })
    }

    fn sync_file(&self, _file: &mut Self::File) -> io::Result<()> {
        Ok(())
    }

    fn file_size(&self, file: &Self::File) -> io::Result<u64> {
        self.run_with_lock(|state| {
            state
                .files
                .get(&file.path)
                .map(|contents| contents.len() as u64)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File Not Found"))
        })
    }

    fn set_file_size(&self, file: &mut Self::File, size: u64) -> io::Result<()> {
        self.run_with_lock(|state| {
            state
                .files
                .get_mut(&file.path)
                .map(|contents| contents.resize(size as usize, 0))
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File Not Found"))
        })
    }

    fn read_file(&self, file: &mut Self::File, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        self.run_with_lock(|state| {
            state
                .files
                .get(&file.path)
                .map(|file_buffer| {
                    let cast_offset = cmp::min(offset as usize, file_buffer.len());
                    let bytes_to_copy = cmp::min(file_buffer.len() - cast_offset, buffer.len());
                    let bytes = &file_buffer[cast_offset..(bytes_to_copy + cast_offset)];

                    buffer[..bytes_to_copy].clone_from_slice(bytes);

                    bytes_to_copy
                })
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File Not Found"))
        })
    }

    fn write_file(&self, file: &mut Self::File, offset: u64, buffer: &[u8]) -> io::Result<usize> {
        self.run_with_lock(|state| {
            state
                .files
                .get_mut(&file.path)
                .map(|file_buffer| {
                    let cast_offset = offset as usize;

                    let last_byte_pos = cast_offset + buffer.len();
                    if last_byte_pos > file_buffer.len() {
                        file_buffer.resize(last_byte_pos, 0);
                    }

                    file_buffer[cast_offset..last_byte_pos].clone_from_slice(buffer);

                    buffer.len()
                })
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File Not Found"))
        })
    }

    fn exists<P>(&self, path: P) -> bool
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| {
            state.files.contains_key(path.as_ref())
                || state.dirs.contains(path.as_ref())
                || state.symlinks.contains_key(path.as_ref())
        })
    }

    fn rename<P, Q>(&self, from: P, to: Q) -> io::Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        self.run_with_lock(|state| {
            let contents = state
                .files
                .remove(from.as_ref())
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File Not Found"))?;
            state.files.insert(to.as_ref().to_path_buf(), contents);

            if let Some(mtime) = state.mtimes.remove(from.as_ref()) {
                state.mtimes.insert(to.as_ref().to_path_buf(), mtime);
            }

            Ok(())
        })
    }

    fn remove_file<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| {
            let had_file = state.files.remove(path.as_ref()).is_some();
            let had_link = state.symlinks.remove(path.as_ref()).is_some();
            state.mtimes.remove(path.as_ref());

            if had_file || had_link {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "File Not Found"))
            }
        })
    }

    fn create_dir_all<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| {
            let mut current = PathBuf::new();
            for piece in path.as_ref().iter() {
                current.push(piece);
                state.dirs.insert(current.clone());
            }

            Ok(())
        })
    }

    fn symlink<P, Q>(&self, target: P, link: Q) -> io::Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        self.run_with_lock(|state| {
            state.symlinks.insert(
                link.as_ref().to_path_buf(),
                target.as_ref().to_string_lossy().into_owned(),
            );

            Ok(())
        })
    }

    fn set_permissions<P>(&self, path: P, mode: u32) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| {
            state.perms.insert(path.as_ref().to_path_buf(), mode);

            Ok(())
        })
    }

    fn set_modified<P>(&self, path: P, modified_s: i64) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        self.run_with_lock(|state| {
            state.mtimes.insert(path.as_ref().to_path_buf(), modified_s);

            Ok(())
        })
    }
}
