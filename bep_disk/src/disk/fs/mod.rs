use std::io;
use std::path::Path;

pub mod cache;
pub mod native;

/// Trait for performing operations on some file system.
///
/// Relative paths are resolved against the implementation's base
/// directory. The sync core holds exactly one implementation per
/// process; everything else reaches the disk through it.
pub trait FileSystem {
    /// Some file object.
    type File;

    /// Open a file for reading and writing, creating it (and any
    /// intermediate directories) if it does not yet exist.
    fn open_file<P>(&self, path: P) -> io::Result<Self::File>
    where
        P: AsRef<Path> + Send + 'static;

    /// Open an existing file for reading only.
    fn open_read_only<P>(&self, path: P) -> io::Result<Self::File>
    where
        P: AsRef<Path> + Send + 'static;

    /// Sync the file contents and metadata to disk.
    fn sync_file(&self, file: &mut Self::File) -> io::Result<()>;

    /// Size of the file in bytes.
    fn file_size(&self, file: &Self::File) -> io::Result<u64>;

    /// Grow or shrink the file to the given length.
    fn set_file_size(&self, file: &mut Self::File, size: u64) -> io::Result<()>;

    /// Read from the file at the given offset.
    fn read_file(&self, file: &mut Self::File, offset: u64, buffer: &mut [u8]) -> io::Result<usize>;

    /// Write to the file at the given offset.
    fn write_file(&self, file: &mut Self::File, offset: u64, buffer: &[u8]) -> io::Result<usize>;

    /// Whether the path currently exists.
    fn exists<P>(&self, path: P) -> bool
    where
        P: AsRef<Path>;

    /// Rename a path over another, replacing the destination.
    fn rename<P, Q>(&self, from: P, to: Q) -> io::Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>;

    /// Remove a file or symlink.
    fn remove_file<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>;

    /// Create a directory and any missing parents.
    fn create_dir_all<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>;

    /// Create a symbolic link at `link` pointing at `target`.
    fn symlink<P, Q>(&self, target: P, link: Q) -> io::Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>;

    /// Set the unix permission bits of a path.
    fn set_permissions<P>(&self, path: P, mode: u32) -> io::Result<()>
    where
        P: AsRef<Path>;

    /// Set the modification time of a path, in unix seconds.
    fn set_modified<P>(&self, path: P, modified_s: i64) -> io::Result<()>
    where
        P: AsRef<Path>;
}
