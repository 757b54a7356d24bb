use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::disk::fs::FileSystem;

/// File that exists on disk.
pub struct NativeFile {
    file: File,
    path: PathBuf,
}

impl NativeFile {
    /// Create a new NativeFile.
    fn new(file: File, path: PathBuf) -> NativeFile {
        NativeFile { file, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// File system that maps to the OS file system.
pub struct NativeFileSystem {
    current_dir: PathBuf,
}

impl NativeFileSystem {
    /// Initialize a new NativeFileSystem with the default directory set.
    pub fn with_directory<P>(default: P) -> NativeFileSystem
    where
        P: AsRef<Path>,
    {
        NativeFileSystem {
            current_dir: default.as_ref().to_path_buf(),
        }
    }

    fn resolve<'a, P>(&self, path: &'a P) -> Cow<'a, Path>
    where
        P: AsRef<Path>,
    {
        combine_user_path(path, &self.current_dir)
    }
}

impl FileSystem for NativeFileSystem {
    type File = NativeFile;

    fn open_file<P>(&self, path: P) -> io::Result<Self::File>
    where
        P: AsRef<Path> + Send + 'static,
    {
        let combine_path = combine_user_path(&path, &self.current_dir);
        let file = create_new_file(&combine_path)?;

        Ok(NativeFile::new(file, combine_path.into_owned()))
    }

    fn open_read_only<P>(&self, path: P) -> io::Result<Self::File>
    where
        P: AsRef<Path> + Send + 'static,
    {
        let combine_path = combine_user_path(&path, &self.current_dir);
        let file = OpenOptions::new().read(true).open(&combine_path)?;

        Ok(NativeFile::new(file, combine_path.into_owned()))
    }

    fn sync_file(&self, file: &mut NativeFile) -> io::Result<()> {
        file.file.sync_all()
    }

    fn file_size(&self, file: &NativeFile) -> io::Result<u64> {
        file.file.metadata().map(|metadata| metadata.len())
    }

    fn set_file_size(&self, file: &mut NativeFile, size: u64) -> io::Result<()> {
        file.file.set_len(size)
    }

    fn read_file(&self, file: &mut NativeFile, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
        file.file.seek(SeekFrom::Start(offset))?;

        file.file.read(buffer)
    }

    fn write_file(&self, file: &mut NativeFile, offset: u64, buffer: &[u8]) -> io::Result<usize> {
        file.file.seek(SeekFrom::Start(offset))?;

        file.file.write(buffer)
    }

    fn exists<P>(&self, path: P) -> bool
    where
        P: AsRef<Path>,
    {
        self.resolve(&path).exists()
    }

    fn rename<P, Q>(&self, from: P, to: Q) -> io::Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        fs::rename(&*self.resolve(&from), &*self.resolve(&to))
    }

    fn remove_file<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        fs::remove_file(&*self.resolve(&path))
    }

    fn create_dir_all<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        fs::create_dir_all(&*self.resolve(&path))
    }

    #[cfg(unix)]
    fn symlink<P, Q>(&self, target: P, link: Q) -> io::Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        ::std::os::unix::fs::symlink(target.as_ref(), &*self.resolve(&link))
    }

    #[cfg(not(unix))]
    fn symlink<P, Q>(&self, _target: P, link: Q) -> io::Result<()>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("Symlinks Are Not Supported For {:?}", link.as_ref()),
        ))
    }

    #[cfg(unix)]
    fn set_permissions<P>(&self, path: P, mode: u32) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(&*self.resolve(&path), fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    fn set_permissions<P>(&self, _path: P, _mode: u32) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        Ok(())
    }

    fn set_modified<P>(&self, path: P, modified_s: i64) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        let time = FileTime::from_unix_time(modified_s, 0);

        filetime::set_file_mtime(&*self.resolve(&path), time)
    }
}

/// Create a new file with read and write options.
///
/// Intermediate directories will be created if they do not exist.
fn create_new_file<P>(path: P) -> io::Result<File>
where
    P: AsRef<Path>,
{
    match path.as_ref().parent() {
        Some(parent_dir) => {
            fs::create_dir_all(parent_dir)?;

            OpenOptions::new().read(true).write(true).create(true).open(&path)
        }
        None => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "File Path Has No Parent",
        )),
    }
}

/// Create a path from the user path and current directory.
fn combine_user_path<'a, P>(user_path: &'a P, current_dir: &Path) -> Cow<'a, Path>
where
    P: AsRef<Path>,
{
    let ref_user_path = user_path.as_ref();

    if ref_user_path.is_absolute() {
        Cow::Borrowed(ref_user_path)
    } else {
        let mut combine_user_path = current_dir.to_path_buf();

        for user_path_piece in ref_user_path.iter() {
            combine_user_path.push(user_path_piece);
        }

        Cow::Owned(combine_user_path)
    }
}
