use std::io;
use std::path::PathBuf;

error_chain! {
    types {
        FsError, FsErrorKind, FsResultExt, FsResult;
    }

    foreign_links {
        Io(io::Error);
    }

    errors {
        PermissionDenied {
            path: PathBuf
        } {
            description("Operation Was Denied By The Operating System")
            display("Operation On {:?} Was Denied By The Operating System", path)
        }
        NotFound {
            path: PathBuf
        } {
            description("Path Does Not Exist")
            display("Path {:?} Does Not Exist", path)
        }
        SizeMismatch {
            path: PathBuf,
            expected_size: u64,
            actual_size:   u64
        } {
            description("File Size Did Not Match The Expected Size")
            display("File {:?} Has Size {} But Should Have Been {}", path, actual_size, expected_size)
        }
    }
}

/// Wrap an io error with the path it occurred on, keeping the common
/// kinds as their own variants.
pub fn classify<P>(path: P, error: io::Error) -> FsError
where
    P: Into<PathBuf>,
{
    match error.kind() {
        io::ErrorKind::NotFound => FsErrorKind::NotFound { path: path.into() }.into(),
        io::ErrorKind::PermissionDenied => {
            FsErrorKind::PermissionDenied { path: path.into() }.into()
        }
        _ => FsError::from(error),
    }
}
