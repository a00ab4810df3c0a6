use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Cannot access {}: {source}", path.display())]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Path is not valid UTF-8: {}", path.display())]
    InvalidPath { path: PathBuf },

    #[error("{failed} of {total} operations failed")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error("Backup destination does not exist: {}", path.display())]
    DestinationMissing { path: PathBuf },

    #[error("No backup destination is selected")]
    NoDestinationSelected,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach a path to an I/O error, splitting "vanished" from every other failure.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Access {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    NotFound,
    Access,
    InvalidPath,
    Cancelled,
    Other,
}

impl fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileErrorKind::NotFound => "not found",
            FileErrorKind::Access => "access denied",
            FileErrorKind::InvalidPath => "unsupported path",
            FileErrorKind::Cancelled => "cancelled",
            FileErrorKind::Other => "error",
        };
        f.write_str(label)
    }
}

/// A per-file failure captured inside a batch report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    pub path: PathBuf,
    pub kind: FileErrorKind,
    pub message: String,
}

impl FileError {
    pub fn from_io(path: &Path, err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => FileErrorKind::NotFound,
            _ => FileErrorKind::Access,
        };
        Self {
            path: path.to_path_buf(),
            kind,
            message: err.to_string(),
        }
    }
}

impl From<&Error> for FileErrorKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::NotFound { .. } => FileErrorKind::NotFound,
            Error::Access { .. } => FileErrorKind::Access,
            Error::InvalidPath { .. } => FileErrorKind::InvalidPath,
            Error::Cancelled => FileErrorKind::Cancelled,
            _ => FileErrorKind::Other,
        }
    }
}

impl FileError {
    /// Paths are stored as text, so a name that is not UTF-8 cannot be tracked.
    pub fn invalid_path(path: &Path) -> Self {
        Self::from_error(
            path,
            &Error::InvalidPath {
                path: path.to_path_buf(),
            },
        )
    }

    pub fn from_error(path: &Path, err: &Error) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: FileErrorKind::from(err),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.path.display(), self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_not_found() {
        let err = Error::from_io(
            Path::new("/gone.txt"),
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_io_permission_is_access() {
        let err = Error::from_io(
            Path::new("/locked.txt"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, Error::Access { .. }));
        assert!(err.to_string().contains("/locked.txt"));
    }

    #[test]
    fn test_file_error_kind_from_error() {
        let err = Error::NotFound {
            path: PathBuf::from("/a"),
        };
        let fe = FileError::from_error(Path::new("/a"), &err);
        assert_eq!(fe.kind, FileErrorKind::NotFound);
    }
}
