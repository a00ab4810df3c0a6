use crate::error::{Error, Result};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

const READ_BUFFER_LENGTH: usize = 64 * 1024; // 64KB

/// Hex-encoded BLAKE3 digest of a file's full content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash the whole file at `path`.
///
/// A read failure part-way through returns an error, never a digest of the
/// bytes seen so far. Directories are rejected as `Access`.
pub fn fingerprint(path: &Path) -> Result<ContentHash> {
    let metadata = fs::metadata(path).map_err(|e| Error::from_io(path, e))?;
    if metadata.is_dir() {
        return Err(Error::Access {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "path is a directory"),
        });
    }

    let mut file = File::open(path).map_err(|e| Error::from_io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_LENGTH];
    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::from_io(path, e)),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentHash(hasher.finalize().to_hex().to_string()))
}

pub fn hash_data(data: &[u8]) -> ContentHash {
    ContentHash(blake3::hash(data).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "hello").unwrap();

        let first = fingerprint(&path).unwrap();
        let second = fingerprint(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, hash_data(b"hello"));
        assert_eq!(first.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, "one").unwrap();
        let before = fingerprint(&path).unwrap();
        fs::write(&path, "two").unwrap();
        assert_ne!(before, fingerprint(&path).unwrap());
    }

    #[test]
    fn test_fingerprint_large_file_spans_buffers() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("big.bin");
        let data = vec![0x5Au8; READ_BUFFER_LENGTH * 3 + 17];
        fs::write(&path, &data).unwrap();
        assert_eq!(fingerprint(&path).unwrap(), hash_data(&data));
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let tmp = tempdir().unwrap();
        let err = fingerprint(&tmp.path().join("nope.txt")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_fingerprint_directory_is_access_error() {
        let tmp = tempdir().unwrap();
        let err = fingerprint(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Access { .. }));
    }
}
