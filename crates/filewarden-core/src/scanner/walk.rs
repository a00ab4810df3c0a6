use super::ignore::{is_ignorable_dir, is_ignorable_name};
use crate::error::{Error, FileError, Result};
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Files found under one folder root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderScan {
    /// Regular files, sorted by path.
    pub files: Vec<PathBuf>,
    /// Directories visited, the root included.
    pub directories: usize,
    /// Entries that could not be read; the scan continues past them.
    pub errors: Vec<FileError>,
}

/// Scan `root` for regular files. Recurses when `recursive`, otherwise only
/// immediate children are returned. Directories named in `ignorable_names`
/// are pruned wherever they appear. Symlinks are not followed.
pub fn scan_folder(
    root: &Path,
    recursive: bool,
    ignorable_names: &HashSet<String>,
) -> Result<FolderScan> {
    let metadata = std::fs::metadata(root).map_err(|e| Error::from_io(root, e))?;
    if !metadata.is_dir() {
        return Err(Error::Access {
            path: root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "not a directory"),
        });
    }

    let mut scan = FolderScan {
        directories: 1,
        ..FolderScan::default()
    };

    // A root that itself sits inside an ignorable directory contributes nothing.
    if is_ignorable_dir(root, ignorable_names) {
        debug!("Folder {} lies inside an ignorable directory", root.display());
        return Ok(scan);
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir() && is_ignorable_name(entry.file_name(), ignorable_names))
        });

    for entry in walker {
        match entry {
            Ok(entry) => {
                let file_type = entry.file_type();
                if file_type.is_dir() {
                    scan.directories += 1;
                } else if file_type.is_file() {
                    let path = entry.into_path();
                    if path.to_str().is_some() {
                        scan.files.push(path);
                    } else {
                        warn!("Skipping non-UTF-8 path {}", path.display());
                        scan.errors.push(FileError::invalid_path(&path));
                    }
                }
            }
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                let io_err = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                warn!("Error scanning {}: {}", path.display(), io_err);
                scan.errors.push(FileError::from_io(&path, &io_err));
            }
        }
    }

    scan.files.sort();
    debug!(
        "Scanned {}: {} files in {} directories",
        root.display(),
        scan.files.len(),
        scan.directories
    );
    Ok(scan)
}

/// One folder to scan, keyed by its registry id.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub key: i64,
    pub root: PathBuf,
    pub recursive: bool,
}

/// Scan several folders in parallel. Each folder's result is stored under its key;
/// a failure on one root does not stop the others.
pub fn scan_folders(
    requests: &[ScanRequest],
    ignorable_names: &HashSet<String>,
) -> DashMap<i64, Result<FolderScan>> {
    let results: DashMap<i64, Result<FolderScan>> = DashMap::new();
    requests.par_iter().for_each(|request| {
        let scan = scan_folder(&request.root, request.recursive, ignorable_names);
        results.insert(request.key, scan);
    });
    results
}
