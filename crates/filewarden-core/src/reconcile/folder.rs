use crate::error::Result;
use crate::scanner::{scan_folder, FolderScan};
use crate::storage::models::{TrackedFile, TrackedFolder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Membership drift of one tracked folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderDelta {
    pub folder_id: i64,
    /// On disk, not tracked by anyone. Sorted.
    pub new_files: Vec<PathBuf>,
    /// Members whose path is absent from the scan.
    pub removed_files: Vec<TrackedFile>,
}

impl FolderDelta {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.removed_files.is_empty()
    }
}

/// Scan `folder` and diff the result against its membership.
///
/// `tracked` is the full set of tracked files: a scanned path already tracked
/// on its own (or by another folder) is never claimed by this folder.
pub fn reconcile_folder(
    folder: &TrackedFolder,
    tracked: &[TrackedFile],
    ignorable_names: &HashSet<String>,
) -> Result<FolderDelta> {
    let scan = scan_folder(&folder.path, folder.monitor_all_subfolders, ignorable_names)?;
    Ok(reconcile_scanned(folder, &scan, tracked))
}

/// Diff an already completed scan of `folder` against its membership.
///
/// Members that sit under a directory the scan could not read are kept: an
/// unreadable subtree says nothing about whether they still exist.
pub fn reconcile_scanned(
    folder: &TrackedFolder,
    scan: &FolderScan,
    tracked: &[TrackedFile],
) -> FolderDelta {
    let on_disk: HashSet<&Path> = scan.files.iter().map(PathBuf::as_path).collect();
    let known: HashSet<&Path> = tracked.iter().map(|f| f.path.as_path()).collect();

    let new_files: Vec<PathBuf> = scan
        .files
        .iter()
        .filter(|path| !known.contains(path.as_path()))
        .cloned()
        .collect();

    let removed_files: Vec<TrackedFile> = tracked
        .iter()
        .filter(|file| file.origin_folder_id == Some(folder.id))
        .filter(|file| !on_disk.contains(file.path.as_path()))
        .filter(|file| !scan.errors.iter().any(|err| file.path.starts_with(&err.path)))
        .cloned()
        .collect();

    debug!(
        "Folder {}: {} new, {} removed",
        folder.path.display(),
        new_files.len(),
        removed_files.len()
    );

    FolderDelta {
        folder_id: folder.id,
        new_files,
        removed_files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_data;
    use std::fs;
    use tempfile::tempdir;

    fn member(id: i64, path: PathBuf, folder_id: Option<i64>) -> TrackedFile {
        TrackedFile {
            id,
            path,
            content_hash: hash_data(b""),
            is_modified: false,
            is_missing: false,
            origin_folder_id: folder_id,
        }
    }

    fn folder(root: &Path, recursive: bool) -> TrackedFolder {
        TrackedFolder {
            id: 7,
            path: root.to_path_buf(),
            monitor_all_subfolders: recursive,
        }
    }

    #[test]
    fn test_matching_membership_is_empty_delta() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        let tracked = vec![
            member(1, tmp.path().join("a.txt"), Some(7)),
            member(2, tmp.path().join("b.txt"), Some(7)),
        ];

        let delta = reconcile_folder(&folder(tmp.path(), true), &tracked, &HashSet::new()).unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_new_and_removed() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("kept.txt"), "k").unwrap();
        fs::write(tmp.path().join("fresh.txt"), "f").unwrap();
        let tracked = vec![
            member(1, tmp.path().join("kept.txt"), Some(7)),
            member(2, tmp.path().join("deleted.txt"), Some(7)),
        ];

        let delta = reconcile_folder(&folder(tmp.path(), true), &tracked, &HashSet::new()).unwrap();
        assert_eq!(delta.new_files, vec![tmp.path().join("fresh.txt")]);
        assert_eq!(delta.removed_files.len(), 1);
        assert_eq!(delta.removed_files[0].id, 2);
    }

    #[test]
    fn test_individual_file_is_never_claimed() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("mine.txt"), "m").unwrap();
        let tracked = vec![member(1, tmp.path().join("mine.txt"), None)];

        let delta = reconcile_folder(&folder(tmp.path(), true), &tracked, &HashSet::new()).unwrap();
        assert!(delta.new_files.is_empty());
        assert!(delta.removed_files.is_empty());
    }

    #[test]
    fn test_top_level_ignores_new_subdirectory_file() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/new.txt"), "n").unwrap();
        let tracked = vec![member(1, tmp.path().join("a.txt"), Some(7))];

        let delta = reconcile_folder(&folder(tmp.path(), false), &tracked, &HashSet::new()).unwrap();
        assert!(delta.new_files.is_empty());
        assert!(delta.removed_files.is_empty());
    }

    #[test]
    fn test_newly_ignored_member_is_removed() {
        let tmp = tempdir().unwrap();
        fs::create_dir(tmp.path().join("build")).unwrap();
        fs::write(tmp.path().join("build/out.o"), "o").unwrap();
        let tracked = vec![member(1, tmp.path().join("build/out.o"), Some(7))];
        let names: HashSet<String> = ["build".to_string()].into_iter().collect();

        let delta = reconcile_folder(&folder(tmp.path(), true), &tracked, &names).unwrap();
        assert_eq!(delta.removed_files.len(), 1);
    }

    #[test]
    fn test_members_under_unreadable_subtree_are_kept() {
        let root = PathBuf::from("/data/photos");
        let scan = FolderScan {
            files: vec![root.join("a.jpg")],
            directories: 2,
            errors: vec![crate::error::FileError {
                path: root.join("locked"),
                kind: crate::error::FileErrorKind::Access,
                message: "denied".to_string(),
            }],
        };
        let tracked = vec![
            member(1, root.join("a.jpg"), Some(7)),
            member(2, root.join("locked/b.jpg"), Some(7)),
        ];

        let delta = reconcile_scanned(&folder(&root, true), &scan, &tracked);
        assert!(delta.removed_files.is_empty());
    }
}
