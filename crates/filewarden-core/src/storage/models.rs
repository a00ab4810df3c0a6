use crate::hasher::ContentHash;
use std::path::PathBuf;

/// A monitored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub id: i64,
    pub path: PathBuf,
    /// Fingerprint as of the last successful reconciliation or backup.
    pub content_hash: ContentHash,
    pub is_modified: bool,
    /// Set by the last pass that could not find `path` on disk.
    pub is_missing: bool,
    /// Present when the file was registered as a member of a tracked folder.
    pub origin_folder_id: Option<i64>,
}

/// A file about to be registered; the registry assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrackedFile {
    pub path: PathBuf,
    pub content_hash: ContentHash,
    pub is_modified: bool,
    pub origin_folder_id: Option<i64>,
}

/// Mutable state of an existing tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub id: i64,
    pub content_hash: ContentHash,
    pub is_modified: bool,
    pub is_missing: bool,
}

impl From<&TrackedFile> for FileUpdate {
    fn from(file: &TrackedFile) -> Self {
        Self {
            id: file.id,
            content_hash: file.content_hash.clone(),
            is_modified: file.is_modified,
            is_missing: file.is_missing,
        }
    }
}

/// A monitored directory. Its members are the files whose `origin_folder_id` is `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFolder {
    pub id: i64,
    pub path: PathBuf,
    pub monitor_all_subfolders: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDestination {
    pub id: i64,
    pub path: PathBuf,
    pub is_selected: bool,
}

/// A directory name excluded from every folder scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnorableName {
    pub id: i64,
    pub name: String,
}

/// Every delta produced by one reconciliation pass, written as a single unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub new_files: Vec<NewTrackedFile>,
    pub updated_files: Vec<FileUpdate>,
    pub removed_file_ids: Vec<i64>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.updated_files.is_empty() && self.removed_file_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new_files.len() + self.updated_files.len() + self.removed_file_ids.len()
    }
}

/// Persisted user settings consumed by the engine.
pub mod setting_keys {
    pub const OVERWRITE_UPDATED_FILES: &str = "overwrite_updated_files";
    pub const INCLUDE_ALL_SUBFOLDERS: &str = "include_all_subfolders";
}
