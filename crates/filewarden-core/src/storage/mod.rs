pub mod models;
mod queries;
mod sqlite;

pub use sqlite::Database;

use crate::error::Result;
use models::*;
use std::path::{Path, PathBuf};

/// The durable system of record for tracked entities.
///
/// Only entity-level verbs are exposed: add, remove by id set, list,
/// existence check by path, and update by id. `apply_changes` writes a whole
/// reconciliation pass atomically.
pub trait Registry: Send {
    // ── Tracked files ────────────────────────────────────────────
    fn list_files(&self) -> Result<Vec<TrackedFile>>;
    fn add_file(&self, file: &NewTrackedFile) -> Result<TrackedFile>;
    fn remove_files(&self, ids: &[i64]) -> Result<usize>;
    fn file_exists(&self, path: &Path) -> Result<bool>;
    fn update_file(&self, update: &FileUpdate) -> Result<()>;

    // ── Tracked folders ──────────────────────────────────────────
    fn list_folders(&self) -> Result<Vec<TrackedFolder>>;
    /// Create the folder and register `members` under it in one transaction.
    /// Each member's `origin_folder_id` is replaced by the new folder's id.
    fn add_folder(
        &self,
        path: &Path,
        monitor_all_subfolders: bool,
        members: &[NewTrackedFile],
    ) -> Result<(TrackedFolder, Vec<TrackedFile>)>;
    fn remove_folders(&self, ids: &[i64]) -> Result<usize>;
    fn folder_exists(&self, path: &Path) -> Result<bool>;

    // ── Backup destinations ──────────────────────────────────────
    fn list_destinations(&self) -> Result<Vec<BackupDestination>>;
    fn add_destination(&self, path: &Path) -> Result<BackupDestination>;
    fn remove_destinations(&self, ids: &[i64]) -> Result<usize>;
    fn destination_exists(&self, path: &Path) -> Result<bool>;
    fn update_destination(&self, id: i64, is_selected: bool) -> Result<()>;

    // ── Ignorable names ──────────────────────────────────────────
    fn list_ignorable(&self) -> Result<Vec<IgnorableName>>;
    fn add_ignorable(&self, name: &str) -> Result<IgnorableName>;
    fn remove_ignorable(&self, ids: &[i64]) -> Result<usize>;
    fn ignorable_exists(&self, name: &str) -> Result<bool>;

    // ── Settings ─────────────────────────────────────────────────
    fn get_setting(&self, key: &str) -> Result<Option<String>>;
    fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Persist every delta in `changes` in one transaction. Returns the
    /// newly registered files with their assigned ids. An empty change set
    /// performs no write.
    fn apply_changes(&self, changes: &ChangeSet) -> Result<Vec<TrackedFile>>;

    /// File every handle on the same registry locks before a pass or a
    /// mutation, so separate processes never interleave. `None` when the
    /// registry is private to this process.
    fn lock_file_path(&self) -> Option<PathBuf> {
        None
    }

    fn get_bool_setting(&self, key: &str) -> Result<Option<bool>> {
        Ok(self
            .get_setting(key)?
            .and_then(|value| value.parse::<bool>().ok()))
    }
}
