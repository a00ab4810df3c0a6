//! Single-writer front door to the registry.
//!
//! Every pass, registration and backup goes through [`SyncCoordinator`], which
//! holds the registry behind one mutex and, for on-disk registries, a lock
//! file shared with other processes. Interactive callers block on it;
//! reconciliation passes wait at most `lock_wait_millis` and then skip.

mod backup_run;
mod guard;
mod pass;
mod poller;

pub use backup_run::{BackupKind, BackupRun};
pub use pass::{PassOutcome, ReconciliationResult};
pub use poller::Poller;

use crate::config::AppConfig;
use crate::error::{Error, FileError, Result};
use crate::hasher::fingerprint;
use crate::notify::ChangeNotifier;
use crate::scanner::scan_folder;
use crate::storage::models::*;
use crate::storage::Registry;
use guard::RegistryGuard;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Files registered by one add operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub added: Vec<TrackedFile>,
    /// Empty, directory or already-tracked paths.
    pub skipped: Vec<PathBuf>,
    pub errors: Vec<FileError>,
}

/// What adding a folder would register, without touching the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderPreview {
    pub files: Vec<PathBuf>,
    pub already_tracked: usize,
    pub directories: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    pub tracked_files: usize,
    pub modified: usize,
    pub missing: usize,
    pub folders: usize,
    pub destinations: usize,
    pub selected_destinations: usize,
}

pub struct SyncCoordinator<R: Registry, N: ChangeNotifier> {
    registry: Mutex<R>,
    notifier: N,
    config: AppConfig,
}

impl<R: Registry, N: ChangeNotifier> SyncCoordinator<R, N> {
    pub fn new(registry: R, notifier: N, config: AppConfig) -> Self {
        Self {
            registry: Mutex::new(registry),
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn lock(&self) -> Result<RegistryGuard<'_, R>> {
        guard::lock(&self.registry)
    }

    fn try_lock_for(&self, wait: Duration) -> Result<Option<RegistryGuard<'_, R>>> {
        guard::try_lock_for(&self.registry, wait)
    }

    // ── Settings ─────────────────────────────────────────────────

    /// Registry value if set, configuration value otherwise.
    fn effective_bool(registry: &R, key: &str, fallback: bool) -> Result<bool> {
        Ok(registry.get_bool_setting(key)?.unwrap_or(fallback))
    }

    pub fn overwrite_updated_files(&self) -> Result<bool> {
        let registry = self.lock()?;
        Self::effective_bool(
            &registry,
            setting_keys::OVERWRITE_UPDATED_FILES,
            self.config.overwrite_updated_files,
        )
    }

    pub fn include_all_subfolders(&self) -> Result<bool> {
        let registry = self.lock()?;
        Self::effective_bool(
            &registry,
            setting_keys::INCLUDE_ALL_SUBFOLDERS,
            self.config.include_all_subfolders,
        )
    }

    pub fn set_setting(&self, key: &str, value: bool) -> Result<()> {
        if key != setting_keys::OVERWRITE_UPDATED_FILES && key != setting_keys::INCLUDE_ALL_SUBFOLDERS {
            return Err(Error::Other(format!("Unknown setting: {}", key)));
        }
        self.lock()?.set_setting(key, &value.to_string())?;
        info!("Setting {} = {}", key, value);
        Ok(())
    }

    // ── Read-only views ──────────────────────────────────────────

    pub fn files(&self) -> Result<Vec<TrackedFile>> {
        self.lock()?.list_files()
    }

    pub fn folders(&self) -> Result<Vec<TrackedFolder>> {
        self.lock()?.list_folders()
    }

    pub fn destinations(&self) -> Result<Vec<BackupDestination>> {
        self.lock()?.list_destinations()
    }

    pub fn ignorables(&self) -> Result<Vec<IgnorableName>> {
        self.lock()?.list_ignorable()
    }

    pub fn status(&self) -> Result<Status> {
        let registry = self.lock()?;
        let files = registry.list_files()?;
        let destinations = registry.list_destinations()?;
        Ok(Status {
            tracked_files: files.len(),
            modified: files.iter().filter(|f| f.is_modified).count(),
            missing: files.iter().filter(|f| f.is_missing).count(),
            folders: registry.list_folders()?.len(),
            destinations: destinations.len(),
            selected_destinations: destinations.iter().filter(|d| d.is_selected).count(),
        })
    }

    // ── Tracked files and folders ────────────────────────────────

    /// Track individual files. New files have no backup yet, so they start modified.
    pub fn add_files(&self, paths: &[PathBuf]) -> Result<Registration> {
        let registry = self.lock()?;
        let mut registration = Registration::default();
        let mut candidates: Vec<PathBuf> = Vec::new();
        let mut seen: HashSet<&Path> = HashSet::new();

        for path in paths {
            if path.to_str().is_none() {
                warn!("Cannot track non-UTF-8 path {}", path.display());
                registration.errors.push(FileError::invalid_path(path));
                continue;
            }
            if path.as_os_str().is_empty()
                || path.is_dir()
                || !seen.insert(path.as_path())
                || registry.file_exists(path)?
            {
                debug!("Skipping {}", path.display());
                registration.skipped.push(path.clone());
                continue;
            }
            candidates.push(path.clone());
        }

        let (new_files, errors) = fingerprint_new(candidates, None);
        registration.errors.extend(errors);
        registration.added = registry.apply_changes(&ChangeSet {
            new_files,
            ..ChangeSet::default()
        })?;
        info!(
            "Added {} files ({} skipped, {} failed)",
            registration.added.len(),
            registration.skipped.len(),
            registration.errors.len()
        );
        Ok(registration)
    }

    /// Scan a folder the way `add_folder` would, without registering anything.
    pub fn preview_folder(&self, path: &Path, recursive: bool) -> Result<FolderPreview> {
        let registry = self.lock()?;
        let ignorable = ignorable_set(&*registry)?;
        let scan = scan_folder(path, recursive, &ignorable)?;
        let known: HashSet<PathBuf> = registry.list_files()?.into_iter().map(|f| f.path).collect();

        let (already, files): (Vec<PathBuf>, Vec<PathBuf>) =
            scan.files.into_iter().partition(|p| known.contains(p));
        Ok(FolderPreview {
            files,
            already_tracked: already.len(),
            directories: scan.directories,
        })
    }

    /// Track a folder and register its files as members. Paths already
    /// tracked, individually or through another folder, keep their owner.
    /// The folder and its members are written together or not at all.
    pub fn add_folder(&self, path: &Path, recursive: bool) -> Result<(TrackedFolder, Registration)> {
        let registry = self.lock()?;
        if registry.folder_exists(path)? {
            return Err(Error::Other(format!("Folder is already tracked: {}", path.display())));
        }
        let ignorable = ignorable_set(&*registry)?;
        let scan = scan_folder(path, recursive, &ignorable)?;
        let known: HashSet<PathBuf> = registry.list_files()?.into_iter().map(|f| f.path).collect();

        let (candidates, skipped): (Vec<PathBuf>, Vec<PathBuf>) =
            scan.files.into_iter().partition(|p| !known.contains(p));
        let (new_files, mut errors) = fingerprint_new(candidates, None);
        errors.extend(scan.errors);

        let (folder, added) = registry.add_folder(path, recursive, &new_files)?;
        info!(
            "Added folder {} with {} files (recursive: {})",
            folder.path.display(),
            added.len(),
            recursive
        );
        Ok((
            folder,
            Registration {
                added,
                skipped,
                errors,
            },
        ))
    }

    pub fn remove_files(&self, ids: &[i64]) -> Result<usize> {
        let removed = self.lock()?.remove_files(ids)?;
        info!("Removed {} tracked files", removed);
        Ok(removed)
    }

    /// Removes the folders and every file registered through them.
    pub fn remove_folders(&self, ids: &[i64]) -> Result<usize> {
        let removed = self.lock()?.remove_folders(ids)?;
        info!("Removed {} tracked folders", removed);
        Ok(removed)
    }

    /// Drop every file the last pass could not find on disk.
    pub fn purge_missing(&self) -> Result<Vec<TrackedFile>> {
        let registry = self.lock()?;
        let missing: Vec<TrackedFile> = registry
            .list_files()?
            .into_iter()
            .filter(|f| f.is_missing)
            .collect();
        let ids: Vec<i64> = missing.iter().map(|f| f.id).collect();
        registry.remove_files(&ids)?;
        info!("Purged {} missing files", missing.len());
        Ok(missing)
    }

    // ── Backup destinations ──────────────────────────────────────

    /// `None` when the path is already a destination.
    pub fn add_destination(&self, path: &Path) -> Result<Option<BackupDestination>> {
        if !path.is_dir() {
            return Err(Error::DestinationMissing {
                path: path.to_path_buf(),
            });
        }
        let registry = self.lock()?;
        if registry.destination_exists(path)? {
            return Ok(None);
        }
        let destination = registry.add_destination(path)?;
        info!("Added backup destination {}", destination.path.display());
        Ok(Some(destination))
    }

    pub fn select_destination(&self, id: i64, is_selected: bool) -> Result<()> {
        let registry = self.lock()?;
        if !registry.list_destinations()?.iter().any(|d| d.id == id) {
            return Err(Error::Other(format!("No backup destination with id {}", id)));
        }
        registry.update_destination(id, is_selected)
    }

    pub fn remove_destinations(&self, ids: &[i64]) -> Result<usize> {
        self.lock()?.remove_destinations(ids)
    }

    /// Destinations whose directory has been moved, renamed or deleted.
    pub fn missing_destinations(&self) -> Result<Vec<BackupDestination>> {
        Ok(self
            .lock()?
            .list_destinations()?
            .into_iter()
            .filter(|d| !d.path.is_dir())
            .collect())
    }

    // ── Ignorable names ──────────────────────────────────────────

    /// `None` when the name is already ignorable.
    pub fn add_ignorable(&self, name: &str) -> Result<Option<IgnorableName>> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(Error::Other(format!("Not a directory name: {:?}", name)));
        }
        let registry = self.lock()?;
        if registry.ignorable_exists(name)? {
            return Ok(None);
        }
        Ok(Some(registry.add_ignorable(name)?))
    }

    pub fn remove_ignorables(&self, ids: &[i64]) -> Result<usize> {
        self.lock()?.remove_ignorable(ids)
    }
}

fn ignorable_set<R: Registry + ?Sized>(registry: &R) -> Result<HashSet<String>> {
    Ok(registry.list_ignorable()?.into_iter().map(|i| i.name).collect())
}

/// Fingerprint files about to be registered. Unreadable files are reported
/// and left out; a later pass or add picks them up.
fn fingerprint_new(
    paths: Vec<PathBuf>,
    origin_folder_id: Option<i64>,
) -> (Vec<NewTrackedFile>, Vec<FileError>) {
    let results: Vec<std::result::Result<NewTrackedFile, FileError>> = paths
        .into_par_iter()
        .map(|path| match fingerprint(&path) {
            Ok(content_hash) => Ok(NewTrackedFile {
                path,
                content_hash,
                is_modified: true,
                origin_folder_id,
            }),
            Err(err) => {
                warn!("Cannot fingerprint {}: {}", path.display(), err);
                Err(FileError::from_error(&path, &err))
            }
        })
        .collect();

    let mut files = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(file) => files.push(file),
            Err(err) => errors.push(err),
        }
    }
    (files, errors)
}
