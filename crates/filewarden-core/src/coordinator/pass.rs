use super::{fingerprint_new, ignorable_set, SyncCoordinator};
use crate::error::{FileError, Result};
use crate::notify::ChangeNotifier;
use crate::progress::ProgressReporter;
use crate::reconcile::{detect_content_drift, reconcile_scanned};
use crate::scanner::{scan_folders, ScanRequest};
use crate::storage::models::*;
use crate::storage::Registry;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything one reconciliation pass observed and wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// Folder files registered during this pass, with their new ids.
    pub new_files: Vec<TrackedFile>,
    /// Every file currently flagged modified, including ones flagged by earlier passes.
    pub modified: Vec<TrackedFile>,
    pub moved_or_missing: Vec<TrackedFile>,
    /// Folder members no longer found under their folder; removed from the registry.
    pub detached: Vec<TrackedFile>,
    pub unchanged: usize,
    /// Selected or not, destinations whose directory is gone.
    pub missing_destinations: Vec<BackupDestination>,
    pub errors: Vec<FileError>,
    /// Count carried by the change notification; zero means none was sent.
    pub notified: usize,
    /// Registry rows written in stage 4.
    pub persisted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(ReconciliationResult),
    /// Another pass or registry operation held the lock for longer than `lock_wait_millis`.
    Skipped,
}

impl<R: Registry, N: ChangeNotifier> SyncCoordinator<R, N> {
    /// Run one reconciliation pass: load, folder reconcile, content drift,
    /// persist and notify, in that order.
    ///
    /// At most one pass runs at a time. A pass that cannot get the registry
    /// within `lock_wait_millis` returns [`PassOutcome::Skipped`].
    pub fn reconcile(&self, reporter: &dyn ProgressReporter) -> Result<PassOutcome> {
        let Some(registry) = self.try_lock_for(self.config.lock_wait())? else {
            info!("Registry busy, skipping reconciliation pass");
            return Ok(PassOutcome::Skipped);
        };
        let mut result = ReconciliationResult::default();

        // Stage 1: load
        let files = registry.list_files()?;
        let folders = registry.list_folders()?;
        let destinations = registry.list_destinations()?;
        let ignorable = ignorable_set(&*registry)?;
        result.missing_destinations = destinations.into_iter().filter(|d| !d.path.is_dir()).collect();
        debug!(
            "Loaded {} files, {} folders, {} ignorable names",
            files.len(),
            folders.len(),
            ignorable.len()
        );

        // Stage 2: folder reconcile
        reporter.on_scan_start(folders.len());
        let scan_start = Instant::now();
        let requests: Vec<ScanRequest> = folders
            .iter()
            .map(|folder| ScanRequest {
                key: folder.id,
                root: folder.path.clone(),
                recursive: folder.monitor_all_subfolders,
            })
            .collect();
        let scans = scan_folders(&requests, &ignorable);

        let mut claimed: HashSet<PathBuf> = HashSet::new();
        let mut new_by_folder: Vec<(i64, Vec<PathBuf>)> = Vec::new();
        let mut detached: Vec<TrackedFile> = Vec::new();
        for folder in &folders {
            match scans.remove(&folder.id) {
                Some((_, Ok(scan))) => {
                    let delta = reconcile_scanned(folder, &scan, &files);
                    // Overlapping folders: the lower id claims a new path first.
                    let new_paths: Vec<PathBuf> = delta
                        .new_files
                        .into_iter()
                        .filter(|path| claimed.insert(path.clone()))
                        .collect();
                    new_by_folder.push((folder.id, new_paths));
                    detached.extend(delta.removed_files);
                    result.errors.extend(scan.errors);
                }
                Some((_, Err(err))) => {
                    warn!("Cannot scan folder {}: {}", folder.path.display(), err);
                    result.errors.push(FileError::from_error(&folder.path, &err));
                }
                None => {}
            }
        }

        let mut new_files: Vec<NewTrackedFile> = Vec::new();
        for (folder_id, paths) in new_by_folder {
            let (registered, errors) = fingerprint_new(paths, Some(folder_id));
            new_files.extend(registered);
            result.errors.extend(errors);
        }
        reporter.on_scan_complete(new_files.len(), detached.len(), scan_start.elapsed().as_secs_f64());

        // Stage 3: content drift over the remaining tracked files
        let detached_ids: HashSet<i64> = detached.iter().map(|f| f.id).collect();
        let remaining: Vec<TrackedFile> = files
            .iter()
            .filter(|f| !detached_ids.contains(&f.id))
            .cloned()
            .collect();
        reporter.on_hash_start(remaining.len());
        let hash_start = Instant::now();
        let drift = detect_content_drift(&remaining);
        reporter.on_hash_complete(drift.drift_count(), hash_start.elapsed().as_secs_f64());

        // Stage 4: persist real changes only, then notify
        let baseline: HashMap<i64, &TrackedFile> = files.iter().map(|f| (f.id, f)).collect();
        let mut changes = ChangeSet {
            new_files,
            updated_files: Vec::new(),
            removed_file_ids: detached_ids.into_iter().collect(),
        };
        changes.removed_file_ids.sort_unstable();

        let mut newly_drifted = 0usize;
        for file in drift.modified.iter().chain(&drift.moved_or_missing) {
            let before = baseline.get(&file.id).copied();
            if before.map_or(true, |b| b.is_modified != file.is_modified || b.is_missing != file.is_missing) {
                changes.updated_files.push(FileUpdate::from(file));
                if before.map_or(true, |b| (file.is_modified && !b.is_modified) || (file.is_missing && !b.is_missing)) {
                    newly_drifted += 1;
                }
            }
        }
        for file in &drift.unchanged {
            // Reappeared at its old path.
            if baseline.get(&file.id).is_some_and(|b| b.is_missing) {
                changes.updated_files.push(FileUpdate::from(file));
            }
        }

        result.persisted = changes.len();
        result.new_files = registry.apply_changes(&changes)?;
        reporter.on_persist_complete(result.persisted);

        result.notified = newly_drifted + result.new_files.len() + detached.len();
        if result.notified > 0 {
            self.notifier.notify(result.notified);
        }

        result.detached = detached;
        result.unchanged = drift.unchanged.len();
        result.errors.extend(drift.errors);
        result.modified = drift.modified;
        result.moved_or_missing = drift.moved_or_missing;

        info!(
            "Pass complete: {} new, {} modified, {} missing, {} detached, {} unchanged, {} rows written",
            result.new_files.len(),
            result.modified.len(),
            result.moved_or_missing.len(),
            result.detached.len(),
            result.unchanged,
            result.persisted
        );
        Ok(PassOutcome::Completed(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::progress::SilentReporter;
    use crate::storage::Database;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct CountingNotifier(Arc<AtomicUsize>);

    impl ChangeNotifier for CountingNotifier {
        fn notify(&self, drifted: usize) {
            self.0.fetch_add(drifted, Ordering::SeqCst);
        }
    }

    fn completed(outcome: PassOutcome) -> ReconciliationResult {
        match outcome {
            PassOutcome::Completed(result) => result,
            PassOutcome::Skipped => panic!("pass was skipped"),
        }
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let notifier = CountingNotifier::default();
        let c = SyncCoordinator::new(
            Database::open_in_memory().unwrap(),
            notifier.clone(),
            AppConfig::default(),
        );
        c.add_files(&[file.clone()]).unwrap();

        fs::write(&file, "changed").unwrap();
        let first = completed(c.reconcile(&SilentReporter).unwrap());
        // Already flagged modified at registration, so nothing new to write.
        assert_eq!(first.modified.len(), 1);
        assert_eq!(first.persisted, 0);
        assert_eq!(first.notified, 0);

        fs::remove_file(&file).unwrap();
        let second = completed(c.reconcile(&SilentReporter).unwrap());
        assert_eq!(second.moved_or_missing.len(), 1);
        assert_eq!(second.persisted, 1);
        assert_eq!(second.notified, 1);

        let third = completed(c.reconcile(&SilentReporter).unwrap());
        assert_eq!(third.persisted, 0);
        assert_eq!(third.notified, 0);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reappearing_file_clears_missing_flag() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let c = SyncCoordinator::new(
            Database::open_in_memory().unwrap(),
            CountingNotifier::default(),
            AppConfig::default(),
        );
        c.add_files(&[file.clone()]).unwrap();

        fs::rename(&file, tmp.path().join("b.txt")).unwrap();
        c.reconcile(&SilentReporter).unwrap();
        assert!(c.files().unwrap()[0].is_missing);

        fs::rename(tmp.path().join("b.txt"), &file).unwrap();
        let result = completed(c.reconcile(&SilentReporter).unwrap());
        assert_eq!(result.persisted, 1);
        assert!(!c.files().unwrap()[0].is_missing);
    }

    #[test]
    fn test_busy_registry_skips_pass() {
        let c = SyncCoordinator::new(
            Database::open_in_memory().unwrap(),
            CountingNotifier::default(),
            AppConfig {
                lock_wait_millis: 50,
                ..AppConfig::default()
            },
        );
        let _held = c.lock().unwrap();
        assert_eq!(c.reconcile(&SilentReporter).unwrap(), PassOutcome::Skipped);
    }

    fn on_disk(
        db_path: &std::path::Path,
        lock_wait_millis: u64,
    ) -> SyncCoordinator<Database, CountingNotifier> {
        SyncCoordinator::new(
            Database::open(db_path.to_str().unwrap()).unwrap(),
            CountingNotifier::default(),
            AppConfig {
                lock_wait_millis,
                ..AppConfig::default()
            },
        )
    }

    #[test]
    fn test_pass_skips_while_another_handle_holds_registry() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("registry.db");
        let file = tmp.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let first = on_disk(&db_path, 50);
        let second = on_disk(&db_path, 50);
        first.add_files(&[file]).unwrap();

        {
            let _held = first.lock().unwrap();
            assert_eq!(second.reconcile(&SilentReporter).unwrap(), PassOutcome::Skipped);
        }
        // The second handle sees the file the first one registered.
        let result = completed(second.reconcile(&SilentReporter).unwrap());
        assert_eq!(result.unchanged, 1);
    }

    #[test]
    fn test_poisoned_registry_is_recovered() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let c = SyncCoordinator::new(
            Database::open_in_memory().unwrap(),
            CountingNotifier::default(),
            AppConfig::default(),
        );
        c.add_files(&[file]).unwrap();

        std::thread::scope(|s| {
            let holder = s.spawn(|| {
                let _held = c.lock().unwrap();
                panic!("holder died with the registry locked");
            });
            assert!(holder.join().is_err());
        });
        assert!(c.registry.is_poisoned());

        assert_eq!(c.files().unwrap().len(), 1);
        let result = completed(c.reconcile(&SilentReporter).unwrap());
        assert_eq!(result.unchanged, 1);
    }
}
