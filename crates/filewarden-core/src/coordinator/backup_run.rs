use super::SyncCoordinator;
use crate::backup::{BackupExecutor, BackupReport};
use crate::error::{Error, Result};
use crate::notify::ChangeNotifier;
use crate::progress::{CancelToken, ProgressReporter};
use crate::reconcile::{reset_baseline, BaselineReset};
use crate::storage::models::*;
use crate::storage::Registry;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Every tracked file, into a fresh timestamped directory.
    Full,
    /// Only files flagged modified, into the destination's `Updated` directory.
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRun {
    pub kind: BackupKind,
    pub destinations: Vec<(PathBuf, BackupReport)>,
    /// Present after an updated-files run.
    pub baseline: Option<BaselineReset>,
}

impl BackupRun {
    pub fn failed_count(&self) -> usize {
        self.destinations
            .iter()
            .map(|(_, report)| report.entries.len() - report.succeeded().count())
            .sum()
    }
}

impl<R: Registry, N: ChangeNotifier> SyncCoordinator<R, N> {
    /// Back up tracked files into every selected destination.
    ///
    /// Fails before copying anything when no destination is selected or a
    /// selected one no longer exists. Known-missing files are not attempted.
    /// After an updated run, files copied to every destination get their
    /// current content as the new baseline.
    pub fn backup(
        &self,
        kind: BackupKind,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<BackupRun> {
        let registry = self.lock()?;
        let selected: Vec<BackupDestination> = registry
            .list_destinations()?
            .into_iter()
            .filter(|d| d.is_selected)
            .collect();
        if selected.is_empty() {
            return Err(Error::NoDestinationSelected);
        }
        if let Some(gone) = selected.iter().find(|d| !d.path.is_dir()) {
            return Err(Error::DestinationMissing {
                path: gone.path.clone(),
            });
        }

        let files: Vec<TrackedFile> = registry
            .list_files()?
            .into_iter()
            .filter(|f| !f.is_missing && (kind == BackupKind::Full || f.is_modified))
            .collect();
        let sources: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        let overwrite = Self::effective_bool(
            &registry,
            setting_keys::OVERWRITE_UPDATED_FILES,
            self.config.overwrite_updated_files,
        )?;
        info!(
            "{:?} backup of {} files to {} destinations",
            kind,
            sources.len(),
            selected.len()
        );

        let executor = BackupExecutor::new(self.config.backup_workers)
            .with_cancel(cancel.clone())
            .with_reporter(reporter);
        let mut destinations = Vec::with_capacity(selected.len());
        for destination in &selected {
            let report = match kind {
                BackupKind::Full => executor.copy_all(&sources, &destination.path)?,
                BackupKind::Updated => executor.copy_updated(&sources, &destination.path, overwrite)?,
            };
            destinations.push((destination.path.clone(), report));
        }

        let baseline = match kind {
            BackupKind::Full => None,
            BackupKind::Updated => {
                let copied_everywhere: HashSet<&PathBuf> = sources
                    .iter()
                    .filter(|source| {
                        destinations.iter().all(|(_, report)| {
                            report.succeeded().any(|entry| &entry.source == *source)
                        })
                    })
                    .collect();
                let to_reset: Vec<TrackedFile> = files
                    .iter()
                    .filter(|f| copied_everywhere.contains(&f.path))
                    .cloned()
                    .collect();
                let reset = reset_baseline(&to_reset);
                registry.apply_changes(&ChangeSet {
                    updated_files: reset.reset.iter().map(FileUpdate::from).collect(),
                    ..ChangeSet::default()
                })?;
                info!("Reset baseline for {} files", reset.reset.len());
                Some(reset)
            }
        };

        Ok(BackupRun {
            kind,
            destinations,
            baseline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::notify::NoopNotifier;
    use crate::progress::SilentReporter;
    use crate::storage::Database;
    use std::fs;
    use tempfile::tempdir;

    fn coordinator() -> SyncCoordinator<Database, NoopNotifier> {
        SyncCoordinator::new(
            Database::open_in_memory().unwrap(),
            NoopNotifier,
            AppConfig::default(),
        )
    }

    #[test]
    fn test_no_selected_destination() {
        let c = coordinator();
        let err = c
            .backup(BackupKind::Full, &CancelToken::new(), &SilentReporter)
            .unwrap_err();
        assert!(matches!(err, Error::NoDestinationSelected));
    }

    #[test]
    fn test_vanished_destination_fails_before_copy() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let file = src.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let c = coordinator();
        c.add_files(&[file]).unwrap();
        let dest_path = dst.path().join("usb");
        fs::create_dir(&dest_path).unwrap();
        let dest = c.add_destination(&dest_path).unwrap().unwrap();
        c.select_destination(dest.id, true).unwrap();
        fs::remove_dir(&dest_path).unwrap();

        let err = c
            .backup(BackupKind::Updated, &CancelToken::new(), &SilentReporter)
            .unwrap_err();
        assert!(matches!(err, Error::DestinationMissing { .. }));
        assert!(c.files().unwrap()[0].is_modified);
    }

    #[test]
    fn test_updated_backup_resets_baseline() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let file = src.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let c = coordinator();
        c.add_files(&[file]).unwrap();
        let dest = c.add_destination(dst.path()).unwrap().unwrap();
        c.select_destination(dest.id, true).unwrap();

        let run = c
            .backup(BackupKind::Updated, &CancelToken::new(), &SilentReporter)
            .unwrap();
        assert_eq!(run.failed_count(), 0);
        assert_eq!(run.baseline.unwrap().reset.len(), 1);
        assert!(dst.path().join("Updated").join("a.txt").is_file());
        assert!(!c.files().unwrap()[0].is_modified);

        let again = c
            .backup(BackupKind::Updated, &CancelToken::new(), &SilentReporter)
            .unwrap();
        assert!(again.destinations[0].1.entries.is_empty());
    }
}
