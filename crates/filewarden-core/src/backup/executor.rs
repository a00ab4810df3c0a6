use super::naming::{create_run_dir, TargetPlanner, PARTIAL_SUFFIX, UPDATED_DIR_NAME};
use super::report::{BackupReport, CopyOutcome, FileCopy};
use crate::error::{Error, FileError, FileErrorKind, Result};
use crate::progress::{CancelToken, ProgressReporter, SilentReporter};
use chrono::{DateTime, Local};
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Copies tracked files into a backup destination on a bounded worker pool.
pub struct BackupExecutor<'a> {
    workers: usize,
    cancel: CancelToken,
    reporter: &'a dyn ProgressReporter,
}

impl BackupExecutor<'static> {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            cancel: CancelToken::new(),
            reporter: &SilentReporter,
        }
    }
}

impl<'a> BackupExecutor<'a> {
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_reporter<'b>(self, reporter: &'b dyn ProgressReporter) -> BackupExecutor<'b> {
        BackupExecutor {
            workers: self.workers,
            cancel: self.cancel,
            reporter,
        }
    }

    /// Full backup: copy every source into a fresh timestamped directory under `destination_root`.
    pub fn copy_all(&self, sources: &[PathBuf], destination_root: &Path) -> Result<BackupReport> {
        self.copy_all_at(sources, destination_root, Local::now())
    }

    /// [`copy_all`](Self::copy_all) with an explicit run timestamp.
    pub fn copy_all_at(
        &self,
        sources: &[PathBuf],
        destination_root: &Path,
        timestamp: DateTime<Local>,
    ) -> Result<BackupReport> {
        ensure_destination(destination_root)?;
        let run_dir =
            create_run_dir(destination_root, timestamp).map_err(|e| Error::from_io(destination_root, e))?;
        info!("Full backup of {} files into {}", sources.len(), run_dir.display());

        let mut planner = TargetPlanner::new(&run_dir, false);
        let plan = plan_targets(sources, &mut planner);
        self.execute(run_dir, plan)
    }

    /// Incremental backup into `<destination_root>/Updated`.
    ///
    /// With `overwrite`, a same-named earlier copy is replaced; otherwise the
    /// new copy gets a ` (n)` suffix and the earlier copy is kept.
    pub fn copy_updated(
        &self,
        sources: &[PathBuf],
        destination_root: &Path,
        overwrite: bool,
    ) -> Result<BackupReport> {
        ensure_destination(destination_root)?;
        let run_dir = destination_root.join(UPDATED_DIR_NAME);
        fs::create_dir_all(&run_dir).map_err(|e| Error::from_io(&run_dir, e))?;
        info!(
            "Updated-files backup of {} files into {} (overwrite: {})",
            sources.len(),
            run_dir.display(),
            overwrite
        );

        let mut planner = TargetPlanner::new(&run_dir, !overwrite);
        let plan = plan_targets(sources, &mut planner);
        self.execute(run_dir, plan)
    }

    fn execute(&self, run_dir: PathBuf, plan: Vec<(PathBuf, Option<PathBuf>)>) -> Result<BackupReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build copy worker pool: {}", e)))?;

        let total = plan.len();
        let copied = AtomicUsize::new(0);
        let start = Instant::now();
        self.reporter
            .on_copy_start(&run_dir.to_string_lossy(), total);

        let entries: Vec<FileCopy> = pool.install(|| {
            plan.par_iter()
                .map(|(source, target)| {
                    let outcome = match target {
                        _ if self.cancel.is_cancelled() => CopyOutcome::Skipped,
                        Some(target) => copy_file(source, target),
                        None => CopyOutcome::Failed(FileError {
                            path: source.clone(),
                            kind: FileErrorKind::Other,
                            message: "source path has no file name".to_string(),
                        }),
                    };
                    let done = copied.fetch_add(1, Ordering::Relaxed) + 1;
                    self.reporter.on_copy_progress(done, total);
                    FileCopy {
                        source: source.clone(),
                        outcome,
                    }
                })
                .collect()
        });

        let report = BackupReport { run_dir, entries };
        let succeeded = report.succeeded().count();
        let failed = report.failures().count();
        self.reporter
            .on_copy_complete(succeeded, failed, start.elapsed().as_secs_f64());
        if failed > 0 || report.skipped_count() > 0 {
            warn!(
                "Backup into {}: {} copied, {} failed, {} skipped",
                report.run_dir.display(),
                succeeded,
                failed,
                report.skipped_count()
            );
        } else {
            info!("Backup into {}: {} copied", report.run_dir.display(), succeeded);
        }
        Ok(report)
    }
}

fn ensure_destination(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(Error::DestinationMissing {
            path: root.to_path_buf(),
        })
    }
}

fn plan_targets(sources: &[PathBuf], planner: &mut TargetPlanner<'_>) -> Vec<(PathBuf, Option<PathBuf>)> {
    sources
        .iter()
        .map(|source| (source.clone(), planner.assign(source)))
        .collect()
}

/// Copy through a sibling temp file and rename it into place, so `target`
/// either keeps its previous content or holds the complete new copy.
fn copy_file(source: &Path, target: &Path) -> CopyOutcome {
    let mut partial_name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    partial_name.push(PARTIAL_SUFFIX);
    let partial = target.with_file_name(partial_name);

    let result = fs::copy(source, &partial)
        .map_err(|e| FileError::from_io(source, &e))
        .and_then(|_| fs::rename(&partial, target).map_err(|e| FileError::from_io(target, &e)));

    match result {
        Ok(()) => {
            debug!("Copied {} -> {}", source.display(), target.display());
            CopyOutcome::Copied {
                destination: target.to_path_buf(),
            }
        }
        Err(err) => {
            if let Err(e) = fs::remove_file(&partial) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Could not remove partial copy {}: {}", partial.display(), e);
                }
            }
            warn!("Copy failed for {}: {}", source.display(), err.message);
            CopyOutcome::Failed(err)
        }
    }
}
