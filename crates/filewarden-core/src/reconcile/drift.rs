use crate::error::{Error, FileError};
use crate::hasher::fingerprint;
use crate::storage::models::TrackedFile;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Classification of a batch of tracked files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// On-disk hash differs from the baseline; returned with `is_modified = true`.
    pub modified: Vec<TrackedFile>,
    /// Path no longer exists; returned with `is_missing = true`.
    pub moved_or_missing: Vec<TrackedFile>,
    /// Hash equals the baseline; returned exactly as given.
    pub unchanged: Vec<TrackedFile>,
    /// Files that exist but could not be read. They are left unclassified.
    pub errors: Vec<FileError>,
}

impl DriftReport {
    pub fn drift_count(&self) -> usize {
        self.modified.len() + self.moved_or_missing.len()
    }
}

enum Classified {
    Modified(TrackedFile),
    Missing(TrackedFile),
    Unchanged(TrackedFile),
    Failed(FileError),
}

fn classify(file: &TrackedFile) -> Classified {
    match fingerprint(&file.path) {
        Ok(hash) if hash != file.content_hash => {
            debug!("Modified: {}", file.path.display());
            Classified::Modified(TrackedFile {
                is_modified: true,
                is_missing: false,
                ..file.clone()
            })
        }
        Ok(_) => Classified::Unchanged(TrackedFile {
            is_missing: false,
            ..file.clone()
        }),
        Err(Error::NotFound { .. }) => {
            debug!("Moved or missing: {}", file.path.display());
            Classified::Missing(TrackedFile {
                is_missing: true,
                ..file.clone()
            })
        }
        Err(err) => {
            warn!("Cannot fingerprint {}: {}", file.path.display(), err);
            Classified::Failed(FileError::from_error(&file.path, &err))
        }
    }
}

/// Compare each file's current content hash with its baseline.
///
/// Reads only; running it twice with no filesystem change in between yields
/// the same report. An unchanged file keeps whatever `is_modified` it came in
/// with. Output order within each bucket follows input order.
pub fn detect_content_drift(files: &[TrackedFile]) -> DriftReport {
    let classified: Vec<Classified> = files.par_iter().map(classify).collect();

    let mut report = DriftReport::default();
    for item in classified {
        match item {
            Classified::Modified(file) => report.modified.push(file),
            Classified::Missing(file) => report.moved_or_missing.push(file),
            Classified::Unchanged(file) => report.unchanged.push(file),
            Classified::Failed(err) => report.errors.push(err),
        }
    }
    report
}

/// Result of re-baselining a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineReset {
    /// Files with `content_hash` set to the current on-disk hash and `is_modified = false`.
    pub reset: Vec<TrackedFile>,
    /// Files that vanished or became unreadable mid-operation.
    pub errors: Vec<FileError>,
}

/// Make the current on-disk content the new baseline for every file.
///
/// A failing element is reported and skipped; the rest are still reset.
pub fn reset_baseline(files: &[TrackedFile]) -> BaselineReset {
    let results: Vec<Result<TrackedFile, FileError>> = files
        .par_iter()
        .map(|file| match fingerprint(&file.path) {
            Ok(hash) => Ok(TrackedFile {
                content_hash: hash,
                is_modified: false,
                is_missing: false,
                ..file.clone()
            }),
            Err(err) => {
                warn!("Cannot reset baseline for {}: {}", file.path.display(), err);
                Err(FileError::from_error(&file.path, &err))
            }
        })
        .collect();

    let mut outcome = BaselineReset::default();
    for result in results {
        match result {
            Ok(file) => outcome.reset.push(file),
            Err(err) => outcome.errors.push(err),
        }
    }
    outcome
}
