use crate::error::{Error, FileError, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied { destination: PathBuf },
    Failed(FileError),
    /// Not attempted because the run was cancelled first.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopy {
    pub source: PathBuf,
    pub outcome: CopyOutcome,
}

/// Per-file outcome of one backup run into one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Directory the files were copied into.
    pub run_dir: PathBuf,
    pub entries: Vec<FileCopy>,
}

impl BackupReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileCopy> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, CopyOutcome::Copied { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileError> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            CopyOutcome::Failed(err) => Some(err),
            _ => None,
        })
    }

    pub fn skipped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == CopyOutcome::Skipped)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.entries
            .iter()
            .all(|e| matches!(e.outcome, CopyOutcome::Copied { .. }))
    }

    /// `Ok` when every file was copied, `PartialBatchFailure` otherwise.
    pub fn into_result(self) -> Result<Self> {
        let failed = self.entries.len() - self.succeeded().count();
        if failed == 0 {
            Ok(self)
        } else {
            Err(Error::PartialBatchFailure {
                failed,
                total: self.entries.len(),
            })
        }
    }
}
