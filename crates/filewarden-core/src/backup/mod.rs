mod executor;
pub mod naming;
mod report;

pub use executor::BackupExecutor;
pub use report::{BackupReport, CopyOutcome, FileCopy};
