//! Classification of tracked files and folders against the live filesystem.
//!
//! Nothing here writes to the registry: every operation returns a value the
//! coordinator turns into a [`ChangeSet`](crate::storage::models::ChangeSet).
//!
//! A path that can no longer be found is reported as moved-or-missing. A
//! rename, a move and a deletion are indistinguishable from the old path
//! alone, so all three land in the same bucket and removal from the registry
//! is left to the caller.

mod drift;
mod folder;

pub use drift::{detect_content_drift, reset_baseline, BaselineReset, DriftReport};
pub use folder::{reconcile_folder, reconcile_scanned, FolderDelta};
