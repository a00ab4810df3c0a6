pub mod backup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hasher;
pub mod notify;
pub mod progress;
pub mod reconcile;
pub mod scanner;
pub mod storage;

pub use config::AppConfig;
pub use coordinator::{BackupKind, BackupRun, PassOutcome, Poller, ReconciliationResult, SyncCoordinator};
pub use error::{Error, FileError, FileErrorKind};
pub use notify::{ChangeNotifier, NoopNotifier, UdpNotifier};
pub use progress::{CancelToken, ProgressReporter, SilentReporter};
