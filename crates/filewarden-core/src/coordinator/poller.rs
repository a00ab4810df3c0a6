use super::{PassOutcome, SyncCoordinator};
use crate::notify::ChangeNotifier;
use crate::progress::{CancelToken, SilentReporter};
use crate::storage::Registry;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const SLEEP_STEP: Duration = Duration::from_millis(200);

/// Background driver running a reconciliation pass every `interval`.
///
/// Stops when its token is cancelled or the poller is dropped.
pub struct Poller {
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn start<R, N>(coordinator: Arc<SyncCoordinator<R, N>>, interval: Duration) -> Self
    where
        R: Registry + 'static,
        N: ChangeNotifier + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = thread::spawn(move || {
            info!("Polling every {}s", interval.as_secs());
            while !token.is_cancelled() {
                match coordinator.reconcile(&SilentReporter) {
                    Ok(PassOutcome::Completed(result)) => {
                        debug!("Background pass notified {}", result.notified)
                    }
                    Ok(PassOutcome::Skipped) => debug!("Background pass skipped"),
                    Err(e) => error!("Background pass failed: {}", e),
                }
                sleep_unless_cancelled(interval, &token);
            }
            info!("Poller stopped");
        });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Handle for stopping the poller from another thread or a signal handler.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Block until the poller is cancelled from elsewhere.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn stop(self) {
        self.cancel.cancel();
        self.join();
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn sleep_unless_cancelled(total: Duration, token: &CancelToken) {
    let deadline = Instant::now() + total;
    while !token.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SLEEP_STEP.min(deadline - now));
    }
}
