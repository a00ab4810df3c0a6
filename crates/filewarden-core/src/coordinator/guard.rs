//! Exclusive access to the registry.
//!
//! The mutex serialises threads in this process. On-disk registries also
//! carry a `<db>.lock` file held with an advisory exclusive lock, so a
//! second process (a `watch` loop next to an interactive command) waits
//! or skips instead of interleaving with us.

use crate::error::{Error, Result};
use crate::storage::Registry;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

const LOCK_POLL_STEP: Duration = Duration::from_millis(25);

/// Holds the registry mutex and, for on-disk registries, the lock file.
pub(crate) struct RegistryGuard<'a, R> {
    registry: MutexGuard<'a, R>,
    lock_file: Option<File>,
}

impl<R> Deref for RegistryGuard<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.registry
    }
}

impl<R> Drop for RegistryGuard<'_, R> {
    fn drop(&mut self) {
        if let Some(file) = &self.lock_file {
            if let Err(e) = FileExt::unlock(file) {
                warn!("Failed to release registry lock file: {}", e);
            }
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| Error::from_io(path, e))
}

fn is_contended(err: &io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Block until the registry is ours. A panicked holder never left a
/// half-written pass behind (stage 4 is one transaction), so poisoning is ignored.
pub(crate) fn lock<R: Registry>(mutex: &Mutex<R>) -> Result<RegistryGuard<'_, R>> {
    let registry = mutex.lock().unwrap_or_else(PoisonError::into_inner);
    let lock_file = match registry.lock_file_path() {
        Some(path) => {
            let file = open_lock_file(&path)?;
            file.lock_exclusive().map_err(|e| Error::from_io(&path, e))?;
            Some(file)
        }
        None => None,
    };
    Ok(RegistryGuard {
        registry,
        lock_file,
    })
}

/// Poll for the registry until `wait` elapses. `None` means someone else,
/// in this process or another, still holds it.
pub(crate) fn try_lock_for<R: Registry>(
    mutex: &Mutex<R>,
    wait: Duration,
) -> Result<Option<RegistryGuard<'_, R>>> {
    let deadline = Instant::now() + wait;
    loop {
        if let Some(guard) = try_lock_once(mutex)? {
            return Ok(Some(guard));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(LOCK_POLL_STEP);
    }
}

fn try_lock_once<R: Registry>(mutex: &Mutex<R>) -> Result<Option<RegistryGuard<'_, R>>> {
    let registry = match mutex.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return Ok(None),
    };
    let Some(path) = registry.lock_file_path() else {
        return Ok(Some(RegistryGuard {
            registry,
            lock_file: None,
        }));
    };
    let file = open_lock_file(&path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(Some(RegistryGuard {
            registry,
            lock_file: Some(file),
        })),
        Err(e) if is_contended(&e) => Ok(None),
        Err(e) => Err(Error::from_io(&path, e)),
    }
}
