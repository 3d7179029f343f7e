// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process advisory file locks.
//!
//! Locks are taken on an open file handle, so two handles to the same path
//! exclude each other even inside one process.

use fs2::FileExt;
use std::fs::File;
use std::time::{Duration, Instant};

/// Interval between non-blocking lock attempts.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lock acquisition failure.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {0:?} waiting for exclusive lock")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Acquire an exclusive lock on `file`, polling until `timeout` elapses.
///
/// A zero timeout makes exactly one attempt.
pub fn lock_exclusive(file: &File, timeout: Duration) -> Result<(), LockError> {
    let deadline = Instant::now() + timeout;
    loop {
        match FileExt::try_lock_exclusive(file) {
            Ok(()) => return Ok(()),
            Err(e) if is_contended(&e) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(LockError::Timeout(timeout));
                }
                std::thread::sleep(LOCK_POLL_INTERVAL.min(deadline - now));
            }
            Err(e) => return Err(LockError::Io(e)),
        }
    }
}

/// Release a lock taken with [`lock_exclusive`].
pub fn unlock(file: &File) -> Result<(), LockError> {
    FileExt::unlock(file)?;
    Ok(())
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Scoped exclusive lock, released when dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    file: &'a File,
}

impl<'a> LockGuard<'a> {
    pub fn acquire(file: &'a File, timeout: Duration) -> Result<Self, LockError> {
        lock_exclusive(file, timeout)?;
        Ok(Self { file })
    }

    pub fn file(&self) -> &File {
        self.file
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = unlock(self.file) {
            tracing::warn!(error = %e, "failed to release file lock");
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
