// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File based mutual exclusion.
//!
//! Every mutation of a progress document happens inside a load-mutate-save
//! critical section. Independent processes serialize on that section through
//! a __lock file__ that sits right next to the progress document. Acquiring
//! the lock means creating the lock file with create-exclusive semantics, so
//! whoever creates it first owns the critical section until the file is
//! removed again.
//!
//! # Fast Fail
//!
//! Acquisition never blocks and never retries. When the lock file already
//! exists the caller gets [`LockError::Held`] back immediately, and has to
//! invoke the operation again if it wants eventual success.
//!
//! # Release
//!
//! A successful acquisition returns a [`LockGuard`]. Dropping the guard
//! closes and deletes the lock file, so the lock is released on every exit
//! path including early error returns. Release failures are logged as
//! warnings and never surfaced, because they must not mask the outcome of
//! the operation that was protected by the lock.
//!
//! # Abandoned Lock Files
//!
//! A process killed inside the critical section leaves its lock file behind.
//! Such files are __not__ reclaimed automatically. The lock file records the
//! holder's process identifier and acquisition time so that a human can
//! decide whether it is safe to delete.

use chrono::{SecondsFormat, Utc};
use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process,
    thread,
    time::Duration,
};
use tracing::{debug, warn};

/// Delay before the single retry of a failed lock release.
pub const DEFAULT_RELEASE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Lock file guarding one progress document.
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
    retry_delay: Duration,
}

impl LockFile {
    /// Construct new lock file handle.
    ///
    /// Does not touch the file system.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry_delay: DEFAULT_RELEASE_RETRY_DELAY,
        }
    }

    /// Use custom delay before retrying a failed release.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Path of lock file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Try to acquire exclusive access.
    ///
    /// # Errors
    ///
    /// - Return [`LockError::Held`] if lock file already exists.
    /// - Return [`LockError::Create`] if lock file cannot be created for any
    ///   other reason.
    pub fn try_acquire(&self) -> Result<LockGuard> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(LockError::Held {
                    lock_path: self.path.clone(),
                    holder: read_holder(&self.path),
                });
            }
            Err(err) => {
                return Err(LockError::Create {
                    source: err,
                    lock_path: self.path.clone(),
                });
            }
        };

        // Holder information is diagnostic only, so failing to write it is fine.
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Err(err) = write!(file, "pid {} since {stamp}", process::id()) {
            debug!("cannot record lock holder in {:?}: {err}", self.path.display());
        }

        debug!("acquired lock {:?}", self.path.display());
        Ok(LockGuard {
            file: Some(file),
            path: self.path.clone(),
            retry_delay: self.retry_delay,
        })
    }
}

/// Scoped ownership of a [`LockFile`].
///
/// Releases the lock when dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
    retry_delay: Duration,
}

impl LockGuard {
    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // INVARIANT: Close handle before removal.
        drop(self.file.take());

        match fs::remove_file(&self.path) {
            Ok(()) => debug!("released lock {:?}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!("failed to release lock {:?}: {err}", self.path.display());
                thread::sleep(self.retry_delay);
                match fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(_) => warn!("could not force cleanup of lock file {:?}", self.path.display()),
                }
            }
        }
    }
}

fn read_holder(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|content| content.trim().to_owned())
        .filter(|content| !content.is_empty())
}

/// Lock acquisition error types.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process currently holds the lock.
    #[error(
        "another task manager instance is already running (lock {:?} held by {})",
        .lock_path.display(),
        .holder.as_deref().unwrap_or("unknown holder")
    )]
    Held {
        lock_path: PathBuf,
        holder: Option<String>,
    },

    /// Lock file cannot be created for reasons other than contention.
    #[error("failed to create lock file at {:?}", lock_path.display())]
    Create {
        #[source]
        source: std::io::Error,
        lock_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = LockError> = std::result::Result<T, E>;
