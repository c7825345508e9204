// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Task coordination.
//!
//! A [`TaskCoordinator`] lets independent processes share one progress
//! document. Each process claims a work item, does its work, and then either
//! completes the item or releases it back to the pool.
//!
//! # Critical Sections
//!
//! Every mutating operation runs exactly one load-mutate-save cycle while
//! holding the document's [`LockFile`]. Lock contention fails fast with
//! [`CoordinatorError::LockHeld`]. The lock is released on every exit path,
//! and nothing is persisted unless the whole mutation succeeded.
//!
//! The read-only [`TaskCoordinator::status`] query skips the lock entirely.
//! Saves are atomic, so it may observe slightly stale content but never a
//! torn document.
//!
//! # Ownership
//!
//! Claiming an item hands out a fresh [`SessionId`]. Only the session that
//! currently holds the claim may complete or release the item. That stays
//! true after the claim goes stale, up until another session reclaims it.
//!
//! # Stale Claims
//!
//! A claim older than the staleness threshold makes its item claimable by
//! anyone. Stale items stay in progress on disk until [`claim`] picks them
//! up or [`cleanup`] returns them to pending.
//!
//! [`claim`]: TaskCoordinator::claim
//! [`cleanup`]: TaskCoordinator::cleanup

use crate::{
    lock::{LockError, LockFile},
    path::lock_path,
    progress::{ProgressDocument, TaskStatus, WorkItem, DEFAULT_STALE_TIMEOUT},
    session::SessionId,
    store::{ProgressStore, StoreError},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, instrument};

/// Coordinate claims over one progress document.
#[derive(Debug, Clone)]
pub struct TaskCoordinator {
    store: ProgressStore,
    lock: LockFile,
    stale_timeout: Duration,
}

impl TaskCoordinator {
    /// Construct new coordinator for progress document at `progress_file`.
    ///
    /// The lock file lives next to the progress document at
    /// `<progress_file>.lock`. Does not touch the file system.
    pub fn new(progress_file: impl Into<PathBuf>) -> Self {
        let progress_file = progress_file.into();
        Self {
            lock: LockFile::new(lock_path(&progress_file)),
            store: ProgressStore::new(progress_file),
            stale_timeout: DEFAULT_STALE_TIMEOUT,
        }
    }

    /// Use custom staleness threshold for claims.
    pub fn with_stale_timeout(mut self, stale_timeout: Duration) -> Self {
        self.stale_timeout = stale_timeout;
        self
    }

    /// Use custom delay before retrying a failed lock release.
    pub fn with_release_retry_delay(mut self, delay: Duration) -> Self {
        self.lock = self.lock.with_retry_delay(delay);
        self
    }

    /// Path of progress document.
    pub fn progress_file(&self) -> &Path {
        self.store.path()
    }

    /// Lock file guarding the progress document.
    pub fn lock_file(&self) -> &LockFile {
        &self.lock
    }

    /// Staleness threshold for claims.
    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }

    /// Claim first pending or stale work item.
    ///
    /// # Errors
    ///
    /// - Return [`CoordinatorError::LockHeld`] if another process holds the
    ///   lock.
    /// - Return [`CoordinatorError::NoClaimable`] if every item is completed
    ///   or held by a fresh claim.
    /// - Return [`CoordinatorError::Store`] if progress document cannot be
    ///   loaded or saved.
    #[instrument(skip(self), fields(progress_file = ?self.store.path().display()), level = "debug")]
    pub fn claim(&self) -> Result<ClaimedTask> {
        let stale_timeout = self.stale_timeout;
        self.mutate(|document, now| {
            let item = document
                .find_claimable_mut(now, stale_timeout)
                .ok_or(CoordinatorError::NoClaimable)?;

            if let Some(previous) = &item.claimed_by {
                info!("reclaiming {} from stale session {}", item.id, previous.session_id);
            }

            let session_id = SessionId::generate();
            item.claim(session_id.clone(), now);
            info!("claimed {} ({}) for session {session_id}", item.id, item.name);

            Ok(ClaimedTask {
                id: item.id.clone(),
                name: item.name.clone(),
                filepath: item.filepath.clone(),
                namespace: item.namespace.clone(),
                session_id,
            })
        })
    }

    /// Complete work item claimed by `session_id`.
    ///
    /// Records `improvements` in the order given, and drops the claim.
    ///
    /// # Errors
    ///
    /// - Return [`CoordinatorError::LockHeld`] if another process holds the
    ///   lock.
    /// - Return [`CoordinatorError::ItemNotFound`] if no item has
    ///   `command_id`.
    /// - Return [`CoordinatorError::NotInProgress`] if item is not claimed.
    /// - Return [`CoordinatorError::WrongSession`] if item is claimed by
    ///   another session.
    /// - Return [`CoordinatorError::Store`] if progress document cannot be
    ///   loaded or saved.
    #[instrument(skip(self, improvements), level = "debug")]
    pub fn complete(
        &self,
        command_id: &str,
        session_id: &str,
        improvements: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Completion> {
        let improvements: Vec<String> = improvements.into_iter().map(Into::into).collect();
        self.mutate(|document, now| {
            let item = owned_item(document, command_id, session_id)?;
            item.complete(improvements, now);
            let name = item.name.clone();
            info!("completed {command_id} ({name})");

            let completed = document.count(TaskStatus::Completed);
            Ok(Completion {
                id: command_id.to_owned(),
                name,
                completed,
                total: document.total_commands,
            })
        })
    }

    /// Release work item claimed by `session_id` back to pending.
    ///
    /// # Errors
    ///
    /// Same as [`TaskCoordinator::complete`].
    #[instrument(skip(self), level = "debug")]
    pub fn release(&self, command_id: &str, session_id: &str) -> Result<Released> {
        self.mutate(|document, now| {
            let item = owned_item(document, command_id, session_id)?;
            item.reset(now);
            info!("released {command_id} ({})", item.name);

            Ok(Released {
                id: command_id.to_owned(),
                name: item.name.clone(),
            })
        })
    }

    /// Return every stale claim to pending.
    ///
    /// Returns number of reclaimed items. The progress document is only
    /// rewritten if at least one item was reclaimed.
    ///
    /// # Errors
    ///
    /// - Return [`CoordinatorError::LockHeld`] if another process holds the
    ///   lock.
    /// - Return [`CoordinatorError::Store`] if progress document cannot be
    ///   loaded or saved.
    #[instrument(skip(self), fields(progress_file = ?self.store.path().display()), level = "debug")]
    pub fn cleanup(&self) -> Result<usize> {
        let _guard = self.lock.try_acquire()?;
        let mut document = self.store.load()?;
        let now = Utc::now();

        let mut recovered = 0;
        for item in document
            .commands
            .iter_mut()
            .filter(|item| item.is_stale(now, self.stale_timeout))
        {
            info!("recovering stale claim on {} ({})", item.id, item.name);
            item.reset(now);
            recovered += 1;
        }

        if recovered > 0 {
            document.recompute_counters(now);
            self.store.save(&document)?;
        } else {
            debug!("no stale claims to recover");
        }

        Ok(recovered)
    }

    /// Report progress counts without taking the lock.
    ///
    /// # Errors
    ///
    /// - Return [`CoordinatorError::Store`] if progress document cannot be
    ///   loaded.
    pub fn status(&self) -> Result<StatusReport> {
        let document = self.store.load()?;
        Ok(StatusReport::new(&document, Utc::now(), self.stale_timeout))
    }

    /// Run one load-mutate-save cycle under the lock.
    ///
    /// Nothing is saved if `mutation` fails.
    fn mutate<T, F>(&self, mutation: F) -> Result<T>
    where
        F: FnOnce(&mut ProgressDocument, DateTime<Utc>) -> Result<T>,
    {
        let _guard = self.lock.try_acquire()?;
        let mut document = self.store.load()?;
        let now = Utc::now();

        let output = mutation(&mut document, now)?;
        document.recompute_counters(now);
        self.store.save(&document)?;

        Ok(output)
    }
}

fn owned_item<'doc>(
    document: &'doc mut ProgressDocument,
    command_id: &str,
    session_id: &str,
) -> Result<&'doc mut WorkItem> {
    let item = document
        .find_mut(command_id)
        .ok_or_else(|| CoordinatorError::ItemNotFound {
            id: command_id.to_owned(),
        })?;

    if item.status != TaskStatus::InProgress {
        return Err(CoordinatorError::NotInProgress {
            name: item.name.clone(),
        });
    }

    // INVARIANT: Only the current claim holder may finish an item, stale or not.
    if !item.is_claimed_by(session_id) {
        return Err(CoordinatorError::WrongSession {
            name: item.name.clone(),
        });
    }

    Ok(item)
}

/// Successfully claimed work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedTask {
    pub id: String,
    pub name: String,
    pub filepath: String,
    pub namespace: String,
    pub session_id: SessionId,
}

/// Successfully completed work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: String,
    pub name: String,

    /// Completed items after this completion.
    pub completed: usize,

    /// Items in the batch.
    pub total: usize,
}

/// Successfully released work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Released {
    pub id: String,
    pub name: String,
}

/// Read-only view of progress.
///
/// `available` counts pending items plus stale in-progress items, since
/// both can be claimed right now.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub total_commands: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub available: usize,
    pub stale: usize,
}

impl StatusReport {
    /// Derive status view from progress document.
    pub fn new(document: &ProgressDocument, now: DateTime<Utc>, stale_timeout: Duration) -> Self {
        let stale = document.count_stale(now, stale_timeout);
        Self {
            total_commands: document.total_commands,
            completed: document.count(TaskStatus::Completed),
            in_progress: document.count(TaskStatus::InProgress),
            available: document.count(TaskStatus::Pending) + stale,
            stale,
        }
    }
}

/// Category of a [`CoordinatorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LockHeld,
    NotFound,
    InvalidFormat,
    InvalidSchema,
    NoClaimable,
    ItemNotFound,
    NotInProgress,
    WrongSession,
    Io,
}

/// All possible error types for task coordination.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Another process currently holds the lock.
    #[error(transparent)]
    LockHeld(LockError),

    /// Lock file cannot be created.
    #[error(transparent)]
    Lock(LockError),

    /// Progress document cannot be loaded or saved.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Nothing left to claim.
    #[error("no claimable commands available")]
    NoClaimable,

    /// No work item has the requested identifier.
    #[error("Command with ID {id} not found")]
    ItemNotFound { id: String },

    /// Work item is not currently claimed.
    #[error("command {name} is not in progress")]
    NotInProgress { name: String },

    /// Work item is claimed by another session.
    #[error("command {name} is not claimed by this session")]
    WrongSession { name: String },
}

impl CoordinatorError {
    /// Categorize error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LockHeld(_) => ErrorKind::LockHeld,
            Self::Lock(_) => ErrorKind::Io,
            Self::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Store(StoreError::InvalidFormat { .. }) => ErrorKind::InvalidFormat,
            Self::Store(StoreError::InvalidSchema { .. }) => ErrorKind::InvalidSchema,
            Self::Store(_) => ErrorKind::Io,
            Self::NoClaimable => ErrorKind::NoClaimable,
            Self::ItemNotFound { .. } => ErrorKind::ItemNotFound,
            Self::NotInProgress { .. } => ErrorKind::NotInProgress,
            Self::WrongSession { .. } => ErrorKind::WrongSession,
        }
    }
}

impl From<LockError> for CoordinatorError {
    fn from(error: LockError) -> Self {
        match error {
            LockError::Held { .. } => Self::LockHeld(error),
            LockError::Create { .. } => Self::Lock(error),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = CoordinatorError> = std::result::Result<T, E>;
