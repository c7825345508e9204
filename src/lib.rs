// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Task coordination over a shared progress document.
//!
//! Several independent processes, each working through a fixed batch of
//! work items, share one JSON __progress document__. Oxitask lets each of
//! them claim the next available item, then complete it or release it, with
//! no two processes ever working on the same item at the same time.
//!
//! # Coordination Model
//!
//! Coordination is local to one host. Processes serialize every mutation of
//! the progress document through an adjacent lock file that is created with
//! create-exclusive semantics, and every save atomically replaces the whole
//! document. A claim carries a timestamp, so work abandoned by a crashed
//! process becomes claimable again once the claim goes stale.
//!
//! # See Also
//!
//! 1. [`TaskCoordinator`]
//! 2. [`ProgressDocument`]
//! 3. [`LockFile`]

pub mod config;
pub mod coordinator;
pub mod lock;
pub mod path;
pub mod progress;
pub mod session;
pub mod store;

pub use config::Settings;
pub use coordinator::{
    ClaimedTask, Completion, CoordinatorError, ErrorKind, Released, StatusReport, TaskCoordinator,
};
pub use lock::{LockFile, LockGuard};
pub use progress::{ClaimInfo, ProgressDocument, TaskStatus, WorkItem};
pub use session::SessionId;
pub use store::ProgressStore;
