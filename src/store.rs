// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Progress document persistence.
//!
//! Load and save a [`ProgressDocument`] at a fixed path.
//!
//! # Atomic Save
//!
//! Saving never writes into the progress document directly. The full
//! document is first written to a freshly named temporary file next to the
//! target at `<path>.tmp.<token>`, and the temporary file is then renamed
//! over the target. Rename is atomic on a single file system, so a concurrent
//! reader only ever observes the old complete document or the new complete
//! document, never a partial write. This is also why reading does not need
//! the lock.

use crate::{
    path::temp_path,
    progress::{ProgressDocument, ProgressError},
    session::unique_token,
};

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Progress document file on disk.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Construct new store for progress document at `path`.
    ///
    /// Does not touch the file system.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of progress document.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Load and validate progress document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotFound`] if progress document does not exist.
    /// - Return [`StoreError::Read`] if progress document cannot be read.
    /// - Return [`StoreError::InvalidFormat`] if content is not valid JSON.
    /// - Return [`StoreError::InvalidSchema`] if content has wrong structure.
    pub fn load(&self) -> Result<ProgressDocument> {
        let data = fs::read_to_string(&self.path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                path: self.path.clone(),
            },
            _ => StoreError::Read {
                source: err,
                path: self.path.clone(),
            },
        })?;

        data.parse().map_err(|err| match err {
            ProgressError::InvalidFormat(source) => StoreError::InvalidFormat {
                source,
                path: self.path.clone(),
            },
            ProgressError::InvalidSchema(reason) => StoreError::InvalidSchema {
                reason,
                path: self.path.clone(),
            },
            ProgressError::Serialize(source) => StoreError::Serialize(source),
        })
    }

    /// Atomically replace progress document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Serialize`] if document cannot be serialized.
    /// - Return [`StoreError::Write`] if temporary file cannot be written, or
    ///   cannot be renamed over the progress document. The temporary file is
    ///   removed on a best-effort basis before returning.
    pub fn save(&self, document: &ProgressDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(document).map_err(StoreError::Serialize)?;
        let temp = temp_path(&self.path, unique_token());

        if let Err(err) = write_then_rename(&temp, &self.path, json.as_bytes()) {
            // Temporary file may not exist yet, so failure here is fine.
            if let Err(cleanup) = fs::remove_file(&temp) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("cannot remove temporary file {:?}: {cleanup}", temp.display());
                }
            }

            return Err(StoreError::Write {
                source: err,
                path: self.path.clone(),
            });
        }

        debug!("saved progress to {:?}", self.path.display());
        Ok(())
    }
}

fn write_then_rename(temp: &Path, target: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    fs::rename(temp, target)
}

/// Progress persistence error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Progress document does not exist.
    #[error("progress file not found: {:?}", path.display())]
    NotFound { path: PathBuf },

    /// Progress document cannot be read.
    #[error("failed to read progress file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Progress document is not valid JSON.
    #[error("progress file contains invalid JSON: {source}")]
    InvalidFormat {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Progress document has wrong structure.
    #[error("invalid progress file format: {reason}")]
    InvalidSchema { reason: String, path: PathBuf },

    /// Progress document cannot be serialized.
    #[error("failed to serialize progress document")]
    Serialize(#[source] serde_json::Error),

    /// Progress document cannot be written.
    #[error("failed to save progress file at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{TaskStatus, WorkItem};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn document() -> ProgressDocument {
        let commands = vec![
            WorkItem::new("001", "alpha", "alpha.md", "test"),
            WorkItem::new("002", "beta", "beta.md", "test"),
        ];
        ProgressDocument::new(commands, Utc::now())
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn save_then_load() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ProgressStore::new(dir.path().join("progress.json"));
        let expect = document();

        store.save(&expect)?;
        let result = store.load()?;
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn save_leaves_no_temporary_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ProgressStore::new(dir.path().join("progress.json"));

        store.save(&document())?;
        store.save(&document())?;
        assert_eq!(entries(dir.path()), vec!["progress.json".to_string()]);

        Ok(())
    }

    #[test]
    fn load_missing_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ProgressStore::new(dir.path().join("nonexistent.json"));

        assert!(matches!(store.load(), Err(StoreError::NotFound { .. })));

        Ok(())
    }

    #[test]
    fn load_corrupt_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("progress.json");
        fs::write(&path, r#"{"invalid": json syntax}"#)?;

        let error = ProgressStore::new(&path).load().unwrap_err();
        assert!(matches!(error, StoreError::InvalidFormat { .. }));
        assert!(error.to_string().contains("progress file contains invalid JSON"));

        Ok(())
    }

    #[test]
    fn failed_rename_keeps_original_and_removes_temporary() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("progress.json");

        // A non-empty directory at the target path makes the rename fail.
        fs::create_dir(&path)?;
        fs::write(path.join("keep"), "original")?;

        let result = ProgressStore::new(&path).save(&document());
        assert!(matches!(result, Err(StoreError::Write { .. })));
        assert_eq!(entries(dir.path()), vec!["progress.json".to_string()]);
        assert_eq!(fs::read_to_string(path.join("keep"))?, "original");

        Ok(())
    }

    #[test]
    fn interrupted_save_does_not_affect_original() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = ProgressStore::new(dir.path().join("progress.json"));
        let original = document();
        store.save(&original)?;

        // Simulate a writer that died after writing part of its temporary file.
        let mut mutated = original.clone();
        mutated.commands[0].status = TaskStatus::Completed;
        let partial = mutated.to_string();
        fs::write(temp_path(store.path(), "crashed"), &partial[..partial.len() / 2])?;

        assert_eq!(store.load()?, original);

        Ok(())
    }
}
