// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the progress document, its lock file, its transient
//! temporary files, and the user's configuration file live. Nothing here
//! checks whether the returned paths actually exist.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Conventional relative location of the progress document.
pub const DEFAULT_PROGRESS_FILE: &str = "notes/improve-slash-commands/progress.json";

/// Path of the lock file guarding a progress document.
///
/// Always the progress path with a ".lock" suffix appended, e.g.,
/// `progress.json` becomes `progress.json.lock`.
pub fn lock_path(progress_file: impl AsRef<Path>) -> PathBuf {
    append_suffix(progress_file.as_ref(), ".lock")
}

/// Path of a temporary file used to atomically replace a progress document.
///
/// Temporary files sit next to their target so the final rename never
/// crosses a file system boundary.
pub fn temp_path(progress_file: impl AsRef<Path>, token: impl AsRef<str>) -> PathBuf {
    append_suffix(progress_file.as_ref(), &format!(".tmp.{}", token.as_ref()))
}

/// Determine default absolute path to configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/oxitask/config.toml`.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("oxitask").join("config.toml"))
        .ok_or(NoConfigDir)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;
