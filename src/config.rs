// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the optional user configuration file to simplify
//! the process of serialization and deserialization. Every key is optional,
//! and missing keys fall back to their defaults.
//!
//! ```toml
//! progress_file = "$HOME/notes/improve-slash-commands/progress.json"
//! stale_timeout = 600
//! release_retry_delay = 100
//! ```

use crate::{
    coordinator::TaskCoordinator,
    lock::DEFAULT_RELEASE_RETRY_DELAY,
    path::DEFAULT_PROGRESS_FILE,
    progress::DEFAULT_STALE_TIMEOUT,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Coordinator settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Path to progress document.
    pub progress_file: PathBuf,

    /// Seconds after which a claim becomes stale.
    pub stale_timeout: u64,

    /// Milliseconds to wait before retrying a failed lock release.
    pub release_retry_delay: u64,
}

impl Settings {
    /// Load settings from file at `path`.
    ///
    /// A missing file yields default settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file content is invalid.
    /// - Return [`ConfigError::ShellExpansion`] if progress file path
    ///   references unknown variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match read_to_string(path.as_ref()) {
            Ok(data) => data.parse(),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            }),
        }
    }

    /// Build coordinator from settings.
    pub fn coordinator(&self) -> TaskCoordinator {
        TaskCoordinator::new(&self.progress_file)
            .with_stale_timeout(Duration::from_secs(self.stale_timeout))
            .with_release_retry_delay(Duration::from_millis(self.release_retry_delay))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            progress_file: PathBuf::from(DEFAULT_PROGRESS_FILE),
            stale_timeout: DEFAULT_STALE_TIMEOUT.as_secs(),
            release_retry_delay: DEFAULT_RELEASE_RETRY_DELAY.as_millis() as u64,
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on progress file path.
        settings.progress_file = PathBuf::from(
            shellexpand::full(settings.progress_file.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file exists but cannot be read.
    #[error("failed to read configuration file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
