// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Settings layout.
//!
//! Specify the layout of the `rice.toml` settings file that lives in the
//! rice directory. Settings are read once at startup and handed to
//! whatever needs them, nothing in the crate looks them up on its own.

use crate::path::{default_rice_dir, PathResolver};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Name of settings file inside the rice directory.
pub const SETTINGS_FILE: &str = "rice.toml";

/// Process wide settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RiceSettings {
    /// Rice directory holding database, settings, and backups.
    pub home: PathBuf,

    /// Database settings.
    #[serde(default)]
    pub store: StoreSettings,

    /// External command settings.
    #[serde(default)]
    pub command: CommandSettings,

    /// Backup settings.
    #[serde(default)]
    pub backup: BackupSettings,
}

impl RiceSettings {
    /// Construct default settings rooted at rice directory `home`.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            store: StoreSettings::default(),
            command: CommandSettings::default(),
            backup: BackupSettings::default(),
        }
    }

    /// Load settings file from default rice directory of `resolver`'s home.
    ///
    /// Falls back to defaults when no settings file exists.
    ///
    /// # Errors
    ///
    /// - Return [`SettingsError::Read`] if settings file cannot be read.
    /// - Return [`SettingsError::Deserialize`] if settings file is malformed.
    pub fn load(resolver: &PathResolver) -> Result<Self> {
        let home = default_rice_dir(resolver.home());
        let path = home.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::new(home));
        }

        let data = std::fs::read_to_string(&path)
            .map_err(|source| SettingsError::Read { source, path })?;
        data.parse()
    }

    /// Path of settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.home.join(SETTINGS_FILE)
    }

    /// Path of database file.
    pub fn database_path(&self) -> PathBuf {
        self.home.join(&self.store.database)
    }

    /// Connection string of the form `<driver>://<database path>`.
    pub fn connection_string(&self) -> String {
        format!("{}://{}", self.store.driver, self.database_path().display())
    }

    /// Directory receiving database backups.
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup.directory {
            Some(directory) => self.home.join(directory),
            None => self.home.join("backups"),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command.timeout_secs)
    }
}

impl FromStr for RiceSettings {
    type Err = SettingsError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: RiceSettings =
            toml::de::from_str(data).map_err(SettingsError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        settings.home = expand(&settings.home)?;
        if let Some(directory) = &settings.backup.directory {
            settings.backup.directory = Some(expand(directory)?);
        }

        Ok(settings)
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(SettingsError::ShellExpansion)?
            .into_owned(),
    ))
}

impl Display for RiceSettings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(SettingsError::Serialize)?
                .as_str(),
        )
    }
}

/// Database settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Name of driver in the driver registry.
    pub driver: String,

    /// Database file name, relative to the rice directory.
    pub database: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            driver: "sqlite".into(),
            database: "rice.db".into(),
        }
    }
}

/// External command settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Seconds before an external command is killed.
    pub timeout_secs: u64,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Backup settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Backup directory, relative paths are taken from the rice directory.
    pub directory: Option<PathBuf>,
}

/// Settings error types.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Failed to deserialize settings.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize settings.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on settings.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to read settings file.
    #[error("failed to read settings file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl From<SettingsError> for FmtError {
    fn from(_: SettingsError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = SettingsError> = std::result::Result<T, E>;
