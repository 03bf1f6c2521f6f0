// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-repository settings.
//!
//! Commitzilla keeps its settings in `<root>/.git/hooks/cz-config.ini`. The
//! file holds a single `[settings]` section of flat key-value pairs:
//!
//! ```ini
//! [settings]
//! model = gpt-4o-mini
//! prefix = no
//! character_name = Shakespeare
//! character_prompt = Speaks in Early Modern English.
//! ```
//!
//! Writes merge into whatever is already stored. Fields left unset in a
//! [`Settings`] value never clobber stored keys, and keys commitzilla does not
//! know about are carried along untouched. Every write rewrites the whole file
//! atomically.

use crate::{
    atomic::{write_atomic, AtomicWriteError},
    path::{NotAGitRepository, RepoPaths},
};

use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Name of the only section commitzilla reads or writes.
pub const SETTINGS_SECTION: &str = "settings";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Settings layout.
///
/// Every field is optional so the same type doubles as a partial update.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Settings {
    /// Completion model to request.
    pub model: Option<String>,

    /// Whether rewritten messages get a `[name] ` prefix.
    pub prefix: Option<Prefix>,

    /// Name of the character whose voice is used.
    pub character_name: Option<String>,

    /// Free text describing the character's voice.
    pub character_prompt: Option<String>,
}

impl Settings {
    /// Key-value pairs of every field that is set.
    pub fn entries(&self) -> Vec<(SettingKey, String)> {
        [
            (SettingKey::Model, self.model.clone()),
            (SettingKey::Prefix, self.prefix.map(|prefix| prefix.to_string())),
            (SettingKey::CharacterName, self.character_name.clone()),
            (SettingKey::CharacterPrompt, self.character_prompt.clone()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
    }

    /// Check whether the prefix flag is enabled. Unset means disabled.
    pub fn prefix_enabled(&self) -> bool {
        self.prefix.is_some_and(Prefix::is_enabled)
    }
}

/// Keys of the settings section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Model,
    Prefix,
    CharacterName,
    CharacterPrompt,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::Model,
        SettingKey::Prefix,
        SettingKey::CharacterName,
        SettingKey::CharacterPrompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Prefix => "prefix",
            Self::CharacterName => "character_name",
            Self::CharacterPrompt => "character_prompt",
        }
    }
}

impl Display for SettingKey {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Prefix flag.
///
/// Stored as `yes` or `no`. Parsing is lenient about case and common boolean
/// spellings, writing is not.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Yes,
    #[default]
    No,
}

impl Prefix {
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl From<bool> for Prefix {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Yes
        } else {
            Self::No
        }
    }
}

impl FromStr for Prefix {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "on" | "1" => Ok(Self::Yes),
            "no" | "n" | "false" | "off" | "0" => Ok(Self::No),
            _ => Err(ConfigError::InvalidPrefix {
                value: value.to_string(),
            }),
        }
    }
}

impl Display for Prefix {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Yes => fmt.write_str("yes"),
            Self::No => fmt.write_str("no"),
        }
    }
}

/// Settings file of one repository.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    ini: Ini,
}

impl ConfigStore {
    /// Open settings of repository at `root`.
    ///
    /// Loads the settings file if it exists, otherwise starts from an empty
    /// settings section. Nothing is written until [`ConfigStore::write`].
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NotAGitRepository`] if `root` has no hooks
    ///   directory.
    /// - Return [`ConfigError::Read`] or [`ConfigError::Parse`] if an existing
    ///   settings file cannot be loaded.
    #[instrument(skip(root), level = "debug")]
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let path = RepoPaths::open(root.as_ref())?.settings_file();
        if !path.exists() {
            debug!("no settings at {:?}, start empty", path.display());
            return Ok(Self {
                path,
                ini: Ini::new(),
            });
        }

        Self::load(path)
    }

    /// Open settings of repository at `root`, requiring the file to exist.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Missing`] if there is no settings file.
    /// - Same as [`ConfigStore::open`] otherwise.
    #[instrument(skip(root), level = "debug")]
    pub fn open_existing(root: impl AsRef<Path>) -> Result<Self> {
        let path = RepoPaths::open(root.as_ref())?.settings_file();
        if !path.exists() {
            return Err(ConfigError::Missing { path });
        }

        Self::load(path)
    }

    fn load(path: PathBuf) -> Result<Self> {
        let data = read_to_string(&path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.clone(),
        })?;
        let ini = Ini::load_from_str_opt(&data, parse_option()).map_err(|err| {
            ConfigError::Parse {
                source: err,
                path: path.clone(),
            }
        })?;

        Ok(Self { path, ini })
    }

    /// Merge set fields of `partial` into stored settings, then persist.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Serialize`] if settings cannot be rendered.
    /// - Return [`ConfigError::Write`] if the file cannot be replaced.
    #[instrument(skip(self, partial), level = "debug")]
    pub fn write(&mut self, partial: &Settings) -> Result<()> {
        for (key, value) in partial.entries() {
            debug!("set {key}");
            self.ini
                .with_section(Some(SETTINGS_SECTION))
                .set(key.as_str(), value);
        }

        let mut buffer = Vec::new();
        self.ini
            .write_to_opt(&mut buffer, write_option())
            .map_err(ConfigError::Serialize)?;
        write_atomic(&self.path, buffer)?;

        Ok(())
    }

    /// Get stored value of `key`.
    pub fn get(&self, key: SettingKey) -> Option<&str> {
        self.ini.get_from(Some(SETTINGS_SECTION), key.as_str())
    }

    /// Get all stored settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::InvalidPrefix`] if the stored prefix flag is
    ///   neither yes nor no.
    pub fn settings(&self) -> Result<Settings> {
        let owned = |key| self.get(key).map(str::to_string);
        Ok(Settings {
            model: owned(SettingKey::Model),
            prefix: self.get(SettingKey::Prefix).map(str::parse::<Prefix>).transpose()?,
            character_name: owned(SettingKey::CharacterName),
            character_prompt: owned(SettingKey::CharacterPrompt),
        })
    }

    /// Path to backing settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: true,
        ..Default::default()
    }
}

fn write_option() -> WriteOption {
    WriteOption {
        escape_policy: EscapePolicy::Reserved,
        ..Default::default()
    }
}

/// Settings error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Repository has no hooks directory.
    #[error(transparent)]
    NotAGitRepository(#[from] NotAGitRepository),

    /// Settings file does not exist.
    #[error("no settings file at {:?}", .path.display())]
    Missing { path: PathBuf },

    /// Settings file cannot be read.
    #[error("failed to read settings file at {:?}", .path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Settings file is not valid INI.
    #[error("failed to parse settings file at {:?}", .path.display())]
    Parse {
        #[source]
        source: ini::ParseError,
        path: PathBuf,
    },

    /// Settings cannot be rendered.
    #[error("failed to serialize settings")]
    Serialize(#[source] std::io::Error),

    /// Settings file cannot be replaced.
    #[error(transparent)]
    Write(#[from] AtomicWriteError),

    /// Prefix flag holds something other than yes or no.
    #[error("invalid prefix value {value:?}, expected yes or no")]
    InvalidPrefix { value: String },
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
