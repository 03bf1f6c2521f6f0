// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Character map management.
//!
//! A __character__ is a named persona whose voice commitzilla rewrites commit
//! messages in. Characters are kept per repository in
//! `<root>/.git/hooks/cz_characters.json`, a flat JSON object mapping each
//! character name to a prompt describing how that character talks.
//!
//! The store is write-through. Every call to [`CharacterStore::set`] persists
//! the whole map before returning, so a character saved from one command is
//! visible to the next one. Persistence only happens inside `set`, bulk reads
//! never touch the disk.

use crate::{
    atomic::{create_atomic, write_atomic, AtomicWriteError},
    path::{NotAGitRepository, RepoPaths},
};

use std::{
    collections::BTreeMap,
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Default character set shipped with commitzilla.
pub const BUNDLED_CHARACTERS: &str = include_str!("../data/characters.json");

/// Name-to-prompt mapping.
pub type CharacterMap = BTreeMap<String, String>;

/// Parse the bundled default character set.
///
/// # Errors
///
/// - Return [`CharacterError::Seed`] if the bundled data is not a valid
///   character map.
pub fn bundled_characters() -> Result<CharacterMap> {
    serde_json::from_str(BUNDLED_CHARACTERS).map_err(CharacterError::Seed)
}

/// Initial contents of a freshly created character file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CharacterSeed {
    /// Start with an empty map.
    Empty,

    /// Start with the bundled default characters.
    #[default]
    Bundled,
}

impl CharacterSeed {
    fn contents(self) -> Result<CharacterMap> {
        match self {
            Self::Empty => Ok(CharacterMap::new()),
            Self::Bundled => bundled_characters(),
        }
    }
}

/// Character file of one repository.
#[derive(Debug, Clone)]
pub struct CharacterStore {
    path: PathBuf,
    characters: CharacterMap,
}

impl CharacterStore {
    /// Open character map of repository at `root`.
    ///
    /// If no character file exists yet, one is created from `seed`. An
    /// existing file is never overwritten, even when it appears between the
    /// existence check and the creation.
    ///
    /// # Errors
    ///
    /// - Return [`CharacterError::NotAGitRepository`] if `root` has no hooks
    ///   directory.
    /// - Return [`CharacterError::Read`] or [`CharacterError::Parse`] if the
    ///   character file cannot be loaded.
    /// - Return [`CharacterError::Write`] if a new character file cannot be
    ///   created.
    #[instrument(skip(root), level = "debug")]
    pub fn open(root: impl AsRef<Path>, seed: CharacterSeed) -> Result<Self> {
        let path = RepoPaths::open(root.as_ref())?.characters_file();

        if !path.exists() {
            let characters = seed.contents()?;
            let data = serde_json::to_string_pretty(&characters)
                .map_err(CharacterError::Serialize)?;
            if create_atomic(&path, data)? {
                info!("created character file at {:?}", path.display());
                return Ok(Self { path, characters });
            }
        }

        let data = read_to_string(&path).map_err(|err| CharacterError::Read {
            source: err,
            path: path.clone(),
        })?;
        let characters = serde_json::from_str(&data).map_err(|err| CharacterError::Parse {
            source: err,
            path: path.clone(),
        })?;

        Ok(Self { path, characters })
    }

    /// Insert or replace a character, then persist the whole map.
    ///
    /// # Errors
    ///
    /// - Return [`CharacterError::Serialize`] if the map cannot be rendered.
    /// - Return [`CharacterError::Write`] if the file cannot be replaced.
    #[instrument(skip(self, name, prompt), level = "debug")]
    pub fn set(&mut self, name: impl Into<String>, prompt: impl Into<String>) -> Result<()> {
        let name = name.into();
        debug!("save character {name:?}");
        self.characters.insert(name, prompt.into());
        self.save()
    }

    /// Get prompt of character `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.characters.get(name).map(String::as_str)
    }

    /// Names of all characters in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.characters.keys().map(String::as_str)
    }

    /// Whole mapping, in name order.
    pub fn characters(&self) -> &CharacterMap {
        &self.characters
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Path to backing character file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let data =
            serde_json::to_string_pretty(&self.characters).map_err(CharacterError::Serialize)?;
        write_atomic(&self.path, data)?;
        Ok(())
    }
}

/// Character map error types.
#[derive(Debug, thiserror::Error)]
pub enum CharacterError {
    /// Repository has no hooks directory.
    #[error(transparent)]
    NotAGitRepository(#[from] NotAGitRepository),

    /// Character file cannot be read.
    #[error("failed to read character file at {:?}", .path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Character file is not a flat JSON object of strings.
    #[error("failed to parse character file at {:?}", .path.display())]
    Parse {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Bundled character set is malformed.
    #[error("bundled character set is malformed")]
    Seed(#[source] serde_json::Error),

    /// Character map cannot be rendered.
    #[error("failed to serialize character map")]
    Serialize(#[source] serde_json::Error),

    /// Character file cannot be replaced.
    #[error(transparent)]
    Write(#[from] AtomicWriteError),
}

/// Friendly result alias :3
type Result<T, E = CharacterError> = std::result::Result<T, E>;
