// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where commitzilla keeps its per-repository artifacts, and where
//! the user's credential lives outside of any repository.
//!
//! # Repository Layout
//!
//! Every artifact lives inside the hooks directory of the repository, i.e.,
//! `<root>/.git/hooks`:
//!
//! - `prepare-commit-msg`, the hook script Git invokes.
//! - `cz-config.ini`, the settings file.
//! - `cz_characters.json`, the character map.
//!
//! The layout is fixed to `<root>/.git/hooks`. Linked worktrees and
//! submodules keep a `.git` file instead of a directory, so they are reported
//! as [`NotAGitRepository`] rather than followed to the real Git directory.
//!
//! Nothing here resolves the "current" repository implicitly. Callers hand
//! over the repository root, and only the binary ever looks at the working
//! directory through [`discover_repo_root`].

use git2::Repository;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the hook script Git invokes before the commit message is
/// finalized.
pub const HOOK_FILE_NAME: &str = "prepare-commit-msg";

/// File name of the settings file.
pub const SETTINGS_FILE_NAME: &str = "cz-config.ini";

/// File name of the character map.
pub const CHARACTERS_FILE_NAME: &str = "cz_characters.json";

/// Fixed artifact locations of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    root: PathBuf,
    hooks_dir: PathBuf,
}

impl RepoPaths {
    /// Compute artifact locations for repository root.
    ///
    /// Does not check if any of the paths exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let hooks_dir = root.join(".git").join("hooks");
        Self { root, hooks_dir }
    }

    /// Compute artifact locations, requiring the hooks directory to exist.
    ///
    /// # Errors
    ///
    /// - Return [`NotAGitRepository`] if `<root>/.git/hooks` is not a
    ///   directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, NotAGitRepository> {
        let paths = Self::new(root);
        if !paths.hooks_dir.is_dir() {
            return Err(NotAGitRepository {
                path: paths.root.clone(),
            });
        }

        Ok(paths)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hooks_dir(&self) -> &Path {
        &self.hooks_dir
    }

    pub fn hook_script(&self) -> PathBuf {
        self.hooks_dir.join(HOOK_FILE_NAME)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.hooks_dir.join(SETTINGS_FILE_NAME)
    }

    pub fn characters_file(&self) -> PathBuf {
        self.hooks_dir.join(CHARACTERS_FILE_NAME)
    }
}

/// Determine root of the non-bare repository containing `start`.
///
/// Walks up from `start` the same way Git does.
///
/// # Errors
///
/// - Return [`NotAGitRepository`] if no repository contains `start`, or if the
///   repository found is bare.
pub fn discover_repo_root(start: impl AsRef<Path>) -> Result<PathBuf, NotAGitRepository> {
    let not_a_repo = || NotAGitRepository {
        path: start.as_ref().to_path_buf(),
    };
    let repository = Repository::discover(start.as_ref()).map_err(|err| {
        debug!("repository discovery failed: {err}");
        not_a_repo()
    })?;

    repository
        .workdir()
        .map(Path::to_path_buf)
        .ok_or_else(not_a_repo)
}

/// Determine default absolute path to commitzilla's credential directory.
///
/// Uses `$XDG_CONFIG_HOME/commitzilla` (or the platform equivalent). Does not
/// check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if the configuration directory cannot be
///   determined.
pub fn default_secret_dir() -> Result<PathBuf, NoConfigDir> {
    dirs::config_dir()
        .map(|path| path.join("commitzilla"))
        .ok_or(NoConfigDir)
}

/// Repository root lacks a Git hooks directory.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("no .git/hooks directory found in {:?}", .path.display())]
pub struct NotAGitRepository {
    pub path: PathBuf,
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;
