// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installation lifecycle.
//!
//! Commitzilla is __installed__ in a repository when any of its three
//! artifacts exist in the hooks directory: the hook script, the settings
//! file, or the character file. It is __not installed__ when none of them
//! exist. There is no other persisted state, the installation state is always
//! derived from what is on disk.
//!
//! # Changesets
//!
//! Installing and uninstalling touch several files, and any single step may
//! fail. Both are expressed as a [`Changeset`], an ordered list of actions
//! applied one at a time. The changeset remembers which artifacts it already
//! handled, so a failure half way through is reported as
//! [`InstallError::PartialInstall`] (or [`InstallError::PartialUninstall`])
//! naming exactly what was done and what was not. Nothing is rolled back. A
//! partial install still counts as installed, and `uninstall` clears it.

use crate::{
    atomic::{write_atomic_with_mode, AtomicWriteError},
    characters::{CharacterError, CharacterSeed, CharacterStore},
    config::{ConfigError, ConfigStore, Settings},
    path::{NotAGitRepository, RepoPaths, HOOK_FILE_NAME},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::remove_file,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Permission bits of the installed hook script: rwx for owner, r-x for group
/// and other.
pub const HOOK_SCRIPT_MODE: u32 = 0o755;

/// Check whether commitzilla is installed in repository at `root`.
pub fn is_installed(root: impl AsRef<Path>) -> bool {
    InstallationState::inspect(&RepoPaths::new(root.as_ref())).is_installed()
}

/// Per-repository artifacts commitzilla manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Artifact {
    HookScript,
    Settings,
    Characters,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [Artifact::HookScript, Artifact::Settings, Artifact::Characters];

    /// Location of artifact in repository.
    pub fn path(&self, paths: &RepoPaths) -> PathBuf {
        match self {
            Self::HookScript => paths.hook_script(),
            Self::Settings => paths.settings_file(),
            Self::Characters => paths.characters_file(),
        }
    }
}

impl Display for Artifact {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::HookScript => fmt.write_str("hook script"),
            Self::Settings => fmt.write_str("settings file"),
            Self::Characters => fmt.write_str("character file"),
        }
    }
}

/// Snapshot of which artifacts exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationState {
    present: Vec<Artifact>,
}

impl InstallationState {
    /// Look at the artifacts on disk.
    pub fn inspect(paths: &RepoPaths) -> Self {
        let present = Artifact::ALL
            .into_iter()
            .filter(|artifact| artifact.path(paths).exists())
            .collect();
        Self { present }
    }

    /// Installed iff at least one artifact exists.
    pub fn is_installed(&self) -> bool {
        !self.present.is_empty()
    }

    /// Some, but not all, artifacts exist.
    pub fn is_partial(&self) -> bool {
        self.is_installed() && self.present.len() < Artifact::ALL.len()
    }

    pub fn is_present(&self, artifact: Artifact) -> bool {
        self.present.contains(&artifact)
    }

    pub fn present(&self) -> &[Artifact] {
        &self.present
    }

    pub fn missing(&self) -> Vec<Artifact> {
        Artifact::ALL
            .into_iter()
            .filter(|artifact| !self.is_present(*artifact))
            .collect()
    }
}

/// Hook script Git runs before a commit message is finalized.
///
/// The script is a POSIX shell shim that hands over to the commitzilla
/// executable, passing along whatever arguments Git gives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookScript {
    program: PathBuf,
}

impl HookScript {
    /// Construct hook script that runs `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Construct hook script that runs the currently executing binary.
    ///
    /// Falls back to `commitzilla` from `PATH` if the current executable
    /// cannot be determined.
    pub fn for_current_exe() -> Self {
        match std::env::current_exe() {
            Ok(program) => Self::new(program),
            Err(err) => {
                debug!("cannot locate current executable: {err}");
                Self::new("commitzilla")
            }
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Render script contents.
    pub fn render(&self) -> String {
        let program = self.program.to_string_lossy().replace('\'', r"'\''");
        format!(
            "#!/bin/sh\n\
             # {HOOK_FILE_NAME} hook installed by commitzilla.\n\
             # Rewrites the commit message in the voice of the configured character.\n\
             exec '{program}' hook \"$@\"\n"
        )
    }
}

/// Single step of a changeset.
#[derive(Debug, Clone)]
pub enum Action {
    /// Create character file from seed if missing, and make sure it knows
    /// the given character.
    EnsureCharacters {
        seed: CharacterSeed,
        character: Option<(String, String)>,
    },

    /// Merge settings into settings file.
    WriteSettings(Settings),

    /// Write hook script and mark it executable.
    WriteHookScript(HookScript),

    /// Delete artifact, tolerating its absence.
    Remove(Artifact),
}

impl Action {
    /// Artifact this action touches.
    pub fn artifact(&self) -> Artifact {
        match self {
            Self::EnsureCharacters { .. } => Artifact::Characters,
            Self::WriteSettings(_) => Artifact::Settings,
            Self::WriteHookScript(_) => Artifact::HookScript,
            Self::Remove(artifact) => *artifact,
        }
    }

    fn apply(&self, paths: &RepoPaths) -> Result<(), StepError> {
        match self {
            Self::EnsureCharacters { seed, character } => {
                let mut store = CharacterStore::open(paths.root(), *seed)?;
                if let Some((name, prompt)) = character {
                    if store.get(name) != Some(prompt.as_str()) {
                        store.set(name.as_str(), prompt.as_str())?;
                    }
                }
            }
            Self::WriteSettings(settings) => {
                ConfigStore::open(paths.root())?.write(settings)?;
            }
            Self::WriteHookScript(script) => {
                write_atomic_with_mode(paths.hook_script(), script.render(), HOOK_SCRIPT_MODE)?;
            }
            Self::Remove(artifact) => {
                let path = artifact.path(paths);
                match remove_file(&path) {
                    Ok(()) => debug!("removed {:?}", path.display()),
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        debug!("{artifact} already absent");
                    }
                    Err(err) => return Err(StepError::Remove { source: err, path }),
                }
            }
        }

        Ok(())
    }
}

/// Ordered list of actions applied to one repository.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    actions: Vec<Action>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Apply actions in order, stopping at the first failure.
    ///
    /// Returns the artifacts handled, in order.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::PartialInstall`] naming the artifacts already
    ///   handled and the one that failed.
    pub fn apply(&self, paths: &RepoPaths) -> Result<Vec<Artifact>> {
        let mut completed = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            action
                .apply(paths)
                .map_err(|err| InstallError::PartialInstall {
                    completed: completed.clone(),
                    failed: action.artifact(),
                    source: err,
                })?;
            completed.push(action.artifact());
        }

        Ok(completed)
    }

    /// Apply every action regardless of earlier failures.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::PartialUninstall`] with the artifacts whose
    ///   action failed, carrying the first failure as source.
    pub fn apply_all(&self, paths: &RepoPaths) -> Result<Vec<Artifact>> {
        let mut completed = Vec::with_capacity(self.actions.len());
        let mut remaining = Vec::new();
        let mut first_error = None;

        for action in &self.actions {
            match action.apply(paths) {
                Ok(()) => completed.push(action.artifact()),
                Err(err) => {
                    remaining.push(action.artifact());
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(source) => Err(InstallError::PartialUninstall { remaining, source }),
            None => Ok(completed),
        }
    }
}

/// Installation lifecycle of one repository.
#[derive(Debug, Clone)]
pub struct InstallationManager {
    paths: RepoPaths,
}

impl InstallationManager {
    /// Manage installation in repository at `root`.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::NotAGitRepository`] if `root` has no hooks
    ///   directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            paths: RepoPaths::open(root)?,
        })
    }

    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    pub fn state(&self) -> InstallationState {
        InstallationState::inspect(&self.paths)
    }

    pub fn is_installed(&self) -> bool {
        self.state().is_installed()
    }

    /// Install commitzilla.
    ///
    /// Ensures the character file exists (seeded from `seed`, and holding
    /// the configured character), persists `settings`, then writes the hook
    /// script with [`HOOK_SCRIPT_MODE`]. Callers are expected to check
    /// [`InstallationManager::is_installed`] first.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::PartialInstall`] if any step fails. Earlier
    ///   steps stay applied.
    #[instrument(skip(self, settings, script), level = "debug")]
    pub fn install(
        &self,
        settings: &Settings,
        seed: CharacterSeed,
        script: &HookScript,
    ) -> Result<()> {
        let character = settings
            .character_name
            .clone()
            .zip(settings.character_prompt.clone());
        let changeset = Changeset::new()
            .push(Action::EnsureCharacters { seed, character })
            .push(Action::WriteSettings(settings.clone()))
            .push(Action::WriteHookScript(script.clone()));

        changeset.apply(&self.paths)?;
        info!("installed commitzilla into {:?}", self.paths.hooks_dir().display());

        Ok(())
    }

    /// Uninstall commitzilla.
    ///
    /// Deletes the hook script, the settings file, and the character file.
    /// Each deletion is attempted even if another fails, and artifacts that
    /// are already gone are skipped silently.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::PartialUninstall`] if any deletion fails.
    #[instrument(skip(self), level = "debug")]
    pub fn uninstall(&self) -> Result<()> {
        let changeset = Artifact::ALL
            .into_iter()
            .fold(Changeset::new(), |changeset, artifact| {
                changeset.push(Action::Remove(artifact))
            });

        changeset.apply_all(&self.paths)?;
        info!("uninstalled commitzilla from {:?}", self.paths.hooks_dir().display());

        Ok(())
    }
}

/// Failure of a single changeset action.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Characters(#[from] CharacterError),

    #[error(transparent)]
    Write(#[from] AtomicWriteError),

    #[error("failed to remove {:?}", .path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Installation error types.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// Repository has no hooks directory.
    #[error(transparent)]
    NotAGitRepository(#[from] NotAGitRepository),

    /// Install stopped part way; earlier artifacts remain in place.
    #[error("partial install: {failed} failed after {}", list(.completed))]
    PartialInstall {
        completed: Vec<Artifact>,
        failed: Artifact,
        #[source]
        source: StepError,
    },

    /// Some artifacts could not be removed.
    #[error("partial uninstall: could not remove {}", list(.remaining))]
    PartialUninstall {
        remaining: Vec<Artifact>,
        #[source]
        source: StepError,
    },
}

fn list(artifacts: &[Artifact]) -> String {
    if artifacts.is_empty() {
        return "nothing".into();
    }

    artifacts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Friendly result alias :3
type Result<T, E = InstallError> = std::result::Result<T, E>;
