// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Commit messages, in character.
//!
//! Commitzilla installs itself as the `prepare-commit-msg` hook of a Git
//! repository, and rewrites every commit message in the voice of a chosen
//! __character__ by asking a remote completion service to do the writing.
//!
//! The crate is split into two halves:
//!
//! - The installation lifecycle, [`InstallationManager`], which creates and
//!   removes the per-repository artifacts: the hook script, the settings file
//!   ([`ConfigStore`]), and the character file ([`CharacterStore`]).
//! - The commit-time pipeline, [`CommitMessageTransformer`], which never fails
//!   a commit and never loses the original message.
//!
//! Every entry point takes the repository root explicitly.

pub mod atomic;
pub mod characters;
pub mod completion;
pub mod config;
pub mod hook;
pub mod install;
pub mod path;
pub mod secret;

pub use characters::{CharacterSeed, CharacterStore};
pub use completion::{Completion, CompletionRequest, OpenAiClient};
pub use config::{ConfigStore, Prefix, SettingKey, Settings};
pub use hook::{CommitMessageTransformer, Outcome};
pub use install::{is_installed, HookScript, InstallationManager, InstallationState};
pub use path::{discover_repo_root, NotAGitRepository, RepoPaths};
pub use secret::{FileSecretStore, SecretStore};
