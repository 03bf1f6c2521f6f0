// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Credential storage.
//!
//! The API key never lives in a repository file. Commitzilla only needs a
//! narrow capability to get, set, and delete a secret by service and key,
//! which is what [`SecretStore`] describes. [`FileSecretStore`] provides it
//! through owner-only files in the user's configuration directory.

use crate::{
    atomic::{write_atomic_with_mode, AtomicWriteError},
    path::{default_secret_dir, NoConfigDir},
};

use std::{
    fs::{read_to_string, remove_file},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Service name credentials are filed under.
pub const SERVICE: &str = "commitzilla";

/// Key of the completion service credential.
pub const API_KEY: &str = "api_key";

/// Environment variable that takes precedence over the stored credential.
pub const API_KEY_ENV: &str = "CZ_OPENAI_API_KEY";

/// Capability to store secrets outside of repository files.
pub trait SecretStore {
    /// Get secret, or `None` if nothing is stored.
    fn get(&self, service: &str, key: &str) -> Result<Option<String>>;

    /// Store secret, replacing any previous value.
    fn set(&self, service: &str, key: &str, value: &str) -> Result<()>;

    /// Delete secret. Deleting a missing secret is not an error.
    fn delete(&self, service: &str, key: &str) -> Result<()>;
}

/// Resolve the completion service credential.
///
/// A non-empty [`API_KEY_ENV`] wins over whatever `store` holds.
///
/// # Errors
///
/// - Return [`SecretError`] if the store cannot be read.
pub fn resolve_api_key(store: &impl SecretStore) -> Result<Option<String>> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            debug!("use credential from {API_KEY_ENV}");
            return Ok(Some(key.trim().to_string()));
        }
    }

    store.get(SERVICE, API_KEY)
}

/// Secret store backed by one file per secret.
///
/// Files are named `<service>.<key>` and created with mode `0600` on unix.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    /// Construct store rooted at `dir`. The directory is created on first
    /// write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Construct store rooted at the default credential directory.
    ///
    /// # Errors
    ///
    /// - Return [`SecretError::NoConfigDir`] if the user's configuration
    ///   directory cannot be determined.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(default_secret_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn secret_path(&self, service: &str, key: &str) -> Result<PathBuf> {
        for name in [service, key] {
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return Err(SecretError::InvalidName {
                    name: name.to_string(),
                });
            }
        }

        Ok(self.dir.join(format!("{service}.{key}")))
    }
}

impl SecretStore for FileSecretStore {
    #[instrument(skip(self), level = "debug")]
    fn get(&self, service: &str, key: &str) -> Result<Option<String>> {
        let path = self.secret_path(service, key)?;
        match read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim().to_string()).filter(|value| !value.is_empty())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SecretError::Read { source: err, path }),
        }
    }

    #[instrument(skip(self, value), level = "debug")]
    fn set(&self, service: &str, key: &str, value: &str) -> Result<()> {
        let path = self.secret_path(service, key)?;
        mkdirp::mkdirp(&self.dir).map_err(|err| SecretError::CreateDir {
            source: err,
            path: self.dir.clone(),
        })?;
        write_atomic_with_mode(&path, value.trim(), 0o600)?;
        debug!("stored secret at {:?}", path.display());

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn delete(&self, service: &str, key: &str) -> Result<()> {
        let path = self.secret_path(service, key)?;
        match remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SecretError::Delete { source: err, path }),
        }
    }
}

/// Secret storage error types.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Configuration directory cannot be determined.
    #[error(transparent)]
    NoConfigDir(#[from] NoConfigDir),

    /// Service or key cannot be used as a file name.
    #[error("invalid secret name {name:?}")]
    InvalidName { name: String },

    /// Credential directory cannot be created.
    #[error("failed to create credential directory at {:?}", .path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Secret file cannot be read.
    #[error("failed to read secret at {:?}", .path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Secret file cannot be written.
    #[error(transparent)]
    Write(#[from] AtomicWriteError),

    /// Secret file cannot be deleted.
    #[error("failed to delete secret at {:?}", .path.display())]
    Delete {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SecretError> = std::result::Result<T, E>;
