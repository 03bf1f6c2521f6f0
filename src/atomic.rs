// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Atomic file replacement.
//!
//! Every artifact commitzilla persists goes through [`write_atomic`]. Content
//! is written to a temporary file in the same directory as the target, flushed
//! to disk, and then renamed over the target. Readers observe either the old
//! file or the new file, never a partial write. If anything fails before the
//! rename, the temporary file is removed when it goes out of scope.
//!
//! Replacing a file keeps its permission bits unless a mode is given
//! explicitly. Brand new files get the temporary file's owner-only mode.

use std::{
    fs::File,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Replace file at `path` with `contents`.
///
/// # Errors
///
/// - Return [`AtomicWriteError::CreateTemp`] if the temporary file cannot be
///   created next to `path`.
/// - Return [`AtomicWriteError::Write`] if contents cannot be written out.
/// - Return [`AtomicWriteError::Persist`] if the rename into place fails.
pub fn write_atomic(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
    replace(path.as_ref(), contents.as_ref(), None)
}

/// Replace file at `path` with `contents`, applying unix permission `mode`
/// before the file becomes visible.
///
/// The mode is ignored on platforms without unix permissions.
///
/// # Errors
///
/// - Same as [`write_atomic`].
pub fn write_atomic_with_mode(
    path: impl AsRef<Path>,
    contents: impl AsRef<[u8]>,
    mode: u32,
) -> Result<()> {
    replace(path.as_ref(), contents.as_ref(), Some(mode))
}

/// Create file at `path` with `contents` unless something already exists
/// there.
///
/// Returns `false`, leaving the existing file alone, if `path` was taken by
/// the time the rename happened.
///
/// # Errors
///
/// - Same as [`write_atomic`], except that an occupied target is not an
///   error.
#[instrument(skip(path, contents), level = "debug")]
pub fn create_atomic(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<bool> {
    let path = path.as_ref();
    let tmp = staged(path, contents.as_ref(), None)?;
    match tmp.persist_noclobber(path) {
        Ok(_) => {
            debug!("created {:?}", path.display());
            Ok(true)
        }
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            debug!("keep existing {:?}", path.display());
            Ok(false)
        }
        Err(err) => Err(AtomicWriteError::Persist {
            source: err.error,
            path: path.to_path_buf(),
        }),
    }
}

#[instrument(skip(contents), level = "debug")]
fn replace(path: &Path, contents: &[u8], mode: Option<u32>) -> Result<()> {
    let tmp = staged(path, contents, mode.or_else(|| existing_mode(path)))?;

    // INVARIANT: Temporary file is deleted on drop if the rename fails.
    tmp.persist(path).map_err(|err| AtomicWriteError::Persist {
        source: err.error,
        path: path.to_path_buf(),
    })?;
    debug!("replaced {:?}", path.display());

    Ok(())
}

/// Write contents to a temporary sibling of `path`, ready to be renamed.
fn staged(path: &Path, contents: &[u8], mode: Option<u32>) -> Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(|err| AtomicWriteError::CreateTemp {
        source: err,
        path: path.to_path_buf(),
    })?;

    let write_err = |err| AtomicWriteError::Write {
        source: err,
        path: path.to_path_buf(),
    };
    tmp.write_all(contents).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    if let Some(mode) = mode {
        apply_mode(tmp.as_file(), mode).map_err(write_err)?;
    }

    Ok(tmp)
}

#[cfg(unix)]
fn apply_mode(file: &File, mode: u32) -> std::io::Result<()> {
    use std::{fs::Permissions, os::unix::fs::PermissionsExt};
    file.set_permissions(Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_mode(_file: &File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn existing_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|meta| meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn existing_mode(_path: &Path) -> Option<u32> {
    None
}

/// Atomic write error types.
#[derive(Debug, thiserror::Error)]
pub enum AtomicWriteError {
    /// Temporary file cannot be created next to target.
    #[error("failed to create temporary file for {:?}", .path.display())]
    CreateTemp {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Contents cannot be written to temporary file.
    #[error("failed to write contents for {:?}", .path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Temporary file cannot be renamed over target.
    #[error("failed to move new contents into {:?}", .path.display())]
    Persist {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = AtomicWriteError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn replaces_existing_contents() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("artifact");
        fs::write(&path, "old old old old")?;

        write_atomic(&path, "new")?;
        assert_eq!(fs::read_to_string(&path)?, "new");

        Ok(())
    }

    #[test]
    fn leaves_no_temporary_files_behind() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write_atomic(dir.path().join("a"), "1")?;
        write_atomic(dir.path().join("a"), "2")?;

        let entries = fs::read_dir(dir.path())?.count();
        assert_eq!(entries, 1);

        Ok(())
    }

    #[test]
    fn missing_parent_directory_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("artifact");
        let result = write_atomic(&path, "data");
        assert!(matches!(result, Err(AtomicWriteError::CreateTemp { .. })));
    }

    #[test]
    fn create_keeps_existing_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("seed.json");

        assert!(create_atomic(&path, "first")?);
        assert!(!create_atomic(&path, "second")?);
        assert_eq!(fs::read_to_string(&path)?, "first");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn applies_mode_before_rename() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let path = dir.path().join("hook");
        write_atomic_with_mode(&path, "#!/bin/sh\n", 0o755)?;

        let mode = fs::metadata(&path)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn replace_keeps_existing_mode() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new()?;
        let path = dir.path().join("COMMIT_EDITMSG");
        fs::write(&path, "fix typo")?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;

        write_atomic(&path, "Lo! I hath mended a typo!")?;
        assert_eq!(fs::metadata(&path)?.permissions().mode() & 0o777, 0o644);

        write_atomic_with_mode(&path, "again", 0o600)?;
        assert_eq!(fs::metadata(&path)?.permissions().mode() & 0o777, 0o600);

        Ok(())
    }
}
