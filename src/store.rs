// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup artifact store management.
//!
//! Completed containers are kept together in one place called the
//! __artifact directory__. Each regular file in there is one artifact, whose
//! name is the file name itself.
//!
//! # Artifact Directory Layout
//!
//! The artifact directory lives at `<repo>/cache`. The plugin cache container
//! always goes by the same well-known name, so every backup replaces the
//! previous one. Only the top-level of the artifact directory is evaluated,
//! subdirectories are neither listed nor deleted.
//!
//! # Cleanup Policy
//!
//! [`ArchiveStore::delete_all`] is best effort by design of the clean
//! operation: an artifact that cannot be removed does not stop the rest from
//! being removed, and is not reported back to the caller.

use std::{
    fs::{read_dir, remove_file},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// A completed container in the artifact directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Artifact {
    /// File name of artifact.
    pub name: String,

    /// Size of artifact in bytes.
    pub size: u64,
}

/// Sum sizes of a listing of artifacts.
pub fn total_size(artifacts: &[Artifact]) -> u64 {
    artifacts.iter().map(|artifact| artifact.size).sum()
}

/// Layer of indirection for artifact removal.
pub trait ArtifactRemover {
    /// Remove artifact at target path.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Artifact removal through the standard filesystem API.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

impl ArtifactRemover for FsRemover {
    fn remove(&self, path: &Path) -> io::Result<()> {
        remove_file(path)
    }
}

/// Manage containers inside an artifact directory.
#[derive(Debug, Clone)]
pub struct ArchiveStore<R = FsRemover>
where
    R: ArtifactRemover,
{
    artifact_dir: PathBuf,
    remover: R,
}

impl ArchiveStore {
    /// Open artifact directory at target path.
    ///
    /// Does not check if the directory exists.
    pub fn open(artifact_dir: impl Into<PathBuf>) -> Self {
        Self::with_remover(artifact_dir, FsRemover)
    }
}

impl<R> ArchiveStore<R>
where
    R: ArtifactRemover,
{
    /// Open artifact directory with custom removal logic.
    pub fn with_remover(artifact_dir: impl Into<PathBuf>, remover: R) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            remover,
        }
    }

    /// Path to artifact directory.
    pub fn artifact_dir(&self) -> &Path {
        self.artifact_dir.as_path()
    }

    /// Path to a named container inside the artifact directory.
    pub fn container_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.artifact_dir.join(name)
    }

    /// List artifacts sorted by name.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::ReadDir`] if the artifact directory, or any
    ///   entry in it, cannot be read.
    #[instrument(skip(self), level = "debug")]
    pub fn list(&self) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        for entry in read_dir(&self.artifact_dir).map_err(|err| self.read_dir_error(err))? {
            let entry = entry.map_err(|err| self.read_dir_error(err))?;
            let metadata = entry.metadata().map_err(|err| self.read_dir_error(err))?;
            if metadata.is_dir() {
                continue;
            }

            artifacts.push(Artifact {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
            });
        }
        artifacts.sort();

        debug!(
            "found {} artifacts in {:?}",
            artifacts.len(),
            self.artifact_dir.display()
        );
        Ok(artifacts)
    }

    /// Delete every artifact, swallowing individual failures.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::ReadDir`] if the artifact directory cannot be
    ///   enumerated. Failures to remove individual artifacts are never
    ///   reported.
    #[instrument(skip(self), level = "debug")]
    pub fn delete_all(&self) -> Result<()> {
        let entries = read_dir(&self.artifact_dir).map_err(|err| self.read_dir_error(err))?;

        for entry in entries.flatten() {
            if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                continue;
            }

            // INVARIANT: Cleanup may be partial, keep going no matter what.
            let path = entry.path();
            match self.remover.remove(&path) {
                Ok(()) => debug!("removed {:?}", path.display()),
                Err(err) => debug!("could not remove {:?}: {err}", path.display()),
            }
        }

        info!("cleaned {:?}", self.artifact_dir.display());
        Ok(())
    }

    fn read_dir_error(&self, source: io::Error) -> StoreError {
        StoreError::ReadDir {
            source,
            artifact_dir: self.artifact_dir.clone(),
        }
    }
}

/// All possible error types for artifact store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Artifact directory cannot be read.
    #[error("failed to read artifact directory at {:?}", artifact_dir.display())]
    ReadDir {
        #[source]
        source: io::Error,
        artifact_dir: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};

    /// Remover that refuses to touch one file name.
    struct Stubborn(&'static str);

    impl ArtifactRemover for Stubborn {
        fn remove(&self, path: &Path) -> io::Result<()> {
            if path.file_name().is_some_and(|name| name == self.0) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
            }

            remove_file(path)
        }
    }

    fn populate(dir: &Path) -> anyhow::Result<()> {
        create_dir_all(dir.join("nested"))?;
        write(dir.join("plugins-cache.tar.gz"), vec![0u8; 2048])?;
        write(dir.join("old.tar.gz"), vec![0u8; 512])?;
        write(dir.join("notes.txt"), "note")?;
        Ok(())
    }

    #[test]
    fn list_skips_directories_and_sorts() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        populate(root.path())?;

        let result = ArchiveStore::open(root.path()).list()?;
        let expect = vec![
            Artifact {
                name: "notes.txt".into(),
                size: 4,
            },
            Artifact {
                name: "old.tar.gz".into(),
                size: 512,
            },
            Artifact {
                name: "plugins-cache.tar.gz".into(),
                size: 2048,
            },
        ];
        assert_eq!(result, expect);
        assert_eq!(total_size(&result), 2564);

        Ok(())
    }

    #[test]
    fn list_missing_directory_fails() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let result = ArchiveStore::open(root.path().join("nope")).list();
        assert!(matches!(result, Err(StoreError::ReadDir { .. })));
        Ok(())
    }

    #[test]
    fn delete_all_removes_files_but_keeps_directories() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        populate(root.path())?;

        let store = ArchiveStore::open(root.path());
        store.delete_all()?;
        assert!(store.list()?.is_empty());
        assert!(root.path().join("nested").is_dir());

        Ok(())
    }

    #[test]
    fn delete_all_survives_undeletable_artifact() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        populate(root.path())?;

        let store = ArchiveStore::with_remover(root.path(), Stubborn("old.tar.gz"));
        store.delete_all()?;

        let remaining = store
            .list()?
            .into_iter()
            .map(|artifact| artifact.name)
            .collect::<Vec<_>>();
        assert_eq!(remaining, vec!["old.tar.gz"]);

        Ok(())
    }

    #[test]
    fn total_size_of_nothing_is_zero() {
        assert_eq!(total_size(&[]), 0);
    }

    #[test]
    fn container_path_joins_artifact_dir() {
        let store = ArchiveStore::open("/backup/cache");
        assert_eq!(
            store.container_path("plugins-cache.tar.gz"),
            PathBuf::from("/backup/cache/plugins-cache.tar.gz")
        );
    }
}
