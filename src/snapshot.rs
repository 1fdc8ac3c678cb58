// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup, restore, and clean operations.
//!
//! A [`Snapshot`] ties the assistant's configuration directory to a backup
//! repository through a fixed layout:
//!
//! | What         | Live location              | Backup location                     |
//! |--------------|----------------------------|-------------------------------------|
//! | Plugin cache | `<claude>/plugins/cache`   | `<repo>/cache/plugins-cache.tar.gz` |
//! | Skills       | `<claude>/skills`          | `<repo>/skills`                     |
//!
//! # Soft Failures
//!
//! A multi-step backup should not abort just because the user never installed
//! a plugin or wrote a skill. Thus, a missing source is reported as
//! [`Step::Missing`] instead of an error, so the caller can warn and move on.
//! Every other failure is a hard error.
//!
//! Nothing in here prints anything. Each operation hands back a structured
//! report for the caller to render however it likes.

use crate::{
    archive::{ArchiveError, ArchiveSummary, ExtractSummary, TreeArchiver, TreeExtractor},
    copy::{CopyError, FlatReplicator, Replication},
    store::{total_size, ArchiveStore, Artifact, StoreError},
};

use std::{
    fs::{metadata, read_dir},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

/// Root label of entries in the plugin cache container.
pub const CACHE_LABEL: &str = "cache";

/// File name of the plugin cache container.
pub const PLUGIN_CACHE_CONTAINER: &str = "plugins-cache.tar.gz";

const ARTIFACT_DIR: &str = "cache";
const PLUGINS_DIR: &str = "plugins";
const SKILLS_DIR: &str = "skills";

/// Outcome of one backup or restore step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// Step ran to completion.
    Done(T),

    /// Step was turned off by the caller.
    Skipped,

    /// Nothing to work on at the given path.
    Missing(PathBuf),
}

/// Top-level plugin found in the plugin cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPlugin {
    /// Directory name of plugin.
    pub name: String,

    /// Total size of plugin's files in bytes.
    pub size: u64,
}

/// Report of a plugin cache backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBackup {
    /// Where the container was written.
    pub container: PathBuf,

    /// Compressed size of container.
    pub size: u64,

    /// What went into the container.
    pub summary: ArchiveSummary,

    /// Plugins found in the cache.
    pub plugins: Vec<DetectedPlugin>,
}

/// Report of a plugin cache restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRestore {
    /// Container that was read.
    pub container: PathBuf,

    /// Compressed size of container.
    pub size: u64,

    /// What came out of the container.
    pub summary: ExtractSummary,
}

/// Report of an artifact cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanReport {
    /// Artifacts found before deletion.
    pub artifacts: Vec<Artifact>,

    /// Combined size of found artifacts.
    pub freed: u64,
}

/// Layout binding between live configuration and backup repository.
#[derive(Debug, Clone)]
pub struct Snapshot {
    claude_dir: PathBuf,
    repo_path: PathBuf,
    compression: Option<u32>,
}

impl Snapshot {
    /// Construct new snapshot layout.
    pub fn new(claude_dir: impl Into<PathBuf>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            claude_dir: claude_dir.into(),
            repo_path: repo_path.into(),
            compression: None,
        }
    }

    /// Use specific gzip level for new containers.
    pub fn with_compression(mut self, level: Option<u32>) -> Self {
        self.compression = level;
        self
    }

    /// Assistant configuration directory.
    pub fn claude_dir(&self) -> &Path {
        self.claude_dir.as_path()
    }

    /// Backup repository.
    pub fn repo_path(&self) -> &Path {
        self.repo_path.as_path()
    }

    /// Live plugin cache directory.
    pub fn plugin_cache_dir(&self) -> PathBuf {
        self.claude_dir.join(PLUGINS_DIR).join("cache")
    }

    /// Artifact store of backup repository.
    pub fn store(&self) -> ArchiveStore {
        ArchiveStore::open(self.repo_path.join(ARTIFACT_DIR))
    }

    /// Path to plugin cache container.
    pub fn container_path(&self) -> PathBuf {
        self.store().container_path(PLUGIN_CACHE_CONTAINER)
    }

    /// List top-level plugin directories of live plugin cache with their
    /// recursive size, sorted by name.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::Inspect`] if the plugin cache cannot be read.
    pub fn detect_plugins(&self) -> Result<Vec<DetectedPlugin>> {
        let cache_dir = self.plugin_cache_dir();
        let mut plugins = Vec::new();

        for entry in read_dir(&cache_dir).map_err(inspect(&cache_dir))? {
            let entry = entry.map_err(inspect(&cache_dir))?;
            if !entry.file_type().map_err(inspect(&cache_dir))?.is_dir() {
                continue;
            }

            let size = WalkDir::new(entry.path())
                .into_iter()
                .filter_map(|node| node.ok())
                .filter_map(|node| node.metadata().ok())
                .filter(|meta| meta.is_file())
                .map(|meta| meta.len())
                .sum();
            plugins.push(DetectedPlugin {
                name: entry.file_name().to_string_lossy().into_owned(),
                size,
            });
        }
        plugins.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(plugins)
    }

    /// Pack live plugin cache into the repository's plugin cache container.
    ///
    /// Replaces any previous container.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::Archive`] if packing fails.
    /// - Return [`SnapshotError::Inspect`] if the plugin cache or the new
    ///   container cannot be inspected for the report.
    #[instrument(skip(self), level = "debug")]
    pub fn backup_cache(&self) -> Result<Step<CacheBackup>> {
        let source = self.plugin_cache_dir();
        let container = self.container_path();

        let mut archiver = TreeArchiver::new(CACHE_LABEL);
        if let Some(level) = self.compression {
            archiver = archiver.with_compression(level);
        }

        let summary = match archiver.archive(&source, &container) {
            Ok(summary) => summary,
            Err(err) if err.is_not_found() => {
                warn!("plugin cache not found at {:?}", source.display());
                return Ok(Step::Missing(source));
            }
            Err(err) => return Err(err.into()),
        };
        let size = metadata(&container).map_err(inspect(&container))?.len();
        let plugins = self.detect_plugins()?;

        Ok(Step::Done(CacheBackup {
            container,
            size,
            summary,
            plugins,
        }))
    }

    /// Unpack plugin cache container into live plugins directory.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::Archive`] if unpacking fails.
    /// - Return [`SnapshotError::Inspect`] if the container exists but
    ///   cannot be inspected.
    #[instrument(skip(self, extractor), level = "debug")]
    pub fn restore_cache(&self, extractor: &TreeExtractor) -> Result<Step<CacheRestore>> {
        let container = self.container_path();
        let size = match metadata(&container) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("plugin cache container not found at {:?}", container.display());
                return Ok(Step::Missing(container));
            }
            Err(err) => return Err(inspect(&container)(err)),
        };

        let summary = match extractor.extract(&container, self.claude_dir.join(PLUGINS_DIR)) {
            Ok(summary) => summary,
            Err(err) if err.is_not_found() => return Ok(Step::Missing(container)),
            Err(err) => return Err(err.into()),
        };

        Ok(Step::Done(CacheRestore {
            container,
            size,
            summary,
        }))
    }

    /// Remove every artifact from the repository's artifact directory.
    ///
    /// The report's freed size is the combined size of the artifacts found
    /// before deletion, even if some of them could not be removed.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::Store`] if the artifact directory cannot be
    ///   read.
    #[instrument(skip(self), level = "debug")]
    pub fn clean_cache(&self) -> Result<CleanReport> {
        let store = self.store();
        let artifacts = store.list()?;
        let freed = total_size(&artifacts);
        store.delete_all()?;
        info!("freed {freed} bytes from {:?}", store.artifact_dir().display());

        Ok(CleanReport { artifacts, freed })
    }

    /// Copy custom skills from live configuration into the repository.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::Copy`] if any skill fails to copy.
    pub fn backup_skills(&self, skip: bool) -> Result<Step<usize>> {
        replicate(
            skip,
            self.claude_dir.join(SKILLS_DIR),
            self.repo_path.join(SKILLS_DIR),
        )
    }

    /// Copy custom skills from the repository back into live configuration.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::Copy`] if any skill fails to copy.
    pub fn restore_skills(&self, skip: bool) -> Result<Step<usize>> {
        replicate(
            skip,
            self.repo_path.join(SKILLS_DIR),
            self.claude_dir.join(SKILLS_DIR),
        )
    }
}

fn replicate(skip: bool, source: PathBuf, destination: PathBuf) -> Result<Step<usize>> {
    match FlatReplicator::new(skip).replicate(&source, &destination) {
        Ok(Replication::Skipped) => Ok(Step::Skipped),
        Ok(Replication::Copied { files }) => Ok(Step::Done(files)),
        Err(err) if err.is_not_found() => {
            warn!("skills directory not found at {:?}", source.display());
            Ok(Step::Missing(source))
        }
        Err(err) => Err(err.into()),
    }
}

fn inspect(path: &Path) -> impl FnOnce(io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Inspect {
        source,
        path: path.to_path_buf(),
    }
}

/// All possible error types for snapshot operations.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Packing or unpacking failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Skill replication failed.
    #[error(transparent)]
    Copy(#[from] CopyError),

    /// Artifact directory could not be managed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Path could not be inspected for reporting.
    #[error("failed to inspect {:?}", path.display())]
    Inspect {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};

    #[test]
    fn backup_cache_missing_source_is_soft() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let snapshot = Snapshot::new(root.path().join("claude"), root.path().join("repo"));

        let result = snapshot.backup_cache()?;
        assert_eq!(result, Step::Missing(snapshot.plugin_cache_dir()));
        assert!(!snapshot.container_path().exists());

        Ok(())
    }

    #[test]
    fn restore_cache_missing_container_is_soft() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let snapshot = Snapshot::new(root.path().join("claude"), root.path().join("repo"));

        let result = snapshot.restore_cache(&TreeExtractor::new())?;
        assert_eq!(result, Step::Missing(snapshot.container_path()));
        assert!(!root.path().join("claude").exists());

        Ok(())
    }

    #[test]
    fn detect_plugins_sums_nested_files() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let snapshot = Snapshot::new(root.path().join("claude"), root.path().join("repo"));
        let cache = snapshot.plugin_cache_dir();
        create_dir_all(cache.join("zeta").join("lib"))?;
        create_dir_all(cache.join("alpha"))?;
        write(cache.join("zeta").join("plugin.json"), "{}")?;
        write(cache.join("zeta").join("lib").join("main.js"), "main();")?;
        write(cache.join("stray.txt"), "not a plugin")?;

        let expect = vec![
            DetectedPlugin {
                name: "alpha".into(),
                size: 0,
            },
            DetectedPlugin {
                name: "zeta".into(),
                size: 9,
            },
        ];
        assert_eq!(snapshot.detect_plugins()?, expect);

        Ok(())
    }

    #[test]
    fn skills_steps_follow_skip_and_missing_policy() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let snapshot = Snapshot::new(root.path().join("claude"), root.path().join("repo"));

        assert_eq!(snapshot.backup_skills(true)?, Step::Skipped);
        assert_eq!(
            snapshot.backup_skills(false)?,
            Step::Missing(root.path().join("claude").join("skills"))
        );

        create_dir_all(root.path().join("claude").join("skills"))?;
        write(root.path().join("claude").join("skills").join("a.md"), "a")?;
        assert_eq!(snapshot.backup_skills(false)?, Step::Done(1));
        assert_eq!(snapshot.restore_skills(false)?, Step::Done(1));

        Ok(())
    }

    #[test]
    fn clean_cache_without_artifact_dir_is_hard_error() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let snapshot = Snapshot::new(root.path().join("claude"), root.path().join("repo"));

        let result = snapshot.clean_cache();
        assert!(matches!(result, Err(SnapshotError::Store(_))));

        Ok(())
    }
}
