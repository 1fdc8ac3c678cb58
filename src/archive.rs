// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory snapshot containers.
//!
//! A __container__ is a single gzip-compressed tar stream that holds an entire
//! directory tree. Each filesystem node of the tree becomes one
//! __archive entry__: a header describing the node's path, kind, size, and
//! permission bits, followed by the file's bytes when the node is a regular
//! file.
//!
//! # Root Label
//!
//! All entry paths inside a container are rooted under a fixed
//! __root label__ rather than the real name of the directory that was
//! archived. Thus, archiving `~/.claude/plugins/cache` with the label `cache`
//! yields entries like `cache`, `cache/foo`, `cache/foo/plugin.json`.
//! Extracting that container into `~/.claude/plugins` recreates the original
//! tree.
//!
//! # Compatibility
//!
//! Containers use plain GNU tar headers wrapped in a single gzip member. Thus,
//! any standard `tar -xzf` can read what [`TreeArchiver`] writes, and
//! [`TreeExtractor`] can read what `tar -czf` writes.
//!
//! # See Also
//!
//! 1. [`pack`]
//! 2. [`unpack`]

pub mod pack;
pub mod unpack;

pub use pack::{ArchiveSummary, TreeArchiver};
pub use unpack::{read_entries, ExtractSummary, TreeExtractor};

use std::{
    fs::{DirBuilder, Metadata},
    io,
    path::{Path, PathBuf},
};

/// Permission given to directories the extractor has to synthesize.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Kind of filesystem node an archive entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Header record of a single node inside a container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveEntry {
    /// Forward-slash separated path rooted under the root label.
    pub path: String,

    /// Kind of node.
    pub kind: EntryKind,

    /// Payload length in bytes. Always zero for directories.
    pub size: u64,

    /// Permission bits of the node.
    pub mode: u32,
}

/// Permission bits of a filesystem node.
#[cfg(unix)]
pub(crate) fn mode_of(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

/// Permission bits of a filesystem node.
///
/// Windows has no mode bits, so approximate them from the read-only flag.
#[cfg(not(unix))]
pub(crate) fn mode_of(metadata: &Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => DEFAULT_DIR_MODE,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[cfg(unix)]
pub(crate) fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::{fs::Permissions, os::unix::fs::PermissionsExt};
    std::fs::set_permissions(path, Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn apply_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Create directory and any missing ancestors with [`DEFAULT_DIR_MODE`].
pub(crate) fn create_dir_default(path: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DEFAULT_DIR_MODE);
    }

    builder.create(path)
}

pub(crate) fn io_at(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        source,
        path: path.to_path_buf(),
    }
}

/// All possible error types for container packing and unpacking.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Source directory or container does not exist.
    #[error("nothing found at {:?}", path.display())]
    NotFound { path: PathBuf },

    /// Filesystem read or write failed.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Permission bits could not be applied.
    #[error("failed to apply mode {mode:o} to {:?}", path.display())]
    Permission {
        #[source]
        source: io::Error,
        path: PathBuf,
        mode: u32,
    },

    /// Container is malformed or truncated.
    #[error("corrupt container at {:?}", path.display())]
    CorruptArchive {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Entry path would land outside of destination root.
    #[error("refusing to extract unsafe entry path {entry:?}")]
    UnsafePath { entry: PathBuf },
}

impl ArchiveError {
    /// Check if error is the soft "nothing to work on" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Friendly result alias :3
pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;
