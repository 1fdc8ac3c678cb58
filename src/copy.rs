// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Selective file replication.
//!
//! Copy a flat set of files from one directory into another, keeping each
//! file's permission bits. Only the top level of the source directory is
//! considered, subdirectories are skipped rather than recursed into. This is
//! how custom skill scripts are carried between the assistant's configuration
//! directory and the backup repository.

use std::{
    fs::{self, File},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Copy one regular file, then give it the source's permission bits.
///
/// Content is copied first and the mode second. If the mode step fails, the
/// destination is left with the copied content and default permissions.
/// Returns the number of bytes copied.
///
/// # Errors
///
/// - Return [`CopyError::NotFound`] if `source` does not exist.
/// - Return [`CopyError::Io`] if either side cannot be opened, or the copy
///   fails midway.
/// - Return [`CopyError::Permission`] if the source's mode cannot be read or
///   applied to `destination`.
pub fn copy_file(source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Result<u64> {
    let source = source.as_ref();
    let destination = destination.as_ref();

    let bytes = {
        let mut reader = File::open(source).map_err(|err| match err.kind() {
            ErrorKind::NotFound => CopyError::NotFound {
                path: source.to_path_buf(),
            },
            _ => CopyError::Io {
                source: err,
                path: source.to_path_buf(),
            },
        })?;
        let mut writer = File::create(destination).map_err(|err| CopyError::Io {
            source: err,
            path: destination.to_path_buf(),
        })?;

        io::copy(&mut reader, &mut writer).map_err(|err| CopyError::Io {
            source: err,
            path: destination.to_path_buf(),
        })?
    };

    let permissions = fs::metadata(source)
        .map_err(|err| CopyError::Permission {
            source: err,
            path: source.to_path_buf(),
        })?
        .permissions();
    fs::set_permissions(destination, permissions).map_err(|err| CopyError::Permission {
        source: err,
        path: destination.to_path_buf(),
    })?;

    Ok(bytes)
}

/// Result of a replication pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replication {
    /// Replication was turned off, nothing was touched.
    Skipped,

    /// Number of files copied.
    Copied { files: usize },
}

/// Replicate the top level files of a directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatReplicator {
    skip: bool,
}

impl FlatReplicator {
    /// Construct new replicator.
    ///
    /// Setting `skip` turns every replication into a no-op.
    pub fn new(skip: bool) -> Self {
        Self { skip }
    }

    /// Copy every non-directory entry of `source_dir` into `destination_dir`.
    ///
    /// Creates `destination_dir` if it is missing. Files are copied in file
    /// name order, and the first failure stops the pass.
    ///
    /// # Errors
    ///
    /// - Return [`CopyError::NotFound`] if `source_dir` does not exist.
    /// - Return [`CopyError::Io`] if a directory cannot be read or created,
    ///   or any file copy fails.
    /// - Return [`CopyError::Permission`] if any file's mode cannot be
    ///   copied.
    #[instrument(skip(self, source_dir, destination_dir), level = "debug")]
    pub fn replicate(
        &self,
        source_dir: impl AsRef<Path>,
        destination_dir: impl AsRef<Path>,
    ) -> Result<Replication> {
        if self.skip {
            debug!("replication turned off");
            return Ok(Replication::Skipped);
        }

        let source_dir = source_dir.as_ref();
        let destination_dir = destination_dir.as_ref();

        let listing = fs::read_dir(source_dir).map_err(|err| match err.kind() {
            ErrorKind::NotFound => CopyError::NotFound {
                path: source_dir.to_path_buf(),
            },
            _ => CopyError::Io {
                source: err,
                path: source_dir.to_path_buf(),
            },
        })?;
        let mut entries = listing
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CopyError::Io {
                source: err,
                path: source_dir.to_path_buf(),
            })?;
        entries.sort_by_key(|entry| entry.file_name());

        mkdirp::mkdirp(destination_dir).map_err(|err| CopyError::Io {
            source: err,
            path: destination_dir.to_path_buf(),
        })?;

        let mut files = 0;
        for entry in entries {
            let file_type = entry.file_type().map_err(|err| CopyError::Io {
                source: err,
                path: entry.path(),
            })?;
            if file_type.is_dir() {
                debug!("skip subdirectory {:?}", entry.path().display());
                continue;
            }

            let bytes = copy_file(entry.path(), destination_dir.join(entry.file_name()))?;
            debug!("copied {:?} ({bytes} bytes)", entry.path().display());
            files += 1;
        }

        info!(
            "replicated {files} files from {:?} to {:?}",
            source_dir.display(),
            destination_dir.display()
        );

        Ok(Replication::Copied { files })
    }
}

/// All possible error types for file replication.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Source file or directory does not exist.
    #[error("nothing found at {:?}", path.display())]
    NotFound { path: PathBuf },

    /// File or directory could not be read, created, or written.
    #[error("failed to copy through {:?}", path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Permission bits could not be carried over.
    #[error("failed to carry permission bits through {:?}", path.display())]
    Permission {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

impl CopyError {
    /// Check if error is the soft "nothing to work on" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Friendly result alias :3
pub type Result<T, E = CopyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, read_to_string, write};

    #[test]
    fn copy_file_copies_content() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(root.path().join("src.txt"), "hello world")?;

        let bytes = copy_file(root.path().join("src.txt"), root.path().join("dst.txt"))?;
        assert_eq!(bytes, 11);
        assert_eq!(read_to_string(root.path().join("dst.txt"))?, "hello world");

        Ok(())
    }

    #[test]
    fn copy_file_missing_source_is_not_found() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let result = copy_file(root.path().join("nope"), root.path().join("dst"));
        assert!(matches!(result, Err(CopyError::NotFound { .. })));
        assert!(!root.path().join("dst").exists());

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn copy_file_carries_mode_bits() -> anyhow::Result<()> {
        use std::{fs::set_permissions, fs::Permissions, os::unix::fs::PermissionsExt};

        let root = tempfile::tempdir()?;
        write(root.path().join("run.sh"), "#!/bin/sh\necho hi\n")?;
        set_permissions(root.path().join("run.sh"), Permissions::from_mode(0o751))?;

        copy_file(root.path().join("run.sh"), root.path().join("copy.sh"))?;
        let mode = fs::metadata(root.path().join("copy.sh"))?.permissions().mode() & 0o7777;
        assert_eq!(mode, 0o751);

        Ok(())
    }

    #[test]
    fn replicate_copies_top_level_files_only() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let source = root.path().join("skills");
        create_dir_all(source.join("drafts"))?;
        write(source.join("a.md"), "a")?;
        write(source.join("b.md"), "bb")?;
        write(source.join("c.sh"), "ccc")?;
        write(source.join("drafts").join("d.md"), "dddd")?;

        let destination = root.path().join("backup").join("skills");
        let result = FlatReplicator::new(false).replicate(&source, &destination)?;
        assert_eq!(result, Replication::Copied { files: 3 });

        let mut names = fs::read_dir(&destination)?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
            .collect::<Result<Vec<_>, _>>()?;
        names.sort();
        assert_eq!(names, vec!["a.md", "b.md", "c.sh"]);
        assert_eq!(read_to_string(destination.join("c.sh"))?, "ccc");
        assert!(!destination.join("drafts").exists());

        Ok(())
    }

    #[test]
    fn replicate_skip_touches_nothing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let destination = root.path().join("backup");

        let result = FlatReplicator::new(true).replicate(root.path().join("nope"), &destination)?;
        assert_eq!(result, Replication::Skipped);
        assert!(!destination.exists());

        Ok(())
    }

    #[test]
    fn replicate_missing_source_is_not_found() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let destination = root.path().join("backup");

        let result = FlatReplicator::new(false).replicate(root.path().join("nope"), &destination);
        assert!(result.is_err_and(|err| err.is_not_found()));
        assert!(!destination.exists());

        Ok(())
    }
}
