// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconstruct a directory tree from a container.
//!
//! Entries are processed strictly in stream order. Nothing is buffered or
//! reordered, so a container whose children precede their parents still
//! extracts fine: missing ancestors are synthesized on demand with
//! [`DEFAULT_DIR_MODE`](crate::archive::DEFAULT_DIR_MODE).
//!
//! # Permission Bits
//!
//! Directory entries get their stored mode applied once the whole stream has
//! been extracted, deepest directories first, so a read-only directory still
//! receives its contents. Until then they stay at
//! [`DEFAULT_DIR_MODE`](crate::archive::DEFAULT_DIR_MODE). A directory entry
//! naming the destination root itself, e.g., `./`, leaves the root's mode
//! alone. Regular files keep whatever mode the process creates them with
//! unless [`TreeExtractor::preserve_file_modes`] is enabled.
//!
//! # Path Safety
//!
//! Entry paths containing `..`, a root, or a drive prefix are rejected with
//! [`ArchiveError::UnsafePath`] before anything is written for them.

use crate::archive::{
    apply_mode, create_dir_default, io_at, ArchiveEntry, ArchiveError, EntryKind, Result,
    DEFAULT_DIR_MODE,
};

use flate2::bufread::GzDecoder;
use std::{
    cmp::Reverse,
    fs::File,
    io::{self, BufReader, BufWriter, ErrorKind, Read, Write},
    path::{Component, Path, PathBuf},
};
use tar::{Archive, EntryType};
use tracing::{debug, info, instrument, warn};

const COPY_BUFFER_SIZE: usize = 8 * 1024;

type Container = Archive<GzDecoder<BufReader<File>>>;

/// Tally of what an extraction pass wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Number of regular files written.
    pub files: usize,

    /// Number of directory entries created or updated.
    pub directories: usize,

    /// Number of entries of unsupported kind that were skipped.
    pub skipped: usize,
}

/// Unpack gzip-compressed tar containers into a destination root.
#[derive(Debug, Default, Clone)]
pub struct TreeExtractor {
    preserve_file_modes: bool,
}

impl TreeExtractor {
    /// Construct new extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reapply stored permission bits to extracted regular files.
    pub fn preserve_file_modes(mut self, preserve: bool) -> Self {
        self.preserve_file_modes = preserve;
        self
    }

    /// Extract `container` under `destination_root`.
    ///
    /// Existing files are truncated and overwritten. Files that exist in the
    /// destination but not in the container are left alone.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::NotFound`] if the container does not exist.
    ///   Nothing is written in this case.
    /// - Return [`ArchiveError::CorruptArchive`] if the stream is malformed or
    ///   ends early. Entries completed before that point stay on disk.
    /// - Return [`ArchiveError::UnsafePath`] if an entry escapes the
    ///   destination root.
    /// - Return [`ArchiveError::Io`] if the destination cannot be written.
    /// - Return [`ArchiveError::Permission`] if a stored mode cannot be
    ///   applied.
    #[instrument(skip(self, container, destination_root), level = "debug")]
    pub fn extract(
        &self,
        container: impl AsRef<Path>,
        destination_root: impl AsRef<Path>,
    ) -> Result<ExtractSummary> {
        let container = container.as_ref();
        let destination_root = destination_root.as_ref();
        let mut archive = open_container(container)?;
        let mut summary = ExtractSummary::default();
        let mut deferred = Vec::new();

        info!(
            "unpack {:?} into {:?}",
            container.display(),
            destination_root.display()
        );
        for entry in archive.entries().map_err(corrupt(container))? {
            let mut entry = entry.map_err(corrupt(container))?;
            let relative = entry.path().map_err(corrupt(container))?.into_owned();
            let mode = entry.header().mode().map_err(corrupt(container))?;
            let size = entry.size();

            match entry.header().entry_type() {
                EntryType::Directory => {
                    let target = confine(destination_root, &relative)?;
                    debug!("unpack directory {:?}", relative.display());
                    create_dir_default(&target).map_err(io_at(&target))?;
                    summary.directories += 1;

                    // INVARIANT: Never touch the mode of the destination root itself.
                    if target == destination_root {
                        continue;
                    }

                    // INVARIANT: Keep directory writable until its children are in place.
                    apply_mode(&target, DEFAULT_DIR_MODE).map_err(|err| {
                        ArchiveError::Permission {
                            source: err,
                            path: target.clone(),
                            mode: DEFAULT_DIR_MODE,
                        }
                    })?;
                    deferred.push((target, mode));
                }
                EntryType::Regular | EntryType::Continuous => {
                    let target = confine(destination_root, &relative)?;
                    if target == destination_root {
                        return Err(ArchiveError::UnsafePath { entry: relative });
                    }

                    debug!("unpack file {:?} ({size} bytes)", relative.display());
                    if let Some(parent) = target.parent() {
                        create_dir_default(parent).map_err(io_at(parent))?;
                    }

                    let file = File::create(&target).map_err(io_at(&target))?;
                    let mut writer = BufWriter::new(file);
                    let copied = copy_payload(&mut entry, &mut writer, container, &target)?;
                    if copied != size {
                        return Err(ArchiveError::CorruptArchive {
                            source: io::Error::new(
                                ErrorKind::UnexpectedEof,
                                format!("payload of {relative:?} ended after {copied} of {size} bytes"),
                            ),
                            path: container.to_path_buf(),
                        });
                    }
                    writer.into_inner().map_err(|err| ArchiveError::Io {
                        source: err.into_error(),
                        path: target.clone(),
                    })?;

                    if self.preserve_file_modes {
                        apply_mode(&target, mode).map_err(|err| ArchiveError::Permission {
                            source: err,
                            path: target.clone(),
                            mode,
                        })?;
                    }
                    summary.files += 1;
                }
                other => {
                    warn!(
                        "skip unsupported entry {:?} of type {other:?}",
                        relative.display()
                    );
                    summary.skipped += 1;
                }
            }
        }

        // INVARIANT: Deepest directories first, so a read-only parent never
        //   blocks the mode change of its own subdirectories.
        deferred.sort_by_key(|(target, _)| Reverse(target.components().count()));
        for (target, mode) in deferred {
            apply_mode(&target, mode).map_err(|err| ArchiveError::Permission {
                source: err,
                path: target.clone(),
                mode,
            })?;
        }

        info!(
            "unpacked {} files and {} directories into {:?}",
            summary.files,
            summary.directories,
            destination_root.display()
        );

        Ok(summary)
    }
}

/// List headers of a container without extracting anything.
///
/// Entries other than regular files and directories are left out.
///
/// # Errors
///
/// - Return [`ArchiveError::NotFound`] if the container does not exist.
/// - Return [`ArchiveError::CorruptArchive`] if the stream is malformed.
pub fn read_entries(container: impl AsRef<Path>) -> Result<Vec<ArchiveEntry>> {
    let container = container.as_ref();
    let mut archive = open_container(container)?;
    let mut listing = Vec::new();

    for entry in archive.entries().map_err(corrupt(container))? {
        let entry = entry.map_err(corrupt(container))?;
        let kind = match entry.header().entry_type() {
            EntryType::Directory => EntryKind::Directory,
            EntryType::Regular | EntryType::Continuous => EntryKind::File,
            _ => continue,
        };
        let path = entry.path().map_err(corrupt(container))?;
        let mode = entry.header().mode().map_err(corrupt(container))?;

        listing.push(ArchiveEntry {
            path: path.to_string_lossy().trim_end_matches('/').to_string(),
            kind,
            size: match kind {
                EntryKind::File => entry.size(),
                EntryKind::Directory => 0,
            },
            mode,
        });
    }

    Ok(listing)
}

fn open_container(container: &Path) -> Result<Container> {
    let file = File::open(container).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ArchiveError::NotFound {
            path: container.to_path_buf(),
        },
        _ => ArchiveError::Io {
            source: err,
            path: container.to_path_buf(),
        },
    })?;

    Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
}

fn corrupt(container: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::CorruptArchive {
        source,
        path: container.to_path_buf(),
    }
}

/// Join entry path onto root, refusing anything that could escape it.
fn confine(root: &Path, relative: &Path) -> Result<PathBuf> {
    let mut target = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafePath {
                    entry: relative.to_path_buf(),
                });
            }
        }
    }

    Ok(target)
}

/// Stream payload into destination, keeping read and write failures apart.
fn copy_payload(
    reader: &mut impl Read,
    writer: &mut impl Write,
    container: &Path,
    target: &Path,
) -> Result<u64> {
    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    let mut copied = 0;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(copied),
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(corrupt(container)(err)),
        };
        writer.write_all(&buffer[..read]).map_err(io_at(target))?;
        copied += read as u64;
    }
}
