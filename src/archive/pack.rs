// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Serialize a directory tree into a container.
//!
//! The tree is walked depth first with siblings sorted by file name, so two
//! runs over an unchanged tree produce the same sequence of entries. Each
//! regular file is streamed straight from disk into the tar builder, thus no
//! file is ever held in memory as a whole.

use crate::archive::{io_at, mode_of, ArchiveError, Result};

use flate2::{write::GzEncoder, Compression};
use std::{
    fs::{self, File, Metadata},
    io::{self, BufWriter, ErrorKind, Read},
    path::{Component, Path},
    time::UNIX_EPOCH,
};
use tar::{Builder, EntryType, Header};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Tally of what a packing pass wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of non-directory entries written.
    pub files: usize,

    /// Number of directory entries written, including the root.
    pub directories: usize,

    /// Total payload bytes written before compression.
    pub bytes: u64,
}

/// Pack directory trees into gzip-compressed tar containers.
#[derive(Debug, Clone)]
pub struct TreeArchiver {
    label: String,
    compression: Compression,
}

impl TreeArchiver {
    /// Construct new archiver that roots every entry under `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            compression: Compression::default(),
        }
    }

    /// Use gzip compression level from 0 (store) to 9 (best).
    ///
    /// Levels above 9 are clamped.
    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    /// Root label of produced entries.
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Pack `source_root` into a fresh container at `container`.
    ///
    /// The source root itself becomes the entry named after the root label.
    /// Parent directories of the container are created when missing. Symbolic
    /// links and special files are skipped.
    ///
    /// On failure the container is left behind half written. It must not be
    /// treated as a usable backup.
    ///
    /// # Errors
    ///
    /// - Return [`ArchiveError::NotFound`] if `source_root` does not exist.
    ///   No container is created in this case.
    /// - Return [`ArchiveError::Io`] if any source node cannot be read, or
    ///   the container cannot be written.
    #[instrument(skip(self, source_root, container), level = "debug")]
    pub fn archive(
        &self,
        source_root: impl AsRef<Path>,
        container: impl AsRef<Path>,
    ) -> Result<ArchiveSummary> {
        let source_root = source_root.as_ref();
        let container = container.as_ref();

        if let Err(err) = fs::metadata(source_root) {
            return Err(match err.kind() {
                ErrorKind::NotFound => ArchiveError::NotFound {
                    path: source_root.to_path_buf(),
                },
                _ => ArchiveError::Io {
                    source: err,
                    path: source_root.to_path_buf(),
                },
            });
        }

        if let Some(parent) = container.parent().filter(|p| !p.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(io_at(parent))?;
        }

        info!(
            "pack {:?} into {:?}",
            source_root.display(),
            container.display()
        );
        let file = File::create(container).map_err(io_at(container))?;
        let mut builder = Builder::new(GzEncoder::new(BufWriter::new(file), self.compression));
        let mut summary = ArchiveSummary::default();

        for node in WalkDir::new(source_root)
            .follow_links(false)
            .sort_by_file_name()
        {
            let node = node.map_err(|err| {
                let path = err.path().unwrap_or(source_root).to_path_buf();
                ArchiveError::Io {
                    source: err.into(),
                    path,
                }
            })?;
            let metadata = node.metadata().map_err(|err| ArchiveError::Io {
                source: err.into(),
                path: node.path().to_path_buf(),
            })?;
            let relative = node.path().strip_prefix(source_root).unwrap_or(Path::new(""));
            let name = self.entry_name(relative);

            let mut header = Header::new_gnu();
            header.set_mode(mode_of(&metadata));
            header.set_mtime(mtime_of(&metadata));

            if metadata.is_dir() {
                debug!("pack directory {name}");
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                builder
                    .append_data(&mut header, &name, io::empty())
                    .map_err(io_at(container))?;
                summary.directories += 1;
            } else if metadata.is_file() {
                debug!("pack file {name} ({} bytes)", metadata.len());
                header.set_entry_type(EntryType::Regular);
                header.set_size(metadata.len());
                let file = File::open(node.path()).map_err(io_at(node.path()))?;
                builder
                    .append_data(&mut header, &name, ExactLen::new(file, metadata.len()))
                    .map_err(io_at(node.path()))?;
                summary.files += 1;
                summary.bytes += metadata.len();
            } else {
                warn!("skip special file {:?}", node.path().display());
            }
        }

        // INVARIANT: Finish every layer explicitly so trailer write errors surface.
        //   - Tar end-of-archive blocks.
        //   - Gzip trailer.
        //   - Buffered bytes.
        let encoder = builder.into_inner().map_err(io_at(container))?;
        let writer = encoder.finish().map_err(io_at(container))?;
        writer.into_inner().map_err(|err| ArchiveError::Io {
            source: err.into_error(),
            path: container.to_path_buf(),
        })?;

        info!(
            "packed {} files and {} directories into {:?}",
            summary.files,
            summary.directories,
            container.display()
        );

        Ok(summary)
    }

    fn entry_name(&self, relative: &Path) -> String {
        let mut name = self.label.trim_end_matches('/').to_string();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                name.push('/');
                name.push_str(part.to_string_lossy().as_ref());
            }
        }

        name
    }
}

fn mtime_of(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |since| since.as_secs())
}

/// Reader that yields exactly `remaining` bytes or fails.
///
/// Guards the header/payload pairing of a tar entry against files that change
/// length between the metadata read and the payload copy.
struct ExactLen<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> ExactLen<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
        }
    }
}

impl<R: Read> Read for ExactLen<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.remaining == 0 {
            return Ok(0);
        }

        let limit = buf
            .len()
            .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let read = self.inner.read(&mut buf[..limit])?;
        if read == 0 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("file shrank by {} bytes while packing", self.remaining),
            ));
        }

        self.remaining -= read as u64;
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{read_entries, ArchiveEntry, EntryKind};
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};

    fn entry(path: &str, kind: EntryKind, size: u64) -> (String, EntryKind, u64) {
        (path.into(), kind, size)
    }

    fn shape(entries: Vec<ArchiveEntry>) -> Vec<(String, EntryKind, u64)> {
        entries
            .into_iter()
            .map(|entry| (entry.path, entry.kind, entry.size))
            .collect()
    }

    #[test]
    fn archive_roots_entries_under_label() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let source = root.path().join("plugins-cache");
        create_dir_all(source.join("nested"))?;
        create_dir_all(source.join("empty"))?;
        write(source.join("a.txt"), "alpha")?;
        write(source.join("nested").join("b.txt"), "bravo!")?;

        let container = root.path().join("out").join("cache.tar.gz");
        let summary = TreeArchiver::new("cache").archive(&source, &container)?;
        assert_eq!(
            summary,
            ArchiveSummary {
                files: 2,
                directories: 3,
                bytes: 11,
            }
        );

        let expect = vec![
            entry("cache", EntryKind::Directory, 0),
            entry("cache/a.txt", EntryKind::File, 5),
            entry("cache/empty", EntryKind::Directory, 0),
            entry("cache/nested", EntryKind::Directory, 0),
            entry("cache/nested/b.txt", EntryKind::File, 6),
        ];
        assert_eq!(shape(read_entries(&container)?), expect);

        Ok(())
    }

    #[test]
    fn archive_missing_source_writes_nothing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let container = root.path().join("out").join("cache.tar.gz");

        let result = TreeArchiver::new("cache").archive(root.path().join("nope"), &container);
        assert!(matches!(result, Err(ArchiveError::NotFound { .. })));
        assert!(!container.exists());
        assert!(!root.path().join("out").exists());

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn archive_records_permission_bits() -> anyhow::Result<()> {
        use std::{fs::set_permissions, fs::Permissions, os::unix::fs::PermissionsExt};

        let root = tempfile::tempdir()?;
        let source = root.path().join("skills");
        create_dir_all(&source)?;
        write(source.join("run.sh"), "#!/bin/sh\n")?;
        set_permissions(source.join("run.sh"), Permissions::from_mode(0o750))?;
        write(source.join("notes.md"), "notes")?;
        set_permissions(source.join("notes.md"), Permissions::from_mode(0o600))?;

        let container = root.path().join("skills.tar.gz");
        TreeArchiver::new("skills").archive(&source, &container)?;

        let modes = read_entries(&container)?
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::File)
            .map(|entry| (entry.path, entry.mode))
            .collect::<Vec<_>>();
        assert_eq!(
            modes,
            vec![
                ("skills/notes.md".to_string(), 0o600),
                ("skills/run.sh".to_string(), 0o750),
            ]
        );

        Ok(())
    }

    #[test]
    fn entry_name_ignores_trailing_label_slash() {
        let archiver = TreeArchiver::new("cache/");
        assert_eq!(archiver.entry_name(Path::new("")), "cache");
        assert_eq!(archiver.entry_name(Path::new("a/b")), "cache/a/b");
    }

    #[test]
    fn exact_len_rejects_short_source() {
        let mut reader = ExactLen::new("abc".as_bytes(), 5);
        let mut sink = Vec::new();
        let result = io::copy(&mut reader, &mut sink);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn exact_len_stops_at_declared_length() -> anyhow::Result<()> {
        let mut reader = ExactLen::new("abcdef".as_bytes(), 4);
        let mut sink = Vec::new();
        io::copy(&mut reader, &mut sink)?;
        assert_eq!(sink, b"abcd");
        Ok(())
    }
}
