// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Assistant configuration backups.
//!
//! ccconfig snapshots the parts of an assistant's configuration directory
//! that are tedious to rebuild by hand, i.e., custom skill scripts and the
//! plugin cache, into a portable backup repository. Snapshots can later be
//! restored, or cleaned out of the repository.
//!
//! The plugin cache is serialized into a single gzip-compressed tar
//! container through [`TreeArchiver`], and reconstructed through
//! [`TreeExtractor`]. Skills are a flat set of files copied one by one through
//! [`FlatReplicator`]. Both are wired to a fixed on-disk layout by
//! [`Snapshot`].

pub mod archive;
pub mod config;
pub mod copy;
pub mod path;
pub mod size;
pub mod snapshot;
pub mod store;

pub use archive::{ArchiveEntry, ArchiveError, EntryKind, TreeArchiver, TreeExtractor};
pub use config::{BackupSettings, Config};
pub use copy::{copy_file, FlatReplicator, Replication};
pub use size::format_size;
pub use snapshot::{Snapshot, Step};
pub use store::{total_size, ArchiveStore, Artifact};
