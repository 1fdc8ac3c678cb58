// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the assistant keeps its configuration, where backups are
//! written by default, and where the settings file for ccconfig lives. None
//! of these functions check whether the returned path actually exists.

use std::{env, path::PathBuf};

/// Environment variable that overrides the assistant's configuration
/// directory.
pub const CLAUDE_DIR_ENV: &str = "CLAUDE_CONFIG_DIR";

/// Determine absolute path to user's home directory.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine absolute path to the assistant's configuration directory.
///
/// Uses [`CLAUDE_DIR_ENV`] if it is set to a non-empty value, otherwise falls
/// back to `~/.claude`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn claude_dir() -> Result<PathBuf> {
    match env::var_os(CLAUDE_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => home_dir().map(|home| home.join(".claude")),
    }
}

/// Determine default absolute path to the backup repository.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/ccconfig-backup`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_repo_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("ccconfig-backup"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to ccconfig's settings file.
///
/// Uses `$XDG_CONFIG_HOME/ccconfig/config.toml`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("ccconfig").join("config.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
