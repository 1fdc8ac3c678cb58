// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of ccconfig's settings file to simplify serialization
//! and deserialization. Every field is optional, so an empty file, or no file
//! at all, is a valid configuration that defers to built-in defaults.
//!
//! # General Layout
//!
//! ```toml
//! [settings]
//! claude_dir = "$HOME/.claude"
//! repo_path = "~/ccconfig-backup"
//! skip_skills = false
//! compression_level = 6
//! ```

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Settings file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Backup settings.
    #[serde(default)]
    pub settings: BackupSettings,
}

impl Config {
    /// Load configuration from target file.
    ///
    /// A missing file is not an error, the default configuration is returned
    /// instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file content is malformed.
    /// - Return [`ConfigError::ShellExpansion`] if path fields cannot be
    ///   expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match read_to_string(path.as_ref()) {
            Ok(data) => data.parse(),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            }),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on path fields.
        config.settings.claude_dir = config
            .settings
            .claude_dir
            .map(|path| expand_path(&path))
            .transpose()?;
        config.settings.repo_path = config
            .settings
            .repo_path
            .map(|path| expand_path(&path))
            .transpose()?;

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Backup configuration settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Assistant configuration directory to back up from and restore to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claude_dir: Option<PathBuf>,

    /// Backup repository that holds skills and cache artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<PathBuf>,

    /// Do not replicate custom skills.
    pub skip_skills: bool,

    /// Gzip compression level from 0 to 9 for cache containers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<u32>,
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read settings file.
    #[error("failed to read settings file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_config() -> anyhow::Result<()> {
        let result: Config = r#"
            [settings]
            claude_dir = "$BLAH/.claude"
            repo_path = "${BLAH}/backup"
            skip_skills = true
            compression_level = 9
        "#
        .parse()?;

        let expect = Config {
            settings: BackupSettings {
                claude_dir: Some("/home/blah/.claude".into()),
                repo_path: Some("/home/blah/backup".into()),
                skip_skills: true,
                compression_level: Some(9),
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_empty_config_uses_defaults() -> anyhow::Result<()> {
        let result: Config = "".parse()?;
        assert_eq!(result, Config::default());

        let result: Config = "[settings]\nskip_skills = true\n".parse()?;
        assert_eq!(result.settings.claude_dir, None);
        assert!(result.settings.skip_skills);

        Ok(())
    }

    #[sealed_test]
    fn deserialize_unknown_variable_fails() {
        let result = r#"
            [settings]
            repo_path = "$CCCONFIG_SURELY_UNSET_VARIABLE/backup"
        "#
        .parse::<Config>();

        assert!(matches!(result, Err(ConfigError::ShellExpansion(_))));
    }

    #[test]
    fn serialize_config() {
        let result = Config {
            settings: BackupSettings {
                claude_dir: Some("/home/blah/.claude".into()),
                repo_path: Some("/home/blah/backup".into()),
                skip_skills: false,
                compression_level: None,
            },
        }
        .to_string();

        let expect = indoc! {r#"
            [settings]
            claude_dir = "/home/blah/.claude"
            repo_path = "/home/blah/backup"
            skip_skills = false
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn load_missing_file_returns_default() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = Config::load(dir.path().join("config.toml"))?;
        assert_eq!(result, Config::default());
        Ok(())
    }
}
