//! Run settings.
//!
//! Settings can come from an optional TOML file; command-line flags override
//! the paths it names. Every key has a default, so an empty file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings for one reconciliation or reclassification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Reference log produced by the conversion tool
    pub log: Option<PathBuf>,

    /// Ruleset file holding the repository blocks
    pub rules: Option<PathBuf>,

    /// Repository block whose `branches` and `tags` are reconciled
    pub repository: String,

    /// Destination that always stays a branch, whatever the log says
    pub exempt_dest: String,

    /// Nested-repository prefix; a found `<key><prefix>` accounts for `<key>`
    pub nested_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log: None,
            rules: None,
            repository: "common_branches".to_string(),
            exempt_dest: "master".to_string(),
            nested_prefix: "boost/".to_string(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::ReadSettings {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::from_toml(&content)?)
    }
}

/// Errors from loading settings.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read settings file '{path}'")]
    ReadSettings {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file")]
    ParseSettings(#[from] toml::de::Error),
}
