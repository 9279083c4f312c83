//! Storage configuration loaded from TOML.
//!
//! ```toml
//! backend = "git"
//!
//! [git]
//! path = "/var/lib/filestore"
//! remote_url = "git@github.com:org/store.git"
//! branch = "main"
//! push_debounce = "5s"
//! ssh_key_path = "/etc/filestore/id_ed25519"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::git::GitProviderConfig;
use crate::provider::{ProviderError, ProviderResult};

/// Which backend the root provider uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Local,
    Object,
    Git,
}

/// Top-level storage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub local: LocalSettings,
    #[serde(default)]
    pub object: ObjectSettings,
    #[serde(default)]
    pub git: GitProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalSettings {
    #[serde(default = "default_local_root")]
    pub root: PathBuf,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            root: default_local_root(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectSettings {
    /// Bucket name, used to label the in-process bucket.
    #[serde(default)]
    pub bucket: String,
    /// Prepended to every object key.
    #[serde(default)]
    pub key_prefix: String,
}

fn default_local_root() -> PathBuf {
    PathBuf::from("data")
}

impl StorageConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> ProviderResult<Self> {
        toml::from_str(content).map_err(|e| ProviderError::Config(e.to_string()))
    }
}
