//! Storage manager: one root provider, many namespaces.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Backend, StorageConfig};
use crate::git::GitProvider;
use crate::provider::{
    path, FileProvider, LocalProvider, MemoryBucket, ObjectStoreProvider, PrefixedProvider,
    ProviderError, ProviderResult,
};

pub const SESSIONS: &str = "sessions";
pub const SKILLS: &str = "skills";
pub const MEMORY: &str = "memory";
pub const ARTIFACTS: &str = "artifacts";

/// Owns the root provider and hands out namespace-scoped views of it.
///
/// Namespaces share the backend (one directory, bucket or repository) and
/// are isolated only by path prefix.
#[derive(Clone)]
pub struct StorageManager {
    root: Arc<dyn FileProvider>,
}

impl StorageManager {
    /// Wrap an existing root provider.
    pub fn new(root: Arc<dyn FileProvider>) -> Self {
        Self { root }
    }

    /// Build the root provider selected by `config`.
    pub async fn from_config(config: &StorageConfig) -> ProviderResult<Self> {
        let root: Arc<dyn FileProvider> = match config.backend {
            Backend::Local => {
                let provider = LocalProvider::new(&config.local.root)?;
                info!(root = %provider.root().display(), "using local storage");
                Arc::new(provider)
            }
            Backend::Object => {
                let settings = &config.object;
                warn!(
                    bucket = %settings.bucket,
                    "object storage uses an in-process bucket, contents do not outlive the process"
                );
                Arc::new(ObjectStoreProvider::new(MemoryBucket::new(), &settings.key_prefix)?)
            }
            Backend::Git => {
                let provider = GitProvider::open(config.git.clone()).await?;
                info!(path = %provider.workdir().display(), "using git storage");
                Arc::new(provider)
            }
        };
        Ok(Self::new(root))
    }

    /// A provider scoped to `name`.
    ///
    /// Names are a single path segment: no slashes, not empty.
    pub fn namespace(&self, name: &str) -> ProviderResult<PrefixedProvider> {
        if name.is_empty() || name.contains('/') {
            return Err(ProviderError::invalid_path(name, "namespace must be a single path segment"));
        }
        if path::normalize(name)? != name {
            return Err(ProviderError::invalid_path(name, "namespace is not a plain name"));
        }
        PrefixedProvider::new(self.root.clone(), name)
    }

    pub fn sessions(&self) -> ProviderResult<PrefixedProvider> {
        self.namespace(SESSIONS)
    }

    pub fn skills(&self) -> ProviderResult<PrefixedProvider> {
        self.namespace(SKILLS)
    }

    pub fn memory(&self) -> ProviderResult<PrefixedProvider> {
        self.namespace(MEMORY)
    }

    pub fn artifacts(&self) -> ProviderResult<PrefixedProvider> {
        self.namespace(ARTIFACTS)
    }

    /// The shared root provider.
    pub fn root(&self) -> &Arc<dyn FileProvider> {
        &self.root
    }

    /// Close the root provider, flushing deferred work.
    pub async fn close(&self) -> ProviderResult<()> {
        self.root.close().await
    }
}
