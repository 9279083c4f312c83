//! Namespace-prefixing wrapper.

use std::sync::Arc;

use async_trait::async_trait;

use crate::provider::error::{ProviderError, ProviderResult};
use crate::provider::{path, FileProvider};

/// Gives a caller an isolated view of a shared provider by prepending a
/// fixed prefix to every path and stripping it from listings.
#[derive(Clone)]
pub struct PrefixedProvider {
    inner: Arc<dyn FileProvider>,
    prefix: String,
}

impl PrefixedProvider {
    /// Wrap `inner`, scoping every operation under `prefix`.
    ///
    /// An empty prefix is a transparent pass-through.
    pub fn new(inner: Arc<dyn FileProvider>, prefix: &str) -> ProviderResult<Self> {
        Ok(Self {
            inner,
            prefix: path::normalize(prefix)?,
        })
    }

    /// Get the namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn scoped(&self, logical: &str) -> ProviderResult<String> {
        let normalized = path::normalize_file(logical)?;
        Ok(path::join(&self.prefix, &normalized))
    }

    fn unscoped(&self, full: String) -> Option<String> {
        if self.prefix.is_empty() {
            return Some(full);
        }
        full.strip_prefix(self.prefix.as_str())?
            .strip_prefix('/')
            .map(str::to_string)
    }
}

#[async_trait]
impl FileProvider for PrefixedProvider {
    async fn read(&self, logical: &str) -> ProviderResult<Vec<u8>> {
        let scoped = self.scoped(logical)?;
        self.inner.read(&scoped).await.map_err(|e| match e {
            // report the caller's path, not ours
            ProviderError::NotFound(_) => ProviderError::NotFound(logical.to_string()),
            other => other,
        })
    }

    async fn write(&self, logical: &str, data: &[u8]) -> ProviderResult<()> {
        let scoped = self.scoped(logical)?;
        self.inner.write(&scoped, data).await
    }

    async fn exists(&self, logical: &str) -> ProviderResult<bool> {
        let scoped = self.scoped(logical)?;
        self.inner.exists(&scoped).await
    }

    async fn delete(&self, logical: &str) -> ProviderResult<()> {
        let scoped = self.scoped(logical)?;
        self.inner.delete(&scoped).await
    }

    async fn list(&self, prefix: &str) -> ProviderResult<Vec<String>> {
        let prefix = path::normalize(prefix)?;
        let listed = self.inner.list(&path::join(&self.prefix, &prefix)).await?;
        Ok(listed
            .into_iter()
            .filter_map(|full| self.unscoped(full))
            .collect())
    }

    async fn close(&self) -> ProviderResult<()> {
        // the shared root is owned by the storage manager
        Ok(())
    }
}
