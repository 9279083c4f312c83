//! Object-storage provider.
//!
//! Logical paths become object keys under an optional key prefix. The
//! bucket itself sits behind the `ObjectBucket` trait so a network client
//! can be plugged in; `MemoryBucket` is the in-process implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::provider::error::{ProviderError, ProviderResult};
use crate::provider::{path, FileProvider};

/// Trait for object storage buckets.
#[async_trait]
pub trait ObjectBucket: Send + Sync {
    /// Stores an object, replacing any previous value.
    async fn put(&self, key: &str, data: Vec<u8>) -> ProviderResult<()>;

    /// Retrieves an object by key.
    async fn get(&self, key: &str) -> ProviderResult<Option<Vec<u8>>>;

    /// Checks if an object exists.
    async fn head(&self, key: &str) -> ProviderResult<bool>;

    /// Deletes an object. Returns whether it existed.
    async fn delete(&self, key: &str) -> ProviderResult<bool>;

    /// Lists all keys starting with `prefix` (plain string match).
    async fn list_keys(&self, prefix: &str) -> ProviderResult<Vec<String>>;
}

/// In-memory bucket.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Debug, Clone, Default)]
pub struct MemoryBucket {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBucket {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the bucket holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectBucket for MemoryBucket {
    async fn put(&self, key: &str, data: Vec<u8>) -> ProviderResult<()> {
        self.objects.write().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> ProviderResult<Option<Vec<u8>>> {
        Ok(self.objects.read().get(key).cloned())
    }

    async fn head(&self, key: &str) -> ProviderResult<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    async fn delete(&self, key: &str) -> ProviderResult<bool> {
        Ok(self.objects.write().remove(key).is_some())
    }

    async fn list_keys(&self, prefix: &str) -> ProviderResult<Vec<String>> {
        let objects = self.objects.read();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// A `FileProvider` over an object bucket.
pub struct ObjectStoreProvider<B> {
    bucket: B,
    key_prefix: String,
}

impl<B: ObjectBucket> ObjectStoreProvider<B> {
    /// Create a provider storing objects under `key_prefix` in `bucket`.
    pub fn new(bucket: B, key_prefix: &str) -> ProviderResult<Self> {
        Ok(Self {
            bucket,
            key_prefix: path::normalize(key_prefix)?,
        })
    }

    /// Get the underlying bucket.
    pub fn bucket(&self) -> &B {
        &self.bucket
    }

    fn key_for(&self, logical: &str) -> ProviderResult<(String, String)> {
        let normalized = path::normalize_file(logical)?;
        let key = path::join(&self.key_prefix, &normalized);
        Ok((normalized, key))
    }

    fn strip_key_prefix<'k>(&self, key: &'k str) -> Option<&'k str> {
        if self.key_prefix.is_empty() {
            return Some(key);
        }
        key.strip_prefix(self.key_prefix.as_str())?.strip_prefix('/')
    }
}

#[async_trait]
impl<B: ObjectBucket> FileProvider for ObjectStoreProvider<B> {
    async fn read(&self, logical: &str) -> ProviderResult<Vec<u8>> {
        let (normalized, key) = self.key_for(logical)?;
        self.bucket
            .get(&key)
            .await?
            .ok_or(ProviderError::NotFound(normalized))
    }

    async fn write(&self, logical: &str, data: &[u8]) -> ProviderResult<()> {
        let (_, key) = self.key_for(logical)?;
        self.bucket.put(&key, data.to_vec()).await
    }

    async fn exists(&self, logical: &str) -> ProviderResult<bool> {
        let (_, key) = self.key_for(logical)?;
        self.bucket.head(&key).await
    }

    async fn delete(&self, logical: &str) -> ProviderResult<()> {
        let (_, key) = self.key_for(logical)?;
        self.bucket.delete(&key).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> ProviderResult<Vec<String>> {
        let prefix = path::normalize(prefix)?;
        let scan = path::join(&self.key_prefix, &prefix);

        let mut paths: Vec<String> = self
            .bucket
            .list_keys(&scan)
            .await?
            .iter()
            .filter_map(|key| self.strip_key_prefix(key))
            .filter(|logical| path::is_under(logical, &prefix))
            .map(str::to_string)
            .collect();
        paths.sort();
        Ok(paths)
    }
}
