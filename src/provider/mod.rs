//! The `FileProvider` contract and its simple backends.
//!
//! Every store in the application (sessions, skills, memory, artifacts)
//! talks to a `FileProvider` and never to a concrete backend.
//!
//! # Architecture
//!
//! ```text
//!   callers ──► PrefixedProvider("sessions") ─┐
//!   callers ──► PrefixedProvider("skills")   ─┼──► root FileProvider
//!   callers ──► PrefixedProvider("memory")   ─┘      │
//!                                     ┌──────────────┼──────────────┐
//!                                     ▼              ▼              ▼
//!                               LocalProvider  ObjectStoreProvider  GitProvider
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use filestore::provider::{FileProvider, LocalProvider};
//!
//! let store = LocalProvider::new("./data")?;
//! store.write("notes/today.md", b"hello").await?;
//! assert_eq!(store.read("notes/today.md").await?, b"hello");
//! assert_eq!(store.list("notes").await?, vec!["notes/today.md"]);
//! ```

mod error;
mod local;
mod object;
pub mod path;
mod prefixed;

use std::sync::Arc;

use async_trait::async_trait;

pub use error::{ProviderError, ProviderResult};
pub use local::LocalProvider;
pub(crate) use local::{walk_files, write_atomic};
pub use object::{MemoryBucket, ObjectBucket, ObjectStoreProvider};
pub use prefixed::PrefixedProvider;

/// Whole-file storage keyed by relative, slash-separated paths.
///
/// Cancellation is cooperative: dropping a returned future stops the
/// caller from waiting, but work already handed to the backend (a
/// filesystem write, a commit) runs to completion.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Read the full contents of a file. Missing files yield `NotFound`.
    async fn read(&self, path: &str) -> ProviderResult<Vec<u8>>;

    /// Create or replace a file.
    async fn write(&self, path: &str, data: &[u8]) -> ProviderResult<()>;

    /// Check whether a file exists.
    async fn exists(&self, path: &str) -> ProviderResult<bool>;

    /// Remove a file. Removing a missing file succeeds.
    async fn delete(&self, path: &str) -> ProviderResult<()>;

    /// List files at or under `prefix`, sorted. A prefix that matches
    /// nothing yields an empty list.
    async fn list(&self, prefix: &str) -> ProviderResult<Vec<String>>;

    /// Release the provider, flushing any deferred work.
    async fn close(&self) -> ProviderResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: FileProvider + ?Sized> FileProvider for Arc<T> {
    async fn read(&self, path: &str) -> ProviderResult<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> ProviderResult<()> {
        (**self).write(path, data).await
    }

    async fn exists(&self, path: &str) -> ProviderResult<bool> {
        (**self).exists(path).await
    }

    async fn delete(&self, path: &str) -> ProviderResult<()> {
        (**self).delete(path).await
    }

    async fn list(&self, prefix: &str) -> ProviderResult<Vec<String>> {
        (**self).list(prefix).await
    }

    async fn close(&self) -> ProviderResult<()> {
        (**self).close().await
    }
}

#[async_trait]
impl<T: FileProvider + ?Sized> FileProvider for Box<T> {
    async fn read(&self, path: &str) -> ProviderResult<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> ProviderResult<()> {
        (**self).write(path, data).await
    }

    async fn exists(&self, path: &str) -> ProviderResult<bool> {
        (**self).exists(path).await
    }

    async fn delete(&self, path: &str) -> ProviderResult<()> {
        (**self).delete(path).await
    }

    async fn list(&self, prefix: &str) -> ProviderResult<Vec<String>> {
        (**self).list(prefix).await
    }

    async fn close(&self) -> ProviderResult<()> {
        (**self).close().await
    }
}
