//! Local-disk provider.
//!
//! Files live directly under a base directory, mirroring the logical
//! paths. Writes go through a sibling temporary file and a rename so a
//! concurrent reader sees either the old or the new contents.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::provider::error::{ProviderError, ProviderResult};
use crate::provider::{path, FileProvider};

/// A `FileProvider` over a plain directory.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    /// Create a provider rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> ProviderResult<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(ProviderError::Config("local root path is empty".to_string()));
        }
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Get the base directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, logical: &str) -> ProviderResult<(String, PathBuf)> {
        let normalized = path::normalize_file(logical)?;
        let full = path::resolve(&self.root, &normalized);
        Ok((normalized, full))
    }
}

#[async_trait]
impl FileProvider for LocalProvider {
    async fn read(&self, logical: &str) -> ProviderResult<Vec<u8>> {
        let (normalized, full) = self.full_path(logical)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ProviderError::NotFound(normalized))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, logical: &str, data: &[u8]) -> ProviderResult<()> {
        let (_, full) = self.full_path(logical)?;
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&full, &data)).await?
    }

    async fn exists(&self, logical: &str) -> ProviderResult<bool> {
        let (_, full) = self.full_path(logical)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, logical: &str) -> ProviderResult<()> {
        let (_, full) = self.full_path(logical)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> ProviderResult<Vec<String>> {
        let prefix = path::normalize(prefix)?;
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk_files(&root, &prefix, &[])).await?
    }
}

/// Write `data` to `target` via a temporary file in the same directory.
pub(crate) fn write_atomic(target: &Path, data: &[u8]) -> ProviderResult<()> {
    let parent = target
        .parent()
        .ok_or_else(|| ProviderError::invalid_path(target.display().to_string(), "no parent"))?;
    std::fs::create_dir_all(parent)?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(path::TEMP_PREFIX);
    // tempfile defaults to 0600; stored files get the usual umask-masked mode
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    let mut tmp = builder.tempfile_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| ProviderError::Io(e.error))?;
    Ok(())
}

/// Walk every file at or under `prefix`, returning sorted logical paths.
///
/// Top-level directories named in `reserved` are skipped entirely.
pub(crate) fn walk_files(
    root: &Path,
    prefix: &str,
    reserved: &[&str],
) -> ProviderResult<Vec<String>> {
    let start = path::resolve(root, prefix);
    if !start.exists() {
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(&start)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let is_reserved = entry.file_type().is_dir()
                && entry.path().parent() == Some(root)
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| reserved.contains(&name));
            !is_reserved
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // removed while we were walking
            Err(e) if e.io_error().map(|io| io.kind()) == Some(std::io::ErrorKind::NotFound) => {
                continue
            }
            Err(e) => return Err(ProviderError::Io(e.into())),
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let hidden = entry
            .file_name()
            .to_str()
            .map_or(true, |name| name.starts_with(path::TEMP_PREFIX));
        if hidden {
            continue;
        }
        if let Some(logical) = path::to_logical(root, entry.path()) {
            files.push(logical);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalProvider) {
        let dir = TempDir::new().unwrap();
        let provider = LocalProvider::new(dir.path().join("store")).unwrap();
        (dir, provider)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_dir, store) = setup();

        store.write("a.txt", b"hello").await.unwrap();
        assert_eq!(store.read("a.txt").await.unwrap(), b"hello");

        // overwrite
        store.write("a.txt", b"bye").await.unwrap();
        assert_eq!(store.read("a.txt").await.unwrap(), b"bye");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, store) = setup();
        let err = store.read("missing.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = setup();

        store.delete("never-written.txt").await.unwrap();
        assert!(!store.exists("never-written.txt").await.unwrap());

        store.write("x/y.bin", &[0, 1, 2]).await.unwrap();
        assert!(store.exists("x/y.bin").await.unwrap());
        store.delete("x/y.bin").await.unwrap();
        store.delete("x/y.bin").await.unwrap();
        assert!(!store.exists("x/y.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_is_false_for_directories() {
        let (_dir, store) = setup();
        store.write("b/c.txt", b"c").await.unwrap();
        assert!(!store.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_list() {
        let (_dir, store) = setup();
        store.write("a.txt", b"a").await.unwrap();
        store.write("b/c.txt", b"c").await.unwrap();
        store.write("bx.txt", b"x").await.unwrap();

        assert_eq!(
            store.list("").await.unwrap(),
            vec!["a.txt", "b/c.txt", "bx.txt"]
        );
        assert_eq!(store.list("b").await.unwrap(), vec!["b/c.txt"]);
        assert!(store.list("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let (_dir, store) = setup();
        let err = store.write("../outside.txt", b"x").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidPath { .. }));
        assert!(store.read("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_temp_prefix_names_are_rejected() {
        let (_dir, store) = setup();
        let err = store.write(".filestore-notes.md", b"x").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidPath { .. }));
        assert!(store.list("").await.unwrap().is_empty());

        // a stray temporary from an interrupted write stays hidden
        store.write("a.txt", b"a").await.unwrap();
        std::fs::write(store.root().join(".filestore-abc123"), b"partial").unwrap();
        assert_eq!(store.list("").await.unwrap(), vec!["a.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_written_files_use_default_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = setup();
        store.write("a.txt", b"a").await.unwrap();

        let reference = store.root().join("reference");
        std::fs::write(&reference, b"r").unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&store.root().join("a.txt")), mode(&reference));
    }
}
