//! The git-backed `FileProvider`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use git2::Repository;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::git::commit::{self, CommitInfo, Staged};
use crate::git::config::GitProviderConfig;
use crate::git::refs;
use crate::git::remote::RemoteLink;
use crate::git::replicator::{ReplicationStatus, Replicator};
use crate::git::repository::{self, RepositoryOrigin};
use crate::git::types::{CommitId, GitSignature};
use crate::provider::{path, walk_files, write_atomic, FileProvider, ProviderError, ProviderResult};

/// How long `close` waits for replication to finish.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the metadata directory, hidden from callers.
const METADATA_DIR: &str = ".git";

/// A `FileProvider` that commits every mutation to a git repository and
/// replicates the branch to an optional remote in the background.
///
/// Cloning is cheap; clones share the same repository and replicator.
#[derive(Clone)]
pub struct GitProvider {
    inner: Arc<Inner>,
}

struct Inner {
    /// mutation lock: held across write + stage + commit
    repo: Mutex<Repository>,
    workdir: PathBuf,
    signature: GitSignature,
    origin: RepositoryOrigin,
    closed: RwLock<bool>,
    replicator: Option<Replicator>,
}

impl GitProvider {
    /// Open, clone or initialize the repository described by `config`.
    pub async fn open(config: GitProviderConfig) -> ProviderResult<Self> {
        config.validate()?;
        let branch = config.branch_name()?;
        let link = match &config.remote_url {
            Some(url) => Some(RemoteLink {
                url: url.clone(),
                branch: branch.clone(),
                credentials: config.credentials(url)?,
            }),
            None => None,
        };

        let workdir = config.path.clone();
        let allow_init = config.allow_init;
        let (repo, origin) = {
            let workdir = workdir.clone();
            let link = link.clone();
            tokio::task::spawn_blocking(move || {
                repository::open_or_create(&workdir, &branch, link.as_ref(), allow_init)
            })
            .await??
        };

        let replicator = link.map(|link| {
            debug!(remote = %link.url, debounce = ?config.push_debounce, "starting replicator");
            Replicator::spawn(workdir.clone(), link, config.push_debounce)
        });

        info!(path = %workdir.display(), %origin, remote = replicator.is_some(), "git provider ready");

        Ok(Self {
            inner: Arc::new(Inner {
                repo: Mutex::new(repo),
                workdir,
                signature: config.signature(),
                origin,
                closed: RwLock::new(false),
                replicator,
            }),
        })
    }

    /// Get the working tree directory.
    pub fn workdir(&self) -> &Path {
        &self.inner.workdir
    }

    /// How the repository was obtained when the provider opened.
    pub fn origin(&self) -> RepositoryOrigin {
        self.inner.origin
    }

    /// Whether a remote is configured.
    pub fn has_remote(&self) -> bool {
        self.inner.replicator.is_some()
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.read()
    }

    /// Replication counters. Without a remote this is always the default.
    pub fn replication_status(&self) -> ReplicationStatus {
        self.inner
            .replicator
            .as_ref()
            .map(Replicator::status)
            .unwrap_or_default()
    }

    /// The commit HEAD points to, if any.
    pub async fn head(&self) -> ProviderResult<Option<CommitId>> {
        self.with_repo(refs::head_id).await
    }

    /// Commits on the branch, newest first.
    pub async fn history(&self, limit: Option<usize>) -> ProviderResult<Vec<CommitInfo>> {
        self.with_repo(move |repo| commit::history(repo, limit)).await
    }

    /// Number of commits on the branch.
    pub async fn commit_count(&self) -> ProviderResult<usize> {
        self.with_repo(commit::count).await
    }

    async fn with_repo<T, F>(&self, f: F) -> ProviderResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> ProviderResult<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner.repo.lock())).await?
    }

    fn ensure_open(&self) -> ProviderResult<()> {
        self.inner.ensure_open()
    }

    fn logical(&self, raw: &str) -> ProviderResult<String> {
        let normalized = path::normalize_file(raw)?;
        reject_metadata(raw, &normalized)?;
        Ok(normalized)
    }
}

impl Inner {
    fn ensure_open(&self) -> ProviderResult<()> {
        if *self.closed.read() {
            return Err(ProviderError::Closed);
        }
        Ok(())
    }

    fn write_and_commit(&self, logical: &str, data: &[u8]) -> ProviderResult<()> {
        let repo = self.repo.lock();
        // close may have won the race for the lock
        self.ensure_open()?;

        write_atomic(&path::resolve(&self.workdir, logical), data)?;
        let id = match commit::commit_change(&repo, Staged::Add(logical), &self.signature) {
            Ok(id) => id,
            Err(e) => {
                // a failed write leaves neither a file nor a staged entry behind
                if let Err(cleanup) = commit::discard_write(&repo, logical) {
                    warn!(path = logical, error = %cleanup, "could not roll back failed write");
                }
                return Err(e);
            }
        };
        if let Some(id) = id {
            debug!(path = logical, commit = %id.short(), "committed write");
        }
        self.schedule_push();
        Ok(())
    }

    fn remove_and_commit(&self, logical: &str) -> ProviderResult<()> {
        let repo = self.repo.lock();
        self.ensure_open()?;

        let full = path::resolve(&self.workdir, logical);
        match std::fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() => {
                return Err(ProviderError::invalid_path(logical, "is a directory"));
            }
            Ok(_) => std::fs::remove_file(&full)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = logical, "delete of missing file");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        match commit::commit_change(&repo, Staged::Remove(logical), &self.signature)? {
            Some(id) => {
                debug!(path = logical, commit = %id.short(), "committed delete");
                self.schedule_push();
            }
            None => debug!(path = logical, "nothing to commit for delete"),
        }
        Ok(())
    }

    fn schedule_push(&self) {
        if let Some(replicator) = &self.replicator {
            replicator.schedule();
        }
    }
}

/// `.git` is repository metadata at any depth, never application data.
fn reject_metadata(raw: &str, normalized: &str) -> ProviderResult<()> {
    if normalized
        .split('/')
        .any(|segment| segment.eq_ignore_ascii_case(METADATA_DIR))
    {
        return Err(ProviderError::invalid_path(raw, "refers to repository metadata"));
    }
    Ok(())
}

#[async_trait]
impl FileProvider for GitProvider {
    async fn read(&self, logical: &str) -> ProviderResult<Vec<u8>> {
        let logical = self.logical(logical)?;
        let full = path::resolve(&self.inner.workdir, &logical);
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ProviderError::NotFound(logical)),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, logical: &str, data: &[u8]) -> ProviderResult<()> {
        self.ensure_open()?;
        let logical = self.logical(logical)?;
        let inner = self.inner.clone();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || inner.write_and_commit(&logical, &data)).await?
    }

    async fn exists(&self, logical: &str) -> ProviderResult<bool> {
        let logical = self.logical(logical)?;
        let full = path::resolve(&self.inner.workdir, &logical);
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, logical: &str) -> ProviderResult<()> {
        self.ensure_open()?;
        let logical = self.logical(logical)?;
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.remove_and_commit(&logical)).await?
    }

    async fn list(&self, prefix: &str) -> ProviderResult<Vec<String>> {
        let normalized = path::normalize(prefix)?;
        reject_metadata(prefix, &normalized)?;
        let root = self.inner.workdir.clone();
        tokio::task::spawn_blocking(move || walk_files(&root, &normalized, &[METADATA_DIR])).await?
    }

    /// Stop accepting mutations and flush pending replication.
    ///
    /// Only the first call does any work; later calls succeed immediately.
    async fn close(&self) -> ProviderResult<()> {
        {
            let mut closed = self.inner.closed.write();
            if *closed {
                return Ok(());
            }
            *closed = true;
        }
        info!(path = %self.inner.workdir.display(), "closing git provider");

        // a writer that passed the closed check finishes its commit first
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || drop(inner.repo.lock())).await?;

        match &self.inner.replicator {
            Some(replicator) => {
                replicator.shutdown(CLOSE_TIMEOUT).await?;
                info!("replication flushed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::types::BranchName;
    use tempfile::TempDir;
    use tokio::time::Instant;

    async fn local_store(dir: &TempDir) -> GitProvider {
        GitProvider::open(GitProviderConfig::new(dir.path().join("store")).allow_init(true))
            .await
            .unwrap()
    }

    /// A bare repository standing in for the shared remote.
    fn bare_remote(dir: &TempDir) -> String {
        let bare = dir.path().join("remote.git");
        Repository::init_bare(&bare).unwrap();
        bare.to_string_lossy().into_owned()
    }

    fn remote_head(url: &str, branch: &str) -> Option<git2::Oid> {
        let bare = Repository::open_bare(url).unwrap();
        bare.refname_to_id(&BranchName::new(branch).unwrap().as_ref_path())
            .ok()
    }

    /// Wait until `n` pushes have finished, successfully or not.
    async fn wait_for_pushes(store: &GitProvider, n: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = store.replication_status();
            if status.successes + status.failures >= n || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;
        assert_eq!(store.origin(), RepositoryOrigin::Initialized);
        assert!(!store.has_remote());

        store.write("notes/today.md", b"hello").await.unwrap();
        assert_eq!(store.read("notes/today.md").await.unwrap(), b"hello");
        assert!(store.exists("notes/today.md").await.unwrap());
        assert!(!store.exists("notes").await.unwrap());

        let err = store.read("missing.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_every_mutation_is_one_commit() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;

        store.write("a.txt", b"1").await.unwrap();
        store.write("a.txt", b"2").await.unwrap();
        store.delete("a.txt").await.unwrap();
        assert_eq!(store.commit_count().await.unwrap(), 3);

        let history = store.history(None).await.unwrap();
        let messages: Vec<&str> = history.iter().map(|c| c.summary()).collect();
        assert_eq!(
            messages,
            vec!["[auto] Delete a.txt", "[auto] Write a.txt", "[auto] Write a.txt"]
        );
        assert_eq!(store.head().await.unwrap(), Some(history[0].id));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;

        store.delete("never-written.txt").await.unwrap();
        assert!(!store.exists("never-written.txt").await.unwrap());
        assert_eq!(store.commit_count().await.unwrap(), 0);

        store.write("a.txt", b"a").await.unwrap();
        store.delete("a.txt").await.unwrap();
        store.delete("a.txt").await.unwrap();
        assert_eq!(store.commit_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_untracked_file_is_not_a_commit() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;

        std::fs::write(store.workdir().join("stray.txt"), b"x").unwrap();
        store.delete("stray.txt").await.unwrap();
        assert!(!store.exists("stray.txt").await.unwrap());
        assert_eq!(store.commit_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;

        store.write("a.txt", b"a").await.unwrap();
        store.write("b/c.txt", b"c").await.unwrap();
        store.write("bx.txt", b"x").await.unwrap();

        assert_eq!(store.list("").await.unwrap(), vec!["a.txt", "b/c.txt", "bx.txt"]);
        assert_eq!(store.list("b").await.unwrap(), vec!["b/c.txt"]);
        assert!(store.list("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_is_off_limits() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;

        for path in [".git/config", ".git", "./.git/HEAD"] {
            let err = store.write(path, b"x").await.unwrap_err();
            assert!(matches!(err, ProviderError::InvalidPath { .. }), "{}", path);
        }
        assert!(store.read(".git/HEAD").await.is_err());
        assert!(store.list(".git").await.is_err());
        assert!(store.write("../escape.txt", b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_nested_metadata_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;

        // what a namespaced caller writing ".git/config" turns into
        for path in ["sessions/.git/config", "a/b/.GIT/HEAD"] {
            let err = store.write(path, b"x").await.unwrap_err();
            assert!(matches!(err, ProviderError::InvalidPath { .. }), "{}", path);
        }
        assert!(!store.workdir().join("sessions").exists());
        assert!(store.list("").await.unwrap().is_empty());
        assert_eq!(store.commit_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_temp_prefix_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;

        let err = store.write(".filestore-notes.md", b"x").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidPath { .. }));
        assert!(!store.exists("notes.md").await.unwrap());
        assert_eq!(store.commit_count().await.unwrap(), 0);

        // every stored file shows up in the listing
        store.write("notes/.filestore", b"x").await.unwrap();
        assert_eq!(store.list("").await.unwrap(), vec!["notes/.filestore"]);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_write() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;
        store.write("a.txt", b"v1").await.unwrap();

        // a stale index lock makes staging fail after the file is on disk
        let lock = store.workdir().join(".git/index.lock");
        std::fs::write(&lock, b"").unwrap();
        assert!(store.write("a.txt", b"v2").await.is_err());
        assert!(store.write("b.txt", b"b").await.is_err());
        std::fs::remove_file(&lock).unwrap();

        assert_eq!(store.read("a.txt").await.unwrap(), b"v1");
        assert!(!store.exists("b.txt").await.unwrap());
        assert_eq!(store.list("").await.unwrap(), vec!["a.txt"]);
        assert_eq!(store.commit_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writes() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let path = format!("docs/{}.txt", i);
                store.write(&path, format!("doc {}", i).as_bytes()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.commit_count().await.unwrap(), 16);
        for i in 0..16 {
            let data = store.read(&format!("docs/{}.txt", i)).await.unwrap();
            assert_eq!(data, format!("doc {}", i).as_bytes());
        }
    }

    #[tokio::test]
    async fn test_close_rejects_mutations() {
        let dir = TempDir::new().unwrap();
        let store = local_store(&dir).await;
        store.write("a.txt", b"a").await.unwrap();

        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(store.is_closed());

        assert!(matches!(store.write("b.txt", b"b").await, Err(ProviderError::Closed)));
        assert!(matches!(store.delete("a.txt").await, Err(ProviderError::Closed)));
        // reads still work
        assert_eq!(store.read("a.txt").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_missing_repo_without_init() {
        let dir = TempDir::new().unwrap();
        let config = GitProviderConfig::new(dir.path().join("store"));
        let err = GitProvider::open(config).await.err().unwrap();
        assert!(matches!(err, ProviderError::RepositoryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_burst_is_pushed_once() {
        let dir = TempDir::new().unwrap();
        let url = bare_remote(&dir);
        let config = GitProviderConfig::new(dir.path().join("store"))
            .remote(url.as_str())
            .push_debounce(Duration::from_millis(300));
        let store = GitProvider::open(config).await.unwrap();
        assert_eq!(store.origin(), RepositoryOrigin::Bootstrapped);

        for i in 0..5 {
            store.write(&format!("burst/{}.txt", i), b"x").await.unwrap();
        }
        assert_eq!(store.replication_status().attempts, 0);
        assert!(store.replication_status().pending);

        wait_for_pushes(&store, 1).await;
        // nothing else is scheduled, so no further push follows
        tokio::time::sleep(Duration::from_millis(600)).await;

        let status = store.replication_status();
        assert_eq!(status.attempts, 1);
        assert_eq!(status.successes, 1);
        assert!(status.last_success.is_some());
        assert!(!status.pending);

        let head = store.head().await.unwrap().unwrap();
        assert_eq!(remote_head(&url, "main"), Some(head.raw()));

        store.close().await.unwrap();
        assert_eq!(store.replication_status().attempts, 1);
    }

    #[tokio::test]
    async fn test_close_flushes_pending_push() {
        let dir = TempDir::new().unwrap();
        let url = bare_remote(&dir);
        let config = GitProviderConfig::new(dir.path().join("store"))
            .remote(url.as_str())
            .push_debounce(Duration::from_secs(60));
        let store = GitProvider::open(config).await.unwrap();

        store.write("a.txt", b"a").await.unwrap();
        store.write("b.txt", b"b").await.unwrap();
        assert_eq!(remote_head(&url, "main"), None);

        store.close().await.unwrap();

        let head = store.head().await.unwrap().unwrap();
        assert_eq!(remote_head(&url, "main"), Some(head.raw()));
        assert_eq!(store.replication_status().attempts, 1);
    }

    #[tokio::test]
    async fn test_push_to_custom_branch() {
        let dir = TempDir::new().unwrap();
        let url = bare_remote(&dir);
        let config = GitProviderConfig::new(dir.path().join("store"))
            .remote(url.as_str())
            .branch("data")
            .push_debounce(Duration::from_secs(60));
        let store = GitProvider::open(config).await.unwrap();

        store.write("a.txt", b"a").await.unwrap();
        store.close().await.unwrap();

        assert!(remote_head(&url, "data").is_some());
        assert_eq!(remote_head(&url, "main"), None);
    }

    #[tokio::test]
    async fn test_clone_populated_remote() {
        let dir = TempDir::new().unwrap();
        let url = bare_remote(&dir);

        let first = GitProvider::open(
            GitProviderConfig::new(dir.path().join("first")).remote(url.as_str()),
        )
        .await
        .unwrap();
        first.write("shared/notes.md", b"from first").await.unwrap();
        first.close().await.unwrap();

        let second = GitProvider::open(
            GitProviderConfig::new(dir.path().join("second"))
                .remote(url.as_str())
                .allow_init(false),
        )
        .await
        .unwrap();
        assert_eq!(second.origin(), RepositoryOrigin::Cloned);
        assert_eq!(second.read("shared/notes.md").await.unwrap(), b"from first");
        assert_eq!(second.commit_count().await.unwrap(), 1);

        // the clone keeps extending the same history
        second.write("shared/more.md", b"from second").await.unwrap();
        second.close().await.unwrap();
        let head = second.head().await.unwrap().unwrap();
        assert_eq!(remote_head(&url, "main"), Some(head.raw()));
    }

    #[tokio::test]
    async fn test_reopen_existing_repository() {
        let dir = TempDir::new().unwrap();
        let url = bare_remote(&dir);
        let path = dir.path().join("store");

        let store = GitProvider::open(GitProviderConfig::new(&path).allow_init(true))
            .await
            .unwrap();
        store.write("a.txt", b"a").await.unwrap();
        store.close().await.unwrap();
        drop(store);

        // a remote configured later is attached on reopen
        let store = GitProvider::open(
            GitProviderConfig::new(&path)
                .remote(url.as_str())
                .push_debounce(Duration::from_secs(60)),
        )
        .await
        .unwrap();
        assert_eq!(store.origin(), RepositoryOrigin::Opened);
        assert!(store.has_remote());
        assert_eq!(store.read("a.txt").await.unwrap(), b"a");

        store.write("b.txt", b"b").await.unwrap();
        store.close().await.unwrap();
        let head = store.head().await.unwrap().unwrap();
        assert_eq!(remote_head(&url, "main"), Some(head.raw()));
    }

    #[tokio::test]
    async fn test_push_failure_does_not_fail_writes() {
        let dir = TempDir::new().unwrap();
        let url = bare_remote(&dir);
        let config = GitProviderConfig::new(dir.path().join("store"))
            .remote(url.as_str())
            .push_debounce(Duration::from_millis(50));
        let store = GitProvider::open(config).await.unwrap();

        // remote disappears after bootstrap
        std::fs::remove_dir_all(&url).unwrap();

        store.write("a.txt", b"a").await.unwrap();
        wait_for_pushes(&store, 1).await;

        let status = store.replication_status();
        assert_eq!(status.failures, 1);
        assert!(status.last_error.is_some());
        assert_eq!(store.read("a.txt").await.unwrap(), b"a");

        // nothing was pending at close time
        store.close().await.unwrap();
    }
}
