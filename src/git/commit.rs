//! Commit creation and history traversal
//!
//! every successful mutation of the working tree becomes exactly one commit:
//! - `Write` stages the file and always commits
//! - `Delete` stages the removal and commits only if the tree changed
//!
//! history is linear on the active branch; nothing here merges or rebases

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use git2::{Repository, Sort};

use crate::git::refs;
use crate::git::types::{CommitId, GitSignature};
use crate::provider::{path as logical_path, write_atomic, ProviderError, ProviderResult};

/// information about a commit
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: CommitId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let time = commit.time();
        let timestamp = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            timestamp,
        }
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// message formatting for automatic commits
pub struct CommitMessage;

impl CommitMessage {
    /// format a message for a file write
    pub fn write(path: &str) -> String {
        format!("[auto] Write {}", path)
    }

    /// format a message for a file deletion
    pub fn delete(path: &str) -> String {
        format!("[auto] Delete {}", path)
    }
}

/// a single staged change to the index
#[derive(Debug, Clone, Copy)]
pub enum Staged<'p> {
    /// the file at this path was written to the working tree
    Add(&'p str),
    /// the file at this path was removed from the working tree
    Remove(&'p str),
}

impl<'p> Staged<'p> {
    fn path(&self) -> &'p str {
        match self {
            Staged::Add(p) | Staged::Remove(p) => p,
        }
    }

    fn message(&self) -> String {
        match self {
            Staged::Add(p) => CommitMessage::write(p),
            Staged::Remove(p) => CommitMessage::delete(p),
        }
    }
}

/// Stage `change` and commit it on HEAD.
///
/// Removals that leave the tree unchanged (the file was never tracked, or
/// its removal is already committed) produce no commit and return `None`.
pub fn commit_change(
    repo: &Repository,
    change: Staged<'_>,
    signature: &GitSignature,
) -> ProviderResult<Option<CommitId>> {
    let mut index = repo.index()?;
    let path = Path::new(change.path());

    match change {
        Staged::Add(_) => index.add_path(path)?,
        Staged::Remove(_) => match index.remove_path(path) {
            Ok(()) => {}
            // not tracked
            Err(e) if e.code() == git2::ErrorCode::NotFound => {}
            Err(e) => return Err(ProviderError::Git(e)),
        },
    }
    index.write()?;
    let tree_id = index.write_tree()?;

    let parent = refs::head_commit(repo)?;
    if let Staged::Remove(_) = change {
        let unchanged = match &parent {
            Some(p) => p.tree_id() == tree_id,
            None => repo.find_tree(tree_id)?.is_empty(),
        };
        if unchanged {
            return Ok(None);
        }
    }

    let id = CommitBuilder::new(repo)
        .tree(tree_id)
        .parents(parent.iter().map(|p| CommitId::new(p.id())).collect())
        .message(change.message())
        .signature(signature.clone())
        .update_ref("HEAD")
        .commit()?;
    Ok(Some(id))
}

/// Undo a write of `path` that never made it into a commit.
///
/// A path HEAD already tracks gets its committed content back. Any other
/// path is deleted. The index is reloaded from disk and only rewritten if
/// the failed attempt got as far as persisting it.
pub fn discard_write(repo: &Repository, path: &str) -> ProviderResult<()> {
    let committed = match refs::head_commit(repo)? {
        Some(head) => match head.tree()?.get_path(Path::new(path)) {
            Ok(entry) => Some(entry.id()),
            Err(e) if e.code() == git2::ErrorCode::NotFound => None,
            Err(e) => return Err(ProviderError::Git(e)),
        },
        None => None,
    };

    if let Some(workdir) = repo.workdir() {
        let full = logical_path::resolve(workdir, path);
        match committed {
            Some(blob) => write_atomic(&full, repo.find_blob(blob)?.content())?,
            None => match std::fs::remove_file(&full) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
    }

    let mut index = repo.index()?;
    index.read(true)?;
    let staged = index.get_path(Path::new(path), 0).map(|entry| entry.id);
    if staged == committed {
        return Ok(());
    }
    match committed {
        Some(_) => index.add_path(Path::new(path))?,
        None => index.remove_path(Path::new(path))?,
    }
    index.write()?;
    Ok(())
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<git2::Oid>,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::default(),
            update_ref: None,
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: git2::Oid) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// set the parents (empty for a root commit)
    pub fn parents(mut self, parents: Vec<CommitId>) -> Self {
        self.parents = parents;
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author/committer signature
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// update a ref (branch) to point to this commit
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> ProviderResult<CommitId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| ProviderError::Git(git2::Error::from_str("commit requires a tree")))?;

        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.signature.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self.repo.commit(
            self.update_ref.as_deref(),
            &sig,
            &sig,
            &self.message,
            &tree,
            &parent_refs,
        )?;

        Ok(CommitId::new(oid))
    }
}

/// get commit history from HEAD, newest first
///
/// an unborn HEAD has no history
pub fn history(repo: &Repository, limit: Option<usize>) -> ProviderResult<Vec<CommitInfo>> {
    let start = match refs::head_id(repo)? {
        Some(id) => id,
        None => return Ok(Vec::new()),
    };

    let mut revwalk = repo.revwalk()?;
    revwalk.push(start.raw())?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    let mut commits = Vec::new();
    for oid in revwalk.take(limit.unwrap_or(usize::MAX)) {
        let commit = repo.find_commit(oid?)?;
        commits.push(CommitInfo::from_git2(&commit));
    }
    Ok(commits)
}

/// count commits reachable from HEAD
pub fn count(repo: &Repository) -> ProviderResult<usize> {
    let start = match refs::head_id(repo)? {
        Some(id) => id,
        None => return Ok(0),
    };

    let mut revwalk = repo.revwalk()?;
    revwalk.push(start.raw())?;
    let mut n = 0;
    for oid in revwalk {
        oid?;
        n += 1;
    }
    Ok(n)
}
