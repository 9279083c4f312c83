//! HEAD and branch resolution.
//!
//! A freshly initialized or bootstrapped repository has an unborn HEAD: it
//! names a branch that has no commit yet. Everything here treats that as
//! "no commits" rather than an error.

use git2::{ErrorCode, Repository};

use crate::git::types::{BranchName, CommitId};
use crate::provider::{ProviderError, ProviderResult};

/// Get the commit HEAD points to, or `None` if HEAD is unborn.
pub fn head_commit(repo: &Repository) -> ProviderResult<Option<git2::Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if is_unborn(&e) => Ok(None),
        Err(e) => Err(ProviderError::Git(e)),
    }
}

/// Get the id of the HEAD commit, or `None` if HEAD is unborn.
pub fn head_id(repo: &Repository) -> ProviderResult<Option<CommitId>> {
    Ok(head_commit(repo)?.map(|commit| CommitId::new(commit.id())))
}

/// Get the local branch HEAD refers to, born or not.
pub fn head_branch(repo: &Repository) -> ProviderResult<BranchName> {
    let head = repo.find_reference("HEAD")?;
    let target = head
        .symbolic_target()
        .ok_or_else(|| ProviderError::Git(git2::Error::from_str("HEAD is detached")))?;
    let short = target.strip_prefix("refs/heads/").unwrap_or(target);
    BranchName::new(short).map_err(|e| ProviderError::Git(git2::Error::from_str(&e.to_string())))
}

/// Point an unborn HEAD at `branch` so the first commit lands there.
pub fn set_unborn_head(repo: &Repository, branch: &BranchName) -> ProviderResult<()> {
    if head_commit(repo)?.is_none() {
        repo.set_head(&branch.as_ref_path())?;
    }
    Ok(())
}

fn is_unborn(e: &git2::Error) -> bool {
    matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unborn_head() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        assert!(head_id(&repo).unwrap().is_none());

        let branch = BranchName::new("store").unwrap();
        set_unborn_head(&repo, &branch).unwrap();
        assert_eq!(head_branch(&repo).unwrap(), branch);
    }

    #[test]
    fn test_head_after_commit() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        set_unborn_head(&repo, &BranchName::main()).unwrap();

        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, "first", &tree, &[])
            .unwrap();

        assert_eq!(head_id(&repo).unwrap(), Some(CommitId::new(oid)));
        assert_eq!(head_branch(&repo).unwrap().as_str(), "main");
    }
}
