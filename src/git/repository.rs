//! Repository resolution.
//!
//! Opening a store walks a fixed ladder:
//!
//! 1. open the repository already at the path (reconciling `origin`)
//! 2. else clone the branch from the remote, if one is configured;
//!    an empty remote leaves an unborn HEAD on the branch (bootstrap)
//! 3. else init a fresh repository, if allowed
//! 4. else fail

use std::fmt;
use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{ErrorCode, Repository, RepositoryInitOptions};
use tracing::{info, warn};

use crate::git::refs;
use crate::git::remote::{self, RemoteLink};
use crate::git::types::BranchName;
use crate::provider::{ProviderError, ProviderResult};

/// How the repository came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryOrigin {
    /// it already existed at the path
    Opened,
    /// it was cloned from the remote
    Cloned,
    /// the remote was empty, so it was initialized and linked to it
    Bootstrapped,
    /// it was initialized locally with no remote
    Initialized,
}

impl fmt::Display for RepositoryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepositoryOrigin::Opened => "opened",
            RepositoryOrigin::Cloned => "cloned",
            RepositoryOrigin::Bootstrapped => "bootstrapped",
            RepositoryOrigin::Initialized => "initialized",
        };
        f.write_str(s)
    }
}

/// Open, clone or initialize the repository at `path`.
pub fn open_or_create(
    path: &Path,
    branch: &BranchName,
    link: Option<&RemoteLink>,
    allow_init: bool,
) -> ProviderResult<(Repository, RepositoryOrigin)> {
    match Repository::open(path) {
        Ok(repo) => {
            if repo.is_bare() {
                return Err(ProviderError::Config(format!(
                    "{} is a bare repository, a working tree is required",
                    path.display()
                )));
            }
            if let Some(link) = link {
                remote::ensure_origin(&repo, &link.url)?;
            }
            info!(path = %path.display(), "opened existing repository");
            return Ok((repo, RepositoryOrigin::Opened));
        }
        Err(e) if e.code() == ErrorCode::NotFound => {}
        Err(e) => return Err(ProviderError::Git(e)),
    }

    if let Some(link) = link {
        return clone_or_bootstrap(path, link);
    }

    if allow_init {
        let repo = init(path, branch)?;
        info!(path = %path.display(), branch = %branch, "initialized new repository");
        return Ok((repo, RepositoryOrigin::Initialized));
    }

    Err(ProviderError::RepositoryUnavailable(path.to_path_buf()))
}

fn clone_or_bootstrap(path: &Path, link: &RemoteLink) -> ProviderResult<(Repository, RepositoryOrigin)> {
    let existed = path.exists();
    let repo = remote::clone(&link.url, path, &link.credentials).map_err(|source| ProviderError::Clone {
        url: link.url.clone(),
        source,
    })?;

    if repo.is_empty()? {
        refs::set_unborn_head(&repo, &link.branch)?;
        remote::ensure_origin(&repo, &link.url)?;
        info!(url = %link.url, branch = %link.branch, "remote is empty, bootstrapped new repository");
        return Ok((repo, RepositoryOrigin::Bootstrapped));
    }

    match checkout_remote_branch(&repo, link) {
        Ok(()) => {
            info!(url = %link.url, branch = %link.branch, path = %path.display(), "cloned repository");
            Ok((repo, RepositoryOrigin::Cloned))
        }
        Err(source) => {
            drop(repo);
            if let Err(e) = remove_clone(path, existed) {
                warn!(path = %path.display(), error = %e, "could not clean up failed clone");
            }
            Err(ProviderError::Clone {
                url: link.url.clone(),
                source,
            })
        }
    }
}

/// Make the link's branch the checked-out local branch.
fn checkout_remote_branch(repo: &Repository, link: &RemoteLink) -> Result<(), git2::Error> {
    let tracking = repo.find_reference(&link.tracking_ref()).map_err(|e| match e.code() {
        ErrorCode::NotFound => git2::Error::from_str(&format!("remote has no branch '{}'", link.branch)),
        _ => e,
    })?;
    let commit = tracking.peel_to_commit()?;

    let local = link.branch.as_ref_path();
    if repo.find_reference(&local).is_err() {
        repo.branch(link.branch.as_str(), &commit, false)?;
    }
    repo.set_head(&local)?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))
}

fn remove_clone(path: &Path, keep_dir: bool) -> std::io::Result<()> {
    if !keep_dir {
        return std::fs::remove_dir_all(path);
    }
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn init(path: &Path, branch: &BranchName) -> ProviderResult<Repository> {
    let mut opts = RepositoryInitOptions::new();
    opts.mkpath(true).initial_head(branch.as_str());
    let repo = Repository::init_opts(path, &opts)?;
    // re-initializing over leftovers keeps their HEAD
    refs::set_unborn_head(&repo, branch)?;
    Ok(repo)
}
