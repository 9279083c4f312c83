//! Remote link, credentials and transport operations.
//!
//! Everything that talks to the network lives here: cloning and pushing.
//! None of it is called while the provider's mutation lock is held.

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};

use git2::build::RepoBuilder;
use git2::{Cred, CredentialType, FetchOptions, PushOptions, RemoteCallbacks, Repository};
use tracing::{debug, warn};

use crate::git::refs;
use crate::git::types::BranchName;
use crate::provider::{ProviderError, ProviderResult};

/// the only remote the provider manages
pub const ORIGIN: &str = "origin";

/// give up after this many rejected credential attempts in one operation
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Authentication attached to remote operations.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// public remote, or one authenticated out of band
    #[default]
    None,
    /// explicit private key file
    SshKey {
        key_path: PathBuf,
        passphrase: Option<String>,
    },
    /// keys held by a running ssh-agent
    SshAgent,
    /// HTTP basic credentials
    UserPass { username: String, password: String },
}

impl Credentials {
    /// Choose the authentication method for `url`.
    ///
    /// SSH remotes use the key file if one is given, else the agent. HTTP(S)
    /// remotes use basic auth when both username and password are present.
    /// Anything else carries no credentials.
    pub fn select(
        url: &str,
        ssh_key_path: Option<&Path>,
        ssh_key_passphrase: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> ProviderResult<Self> {
        match RemoteScheme::of(url) {
            RemoteScheme::Ssh => match ssh_key_path {
                Some(key_path) => {
                    if !key_path.is_file() {
                        return Err(ProviderError::Credentials(format!(
                            "ssh key not found: {}",
                            key_path.display()
                        )));
                    }
                    Ok(Credentials::SshKey {
                        key_path: key_path.to_path_buf(),
                        passphrase: ssh_key_passphrase
                            .filter(|p| !p.is_empty())
                            .map(str::to_string),
                    })
                }
                None => Ok(Credentials::SshAgent),
            },
            RemoteScheme::Http => match (username, password) {
                (Some(user), Some(pass)) if !user.is_empty() => Ok(Credentials::UserPass {
                    username: user.to_string(),
                    password: pass.to_string(),
                }),
                _ => Ok(Credentials::None),
            },
            RemoteScheme::Other => Ok(Credentials::None),
        }
    }

    fn to_cred(&self, username_from_url: Option<&str>, allowed: CredentialType) -> Result<Cred, git2::Error> {
        let ssh_user = username_from_url.unwrap_or("git");
        match self {
            Credentials::SshKey {
                key_path,
                passphrase,
            } if allowed.is_ssh_key() => {
                Cred::ssh_key(ssh_user, None, key_path, passphrase.as_deref())
            }
            Credentials::SshAgent if allowed.is_ssh_key() => Cred::ssh_key_from_agent(ssh_user),
            Credentials::UserPass { username, password } if allowed.is_user_pass_plaintext() => {
                Cred::userpass_plaintext(username, password)
            }
            _ if allowed.is_username() => Cred::username(ssh_user),
            _ => Cred::default(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::SshKey { key_path, .. } => f
                .debug_struct("SshKey")
                .field("key_path", key_path)
                .field("passphrase", &"<redacted>")
                .finish(),
            Credentials::SshAgent => write!(f, "SshAgent"),
            Credentials::UserPass { username, .. } => f
                .debug_struct("UserPass")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteScheme {
    Ssh,
    Http,
    Other,
}

impl RemoteScheme {
    fn of(url: &str) -> Self {
        if url.starts_with("ssh://") || url.starts_with("git+ssh://") {
            return RemoteScheme::Ssh;
        }
        if url.starts_with("https://") || url.starts_with("http://") {
            return RemoteScheme::Http;
        }
        // scp-like syntax: user@host:path
        if !url.contains("://") {
            if let Some((host, _)) = url.split_once(':') {
                if host.contains('@') && !host.contains('/') {
                    return RemoteScheme::Ssh;
                }
            }
        }
        RemoteScheme::Other
    }
}

/// The configured replication target.
#[derive(Debug, Clone)]
pub struct RemoteLink {
    pub url: String,
    pub branch: BranchName,
    pub credentials: Credentials,
}

impl RemoteLink {
    /// The push refspec for the given local branch.
    pub fn refspec(&self, local: &BranchName) -> String {
        format!("{}:{}", local.as_ref_path(), self.branch.as_ref_path())
    }

    /// The remote-tracking ref for the link's branch.
    pub fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", ORIGIN, self.branch)
    }
}

/// Result of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// the remote branch was updated
    Pushed,
    /// the remote already had our HEAD
    UpToDate,
}

fn callbacks<'a>(credentials: &'a Credentials) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0;
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed: credentials rejected"));
        }
        credentials.to_cred(username_from_url, allowed)
    });
    callbacks
}

/// Clone `url` into `path`, checking out whatever the remote's HEAD names.
///
/// An empty remote clones fine and yields an empty repository; picking the
/// configured branch is left to the caller.
pub fn clone(url: &str, path: &Path, credentials: &Credentials) -> Result<Repository, git2::Error> {
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks(credentials));
    RepoBuilder::new().fetch_options(fetch).clone(url, path)
}

/// Make sure `origin` exists. An existing `origin` is left untouched.
pub fn ensure_origin(repo: &Repository, url: &str) -> ProviderResult<()> {
    match repo.find_remote(ORIGIN) {
        Ok(existing) => {
            if existing.url() != Some(url) {
                warn!(
                    configured = existing.url().unwrap_or(""),
                    requested = url,
                    "origin already exists with a different url, keeping it"
                );
            }
            Ok(())
        }
        Err(e) if e.code() == git2::ErrorCode::NotFound => {
            repo.remote(ORIGIN, url)?;
            debug!(url, "added origin remote");
            Ok(())
        }
        Err(e) => Err(ProviderError::Git(e)),
    }
}

/// Push HEAD's branch to the link's branch on `origin`.
///
/// Rejections reported by the remote are errors. A remote that already
/// has our HEAD is `UpToDate` and no transfer happens.
pub fn push(repo: &Repository, link: &RemoteLink) -> ProviderResult<PushOutcome> {
    let head = match refs::head_id(repo)? {
        Some(id) => id,
        None => return Ok(PushOutcome::UpToDate),
    };
    if let Ok(tracking) = repo.refname_to_id(&link.tracking_ref()) {
        if tracking == head.raw() {
            return Ok(PushOutcome::UpToDate);
        }
    }

    let local = refs::head_branch(repo)?;
    let refspec = link.refspec(&local);
    let mut remote = repo.find_remote(ORIGIN)?;

    let rejection: RefCell<Option<String>> = RefCell::new(None);
    {
        let mut callbacks = callbacks(&link.credentials);
        callbacks.push_update_reference(|refname, status| {
            if let Some(msg) = status {
                *rejection.borrow_mut() = Some(format!("{}: {}", refname, msg));
            }
            Ok(())
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        remote.push(&[refspec.as_str()], Some(&mut options))?;
    }

    if let Some(message) = rejection.into_inner() {
        return Err(ProviderError::Git(git2::Error::from_str(&format!(
            "push rejected: {}",
            message
        ))));
    }

    debug!(refspec = %refspec, head = %head.short(), "pushed");
    Ok(PushOutcome::Pushed)
}
