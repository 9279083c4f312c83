//! Configuration for the git provider.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::git::remote::Credentials;
use crate::git::types::{BranchName, GitSignature};
use crate::provider::{ProviderError, ProviderResult};

/// Default delay between the last commit and the push that follows it.
pub const DEFAULT_PUSH_DEBOUNCE: Duration = Duration::from_secs(5);

/// Configuration for opening a [`GitProvider`](super::GitProvider).
///
/// Deserializable from the `[git]` section of the storage config, or built
/// directly:
///
/// ```ignore
/// let config = GitProviderConfig::new("/var/lib/store")
///     .remote("git@github.com:org/store.git")
///     .branch("data")
///     .push_debounce(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitProviderConfig {
    /// Working tree of the repository.
    pub path: PathBuf,
    /// Commit author name. Empty means the default.
    pub author_name: String,
    /// Commit author email. Empty means the default.
    pub author_email: String,
    /// Remote to clone from and push to.
    pub remote_url: Option<String>,
    /// Branch to commit on and push to.
    pub branch: String,
    /// Quiet period after the last commit before pushing.
    #[serde(with = "humantime_serde")]
    pub push_debounce: Duration,
    /// Initialize a fresh repository when there is neither a repository
    /// nor a remote. Off unless explicitly enabled.
    pub allow_init: bool,
    #[serde(flatten)]
    pub auth: AuthConfig,
}

impl Default for GitProviderConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            author_name: String::new(),
            author_email: String::new(),
            remote_url: None,
            branch: BranchName::MAIN.to_string(),
            push_debounce: DEFAULT_PUSH_DEBOUNCE,
            allow_init: false,
            auth: AuthConfig::default(),
        }
    }
}

impl GitProviderConfig {
    /// Create a new configuration for the repository at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the commit author.
    pub fn author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    /// Set the remote URL.
    pub fn remote(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    /// Set the branch.
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Set the push debounce delay.
    pub fn push_debounce(mut self, delay: Duration) -> Self {
        self.push_debounce = delay;
        self
    }

    /// Set allow_init flag.
    pub fn allow_init(mut self, value: bool) -> Self {
        self.allow_init = value;
        self
    }

    /// Authenticate SSH remotes with a key file.
    pub fn ssh_key(mut self, path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        self.auth.ssh_key_path = Some(path.into());
        self.auth.ssh_key_passphrase = passphrase;
        self
    }

    /// Authenticate HTTP(S) remotes with basic auth.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth.username = Some(username.into());
        self.auth.password = Some(password.into());
        self
    }

    pub(crate) fn validate(&self) -> ProviderResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ProviderError::Config("git provider requires a repository path".to_string()));
        }
        if let Some(url) = &self.remote_url {
            if url.trim().is_empty() {
                return Err(ProviderError::Config("remote url is empty".to_string()));
            }
        }
        Ok(())
    }

    pub(crate) fn branch_name(&self) -> ProviderResult<BranchName> {
        BranchName::new(self.branch.as_str()).map_err(|e| ProviderError::Config(e.to_string()))
    }

    pub(crate) fn signature(&self) -> GitSignature {
        GitSignature::new(self.author_name.as_str(), self.author_email.as_str())
    }

    pub(crate) fn credentials(&self, url: &str) -> ProviderResult<Credentials> {
        Credentials::select(
            url,
            self.auth.ssh_key_path.as_deref(),
            self.auth.ssh_key_passphrase.as_deref(),
            self.auth.username.as_deref(),
            self.auth.password.as_deref(),
        )
    }
}

/// Authentication material for the remote.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub ssh_key_path: Option<PathBuf>,
    pub ssh_key_passphrase: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &Option<String>| s.as_ref().map(|_| "<redacted>");
        f.debug_struct("AuthConfig")
            .field("ssh_key_path", &self.ssh_key_path)
            .field("ssh_key_passphrase", &redact(&self.ssh_key_passphrase))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}
