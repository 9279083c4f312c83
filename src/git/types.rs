//! core type-safe wrappers around git primitives for the git provider.

use std::fmt;

use git2::Oid;

/// Git commit identifier.
///
/// The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// the default branch name
    pub const MAIN: &'static str = "main";

    /// create a new BranchName
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidBranchError> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidBranchError(name));
        }
        // git is more permissive, we only need to keep refspecs well-formed
        let malformed = name.contains("..")
            || name.ends_with('/')
            || name.starts_with('/')
            || name.starts_with('-')
            || name.ends_with(".lock")
            || name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, ':' | '~' | '^' | '?' | '*' | '[' | '\\'));
        if malformed {
            return Err(InvalidBranchError(name));
        }
        Ok(Self(name))
    }

    /// the default branch
    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    /// get the full ref path (e.g., "refs/heads/main")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// get the short name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BranchName {
    fn default() -> Self {
        Self::main()
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// error type for malformed branch names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBranchError(pub String);

impl fmt::Display for InvalidBranchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid branch name: '{}'", self.0)
    }
}

impl std::error::Error for InvalidBranchError {}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    pub const DEFAULT_NAME: &'static str = "filestore";
    pub const DEFAULT_EMAIL: &'static str = "filestore@localhost";

    /// create a new signature, falling back to the defaults for empty fields
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        let name = name.into();
        let email = email.into();
        Self {
            name: if name.trim().is_empty() {
                Self::DEFAULT_NAME.to_string()
            } else {
                name
            },
            email: if email.trim().is_empty() {
                Self::DEFAULT_EMAIL.to_string()
            } else {
                email
            },
        }
    }

    /// convert to git2::Signature
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME, Self::DEFAULT_EMAIL)
    }
}
