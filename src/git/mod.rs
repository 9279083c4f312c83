//! git-backed provider
//!
//! every `write`/`delete` becomes one commit on the configured branch, made
//! synchronously under a single mutation lock. Replication to the remote is
//! asynchronous: commits are coalesced and pushed once writes go quiet, so
//! callers never wait on the network.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       GitProvider                           │
//! │   (FileProvider: read / write / exists / delete / list)     │
//! └─────────────────────────────────────────────────────────────┘
//!          │ mutation lock                      │ Committed / Flush
//!          ▼                                    ▼
//!   ┌─────────────┐                     ┌───────────────┐
//!   │   commit    │                     │  replicator   │
//!   │ (one per    │                     │ (debounce +   │
//!   │  mutation)  │                     │  push task)   │
//!   └─────────────┘                     └───────────────┘
//!          │                                    │
//!          ▼                                    ▼
//!   ┌─────────────┐   ┌─────────────┐    ┌─────────────┐
//!   │    refs     │   │ repository  │    │   remote    │
//!   │   (HEAD)    │   │ (open/clone │    │ (clone/push │
//!   │             │   │   /init)    │    │  /creds)    │
//!   └─────────────┘   └─────────────┘    └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use filestore::git::{GitProvider, GitProviderConfig};
//! use filestore::provider::FileProvider;
//!
//! let config = GitProviderConfig::new("./store")
//!     .remote("git@github.com:org/store.git")
//!     .author("filestore", "filestore@example.com");
//! let store = GitProvider::open(config).await?;
//!
//! store.write("sessions/42.json", br#"{"id":42}"#).await?;   // one commit
//! store.close().await?;                                       // flushes the push
//! ```

mod commit;
mod config;
mod provider;
mod refs;
mod remote;
mod replicator;
mod repository;
mod types;

pub use commit::{CommitInfo, CommitMessage};
pub use config::{AuthConfig, GitProviderConfig, DEFAULT_PUSH_DEBOUNCE};
pub use provider::{GitProvider, CLOSE_TIMEOUT};
pub use remote::{Credentials, PushOutcome, ORIGIN};
pub use replicator::ReplicationStatus;
pub use repository::RepositoryOrigin;
pub use types::{BranchName, CommitId, GitSignature, InvalidBranchError};
