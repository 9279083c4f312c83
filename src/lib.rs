//! filestore - pluggable whole-file storage
//!
//! Application stores (sessions, skills, memory, artifacts) read and write
//! whole files through the [`provider::FileProvider`] trait. The backend is
//! chosen by configuration: a local directory, an object bucket, or a git
//! repository where every mutation is a commit and the branch is pushed to
//! a shared remote in the background.
//!
//! # Example
//!
//! ```no_run
//! use filestore::config::StorageConfig;
//! use filestore::manager::StorageManager;
//! use filestore::provider::FileProvider;
//!
//! # async fn run() -> filestore::provider::ProviderResult<()> {
//! let config = StorageConfig::load("filestore.toml")?;
//! let manager = StorageManager::from_config(&config).await?;
//!
//! let sessions = manager.sessions()?;
//! sessions.write("42.json", br#"{"id":42}"#).await?;
//! assert!(sessions.exists("42.json").await?);
//!
//! manager.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod git;
pub mod logging;
pub mod manager;
pub mod provider;
