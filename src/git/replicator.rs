//! Debounced, coalesced replication to the remote.
//!
//! One task per provider owns the debounce deadline. Every commit sends a
//! `Committed` signal, which re-arms the deadline; the push only runs once
//! the deadline passes with no further signal, so a burst of writes costs
//! a single push. `Flush` pushes immediately if anything is pending, replies
//! and stops the task.
//!
//! ```text
//!   write ─► schedule() ─► [pending = true] ─► Committed ─┐
//!                                                        ▼
//!                         ┌──────────── replicator task ─────────────┐
//!                         │ deadline = now + delay   (on Committed)  │
//!                         │ deadline passed ─► take pending ─► push  │
//!                         │ Flush ─► take pending ─► push ─► reply   │
//!                         └──────────────────────────────────────────┘
//! ```
//!
//! The pending flag and the counters sit behind their own short-lived lock,
//! never held across a push.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use git2::Repository;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::git::remote::{self, PushOutcome, RemoteLink};
use crate::provider::{ProviderError, ProviderResult};

/// Snapshot of the replication state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationStatus {
    /// local commits exist that no push has picked up yet
    pub pending: bool,
    /// pushes started
    pub attempts: u64,
    /// pushes that succeeded (including "already up to date")
    pub successes: u64,
    /// pushes that failed
    pub failures: u64,
    /// message of the most recent failure, cleared by the next success
    pub last_error: Option<String>,
    /// when the last push succeeded
    pub last_success: Option<DateTime<Utc>>,
}

enum Signal {
    Committed,
    Flush(oneshot::Sender<ProviderResult<()>>),
}

/// Handle to the replicator task.
pub(crate) struct Replicator {
    tx: mpsc::UnboundedSender<Signal>,
    task: Mutex<Option<JoinHandle<()>>>,
    state: Arc<Mutex<ReplicationStatus>>,
}

impl Replicator {
    /// Start the replicator task. Must be called within a tokio runtime.
    pub fn spawn(workdir: PathBuf, link: RemoteLink, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ReplicationStatus::default()));
        let worker = Worker {
            workdir,
            link,
            delay,
            state: state.clone(),
        };
        let task = tokio::spawn(worker.run(rx));

        Self {
            tx,
            task: Mutex::new(Some(task)),
            state,
        }
    }

    /// Note a new local commit and restart the debounce window.
    pub fn schedule(&self) {
        self.state.lock().pending = true;
        if self.tx.send(Signal::Committed).is_err() {
            warn!("replicator has stopped, commit will not be pushed");
        } else {
            trace!("push scheduled");
        }
    }

    /// Current replication state.
    pub fn status(&self) -> ReplicationStatus {
        self.state.lock().clone()
    }

    /// Flush any pending push and stop the task, waiting at most `timeout`.
    ///
    /// A push already in flight is waited for before the flush runs. Only
    /// the first call does any work.
    pub async fn shutdown(&self, timeout: Duration) -> ProviderResult<()> {
        let task = match self.task.lock().take() {
            Some(task) => task,
            None => return Ok(()),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        // the task may already have exited; joining it below still works
        let _ = self.tx.send(Signal::Flush(reply_tx));

        let wait = async move {
            let flushed = reply_rx.await.unwrap_or(Ok(()));
            if let Err(e) = task.await {
                return Err(ProviderError::from(e));
            }
            flushed
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                error!(?timeout, "replicator did not finish before the shutdown deadline");
                Err(ProviderError::ShutdownTimeout(timeout))
            }
        }
    }
}

struct Worker {
    workdir: PathBuf,
    link: RemoteLink,
    delay: Duration,
    state: Arc<Mutex<ReplicationStatus>>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Signal>) {
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                signal = rx.recv() => match signal {
                    Some(Signal::Committed) => {
                        deadline = Some(Instant::now() + self.delay);
                    }
                    Some(Signal::Flush(reply)) => {
                        let result = match self.take_pending() {
                            true => self.push().await.map_err(|message| ProviderError::FlushFailed {
                                remote: self.link.url.clone(),
                                message,
                            }),
                            false => Ok(()),
                        };
                        let _ = reply.send(result);
                        debug!("replicator stopped");
                        return;
                    }
                    None => {
                        if self.state.lock().pending {
                            warn!("provider dropped without close, unpushed commits remain local");
                        }
                        return;
                    }
                },

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    if self.take_pending() {
                        // failures are recorded and logged, never returned to writers
                        let _ = self.push().await;
                    }
                }
            }
        }
    }

    /// Clear the pending flag, reporting whether it was set.
    fn take_pending(&self) -> bool {
        std::mem::take(&mut self.state.lock().pending)
    }

    async fn push(&self) -> Result<(), String> {
        self.state.lock().attempts += 1;

        let workdir = self.workdir.clone();
        let link = self.link.clone();
        let result = tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&workdir)?;
            remote::push(&repo, &link)
        })
        .await
        .map_err(ProviderError::from)
        .and_then(|r| r);

        let mut state = self.state.lock();
        match result {
            Ok(outcome) => {
                state.successes += 1;
                state.last_error = None;
                state.last_success = Some(Utc::now());
                match outcome {
                    PushOutcome::Pushed => {
                        info!(remote = %self.link.url, branch = %self.link.branch, "pushed to remote")
                    }
                    PushOutcome::UpToDate => debug!(remote = %self.link.url, "remote already up to date"),
                }
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                state.failures += 1;
                state.last_error = Some(message.clone());
                error!(remote = %self.link.url, error = %message, "push failed");
                Err(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::commit::{self, Staged};
    use crate::git::remote::Credentials;
    use crate::git::types::{BranchName, GitSignature};
    use tempfile::TempDir;

    fn unreachable_link(dir: &TempDir) -> RemoteLink {
        RemoteLink {
            url: dir.path().join("missing.git").to_string_lossy().into_owned(),
            branch: BranchName::main(),
            credentials: Credentials::None,
        }
    }

    /// A work repository with one commit and `origin` pointing at `link`.
    fn committed_workdir(dir: &TempDir, link: &RemoteLink) -> PathBuf {
        let workdir = dir.path().join("work");
        let repo = Repository::init(&workdir).unwrap();
        crate::git::refs::set_unborn_head(&repo, &link.branch).unwrap();
        remote::ensure_origin(&repo, &link.url).unwrap();

        std::fs::write(workdir.join("a.txt"), b"a").unwrap();
        commit::commit_change(&repo, Staged::Add("a.txt"), &GitSignature::default())
            .unwrap()
            .unwrap();
        workdir
    }

    #[tokio::test]
    async fn test_shutdown_without_pending_is_ok() {
        let dir = TempDir::new().unwrap();
        let replicator =
            Replicator::spawn(dir.path().to_path_buf(), unreachable_link(&dir), Duration::from_secs(60));

        replicator.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(replicator.status().attempts, 0);

        // second shutdown is a no-op
        replicator.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_push_is_recorded_not_raised() {
        let dir = TempDir::new().unwrap();
        let link = unreachable_link(&dir);
        let workdir = committed_workdir(&dir, &link);
        let replicator = Replicator::spawn(workdir, link, Duration::from_millis(20));

        replicator.schedule();
        assert!(replicator.status().pending);

        let deadline = Instant::now() + Duration::from_secs(5);
        while replicator.status().failures == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = replicator.status();
        assert_eq!(status.attempts, 1);
        assert_eq!(status.failures, 1);
        assert_eq!(status.successes, 0);
        assert!(status.last_error.is_some());
        assert!(status.last_success.is_none());
        assert!(!status.pending);

        // nothing pending any more, so shutdown has nothing to report
        replicator.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_failure_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let link = unreachable_link(&dir);
        let workdir = committed_workdir(&dir, &link);
        let replicator = Replicator::spawn(workdir, link, Duration::from_secs(60));

        replicator.schedule();
        let err = replicator.shutdown(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ProviderError::FlushFailed { .. }));

        let status = replicator.status();
        assert_eq!(status.attempts, 1);
        assert_eq!(status.failures, 1);
    }

    #[tokio::test]
    async fn test_shutdown_deadline_is_enforced() {
        // a task stuck mid-push: the flush request is never answered
        let (tx, _rx) = mpsc::unbounded_channel();
        let replicator = Replicator {
            tx,
            task: Mutex::new(Some(tokio::spawn(std::future::pending::<()>()))),
            state: Arc::new(Mutex::new(ReplicationStatus::default())),
        };
        replicator.schedule();

        let timeout = Duration::from_millis(50);
        let err = replicator.shutdown(timeout).await.unwrap_err();
        assert!(matches!(err, ProviderError::ShutdownTimeout(d) if d == timeout));
        assert!(err.is_retriable());

        // the deadline already fired, a second call does not wait again
        replicator.shutdown(timeout).await.unwrap();
    }
}
