//! sync
//!
//! The repository state reconciliation engine.
//!
//! # Architecture
//!
//! [`Workspace`] orchestrates one synchronization cycle over a repository
//! that an unrelated foreground process (the assignment downloader) may be
//! writing into concurrently:
//!
//! 1. sanitize the index so the merge cannot discard staged work,
//! 2. pull with the conflict policy (local on-disk content wins),
//! 3. stage-all, change-check, commit, divergence-check, push.
//!
//! The status matrix is recomputed fresh before each decision point; no
//! snapshot is cached across steps, since the working directory can change
//! between steps.
//!
//! # Concurrency
//!
//! I/O-bound per-path operations are issued as independent tasks and
//! awaited together (barrier synchronization, not a pipeline). Index
//! writes are serialized twice over: an in-process async mutex and the
//! cross-process [`IndexLock`], because the index is a single file and
//! concurrent rewrites would corrupt it. Sanitization fully completes
//! before fetch begins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info};

use crate::auth::CredentialProvider;
use crate::git::{Author, Git, GitError, MergeOutcome, StatusEntry, WorkdirState};

mod lock;
mod sanitize;

pub use lock::{IndexLock, DEFAULT_LOCK_TIMEOUT};

/// The branch the single-branch workflow defaults to.
pub const DEFAULT_BRANCH: &str = "main";

/// The reconciliation engine for one repository root.
///
/// Cheap to clone; clones share the in-process index gate.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Repository root directory.
    root: PathBuf,
    /// In-process serialization of index writes.
    index_gate: Arc<Mutex<()>>,
}

impl Workspace {
    /// Open the workspace at a repository root.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if the root is not inside a repository
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GitError> {
        let root = root.into();
        Git::open(&root)?;
        Ok(Self {
            root,
            index_gate: Arc::new(Mutex::new(())),
        })
    }

    /// Clone a remote repository and open a workspace over it.
    pub async fn clone_repository(
        root: impl Into<PathBuf>,
        url: &str,
        branch: &str,
        credentials: &CredentialProvider,
        single_branch: bool,
    ) -> Result<Self, GitError> {
        let root = root.into();
        let target = root.clone();
        let url = url.to_string();
        let branch = branch.to_string();
        let credentials = credentials.clone();
        run_blocking(move || {
            Git::clone(&target, &url, &branch, &credentials, single_branch).map(|_| ())
        })
        .await?;
        Self::open(root)
    }

    /// The repository root this workspace operates on.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // Status Matrix and Change Detection
    // =========================================================================

    /// Compute a fresh status matrix, optionally restricted to a checked
    /// path (a directory expands to its subtree, a file to itself).
    ///
    /// # Errors
    ///
    /// - [`GitError::Filesystem`] if the checked path cannot be stat'ed
    pub async fn status_matrix(
        &self,
        checked_path: Option<PathBuf>,
    ) -> Result<Vec<StatusEntry>, GitError> {
        self.with_repo(move |git| {
            let filter = match &checked_path {
                Some(path) => Some(git.path_filter(path)?),
                None => None,
            };
            git.status_matrix(filter.as_ref())
        })
        .await
    }

    /// Whether any path under the optional checked path deviates from the
    /// fully-clean triple (present, identical-to-head, identical-to-head).
    pub async fn is_workdir_changed(
        &self,
        checked_path: Option<PathBuf>,
    ) -> Result<bool, GitError> {
        let matrix = self.status_matrix(checked_path).await?;
        Ok(matrix.iter().any(|entry| !entry.is_clean()))
    }

    /// Whether any of the listed subtrees holds uncommitted work.
    ///
    /// Each subtree is evaluated independently and concurrently; the
    /// result is the logical OR.
    pub async fn has_changes_to_commit(
        &self,
        checked_paths: &[PathBuf],
    ) -> Result<bool, GitError> {
        let mut tasks = Vec::with_capacity(checked_paths.len());
        for path in checked_paths {
            let workspace = self.clone();
            let path = path.clone();
            tasks.push(task::spawn(async move {
                workspace.is_workdir_changed(Some(path)).await
            }));
        }

        let mut changed = false;
        let mut first_err = None;
        for handle in tasks {
            match handle.await {
                Ok(Ok(result)) => changed |= result,
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    first_err.get_or_insert(GitError::Internal {
                        message: format!("change check task failed: {e}"),
                    });
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }

    // =========================================================================
    // Index Sanitizer
    // =========================================================================

    /// Reset every staged record an incoming merge could silently discard,
    /// restoring those index entries to mirror HEAD.
    ///
    /// Returns the reset paths in deterministic (sorted) order. An empty
    /// selection is not an error. All resets are durably reflected in the
    /// index before this returns; the merge's checkout reads the index
    /// synchronously.
    pub async fn sanitize_index(&self) -> Result<Vec<String>, GitError> {
        let matrix = self.status_matrix(None).await?;
        let selected = sanitize::select(&matrix);
        if selected.is_empty() {
            return Ok(selected);
        }

        debug!(paths = ?selected, "resetting staged entries before merge");
        self.index_barrier(selected.clone(), |git, path| git.reset_index_entry(path))
            .await?;
        Ok(selected)
    }

    // =========================================================================
    // Pull Orchestration
    // =========================================================================

    /// Fetch and merge a remote branch without touching staged work first.
    ///
    /// A working-directory conflict propagates as
    /// [`GitError::CheckoutConflict`]; nothing is swallowed here.
    pub async fn pull(
        &self,
        branch: &str,
        author: &Author,
        credentials: &CredentialProvider,
    ) -> Result<MergeOutcome, GitError> {
        let branch = branch.to_string();
        let author = author.clone();
        let credentials = credentials.clone();
        self.with_repo(move |git| git.fetch_and_merge(&branch, &author, &credentials, false))
            .await
    }

    /// The preserving pull: sanitize, then fetch and merge with the
    /// conflict-tolerance policy.
    ///
    /// Paths whose on-disk content conflicts with the incoming commit keep
    /// their pre-pull content and the result is tagged
    /// [`MergeOutcome::ConflictPreserved`]; the branch pointer advances
    /// either way. Conflicted paths are left for the caller's next
    /// sanitize/add cycle, and nothing distinguishes a clean pull from a
    /// preserved-conflict pull beyond the tag - callers needing per-path
    /// detail recompute the status matrix. Every other failure kind
    /// propagates unchanged.
    pub async fn pull_preserving_stage(
        &self,
        branch: &str,
        author: &Author,
        credentials: &CredentialProvider,
    ) -> Result<MergeOutcome, GitError> {
        // Causal dependency: every reset must be durable before fetch
        // begins.
        self.sanitize_index().await?;

        let branch_name = branch.to_string();
        let author = author.clone();
        let credentials = credentials.clone();
        let outcome = self
            .with_repo(move |git| git.fetch_and_merge(&branch_name, &author, &credentials, true))
            .await?;

        info!(branch, ?outcome, "pull complete");
        Ok(outcome)
    }

    // =========================================================================
    // Index Mutator ("add all")
    // =========================================================================

    /// Mirror working-directory presence into the staged snapshot for
    /// every path: absent paths stage a removal, all others stage the
    /// current on-disk content.
    ///
    /// Per-path operations run as independent tasks behind the index
    /// locks; all complete before this returns.
    pub async fn add_all(&self) -> Result<(), GitError> {
        let matrix = self.status_matrix(None).await?;
        let pending: Vec<(String, bool)> = matrix
            .into_iter()
            // A clean entry's staged record already mirrors its on-disk
            // content; staging it again is a no-op.
            .filter(|entry| !entry.is_clean())
            .map(|entry| {
                let remove = entry.workdir == WorkdirState::Absent;
                (entry.path, remove)
            })
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        debug!(count = pending.len(), "staging working-directory state");
        self.index_barrier(pending, |git, (path, remove)| {
            if *remove {
                git.stage_remove(path)
            } else {
                git.stage_add(path)
            }
        })
        .await
    }

    // =========================================================================
    // Commit, Push, Divergence
    // =========================================================================

    /// Commit the staged snapshot. Returns the new commit id.
    pub async fn commit(&self, author: &Author, message: &str) -> Result<String, GitError> {
        let author = author.clone();
        let message = message.to_string();
        self.with_repo(move |git| git.commit(&author, &message)).await
    }

    /// Push a branch to the default remote.
    pub async fn push(
        &self,
        branch: &str,
        credentials: &CredentialProvider,
    ) -> Result<(), GitError> {
        let branch = branch.to_string();
        let credentials = credentials.clone();
        self.with_repo(move |git| git.push(&branch, &credentials)).await
    }

    /// Whether the local branch's history differs from its remote-tracking
    /// counterpart.
    ///
    /// Compares the full ordered histories (same commits, same order, same
    /// recorded data), not just the tips. A remote-tracking ref that does
    /// not exist yet means the remote has never seen this history, so the
    /// local side counts as ahead.
    pub async fn is_local_history_ahead(
        &self,
        branch: &str,
        remote: &str,
    ) -> Result<bool, GitError> {
        let local_ref = format!("refs/heads/{branch}");
        let remote_ref = format!("refs/remotes/{remote}/{branch}");

        let local_task = self.with_repo(move |git| git.history(&local_ref));
        let remote_task = self.with_repo(move |git| git.history(&remote_ref));
        let (local, remote_history) = tokio::join!(local_task, remote_task);

        let local = local?;
        let remote_history = match remote_history {
            Ok(history) => history,
            Err(GitError::RefNotFound { .. }) => return Ok(true),
            Err(e) => return Err(e),
        };

        Ok(local != remote_history)
    }

    // =========================================================================
    // Branch and Remote Passthroughs
    // =========================================================================

    /// Check whether a branch exists locally or on a remote.
    pub async fn branch_exists(
        &self,
        name: &str,
        remote: Option<&str>,
    ) -> Result<bool, GitError> {
        let name = name.to_string();
        let remote = remote.map(str::to_string);
        self.with_repo(move |git| git.branch_exists(&name, remote.as_deref()))
            .await
    }

    /// List branches: local ones, or the remote-tracking ones of a remote.
    pub async fn list_branches(&self, remote: Option<&str>) -> Result<Vec<String>, GitError> {
        let remote = remote.map(str::to_string);
        self.with_repo(move |git| git.list_branches(remote.as_deref()))
            .await
    }

    /// Rename a local branch, optionally checking it out afterwards.
    pub async fn rename_branch(
        &self,
        old_name: &str,
        new_name: &str,
        checkout: bool,
    ) -> Result<(), GitError> {
        let old_name = old_name.to_string();
        let new_name = new_name.to_string();
        self.with_repo(move |git| git.rename_branch(&old_name, &new_name, checkout))
            .await
    }

    /// Configure a local branch to track its counterpart on a remote.
    pub async fn set_branch_tracking(
        &self,
        branch: &str,
        remote: &str,
    ) -> Result<(), GitError> {
        let branch = branch.to_string();
        let remote = remote.to_string();
        self.with_repo(move |git| git.set_branch_tracking(&branch, &remote))
            .await
    }

    /// Delete a remote.
    pub async fn delete_remote(&self, name: &str) -> Result<(), GitError> {
        let name = name.to_string();
        self.with_repo(move |git| git.delete_remote(&name)).await
    }

    /// Set the URL of a remote.
    pub async fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        let name = name.to_string();
        let url = url.to_string();
        self.with_repo(move |git| git.set_remote_url(&name, &url)).await
    }

    /// Get the current branch name, if on a branch.
    pub async fn current_branch(&self) -> Result<Option<String>, GitError> {
        self.with_repo(|git| git.current_branch()).await
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Run a read or single-shot operation against a freshly opened
    /// repository on the blocking pool.
    async fn with_repo<T, F>(&self, op: F) -> Result<T, GitError>
    where
        F: FnOnce(Git) -> Result<T, GitError> + Send + 'static,
        T: Send + 'static,
    {
        let root = self.root.clone();
        run_blocking(move || {
            let git = Git::open(&root)?;
            op(git)
        })
        .await
    }

    /// Issue one index mutation per item as independent concurrent tasks
    /// and await them all (barrier).
    ///
    /// Each task holds the in-process gate and the cross-process
    /// [`IndexLock`] for the duration of its write. A failed task fails
    /// the barrier after every task has settled; partial completion is
    /// surfaced as that error, not recovered.
    async fn index_barrier<I, F>(&self, items: Vec<I>, op: F) -> Result<(), GitError>
    where
        I: Send + 'static,
        F: Fn(&Git, &I) -> Result<(), GitError> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let mut tasks = Vec::with_capacity(items.len());

        for item in items {
            let gate = Arc::clone(&self.index_gate);
            let op = Arc::clone(&op);
            let root = self.root.clone();
            tasks.push(task::spawn(async move {
                let guard = gate.lock_owned().await;
                run_blocking(move || {
                    let _guard = guard;
                    let git = Git::open(&root)?;
                    let _lock = IndexLock::acquire(git.git_dir(), DEFAULT_LOCK_TIMEOUT)?;
                    op(&git, &item)
                })
                .await
            }));
        }

        let mut first_err = None;
        for handle in tasks {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    first_err.get_or_insert(GitError::Internal {
                        message: format!("index task failed: {e}"),
                    });
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Run a closure on the blocking pool, flattening the join error.
async fn run_blocking<T, F>(op: F) -> Result<T, GitError>
where
    F: FnOnce() -> Result<T, GitError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(op)
        .await
        .map_err(|e| GitError::Internal {
            message: format!("blocking task failed: {e}"),
        })?
}
