//! git::interface
//!
//! Git interface implementation using git2.
//!
//! This module provides the **single doorway** to all Git operations in
//! stagesync. All repository reads and writes flow through this interface,
//! which provides structured results and normalizes errors into typed
//! failure categories. No other module should import `git2` directly
//! (the sibling [`super::status`] module shares the doorway).
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants so callers can
//! distinguish the failure kinds the synchronization policy depends on:
//!
//! - [`GitError::CheckoutConflict`]: applying fetched content would
//!   overwrite local modifications
//! - [`GitError::Authentication`]: the remote rejected our credentials
//! - [`GitError::Network`]: transport-level failure talking to the remote
//! - [`GitError::Filesystem`]: a path could not be read or stat'ed
//!
//! # Example
//!
//! ```ignore
//! use stagesync::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! let matrix = git.status_matrix(None)?;
//! for entry in &matrix {
//!     println!("{} {:?}", entry.path, entry.stage);
//! }
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use crate::auth::CredentialProvider;

use super::status::{self, PathFilter, StatusEntry};

/// The remote every operation in the single-remote workflow targets.
pub const DEFAULT_REMOTE: &str = "origin";

/// Errors from Git operations.
///
/// The taxonomy is exposed directly to callers (never wrapped opaquely) so
/// that the pull-preserving-stage flow can swallow exactly
/// [`GitError::CheckoutConflict`] and propagate everything else unchanged.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Requested remote does not exist.
    #[error("remote not found: {name}")]
    RemoteNotFound {
        /// The remote that was not found
        name: String,
    },

    /// Applying fetched content to the working directory would overwrite
    /// local modifications not reflected in the target commit.
    #[error("checkout would overwrite local changes ({} path(s))", paths.len())]
    CheckoutConflict {
        /// The conflicted repository-relative paths, when known.
        paths: Vec<String>,
    },

    /// Merging two committed histories produced content conflicts.
    #[error("merge produced content conflicts ({} path(s))", paths.len())]
    MergeConflict {
        /// The conflicted repository-relative paths.
        paths: Vec<String>,
    },

    /// The remote rejected our credentials.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Description of the failure
        message: String,
    },

    /// Transport-level failure talking to the remote.
    #[error("network failure: {message}")]
    Network {
        /// Description of the failure
        message: String,
    },

    /// A path could not be read or stat'ed.
    #[error("filesystem error at {path}: {message}")]
    Filesystem {
        /// The path involved
        path: PathBuf,
        /// Description of the failure
        message: String,
    },

    /// Timed out waiting for the cross-process index lock.
    #[error("timed out waiting for the index lock at {path}")]
    LockTimeout {
        /// Path to the lock file
        path: PathBuf,
    },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    pub(crate) fn from_git2(err: git2::Error, context: &str) -> Self {
        match (err.class(), err.code()) {
            (git2::ErrorClass::Checkout, git2::ErrorCode::Conflict) => {
                GitError::CheckoutConflict { paths: Vec::new() }
            }
            (_, git2::ErrorCode::Auth) => GitError::Authentication {
                message: format!("{}: {}", context, err.message()),
            },
            (git2::ErrorClass::Net, _)
            | (git2::ErrorClass::Http, _)
            | (git2::ErrorClass::Ssh, _)
            | (git2::ErrorClass::Ssl, _) => GitError::Network {
                message: format!("{}: {}", context, err.message()),
            },
            (git2::ErrorClass::Os, _) | (git2::ErrorClass::Filesystem, _) => {
                GitError::Filesystem {
                    path: PathBuf::from(context),
                    message: err.message().to_string(),
                }
            }
            (_, git2::ErrorCode::NotFound) => GitError::RefNotFound {
                refname: context.to_string(),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::from_git2(err, "git")
    }
}

/// Author identity used for commits and synthetic merge commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    /// Author name
    pub name: String,
    /// Author email
    pub email: String,
}

impl Author {
    /// Create an author identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    fn signature(&self) -> Result<git2::Signature<'static>, GitError> {
        git2::Signature::now(&self.name, &self.email)
            .map_err(|e| GitError::from_git2(e, "signature"))
    }
}

/// One commit in an ordered history, with all recorded data the divergence
/// detector compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// The commit id (full hex).
    pub id: String,
    /// Parent commit ids, in order.
    pub parent_ids: Vec<String>,
    /// Full commit message.
    pub message: String,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// Author timestamp.
    pub author_time: chrono::DateTime<chrono::Utc>,
}

/// Result of a fetch-and-merge cycle.
///
/// The one expected conflict case is a value, not an error: callers and
/// tests assert on the tag instead of catching exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The local branch already contained the fetched history.
    UpToDate,
    /// The local branch pointer was fast-forwarded and the working
    /// directory updated cleanly.
    FastForwarded,
    /// A synthetic merge commit joined the two histories.
    Merged,
    /// The branch pointer advanced, but at least one path kept its local
    /// on-disk content instead of the incoming committed content.
    ConflictPreserved,
}

impl MergeOutcome {
    /// Whether local on-disk content was kept over incoming content.
    pub fn preserved_local_content(self) -> bool {
        matches!(self, MergeOutcome::ConflictPreserved)
    }
}

/// The Git interface.
///
/// This is the **single point of interaction** with Git. All repository
/// reads and writes flow through this interface; the reconciliation engine
/// never touches `git2` directly.
pub struct Git {
    /// The underlying git2 repository
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening, Cloning, and Info
    // =========================================================================

    /// Open a repository at the given path.
    ///
    /// Uses `git2::Repository::discover` to find the repository root, so
    /// `path` can be any directory within the repository.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;

        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }

        Ok(Self { repo })
    }

    /// Clone a repository.
    ///
    /// With `single_branch`, the created remote fetches only the requested
    /// branch; otherwise the default refspec applies. Credentials are
    /// injected exactly as for fetch and push.
    pub fn clone(
        path: &Path,
        url: &str,
        branch: &str,
        credentials: &CredentialProvider,
        single_branch: bool,
    ) -> Result<Self, GitError> {
        let mut fetch_opts = git2::FetchOptions::new();
        fetch_opts.remote_callbacks(remote_callbacks(credentials));

        let mut builder = git2::build::RepoBuilder::new();
        builder.branch(branch).fetch_options(fetch_opts);
        if single_branch {
            let refspec = format!("+refs/heads/{branch}:refs/remotes/{DEFAULT_REMOTE}/{branch}");
            builder.remote_create(move |repo, name, url| {
                repo.remote_with_fetch(name, url, &refspec)
            });
        }

        let repo = builder
            .clone(url, path)
            .map_err(|e| GitError::from_git2(e, url))?;
        Ok(Self { repo })
    }

    /// Get direct access to the .git directory path.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Get the working directory path.
    pub fn workdir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or(GitError::BareRepo)
    }

    // =========================================================================
    // Status Matrix
    // =========================================================================

    /// Build a path filter for a checked path, expanding directories to
    /// subtree prefixes and files to exact matches.
    ///
    /// # Errors
    ///
    /// - [`GitError::Filesystem`] if the checked path cannot be stat'ed
    pub fn path_filter(&self, checked: &Path) -> Result<PathFilter, GitError> {
        PathFilter::new(self.workdir()?, checked)
    }

    /// Compute the tri-snapshot status matrix, optionally restricted to a
    /// filter. Read-only over all three snapshots.
    pub fn status_matrix(
        &self,
        filter: Option<&PathFilter>,
    ) -> Result<Vec<StatusEntry>, GitError> {
        status::compute(&self.repo, filter)
    }

    // =========================================================================
    // Per-Path Index Mutations
    // =========================================================================
    //
    // Each of these loads the index, applies one path's change, and writes
    // the index back. Callers serialize concurrent invocations; the index
    // is a single file and concurrent full-file rewrites would corrupt it.

    /// Restore a path's staged entry to mirror the committed snapshot.
    ///
    /// If HEAD has the path, the staged entry is rewritten to the committed
    /// blob; if HEAD does not have it, the staged record is dropped. Either
    /// way the staged snapshot stops claiming content a merge could
    /// silently discard.
    pub fn reset_index_entry(&self, path: &str) -> Result<(), GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;

        let head_entry = match self.head_tree()? {
            Some(tree) => tree
                .get_path(Path::new(path))
                .ok()
                .filter(|e| e.kind() == Some(git2::ObjectType::Blob)),
            None => None,
        };

        match head_entry {
            Some(entry) => {
                let blob = self
                    .repo
                    .find_blob(entry.id())
                    .map_err(|e| GitError::from_git2(e, path))?;
                let staged = git2::IndexEntry {
                    ctime: git2::IndexTime::new(0, 0),
                    mtime: git2::IndexTime::new(0, 0),
                    dev: 0,
                    ino: 0,
                    mode: entry.filemode() as u32,
                    uid: 0,
                    gid: 0,
                    file_size: blob.size() as u32,
                    id: entry.id(),
                    flags: 0,
                    flags_extended: 0,
                    path: path.as_bytes().to_vec(),
                };
                index
                    .add(&staged)
                    .map_err(|e| GitError::from_git2(e, path))?;
            }
            None => match index.remove_path(Path::new(path)) {
                Ok(()) => {}
                Err(e) if e.code() == git2::ErrorCode::NotFound => {}
                Err(e) => return Err(GitError::from_git2(e, path)),
            },
        }

        index.write().map_err(|e| GitError::from_git2(e, path))
    }

    /// Stage the current on-disk content of a path.
    pub fn stage_add(&self, path: &str) -> Result<(), GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        index
            .add_path(Path::new(path))
            .map_err(|e| GitError::from_git2(e, path))?;
        index.write().map_err(|e| GitError::from_git2(e, path))
    }

    /// Stage the removal of a path.
    pub fn stage_remove(&self, path: &str) -> Result<(), GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        match index.remove_path(Path::new(path)) {
            Ok(()) => {}
            Err(e) if e.code() == git2::ErrorCode::NotFound => {}
            Err(e) => return Err(GitError::from_git2(e, path)),
        }
        index.write().map_err(|e| GitError::from_git2(e, path))
    }

    // =========================================================================
    // Commit and History
    // =========================================================================

    /// Commit the staged snapshot to the current branch.
    ///
    /// Returns the new commit id. Works on an unborn branch (first commit).
    pub fn commit(&self, author: &Author, message: &str) -> Result<String, GitError> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        let tree_id = index
            .write_tree()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| GitError::from_git2(e, "tree"))?;

        let parent = match self.repo.head() {
            Ok(head) => Some(
                head.peel_to_commit()
                    .map_err(|e| GitError::from_git2(e, "HEAD"))?,
            ),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                None
            }
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let sig = author.signature()?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .map_err(|e| GitError::from_git2(e, "commit"))?;
        Ok(oid.to_string())
    }

    /// Resolve a full refname to its commit id (hex).
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<String, GitError> {
        let oid = self
            .repo
            .refname_to_id(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;
        Ok(oid.to_string())
    }

    /// The ordered commit history reachable from a ref, tip first.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn history(&self, refname: &str) -> Result<Vec<CommitRecord>, GitError> {
        let tip = self
            .repo
            .refname_to_id(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let mut walk = self
            .repo
            .revwalk()
            .map_err(|e| GitError::from_git2(e, refname))?;
        walk.push(tip)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let mut records = Vec::new();
        for id in walk {
            let id = id.map_err(|e| GitError::from_git2(e, refname))?;
            records.push(self.commit_record(id)?);
        }
        Ok(records)
    }

    /// Build the full record for one commit.
    fn commit_record(&self, id: git2::Oid) -> Result<CommitRecord, GitError> {
        let commit = self
            .repo
            .find_commit(id)
            .map_err(|e| GitError::from_git2(e, &id.to_string()))?;

        let author = commit.author();
        let author_time = chrono::DateTime::from_timestamp(author.when().seconds(), 0)
            .unwrap_or(chrono::DateTime::UNIX_EPOCH)
            .with_timezone(&chrono::Utc);

        Ok(CommitRecord {
            id: id.to_string(),
            parent_ids: commit.parent_ids().map(|p| p.to_string()).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            author_time,
        })
    }

    // =========================================================================
    // Fetch, Merge, and Push
    // =========================================================================

    /// Fetch a branch from the default remote and merge it into the local
    /// branch, updating the working directory.
    ///
    /// The checkout never force-overwrites working-directory modifications.
    /// With `preserve_local` set, paths whose on-disk content conflicts
    /// with the incoming commit keep their on-disk content, every other
    /// path is updated, the branch pointer advances regardless, and the
    /// result is tagged [`MergeOutcome::ConflictPreserved`]. Without
    /// `preserve_local`, the same situation raises
    /// [`GitError::CheckoutConflict`] and the branch pointer is left
    /// untouched.
    pub fn fetch_and_merge(
        &self,
        branch: &str,
        author: &Author,
        credentials: &CredentialProvider,
        preserve_local: bool,
    ) -> Result<MergeOutcome, GitError> {
        self.fetch(branch, credentials)?;

        let remote_ref = format!("refs/remotes/{DEFAULT_REMOTE}/{branch}");
        let remote_oid = self
            .repo
            .refname_to_id(&remote_ref)
            .map_err(|e| GitError::from_git2(e, &remote_ref))?;
        let annotated = self
            .repo
            .find_annotated_commit(remote_oid)
            .map_err(|e| GitError::from_git2(e, &remote_ref))?;

        let (analysis, _preference) = self
            .repo
            .merge_analysis(&[&annotated])
            .map_err(|e| GitError::from_git2(e, branch))?;

        if analysis.is_up_to_date() {
            return Ok(MergeOutcome::UpToDate);
        }
        if analysis.is_unborn() || analysis.is_fast_forward() {
            return self.fast_forward(branch, remote_oid, preserve_local);
        }
        self.merge_commit(branch, &annotated, remote_oid, author, preserve_local)
    }

    /// Fetch one branch from the default remote.
    fn fetch(&self, branch: &str, credentials: &CredentialProvider) -> Result<(), GitError> {
        let mut remote = self.repo.find_remote(DEFAULT_REMOTE).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RemoteNotFound {
                    name: DEFAULT_REMOTE.to_string(),
                }
            } else {
                GitError::from_git2(e, DEFAULT_REMOTE)
            }
        })?;

        let mut opts = git2::FetchOptions::new();
        opts.remote_callbacks(remote_callbacks(credentials));

        let refspec = format!("refs/heads/{branch}:refs/remotes/{DEFAULT_REMOTE}/{branch}");
        remote
            .fetch(&[refspec.as_str()], Some(&mut opts), None)
            .map_err(|e| GitError::from_git2(e, branch))
    }

    /// Fast-forward the local branch to `target` and update the working
    /// directory with a safe checkout.
    fn fast_forward(
        &self,
        branch: &str,
        target: git2::Oid,
        preserve_local: bool,
    ) -> Result<MergeOutcome, GitError> {
        let commit = self
            .repo
            .find_commit(target)
            .map_err(|e| GitError::from_git2(e, &target.to_string()))?;
        let tree = commit
            .tree()
            .map_err(|e| GitError::from_git2(e, &target.to_string()))?;

        let preserved = self.checkout_tree(tree.as_object(), preserve_local)?;

        let local_ref = format!("refs/heads/{branch}");
        match self.repo.find_reference(&local_ref) {
            Ok(mut reference) => {
                reference
                    .set_target(target, "stagesync: fast-forward")
                    .map_err(|e| GitError::from_git2(e, &local_ref))?;
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                self.repo
                    .reference(&local_ref, target, true, "stagesync: fast-forward")
                    .map_err(|e| GitError::from_git2(e, &local_ref))?;
            }
            Err(e) => return Err(GitError::from_git2(e, &local_ref)),
        }
        self.repo
            .set_head(&local_ref)
            .map_err(|e| GitError::from_git2(e, &local_ref))?;

        if preserved.is_empty() {
            Ok(MergeOutcome::FastForwarded)
        } else {
            Ok(MergeOutcome::ConflictPreserved)
        }
    }

    /// Merge a fetched commit into the local branch with a synthetic merge
    /// commit authored by `author`.
    fn merge_commit(
        &self,
        branch: &str,
        annotated: &git2::AnnotatedCommit<'_>,
        remote_oid: git2::Oid,
        author: &Author,
        preserve_local: bool,
    ) -> Result<MergeOutcome, GitError> {
        let (mut checkout, conflicts) = conflict_tracking_checkout(preserve_local);
        let mut merge_opts = git2::MergeOptions::new();

        if let Err(e) = self
            .repo
            .merge(&[annotated], Some(&mut merge_opts), Some(&mut checkout))
        {
            let _ = self.repo.cleanup_state();
            if e.class() == git2::ErrorClass::Checkout
                && e.code() == git2::ErrorCode::Conflict
            {
                return Err(GitError::CheckoutConflict {
                    paths: conflicts.borrow().clone(),
                });
            }
            return Err(GitError::from_git2(e, branch));
        }

        let mut index = self
            .repo
            .index()
            .map_err(|e| GitError::from_git2(e, "index"))?;

        // Content conflicts between the two committed histories are not the
        // swallowed category; they propagate.
        if index.has_conflicts() {
            let paths = index
                .conflicts()
                .map_err(|e| GitError::from_git2(e, branch))?
                .filter_map(|c| c.ok())
                .filter_map(|c| c.our.or(c.their))
                .filter_map(|entry| String::from_utf8(entry.path).ok())
                .collect();
            let _ = self.repo.cleanup_state();
            return Err(GitError::MergeConflict { paths });
        }

        let tree_id = index
            .write_tree()
            .map_err(|e| GitError::from_git2(e, "index"))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| GitError::from_git2(e, "tree"))?;

        let local_ref = format!("refs/heads/{branch}");
        let local_oid = self
            .repo
            .refname_to_id(&local_ref)
            .map_err(|e| GitError::from_git2(e, &local_ref))?;
        let local = self
            .repo
            .find_commit(local_oid)
            .map_err(|e| GitError::from_git2(e, &local_ref))?;
        let remote = self
            .repo
            .find_commit(remote_oid)
            .map_err(|e| GitError::from_git2(e, &remote_oid.to_string()))?;

        let sig = author.signature()?;
        let message = format!("Merge branch '{branch}' of {DEFAULT_REMOTE}");
        self.repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&local, &remote])
            .map_err(|e| GitError::from_git2(e, branch))?;
        self.repo
            .cleanup_state()
            .map_err(|e| GitError::from_git2(e, branch))?;

        if conflicts.borrow().is_empty() {
            Ok(MergeOutcome::Merged)
        } else {
            Ok(MergeOutcome::ConflictPreserved)
        }
    }

    /// Run a safe checkout of `target`, returning the paths whose local
    /// content was preserved.
    ///
    /// Without `preserve_local`, any would-be conflict aborts the checkout
    /// with [`GitError::CheckoutConflict`]; with it, safe updates are
    /// applied and conflicted paths are left untouched.
    fn checkout_tree(
        &self,
        target: &git2::Object<'_>,
        preserve_local: bool,
    ) -> Result<Vec<String>, GitError> {
        let (mut opts, conflicts) = conflict_tracking_checkout(preserve_local);

        match self.repo.checkout_tree(target, Some(&mut opts)) {
            Ok(()) => {
                let preserved = conflicts.borrow().clone();
                Ok(preserved)
            }
            Err(e) if e.code() == git2::ErrorCode::Conflict => Err(GitError::CheckoutConflict {
                paths: conflicts.borrow().clone(),
            }),
            Err(e) => Err(GitError::from_git2(e, "checkout")),
        }
    }

    /// Push a branch to the default remote.
    pub fn push(&self, branch: &str, credentials: &CredentialProvider) -> Result<(), GitError> {
        let mut remote = self.repo.find_remote(DEFAULT_REMOTE).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RemoteNotFound {
                    name: DEFAULT_REMOTE.to_string(),
                }
            } else {
                GitError::from_git2(e, DEFAULT_REMOTE)
            }
        })?;

        let mut callbacks = remote_callbacks(credentials);
        let rejection: Rc<RefCell<Option<String>>> = Rc::default();
        let sink = Rc::clone(&rejection);
        callbacks.push_update_reference(move |refname, status| {
            if let Some(message) = status {
                *sink.borrow_mut() = Some(format!("{refname}: {message}"));
            }
            Ok(())
        });

        let mut opts = git2::PushOptions::new();
        opts.remote_callbacks(callbacks);

        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        remote
            .push(&[refspec.as_str()], Some(&mut opts))
            .map_err(|e| GitError::from_git2(e, branch))?;

        if let Some(message) = rejection.borrow_mut().take() {
            return Err(GitError::Network { message });
        }
        Ok(())
    }

    // =========================================================================
    // Branch and Remote Management
    // =========================================================================

    /// Get the current branch name, if on a branch.
    ///
    /// Returns `None` if HEAD is detached or unborn.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(GitError::from_git2(e, "HEAD")),
        };

        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(Some(name.to_string()));
            }
        }

        Ok(None) // Detached HEAD
    }

    /// List branches: local ones, or the remote-tracking ones of a remote.
    ///
    /// Remote branch names come back without the `<remote>/` prefix.
    pub fn list_branches(&self, remote: Option<&str>) -> Result<Vec<String>, GitError> {
        let branch_type = if remote.is_some() {
            git2::BranchType::Remote
        } else {
            git2::BranchType::Local
        };
        let branches = self
            .repo
            .branches(Some(branch_type))
            .map_err(|e| GitError::from_git2(e, "branches"))?;

        let mut names = Vec::new();
        for branch in branches {
            let (branch, _) = branch.map_err(|e| GitError::from_git2(e, "branches"))?;
            let Some(name) = branch.name().ok().flatten() else {
                continue;
            };
            match remote {
                Some(remote_name) => {
                    if let Some(short) = name.strip_prefix(&format!("{remote_name}/")) {
                        if short != "HEAD" {
                            names.push(short.to_string());
                        }
                    }
                }
                None => names.push(name.to_string()),
            }
        }
        Ok(names)
    }

    /// Check whether a branch exists locally or on a remote.
    pub fn branch_exists(&self, name: &str, remote: Option<&str>) -> Result<bool, GitError> {
        Ok(self.list_branches(remote)?.iter().any(|b| b == name))
    }

    /// Rename a local branch, optionally checking it out afterwards.
    pub fn rename_branch(
        &self,
        old_name: &str,
        new_name: &str,
        checkout: bool,
    ) -> Result<(), GitError> {
        let mut branch = self
            .repo
            .find_branch(old_name, git2::BranchType::Local)
            .map_err(|e| GitError::from_git2(e, old_name))?;
        branch
            .rename(new_name, false)
            .map_err(|e| GitError::from_git2(e, new_name))?;

        if checkout {
            let refname = format!("refs/heads/{new_name}");
            self.repo
                .set_head(&refname)
                .map_err(|e| GitError::from_git2(e, &refname))?;
        }
        Ok(())
    }

    /// Configure a local branch to track the same-named branch on a remote.
    pub fn set_branch_tracking(&self, branch: &str, remote: &str) -> Result<(), GitError> {
        let mut config = self
            .repo
            .config()
            .map_err(|e| GitError::from_git2(e, "config"))?;
        config
            .set_str(&format!("branch.{branch}.remote"), remote)
            .map_err(|e| GitError::from_git2(e, branch))?;
        config
            .set_str(
                &format!("branch.{branch}.merge"),
                &format!("refs/heads/{branch}"),
            )
            .map_err(|e| GitError::from_git2(e, branch))?;
        Ok(())
    }

    /// Delete a remote.
    pub fn delete_remote(&self, name: &str) -> Result<(), GitError> {
        self.repo.remote_delete(name).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RemoteNotFound {
                    name: name.to_string(),
                }
            } else {
                GitError::from_git2(e, name)
            }
        })
    }

    /// Set the URL of a remote.
    pub fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.repo
            .remote_set_url(name, url)
            .map_err(|e| GitError::from_git2(e, name))
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// The HEAD tree, or `None` for an unborn branch.
    fn head_tree(&self) -> Result<Option<git2::Tree<'_>>, GitError> {
        match self.repo.head() {
            Ok(head) => {
                let tree = head
                    .peel_to_tree()
                    .map_err(|e| GitError::from_git2(e, "HEAD"))?;
                Ok(Some(tree))
            }
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(GitError::from_git2(e, "HEAD")),
        }
    }
}

/// Build remote callbacks injecting the provider's credentials.
///
/// With a token the callbacks present `(username = "oauth2", password =
/// token)` to the transport; without one the default credential machinery
/// applies (anonymous for public remotes).
fn remote_callbacks(credentials: &CredentialProvider) -> git2::RemoteCallbacks<'_> {
    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, _allowed| {
        match credentials.userpass() {
            Some((username, password)) => git2::Cred::userpass_plaintext(username, password),
            None => match username_from_url {
                Some(name) => git2::Cred::username(name),
                None => git2::Cred::default(),
            },
        }
    });
    callbacks
}

/// A safe checkout builder that records conflicted paths via the notify
/// callback. With `preserve_local`, safe updates are applied even when
/// conflicts exist and the conflicted paths keep their on-disk content.
fn conflict_tracking_checkout(
    preserve_local: bool,
) -> (
    git2::build::CheckoutBuilder<'static>,
    Rc<RefCell<Vec<String>>>,
) {
    let conflicts: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = Rc::clone(&conflicts);

    let mut opts = git2::build::CheckoutBuilder::new();
    opts.safe();
    opts.notify_on(git2::CheckoutNotificationType::CONFLICT);
    opts.notify(move |_kind, path, _baseline, _target, _workdir| {
        if let Some(path) = path {
            sink.borrow_mut().push(path.display().to_string());
        }
        true
    });
    if preserve_local {
        opts.allow_conflicts(true);
    }

    (opts, conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod git_error {
        use super::*;

        #[test]
        fn error_variants_constructible() {
            let _ = GitError::NotARepo {
                path: PathBuf::from("/tmp"),
            };
            let _ = GitError::BareRepo;
            let _ = GitError::RefNotFound {
                refname: "refs/heads/main".to_string(),
            };
            let _ = GitError::RemoteNotFound {
                name: "origin".to_string(),
            };
            let _ = GitError::CheckoutConflict {
                paths: vec!["a.txt".to_string()],
            };
            let _ = GitError::MergeConflict {
                paths: vec!["a.txt".to_string()],
            };
            let _ = GitError::Authentication {
                message: "rejected".to_string(),
            };
            let _ = GitError::Network {
                message: "timed out".to_string(),
            };
            let _ = GitError::Filesystem {
                path: PathBuf::from("missing"),
                message: "no such file".to_string(),
            };
            let _ = GitError::LockTimeout {
                path: PathBuf::from(".git/stagesync.lock"),
            };
            let _ = GitError::Internal {
                message: "oops".to_string(),
            };
        }

        #[test]
        fn checkout_conflict_mapping() {
            let raw = git2::Error::new(
                git2::ErrorCode::Conflict,
                git2::ErrorClass::Checkout,
                "1 conflict prevents checkout",
            );
            let err = GitError::from_git2(raw, "checkout");
            assert!(matches!(err, GitError::CheckoutConflict { .. }));
        }

        #[test]
        fn auth_mapping() {
            let raw = git2::Error::new(
                git2::ErrorCode::Auth,
                git2::ErrorClass::Http,
                "remote authentication required",
            );
            let err = GitError::from_git2(raw, "fetch");
            assert!(matches!(err, GitError::Authentication { .. }));
        }

        #[test]
        fn network_mapping() {
            let raw = git2::Error::new(
                git2::ErrorCode::GenericError,
                git2::ErrorClass::Net,
                "could not resolve host",
            );
            let err = GitError::from_git2(raw, "fetch");
            assert!(matches!(err, GitError::Network { .. }));
        }

        #[test]
        fn not_found_mapping() {
            let raw = git2::Error::new(
                git2::ErrorCode::NotFound,
                git2::ErrorClass::Reference,
                "reference not found",
            );
            let err = GitError::from_git2(raw, "refs/heads/main");
            assert!(
                matches!(err, GitError::RefNotFound { refname } if refname == "refs/heads/main")
            );
        }

        #[test]
        fn error_display_formatting() {
            let err = GitError::CheckoutConflict {
                paths: vec!["a.txt".to_string(), "b.txt".to_string()],
            };
            assert!(err.to_string().contains("overwrite local changes"));
            assert!(err.to_string().contains("2 path(s)"));
        }
    }

    mod merge_outcome {
        use super::*;

        #[test]
        fn only_conflict_preserved_keeps_local_content() {
            assert!(MergeOutcome::ConflictPreserved.preserved_local_content());
            assert!(!MergeOutcome::UpToDate.preserved_local_content());
            assert!(!MergeOutcome::FastForwarded.preserved_local_content());
            assert!(!MergeOutcome::Merged.preserved_local_content());
        }
    }

    mod author {
        use super::*;

        #[test]
        fn signature_from_identity() {
            let author = Author::new("Test User", "test@example.com");
            let sig = author.signature().expect("signature");
            assert_eq!(sig.name(), Some("Test User"));
            assert_eq!(sig.email(), Some("test@example.com"));
        }
    }
}
