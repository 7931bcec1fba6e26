//! git::status
//!
//! Tri-snapshot status matrix computation.
//!
//! For every path observed in any of the three repository snapshots (the
//! committed HEAD tree, the staged index, and the on-disk working tree)
//! this module produces one [`StatusEntry`] classifying the path against
//! each snapshot. Everything above the Git interface reasons about
//! repository state exclusively through these entries; nothing caches them
//! across steps.
//!
//! # Code values
//!
//! Each state carries a stable numeric code. The full mapping:
//!
//! | snapshot | code | meaning                      |
//! |----------|------|------------------------------|
//! | head     | 0    | absent                       |
//! | head     | 1    | present                      |
//! | workdir  | 0    | absent                       |
//! | workdir  | 1    | identical to HEAD            |
//! | workdir  | 2    | modified or added            |
//! | stage    | 0    | absent                       |
//! | stage    | 1    | identical to HEAD            |
//! | stage    | 2    | matches workdir modification |
//! | stage    | 3    | differs from both            |
//!
//! # Comparison semantics
//!
//! Classification is content-based: blob ids for HEAD and the index, a
//! byte-exact blob hash of the on-disk file for the working tree. CRLF
//! filters are not applied to the on-disk hash; repositories using content
//! filters would report spurious modifications.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path};

use git2::{ObjectType, Repository, Status, StatusOptions, TreeWalkMode, TreeWalkResult};

use super::interface::GitError;

/// Presence of a path in the committed HEAD snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadState {
    /// Path does not exist in the last commit.
    Absent,
    /// Path exists in the last commit.
    Present,
}

impl HeadState {
    /// Stable numeric code for this state (see module table).
    pub fn code(self) -> u8 {
        match self {
            HeadState::Absent => 0,
            HeadState::Present => 1,
        }
    }
}

/// On-disk content of a path relative to the committed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkdirState {
    /// No file on disk.
    Absent,
    /// On-disk content matches the committed content.
    Unchanged,
    /// On-disk content differs from the committed content, or the path is
    /// new on disk.
    Changed,
}

impl WorkdirState {
    /// Stable numeric code for this state (see module table).
    pub fn code(self) -> u8 {
        match self {
            WorkdirState::Absent => 0,
            WorkdirState::Unchanged => 1,
            WorkdirState::Changed => 2,
        }
    }
}

/// Staged content of a path relative to the other two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// No staged record for the path.
    Absent,
    /// Staged content matches the committed content.
    Unchanged,
    /// Staged content matches the on-disk modification.
    MatchesWorkdir,
    /// Staged content matches neither the committed nor the on-disk
    /// content.
    DiffersFromBoth,
}

impl StageState {
    /// Stable numeric code for this state (see module table).
    pub fn code(self) -> u8 {
        match self {
            StageState::Absent => 0,
            StageState::Unchanged => 1,
            StageState::MatchesWorkdir => 2,
            StageState::DiffersFromBoth => 3,
        }
    }

    /// Whether the staged record holds content not yet committed.
    pub fn is_staged_modification(self) -> bool {
        matches!(self, StageState::MatchesWorkdir | StageState::DiffersFromBoth)
    }
}

/// One row of the status matrix: a repository-relative path classified
/// against the three snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Repository-relative path, unique within one matrix.
    pub path: String,
    /// Presence in the committed snapshot.
    pub head: HeadState,
    /// On-disk content relative to the committed snapshot.
    pub workdir: WorkdirState,
    /// Staged content relative to the other snapshots.
    pub stage: StageState,
}

impl StatusEntry {
    /// A fully clean path: committed, unmodified on disk, nothing staged
    /// beyond the committed content.
    pub fn is_clean(&self) -> bool {
        self.head == HeadState::Present
            && self.workdir == WorkdirState::Unchanged
            && self.stage == StageState::Unchanged
    }

    /// Classify a path from the blob ids observed in each snapshot.
    fn classify(
        path: String,
        head: Option<git2::Oid>,
        stage: Option<git2::Oid>,
        workdir: Option<git2::Oid>,
    ) -> Self {
        let head_state = if head.is_some() {
            HeadState::Present
        } else {
            HeadState::Absent
        };

        let workdir_state = match workdir {
            None => WorkdirState::Absent,
            w if w == head => WorkdirState::Unchanged,
            _ => WorkdirState::Changed,
        };

        let stage_state = match stage {
            None => StageState::Absent,
            s if s == head => StageState::Unchanged,
            s if s == workdir => StageState::MatchesWorkdir,
            _ => StageState::DiffersFromBoth,
        };

        StatusEntry {
            path,
            head: head_state,
            workdir: workdir_state,
            stage: stage_state,
        }
    }
}

/// A path restriction for matrix computation.
///
/// Built from a checked path via [`PathFilter::new`]: a directory expands to
/// a prefix match over its subtree, a file matches exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathFilter {
    /// Match exactly one repository-relative path.
    Exact(String),
    /// Match every path under a directory (prefix including the trailing
    /// separator; the empty prefix matches everything).
    Subtree(String),
}

impl PathFilter {
    /// Build a filter for a checked path under `workdir`.
    ///
    /// # Errors
    ///
    /// [`GitError::Filesystem`] if the checked path cannot be stat'ed.
    pub fn new(workdir: &Path, checked: &Path) -> Result<Self, GitError> {
        let full = workdir.join(checked);
        let meta = fs::symlink_metadata(&full).map_err(|e| GitError::Filesystem {
            path: full.clone(),
            message: e.to_string(),
        })?;

        let rel = rel_string(checked);
        if meta.is_dir() {
            if rel.is_empty() {
                Ok(PathFilter::Subtree(String::new()))
            } else {
                Ok(PathFilter::Subtree(format!("{rel}/")))
            }
        } else {
            Ok(PathFilter::Exact(rel))
        }
    }

    /// Whether a repository-relative path falls inside this filter.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathFilter::Exact(p) => path == p,
            PathFilter::Subtree(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Normalize a repository-relative path to forward-slash form, dropping
/// `.` components.
fn rel_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

/// Compute the status matrix for a repository.
///
/// Enumerates the union of paths across the HEAD tree, the index, and the
/// untracked (non-ignored) working-tree files, then classifies each path.
/// Read-only; entries come back sorted by path so logging is deterministic.
pub(crate) fn compute(
    repo: &Repository,
    filter: Option<&PathFilter>,
) -> Result<Vec<StatusEntry>, GitError> {
    let workdir = repo.workdir().ok_or(GitError::BareRepo)?;

    let head_tree = head_tree(repo)?;
    let index = repo
        .index()
        .map_err(|e| GitError::from_git2(e, "index"))?;

    let mut paths: BTreeSet<String> = BTreeSet::new();

    if let Some(tree) = &head_tree {
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    let path = format!("{dir}{name}");
                    if filter.map_or(true, |f| f.matches(&path)) {
                        paths.insert(path);
                    }
                }
            }
            TreeWalkResult::Ok
        })
        .map_err(|e| GitError::from_git2(e, "HEAD tree"))?;
    }

    for entry in index.iter() {
        if let Ok(path) = String::from_utf8(entry.path.clone()) {
            if filter.map_or(true, |f| f.matches(&path)) {
                paths.insert(path);
            }
        }
    }

    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .exclude_submodules(true);
    let statuses = repo
        .statuses(Some(&mut opts))
        .map_err(|e| GitError::from_git2(e, "status"))?;
    for entry in statuses.iter() {
        if entry.status().contains(Status::WT_NEW) {
            if let Some(path) = entry.path() {
                if filter.map_or(true, |f| f.matches(path)) {
                    paths.insert(path.to_string());
                }
            }
        }
    }

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let head_id = head_tree.as_ref().and_then(|tree| {
            tree.get_path(Path::new(&path))
                .ok()
                .filter(|e| e.kind() == Some(ObjectType::Blob))
                .map(|e| e.id())
        });
        let stage_id = index.get_path(Path::new(&path), 0).map(|e| e.id);
        let workdir_id = hash_workdir(workdir, &path)?;
        entries.push(StatusEntry::classify(path, head_id, stage_id, workdir_id));
    }

    Ok(entries)
}

/// The HEAD tree, or `None` for an unborn branch.
fn head_tree(repo: &Repository) -> Result<Option<git2::Tree<'_>>, GitError> {
    match repo.head() {
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

/// Blob hash of the on-disk content at `rel`, or `None` if nothing is on
/// disk there.
fn hash_workdir(workdir: &Path, rel: &str) -> Result<Option<git2::Oid>, GitError> {
    let full = workdir.join(rel);
    match fs::symlink_metadata(&full) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = fs::read_link(&full).map_err(|e| GitError::Filesystem {
                path: full.clone(),
                message: e.to_string(),
            })?;
            let target = target.to_string_lossy();
            let oid = git2::Oid::hash_object(ObjectType::Blob, target.as_bytes())
                .map_err(|e| GitError::from_git2(e, rel))?;
            Ok(Some(oid))
        }
        Ok(meta) if meta.is_file() => {
            let oid = git2::Oid::hash_file(ObjectType::Blob, &full)
                .map_err(|e| GitError::from_git2(e, rel))?;
            Ok(Some(oid))
        }
        // A directory shadowing a tracked path has no blob content.
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GitError::Filesystem {
            path: full,
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> git2::Oid {
        let raw = [byte; 20];
        git2::Oid::from_bytes(&raw).unwrap()
    }

    mod codes {
        use super::super::*;

        #[test]
        fn head_codes_match_table() {
            assert_eq!(HeadState::Absent.code(), 0);
            assert_eq!(HeadState::Present.code(), 1);
        }

        #[test]
        fn workdir_codes_match_table() {
            assert_eq!(WorkdirState::Absent.code(), 0);
            assert_eq!(WorkdirState::Unchanged.code(), 1);
            assert_eq!(WorkdirState::Changed.code(), 2);
        }

        #[test]
        fn stage_codes_match_table() {
            assert_eq!(StageState::Absent.code(), 0);
            assert_eq!(StageState::Unchanged.code(), 1);
            assert_eq!(StageState::MatchesWorkdir.code(), 2);
            assert_eq!(StageState::DiffersFromBoth.code(), 3);
        }
    }

    mod classify {
        use super::*;

        #[test]
        fn clean_tracked_file() {
            let entry =
                StatusEntry::classify("a.txt".into(), Some(oid(1)), Some(oid(1)), Some(oid(1)));
            assert_eq!(entry.head, HeadState::Present);
            assert_eq!(entry.workdir, WorkdirState::Unchanged);
            assert_eq!(entry.stage, StageState::Unchanged);
            assert!(entry.is_clean());
        }

        #[test]
        fn unstaged_edit() {
            let entry =
                StatusEntry::classify("a.txt".into(), Some(oid(1)), Some(oid(1)), Some(oid(2)));
            assert_eq!(entry.workdir, WorkdirState::Changed);
            assert_eq!(entry.stage, StageState::Unchanged);
            assert!(!entry.is_clean());
        }

        #[test]
        fn staged_edit_matching_workdir() {
            let entry =
                StatusEntry::classify("a.txt".into(), Some(oid(1)), Some(oid(2)), Some(oid(2)));
            assert_eq!(entry.stage, StageState::MatchesWorkdir);
            assert!(entry.stage.is_staged_modification());
        }

        #[test]
        fn staged_edit_with_further_workdir_edit() {
            let entry =
                StatusEntry::classify("a.txt".into(), Some(oid(1)), Some(oid(2)), Some(oid(3)));
            assert_eq!(entry.stage, StageState::DiffersFromBoth);
            assert!(entry.stage.is_staged_modification());
        }

        #[test]
        fn untracked_file() {
            let entry = StatusEntry::classify("new.txt".into(), None, None, Some(oid(1)));
            assert_eq!(entry.head, HeadState::Absent);
            assert_eq!(entry.workdir, WorkdirState::Changed);
            assert_eq!(entry.stage, StageState::Absent);
        }

        #[test]
        fn staged_new_file() {
            let entry = StatusEntry::classify("new.txt".into(), None, Some(oid(1)), Some(oid(1)));
            assert_eq!(entry.head, HeadState::Absent);
            assert_eq!(entry.stage, StageState::MatchesWorkdir);
        }

        #[test]
        fn deleted_on_disk() {
            let entry = StatusEntry::classify("a.txt".into(), Some(oid(1)), Some(oid(1)), None);
            assert_eq!(entry.workdir, WorkdirState::Absent);
            assert_eq!(entry.stage, StageState::Unchanged);
        }

        #[test]
        fn staged_then_deleted_everywhere() {
            // Created, staged, then removed on disk with no committed
            // version: the stage record matches neither snapshot.
            let entry = StatusEntry::classify("ghost.txt".into(), None, Some(oid(1)), None);
            assert_eq!(entry.head, HeadState::Absent);
            assert_eq!(entry.workdir, WorkdirState::Absent);
            assert_eq!(entry.stage, StageState::DiffersFromBoth);
        }
    }

    mod filters {
        use super::super::*;
        use std::path::PathBuf;

        #[test]
        fn exact_filter_matches_only_that_path() {
            let filter = PathFilter::Exact("dir/a.txt".into());
            assert!(filter.matches("dir/a.txt"));
            assert!(!filter.matches("dir/a.txt.bak"));
            assert!(!filter.matches("dir/b.txt"));
        }

        #[test]
        fn subtree_filter_matches_prefix() {
            let filter = PathFilter::Subtree("dir/".into());
            assert!(filter.matches("dir/a.txt"));
            assert!(filter.matches("dir/nested/b.txt"));
            assert!(!filter.matches("dir2/a.txt"));
            assert!(!filter.matches("dir"));
        }

        #[test]
        fn empty_subtree_matches_everything() {
            let filter = PathFilter::Subtree(String::new());
            assert!(filter.matches("anything"));
        }

        #[test]
        fn new_rejects_missing_path() {
            let tmp = tempfile::tempdir().unwrap();
            let err = PathFilter::new(tmp.path(), Path::new("missing")).unwrap_err();
            assert!(matches!(err, GitError::Filesystem { .. }));
        }

        #[test]
        fn new_distinguishes_dir_from_file() {
            let tmp = tempfile::tempdir().unwrap();
            std::fs::create_dir(tmp.path().join("sub")).unwrap();
            std::fs::write(tmp.path().join("file.txt"), "x").unwrap();

            let dir = PathFilter::new(tmp.path(), Path::new("sub")).unwrap();
            assert_eq!(dir, PathFilter::Subtree("sub/".into()));

            let file = PathFilter::new(tmp.path(), Path::new("file.txt")).unwrap();
            assert_eq!(file, PathFilter::Exact("file.txt".into()));
        }

        #[test]
        fn rel_string_normalizes_components() {
            assert_eq!(rel_string(&PathBuf::from("./dir/a.txt")), "dir/a.txt");
            assert_eq!(rel_string(&PathBuf::from(".")), "");
        }
    }
}
