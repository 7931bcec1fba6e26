//! Integration tests for the status matrix service.
//!
//! These use real git repositories created via tempfile and assert the
//! tri-snapshot classification of each path.

mod common;

use std::path::PathBuf;

use common::{run_git, TestRepo};
use stagesync::git::{GitError, HeadState, StageState, StatusEntry, WorkdirState};
use stagesync::sync::Workspace;

fn entry<'a>(matrix: &'a [StatusEntry], path: &str) -> &'a StatusEntry {
    matrix
        .iter()
        .find(|e| e.path == path)
        .unwrap_or_else(|| panic!("no entry for {path}"))
}

#[tokio::test]
async fn clean_repository_is_all_clean() {
    let repo = TestRepo::new();
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace.status_matrix(None).await.unwrap();
    assert_eq!(matrix.len(), 1);

    let readme = entry(&matrix, "README.md");
    assert!(readme.is_clean());
    assert_eq!(readme.head, HeadState::Present);
    assert_eq!(readme.workdir, WorkdirState::Unchanged);
    assert_eq!(readme.stage, StageState::Unchanged);
}

#[tokio::test]
async fn untracked_file_classification() {
    let repo = TestRepo::new();
    repo.write_file("notes.txt", "scratch\n");
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace.status_matrix(None).await.unwrap();
    let notes = entry(&matrix, "notes.txt");
    assert_eq!(notes.head, HeadState::Absent);
    assert_eq!(notes.workdir, WorkdirState::Changed);
    assert_eq!(notes.stage, StageState::Absent);
}

#[tokio::test]
async fn unstaged_edit_classification() {
    let repo = TestRepo::new();
    repo.write_file("README.md", "# Edited\n");
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace.status_matrix(None).await.unwrap();
    let readme = entry(&matrix, "README.md");
    assert_eq!(readme.head, HeadState::Present);
    assert_eq!(readme.workdir, WorkdirState::Changed);
    assert_eq!(readme.stage, StageState::Unchanged);
}

#[tokio::test]
async fn staged_edit_matches_workdir() {
    let repo = TestRepo::new();
    repo.write_file("README.md", "# Edited\n");
    run_git(repo.path(), &["add", "README.md"]);
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace.status_matrix(None).await.unwrap();
    let readme = entry(&matrix, "README.md");
    assert_eq!(readme.stage, StageState::MatchesWorkdir);
}

#[tokio::test]
async fn staged_edit_then_further_edit_differs_from_both() {
    let repo = TestRepo::new();
    repo.write_file("README.md", "# Edited\n");
    run_git(repo.path(), &["add", "README.md"]);
    repo.write_file("README.md", "# Edited again\n");
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace.status_matrix(None).await.unwrap();
    let readme = entry(&matrix, "README.md");
    assert_eq!(readme.workdir, WorkdirState::Changed);
    assert_eq!(readme.stage, StageState::DiffersFromBoth);
}

#[tokio::test]
async fn deleted_file_classification() {
    let repo = TestRepo::new();
    repo.commit_file("data.txt", "payload\n", "add data");
    std::fs::remove_file(repo.path().join("data.txt")).unwrap();
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace.status_matrix(None).await.unwrap();
    let data = entry(&matrix, "data.txt");
    assert_eq!(data.head, HeadState::Present);
    assert_eq!(data.workdir, WorkdirState::Absent);
    assert_eq!(data.stage, StageState::Unchanged);
}

#[tokio::test]
async fn staged_removal_classification() {
    let repo = TestRepo::new();
    repo.commit_file("data.txt", "payload\n", "add data");
    run_git(repo.path(), &["rm", "data.txt"]);
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace.status_matrix(None).await.unwrap();
    let data = entry(&matrix, "data.txt");
    assert_eq!(data.head, HeadState::Present);
    assert_eq!(data.workdir, WorkdirState::Absent);
    assert_eq!(data.stage, StageState::Absent);
}

#[tokio::test]
async fn matrix_is_sorted_by_path() {
    let repo = TestRepo::new();
    repo.write_file("zebra.txt", "z\n");
    repo.write_file("alpha.txt", "a\n");
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace.status_matrix(None).await.unwrap();
    let paths: Vec<&str> = matrix.iter().map(|e| e.path.as_str()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
}

#[tokio::test]
async fn directory_filter_expands_to_subtree() {
    let repo = TestRepo::new();
    repo.commit_file("hw1/main.py", "print(1)\n", "hw1");
    repo.commit_file("hw2/main.py", "print(2)\n", "hw2");
    repo.write_file("hw1/scratch.py", "draft\n");
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace
        .status_matrix(Some(PathBuf::from("hw1")))
        .await
        .unwrap();
    let paths: Vec<&str> = matrix.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["hw1/main.py", "hw1/scratch.py"]);
}

#[tokio::test]
async fn file_filter_matches_exactly() {
    let repo = TestRepo::new();
    repo.commit_file("hw1/main.py", "print(1)\n", "hw1");
    repo.write_file("hw1/main.py.bak", "backup\n");
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace
        .status_matrix(Some(PathBuf::from("hw1/main.py")))
        .await
        .unwrap();
    let paths: Vec<&str> = matrix.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["hw1/main.py"]);
}

#[tokio::test]
async fn missing_checked_path_is_filesystem_error() {
    let repo = TestRepo::new();
    let workspace = Workspace::open(repo.path()).unwrap();

    let err = workspace
        .status_matrix(Some(PathBuf::from("no-such-dir")))
        .await
        .unwrap_err();
    assert!(matches!(err, GitError::Filesystem { .. }));
}

#[tokio::test]
async fn ignored_files_are_not_listed() {
    let repo = TestRepo::new();
    repo.commit_file(".gitignore", "*.log\n", "ignore logs");
    repo.write_file("debug.log", "noise\n");
    let workspace = Workspace::open(repo.path()).unwrap();

    let matrix = workspace.status_matrix(None).await.unwrap();
    assert!(matrix.iter().all(|e| e.path != "debug.log"));
}
