//! Shared fixtures for integration tests.
//!
//! Repositories are created by driving the real `git` CLI into tempdirs,
//! then exercised through the stagesync API.
#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run a git command in a directory, asserting success.
pub fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Run a git command and capture stdout.
pub fn run_git_capture(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Test fixture that creates a real git repository with an initial commit
/// on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new test repository with an initial commit.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");

        run_git(dir.path(), &["init", "--initial-branch=main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);

        std::fs::write(dir.path().join("README.md"), "# Test Repo\n").unwrap();
        run_git(dir.path(), &["add", "README.md"]);
        run_git(dir.path(), &["commit", "-m", "Initial commit"]);

        Self { dir }
    }

    /// Open an existing directory as a fixture (e.g. a clone).
    pub fn at(dir: TempDir) -> Self {
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        Self { dir }
    }

    /// Get the path to the repository.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file under the repository root, creating parents.
    pub fn write_file(&self, rel: &str, content: &str) {
        let full = self.path().join(rel);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }

    /// Read a file under the repository root.
    pub fn read_file(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path().join(rel)).unwrap()
    }

    /// Create a file and commit it, returning the new HEAD id.
    pub fn commit_file(&self, rel: &str, content: &str, message: &str) -> String {
        self.write_file(rel, content);
        run_git(self.path(), &["add", rel]);
        run_git(self.path(), &["commit", "-m", message]);
        self.head_id()
    }

    /// The current HEAD commit id.
    pub fn head_id(&self) -> String {
        run_git_capture(self.path(), &["rev-parse", "HEAD"])
    }
}

/// A bare "origin" plus a working clone wired to it.
pub struct RemotePair {
    pub origin: TempDir,
    pub local: TestRepo,
}

impl RemotePair {
    /// Create a bare origin seeded with one commit, and a clone of it.
    pub fn new() -> Self {
        let origin = TempDir::new().expect("failed to create temp dir");
        run_git(
            origin.path(),
            &["init", "--bare", "--initial-branch=main"],
        );

        let seed = TestRepo::new();
        run_git(
            seed.path(),
            &["remote", "add", "origin", origin.path().to_str().unwrap()],
        );
        run_git(seed.path(), &["push", "-u", "origin", "main"]);

        Self {
            origin,
            local: seed,
        }
    }

    /// Make an additional working clone of the origin.
    pub fn fresh_clone(&self) -> TestRepo {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(
            dir.path(),
            &[
                "clone",
                self.origin.path().to_str().unwrap(),
                dir.path().to_str().unwrap(),
            ],
        );
        TestRepo::at(dir)
    }

    /// The origin's current tip of a branch.
    pub fn origin_tip(&self, branch: &str) -> String {
        run_git_capture(self.origin.path(), &["rev-parse", branch])
    }

    /// The origin path as a URL-ish string for cloning.
    pub fn origin_url(&self) -> String {
        self.origin.path().to_str().unwrap().to_string()
    }
}
