//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Run as if in that directory
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// stagesync - repository sync that preserves staged work
#[derive(Parser, Debug)]
#[command(name = "stagesync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if stagesync was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clone the configured repository
    #[command(
        name = "clone",
        long_about = "Clone a repository for the single-branch workflow.\n\n\
            The URL defaults to `remote_url` from the config file. Only the \
            target branch is fetched; the configured token is presented as \
            oauth2 basic authentication."
    )]
    Clone {
        /// Repository URL (defaults to the configured remote_url)
        url: Option<String>,

        /// Target directory (defaults to the repository name)
        dir: Option<PathBuf>,

        /// Branch to clone (defaults to the configured branch)
        #[arg(long)]
        branch: Option<String>,
    },

    /// Run one full synchronization cycle
    #[command(
        name = "sync",
        long_about = "Run one full synchronization cycle.\n\n\
            Sanitizes the index, pulls the remote branch while preserving \
            local on-disk content, stages everything, commits when there is \
            work to commit, and pushes when the local history is ahead.\n\n\
            A pull that preserves local content over incoming commits is \
            reported but is not an error."
    )]
    Sync {
        /// Commit message for the cycle's commit
        #[arg(short, long)]
        message: Option<String>,

        /// Branch to sync (defaults to the configured branch)
        #[arg(long)]
        branch: Option<String>,
    },

    /// Fetch and merge the remote branch
    Pull {
        /// Branch to pull (defaults to the configured branch)
        #[arg(long)]
        branch: Option<String>,

        /// Fail on working-directory conflicts instead of preserving
        /// local content
        #[arg(long)]
        no_preserve: bool,
    },

    /// Show the tri-snapshot status matrix
    Status {
        /// Restrict to one file or subtree
        path: Option<PathBuf>,
    },

    /// Push the local branch to the remote
    Push {
        /// Branch to push (defaults to the configured branch)
        #[arg(long)]
        branch: Option<String>,
    },

    /// List local or remote branches
    Branches {
        /// List the remote-tracking branches of this remote instead
        #[arg(long)]
        remote: Option<String>,
    },
}
