//! cli
//!
//! Command-line interface layer for stagesync.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Delegate to the [`crate::sync`] engine
//! - Does NOT perform repository mutations directly
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap, loads the
//! configuration, and dispatches to [`Workspace`] on a tokio runtime. All
//! repository state changes flow through the engine.

pub mod args;

pub use args::{Cli, Command};

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::auth::CredentialProvider;
use crate::config::Config;
use crate::git::{Author, MergeOutcome, DEFAULT_REMOTE};
use crate::sync::Workspace;

/// Execution context shared by all command handlers.
struct CommandContext {
    cwd: PathBuf,
    quiet: bool,
    config: Config,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. Commands run on a
/// tokio runtime built here; the engine itself is async.
pub fn run(cli: Cli) -> Result<()> {
    let cwd = match cli.cwd.clone() {
        Some(cwd) => cwd,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let ctx = CommandContext {
        cwd,
        quiet: cli.quiet,
        config: Config::load()?,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(dispatch(cli.command, &ctx))
}

/// Dispatch to the command handler.
async fn dispatch(command: Command, ctx: &CommandContext) -> Result<()> {
    match command {
        Command::Clone { url, dir, branch } => clone(ctx, url, dir, branch).await,
        Command::Sync { message, branch } => sync(ctx, message, branch).await,
        Command::Pull {
            branch,
            no_preserve,
        } => pull(ctx, branch, no_preserve).await,
        Command::Status { path } => status(ctx, path).await,
        Command::Push { branch } => push(ctx, branch).await,
        Command::Branches { remote } => branches(ctx, remote).await,
    }
}

/// The branch a command targets: explicit flag first, then config.
fn target_branch(ctx: &CommandContext, branch: Option<String>) -> String {
    branch.unwrap_or_else(|| ctx.config.branch.clone())
}

fn credentials(ctx: &CommandContext) -> CredentialProvider {
    ctx.config.credentials()
}

fn author(ctx: &CommandContext) -> Author {
    ctx.config.author()
}

async fn clone(
    ctx: &CommandContext,
    url: Option<String>,
    dir: Option<PathBuf>,
    branch: Option<String>,
) -> Result<()> {
    let Some(url) = url.or_else(|| ctx.config.remote_url.clone()) else {
        bail!("no repository URL given and no remote_url configured");
    };
    let branch = target_branch(ctx, branch);
    let dir = match dir {
        Some(dir) => ctx.cwd.join(dir),
        None => ctx.cwd.join(repo_name_from_url(&url)),
    };

    if !ctx.quiet {
        println!("Cloning {} into {}...", url, dir.display());
    }
    let workspace =
        Workspace::clone_repository(&dir, &url, &branch, &credentials(ctx), true).await?;
    workspace.set_branch_tracking(&branch, DEFAULT_REMOTE).await?;

    if !ctx.quiet {
        println!("Cloned branch '{branch}'.");
    }
    Ok(())
}

async fn sync(ctx: &CommandContext, message: Option<String>, branch: Option<String>) -> Result<()> {
    let branch = target_branch(ctx, branch);
    let workspace = Workspace::open(&ctx.cwd)?;

    let outcome = workspace
        .pull_preserving_stage(&branch, &author(ctx), &credentials(ctx))
        .await?;
    if !ctx.quiet {
        match outcome {
            MergeOutcome::ConflictPreserved => {
                println!("Pulled '{branch}' (local content kept where it conflicted).")
            }
            MergeOutcome::UpToDate => println!("Branch '{branch}' is up to date."),
            _ => println!("Pulled '{branch}'."),
        }
    }

    workspace.add_all().await?;

    let dirty = workspace
        .has_changes_to_commit(&[PathBuf::from(".")])
        .await?;
    if dirty {
        let message = message.unwrap_or_else(|| "stagesync: sync".to_string());
        let commit_id = workspace.commit(&author(ctx), &message).await?;
        if !ctx.quiet {
            println!("Committed {}.", &commit_id[..12.min(commit_id.len())]);
        }
    } else if !ctx.quiet {
        println!("Nothing to commit.");
    }

    if workspace
        .is_local_history_ahead(&branch, DEFAULT_REMOTE)
        .await?
    {
        workspace.push(&branch, &credentials(ctx)).await?;
        if !ctx.quiet {
            println!("Pushed '{branch}'.");
        }
    } else if !ctx.quiet {
        println!("Remote already has the local history.");
    }

    Ok(())
}

async fn pull(ctx: &CommandContext, branch: Option<String>, no_preserve: bool) -> Result<()> {
    let branch = target_branch(ctx, branch);
    let workspace = Workspace::open(&ctx.cwd)?;

    let outcome = if no_preserve {
        workspace
            .pull(&branch, &author(ctx), &credentials(ctx))
            .await?
    } else {
        workspace
            .pull_preserving_stage(&branch, &author(ctx), &credentials(ctx))
            .await?
    };

    if !ctx.quiet {
        match outcome {
            MergeOutcome::UpToDate => println!("Already up to date."),
            MergeOutcome::FastForwarded => println!("Fast-forwarded '{branch}'."),
            MergeOutcome::Merged => println!("Merged '{branch}'."),
            MergeOutcome::ConflictPreserved => {
                println!("Pulled '{branch}'; local content kept where it conflicted.")
            }
        }
    }
    Ok(())
}

async fn status(ctx: &CommandContext, path: Option<PathBuf>) -> Result<()> {
    let workspace = Workspace::open(&ctx.cwd)?;
    let matrix = workspace.status_matrix(path).await?;

    let mut clean = 0usize;
    for entry in &matrix {
        if entry.is_clean() {
            clean += 1;
            continue;
        }
        println!(
            "[{}{}{}] {}",
            entry.head.code(),
            entry.workdir.code(),
            entry.stage.code(),
            entry.path
        );
    }
    if !ctx.quiet {
        println!("{} path(s), {} clean", matrix.len(), clean);
    }
    Ok(())
}

async fn push(ctx: &CommandContext, branch: Option<String>) -> Result<()> {
    let branch = target_branch(ctx, branch);
    let workspace = Workspace::open(&ctx.cwd)?;

    if !workspace
        .is_local_history_ahead(&branch, DEFAULT_REMOTE)
        .await?
    {
        if !ctx.quiet {
            println!("Remote already has the local history.");
        }
        return Ok(());
    }

    workspace.push(&branch, &credentials(ctx)).await?;
    if !ctx.quiet {
        println!("Pushed '{branch}'.");
    }
    Ok(())
}

async fn branches(ctx: &CommandContext, remote: Option<String>) -> Result<()> {
    let workspace = Workspace::open(&ctx.cwd)?;
    let names = workspace.list_branches(remote.as_deref()).await?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Derive a directory name from a repository URL.
fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    name.trim_end_matches(".git").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_name_from_https_url() {
        assert_eq!(
            repo_name_from_url("https://git.example.edu/cs101/student.git"),
            "student"
        );
    }

    #[test]
    fn repo_name_from_url_without_suffix() {
        assert_eq!(
            repo_name_from_url("https://git.example.edu/cs101/student"),
            "student"
        );
    }

    #[test]
    fn repo_name_from_trailing_slash() {
        assert_eq!(
            repo_name_from_url("https://git.example.edu/cs101/student/"),
            "student"
        );
    }
}
