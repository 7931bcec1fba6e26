//! stagesync - repository sync that preserves staged work
//!
//! stagesync keeps a local working copy of a version-controlled repository
//! in step with its remote while an unrelated foreground process (an
//! assignment-download workflow) deposits files into the same tree. The
//! core is the repository state reconciliation engine: a three-way
//! comparison of every tracked path decides which staged records must be
//! reset before a merge may proceed, the merge runs with a safe checkout,
//! and local on-disk content always wins over incoming committed content.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to the
//!   engine)
//! - [`sync`] - The reconciliation engine: sanitize, pull, stage, commit,
//!   push
//! - [`git`] - Single interface for all Git operations
//! - [`auth`] - Token-based credential injection
//! - [`assets`] - Course hub client (assignment downloads)
//! - [`config`] - Configuration loading
//!
//! # Correctness Invariants
//!
//! 1. Staged content a merge could discard is reset to HEAD before the
//!    merge begins
//! 2. The checkout step never force-overwrites working-directory content
//! 3. Index writes are serialized in-process and across processes
//! 4. The status matrix is recomputed fresh before every decision point

pub mod assets;
pub mod auth;
pub mod cli;
pub mod config;
pub mod git;
pub mod sync;
