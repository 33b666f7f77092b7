//! revsel - Revision Candidate Selection Library
//!
//! Given a commit graph, a set of branch specs and a job's build history,
//! decide which revisions should be built next.
//!
//! # Core Concepts
//!
//! - **Revision**: a commit plus every branch name pointing at it
//! - **Branch spec**: wildcard or `:regex` pattern selecting branch names
//! - **Build history**: per-job ledger of finished builds, keyed by branch
//! - **Strategy**: default, inverse, age/ancestry bounded, compound with
//!   priorities, or a time-ordered queue over one branch's log
//! - **Commit graph**: the query surface strategies run against, backed by
//!   libgit2, an in-memory DAG, or a remote graph agent
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `.revsel.toml`
//! - `error`: Error types and result aliases
//! - `revision`: Commit ids, branches and revisions
//! - `branch_spec`: Branch spec parsing and matching
//! - `graph`: Commit graph trait and its implementations
//! - `history`: Build records and the per-job history
//! - `select`: Selection strategies
//! - `storage`: File-backed history store
//! - `lock`: File locking and atomic writes for concurrency safety
//! - `output`: Human and JSON output envelopes

pub mod branch_spec;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod history;
pub mod lock;
pub mod output;
pub mod revision;
pub mod select;
pub mod storage;

pub use error::{Error, Result};
