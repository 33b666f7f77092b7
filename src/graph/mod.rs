//! Commit graph queries consumed by the selection engine.
//!
//! Selection never touches git objects directly; everything goes through
//! [`CommitGraph`]. Implementations:
//! - [`git::GitGraph`]: libgit2 over a local repository
//! - [`memory::MemoryGraph`]: an in-memory DAG for tests and simulations
//! - [`protocol::RemoteGraph`]: forwards each query to a graph agent
//!
//! Every query may block (disk, subprocess, network). Failures propagate as
//! [`crate::Error`]; none of them are turned into "no commits".

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::revision::{Branch, CommitId};

pub mod git;
pub mod memory;
pub mod protocol;

/// A commit in a log listing with its committer time (epoch seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub commit: CommitId,
    pub time: i64,
}

impl LogEntry {
    pub fn new(commit: CommitId, time: i64) -> Self {
        Self { commit, time }
    }
}

/// Reachability and timestamp queries that must share one traversal state.
///
/// One context is opened per selection invocation and reused for every
/// candidate; answers from different contexts must not be mixed.
pub trait TraversalContext {
    /// Whether `ancestor` is reachable from `candidate` (or equal to it).
    fn is_merged_into(&mut self, ancestor: &CommitId, candidate: &CommitId) -> Result<bool>;

    /// Committer time of `commit` in epoch seconds.
    fn commit_time(&mut self, commit: &CommitId) -> Result<i64>;
}

/// Query surface over a repository.
pub trait CommitGraph {
    /// All reference names and the commits they point at.
    ///
    /// Remote-tracking branches use their short form (`origin/master`),
    /// tags their full form (`refs/tags/v1`).
    fn list_reference_commits(&self) -> Result<Vec<Branch>>;

    /// Resolve a reference name or commit hash to a commit.
    ///
    /// A name that does not exist yields [`crate::Error::RefNotFound`].
    fn resolve(&self, name: &str) -> Result<CommitId>;

    /// Nearest common ancestor of two commits, if they share history.
    fn merge_base(&self, a: &CommitId, b: &CommitId) -> Result<Option<CommitId>>;

    /// Committer time of a commit in epoch seconds.
    fn commit_timestamp(&self, commit: &CommitId) -> Result<i64>;

    /// Every commit reachable from `reference` (or from all references when
    /// `None`), in log order.
    fn log_all(&self, reference: Option<&str>) -> Result<Vec<LogEntry>>;

    /// The commit recorded by the most recent fetch.
    fn resolve_fetch_head(&self) -> Result<CommitId>;

    /// Open the traversal context shared by one selection invocation.
    fn traversal(&self) -> Result<Box<dyn TraversalContext + '_>>;
}

/// Short display form of a full reference name.
///
/// `refs/remotes/origin/master` becomes `origin/master`; tags and local
/// branches keep their full name.
pub fn display_reference_name(name: &str) -> &str {
    name.strip_prefix("refs/remotes/").unwrap_or(name)
}
