//! Commit identities, branches, and revisions.
//!
//! A [`Revision`] is a commit plus every reference name that currently
//! points at it. Revisions are rebuilt from the live reference list on each
//! selection call; only their commit identity is persisted by the build
//! history.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use git2::Oid;
use serde::{Deserialize, Serialize};

use crate::branch_spec::BranchSpec;
use crate::error::{Error, Result};

/// Branch label used for a commit that was requested by hash.
pub const DETACHED: &str = "detached";

/// Full hexadecimal commit identity (SHA-1 or SHA-256 length).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    /// Parse a full commit id. Upper-case hex is normalized to lower-case.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let valid_len = trimmed.len() == 40 || trimmed.len() == 64;
        if !valid_len || !trimmed.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(Error::InvalidCommitId(value.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Seven-character abbreviation for display.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }

    pub fn to_oid(&self) -> Result<Oid> {
        Oid::from_str(&self.0).map_err(|_| Error::InvalidCommitId(self.0.clone()))
    }
}

impl From<Oid> for CommitId {
    fn from(oid: Oid) -> Self {
        Self(oid.to_string())
    }
}

impl FromStr for CommitId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommitId {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CommitId> for String {
    fn from(value: CommitId) -> Self {
        value.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a user-supplied target looks like an abbreviated or full commit hash.
pub fn looks_like_commit_prefix(value: &str) -> bool {
    (6..=40).contains(&value.len())
        && value
            .chars()
            .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch))
}

/// A named reference and the commit it points to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: CommitId,
}

impl Branch {
    pub fn new(name: impl Into<String>, commit: CommitId) -> Self {
        Self {
            name: name.into(),
            commit,
        }
    }

    /// Whether this is a symbolic default-branch pointer such as `origin/HEAD`.
    pub fn is_head_pointer(&self) -> bool {
        self.name == "HEAD" || self.name.ends_with("/HEAD")
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.commit.short())
    }
}

/// A commit plus the set of branches pointing at it.
///
/// Equality and hashing consider only the commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    commit: CommitId,
    #[serde(default)]
    branches: Vec<Branch>,
}

impl Revision {
    pub fn new(commit: CommitId) -> Self {
        Self {
            commit,
            branches: Vec::new(),
        }
    }

    /// Builder form of [`Revision::add_branch`].
    pub fn with_branch(mut self, name: impl Into<String>) -> Self {
        self.add_branch(name);
        self
    }

    pub fn commit(&self) -> &CommitId {
        &self.commit
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn branch_names(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|branch| branch.name.as_str())
    }

    pub fn has_branches(&self) -> bool {
        !self.branches.is_empty()
    }

    pub fn contains_branch(&self, name: &str) -> bool {
        self.branches.iter().any(|branch| branch.name == name)
    }

    /// Add a branch name pointing at this revision's commit.
    ///
    /// Returns `false` when a branch with that name is already present.
    pub fn add_branch(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains_branch(&name) {
            return false;
        }
        self.branches.push(Branch::new(name, self.commit.clone()));
        true
    }

    pub fn retain_branches<F>(&mut self, keep: F)
    where
        F: FnMut(&Branch) -> bool,
    {
        self.branches.retain(keep);
    }

    /// Reorder branches so the ones matched by earlier specs come first.
    ///
    /// Branches matched by no spec keep their relative order at the end.
    pub fn sort_branches_by_specs(
        &mut self,
        specs: &[BranchSpec],
        env: &HashMap<String, String>,
    ) -> Result<()> {
        let mut ranked = Vec::with_capacity(self.branches.len());
        for branch in self.branches.drain(..) {
            let mut rank = specs.len();
            for (idx, spec) in specs.iter().enumerate() {
                if spec.matches(&branch.name, env)? {
                    rank = idx;
                    break;
                }
            }
            ranked.push((rank, branch));
        }
        ranked.sort_by_key(|(rank, _)| *rank);
        self.branches = ranked.into_iter().map(|(_, branch)| branch).collect();
        Ok(())
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.commit == other.commit
    }
}

impl Eq for Revision {}

impl Hash for Revision {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.commit.hash(state);
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.branch_names().collect();
        write!(f, "{} ({})", self.commit, names.join(", "))
    }
}

/// Group reference/commit pairs into one revision per commit.
///
/// Revisions come out in the order their commit was first seen.
pub fn group_by_commit<I>(branches: I) -> Vec<Revision>
where
    I: IntoIterator<Item = Branch>,
{
    let mut index: HashMap<CommitId, usize> = HashMap::new();
    let mut revisions: Vec<Revision> = Vec::new();
    for branch in branches {
        let slot = *index.entry(branch.commit.clone()).or_insert_with(|| {
            revisions.push(Revision::new(branch.commit.clone()));
            revisions.len() - 1
        });
        revisions[slot].add_branch(branch.name);
    }
    revisions
}
