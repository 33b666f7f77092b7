//! libgit2-backed commit graph.
//!
//! Repository discovery lives here too, since every command that talks to a
//! real repository goes through [`GitGraph`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::{ErrorCode, Oid, Repository, Sort};
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{display_reference_name, CommitGraph, LogEntry, TraversalContext};
use crate::revision::{Branch, CommitId};

/// Discover a git repository from a starting path.
pub fn discover_repo(start: Option<&Path>) -> Result<Repository> {
    let start_path = match start {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?,
    };

    Repository::discover(&start_path).map_err(|err| {
        if err.code() == ErrorCode::NotFound {
            Error::RepoNotFound(start_path)
        } else {
            Error::Git(err)
        }
    })
}

/// Directory holding `.revsel.toml`: the work tree root, or the git dir of a
/// bare repository.
pub fn config_root(repo: &Repository) -> PathBuf {
    repo.workdir()
        .map(|path| path.to_path_buf())
        .unwrap_or_else(|| repo.path().to_path_buf())
}

/// Get the common git directory (shared across worktrees).
pub fn common_dir(repo: &Repository) -> PathBuf {
    let git_dir = repo.path();
    let commondir_file = git_dir.join("commondir");

    if commondir_file.exists() {
        if let Ok(content) = std::fs::read_to_string(&commondir_file) {
            let rel = content.trim();
            if !rel.is_empty() {
                return git_dir.join(rel);
            }
        }
    }

    git_dir.to_path_buf()
}

/// Commit graph over a local repository.
pub struct GitGraph {
    repo: Repository,
    local_branches: bool,
}

impl GitGraph {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            local_branches: false,
        }
    }

    /// Discover the repository containing `start` (or the current directory).
    pub fn open(start: Option<&Path>) -> Result<Self> {
        Ok(Self::new(discover_repo(start)?))
    }

    /// Also list local branches as `refs/heads/<name>`.
    pub fn with_local_branches(mut self, enabled: bool) -> Self {
        self.local_branches = enabled;
        self
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    fn find_commit(&self, commit: &CommitId) -> Result<git2::Commit<'_>> {
        let oid = commit.to_oid()?;
        self.repo
            .find_commit(oid)
            .map_err(|err| missing_or_git(err, commit))
    }

    /// Commit HEAD points at, or `None` while HEAD is unborn.
    fn head_commit(&self) -> Result<Option<Oid>> {
        match self.repo.head() {
            Ok(head) => Ok(head.target()),
            Err(err)
                if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
                    || err.class() == git2::ErrorClass::Reference =>
            {
                Ok(None)
            }
            Err(err) => Err(Error::Git(err)),
        }
    }

    fn listed_name(&self, full: &str) -> Option<String> {
        if full.starts_with("refs/remotes/") || full.starts_with("refs/tags/") {
            return Some(display_reference_name(full).to_string());
        }
        if self.local_branches && full.starts_with("refs/heads/") {
            return Some(full.to_string());
        }
        None
    }
}

impl CommitGraph for GitGraph {
    fn list_reference_commits(&self) -> Result<Vec<Branch>> {
        let mut branches = Vec::new();
        for reference in self.repo.references()? {
            let reference = reference?;
            let Some(full) = reference.name() else {
                continue;
            };
            let Some(name) = self.listed_name(full) else {
                continue;
            };

            match reference.peel_to_commit() {
                Ok(commit) => branches.push(Branch::new(name, commit.id().into())),
                Err(err) if matches!(err.code(), ErrorCode::NotFound | ErrorCode::Peel) => {
                    debug!(reference = full, "skipping reference without a commit target");
                }
                Err(err) => return Err(Error::Git(err)),
            }
        }
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    fn resolve(&self, name: &str) -> Result<CommitId> {
        let object = self.repo.revparse_single(name).map_err(|err| match err.code() {
            ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous => {
                Error::RefNotFound(name.to_string())
            }
            _ => Error::Git(err),
        })?;
        let commit = object.peel_to_commit().map_err(|err| match err.code() {
            ErrorCode::Peel | ErrorCode::InvalidSpec => Error::RefNotFound(name.to_string()),
            _ => Error::Git(err),
        })?;
        Ok(commit.id().into())
    }

    fn merge_base(&self, a: &CommitId, b: &CommitId) -> Result<Option<CommitId>> {
        let left = self.find_commit(a)?.id();
        let right = self.find_commit(b)?.id();
        match self.repo.merge_base(left, right) {
            Ok(oid) => Ok(Some(oid.into())),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(Error::Git(err)),
        }
    }

    fn commit_timestamp(&self, commit: &CommitId) -> Result<i64> {
        Ok(self.find_commit(commit)?.time().seconds())
    }

    fn log_all(&self, reference: Option<&str>) -> Result<Vec<LogEntry>> {
        let mut revwalk = self.repo.revwalk()?;
        match reference {
            Some(name) => {
                let start = self.resolve(name)?;
                revwalk.push(start.to_oid()?)?;
            }
            None => {
                revwalk.push_glob("refs/remotes")?;
                revwalk.push_glob("refs/tags")?;
                revwalk.push_glob("refs/heads")?;
                // A fetch-only clone has HEAD on a branch that does not exist yet.
                if self.head_commit()?.is_some() {
                    revwalk.push_head()?;
                }
            }
        }
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        let mut entries = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            entries.push(LogEntry::new(oid.into(), commit.time().seconds()));
        }
        Ok(entries)
    }

    fn resolve_fetch_head(&self) -> Result<CommitId> {
        let path = self.repo.path().join("FETCH_HEAD");
        if !path.exists() {
            return Err(Error::RefNotFound("FETCH_HEAD".to_string()));
        }
        let content = std::fs::read_to_string(&path)?;
        let first = content
            .lines()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| line.split_whitespace().next())
            .ok_or_else(|| Error::RefNotFound("FETCH_HEAD".to_string()))?;
        let commit = CommitId::parse(first).map_err(|_| {
            Error::OperationFailed(format!("malformed FETCH_HEAD entry '{first}'"))
        })?;
        self.find_commit(&commit)?;
        Ok(commit)
    }

    fn traversal(&self) -> Result<Box<dyn TraversalContext + '_>> {
        Ok(Box::new(GitTraversal {
            graph: self,
            reachable: HashMap::new(),
        }))
    }
}

/// Traversal state for one selection invocation.
///
/// Reachability answers are cached for the lifetime of the context.
struct GitTraversal<'g> {
    graph: &'g GitGraph,
    reachable: HashMap<(Oid, Oid), bool>,
}

impl TraversalContext for GitTraversal<'_> {
    fn is_merged_into(&mut self, ancestor: &CommitId, candidate: &CommitId) -> Result<bool> {
        let ancestor_oid = self.graph.find_commit(ancestor)?.id();
        let candidate_oid = self.graph.find_commit(candidate)?.id();
        if ancestor_oid == candidate_oid {
            return Ok(true);
        }
        if let Some(hit) = self.reachable.get(&(ancestor_oid, candidate_oid)) {
            return Ok(*hit);
        }
        let merged = self
            .graph
            .repo
            .graph_descendant_of(candidate_oid, ancestor_oid)?;
        self.reachable.insert((ancestor_oid, candidate_oid), merged);
        Ok(merged)
    }

    fn commit_time(&mut self, commit: &CommitId) -> Result<i64> {
        self.graph.commit_timestamp(commit)
    }
}

fn missing_or_git(err: git2::Error, commit: &CommitId) -> Error {
    if err.code() == ErrorCode::NotFound {
        Error::MissingObject(commit.to_string())
    } else {
        Error::Git(err)
    }
}
