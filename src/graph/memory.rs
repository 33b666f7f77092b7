//! In-memory commit graph.
//!
//! Used by unit tests and by callers that want to simulate selection
//! without a repository on disk. References are stored under their full
//! names (`refs/remotes/origin/master`, `refs/tags/v1`, `refs/heads/dev`)
//! and listed the same way [`super::git::GitGraph`] lists them.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::graph::{display_reference_name, CommitGraph, LogEntry, TraversalContext};
use crate::revision::{Branch, CommitId};

#[derive(Debug, Clone)]
struct MemoryCommit {
    parents: Vec<CommitId>,
    time: i64,
    /// Insertion order, used as the log-order tiebreak.
    seq: usize,
}

/// A commit DAG with named references.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    commits: HashMap<CommitId, MemoryCommit>,
    refs: BTreeMap<String, CommitId>,
    fetch_head: Option<CommitId>,
    local_branches: bool,
}

/// Deterministic 40-hex commit id derived from a short label.
pub fn synthetic_id(label: &str) -> CommitId {
    let mut hex = String::with_capacity(40);
    for byte in label.bytes() {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.truncate(40);
    while hex.len() < 40 {
        hex.push('0');
    }
    CommitId::parse(&hex).unwrap_or_else(|_| unreachable!("synthetic ids are hex"))
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also list `refs/heads/*` references.
    pub fn with_local_branches(mut self, enabled: bool) -> Self {
        self.local_branches = enabled;
        self
    }

    /// Add a commit. Parents must already exist.
    pub fn add_commit(&mut self, id: CommitId, parents: &[CommitId], time: i64) -> Result<()> {
        for parent in parents {
            if !self.commits.contains_key(parent) {
                return Err(Error::MissingObject(parent.to_string()));
            }
        }
        let seq = self.commits.len();
        self.commits.insert(
            id,
            MemoryCommit {
                parents: parents.to_vec(),
                time,
                seq,
            },
        );
        Ok(())
    }

    /// Point a full reference name at a commit.
    pub fn set_ref(&mut self, name: &str, commit: &CommitId) -> Result<()> {
        if !self.commits.contains_key(commit) {
            return Err(Error::MissingObject(commit.to_string()));
        }
        self.refs.insert(name.to_string(), commit.clone());
        Ok(())
    }

    pub fn remove_ref(&mut self, name: &str) -> Option<CommitId> {
        self.refs.remove(name)
    }

    pub fn set_fetch_head(&mut self, commit: &CommitId) {
        self.fetch_head = Some(commit.clone());
    }

    fn commit(&self, id: &CommitId) -> Result<&MemoryCommit> {
        self.commits
            .get(id)
            .ok_or_else(|| Error::MissingObject(id.to_string()))
    }

    /// `start` and everything reachable from it.
    fn ancestors(&self, start: &CommitId) -> Result<HashSet<CommitId>> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for parent in &self.commit(&id)?.parents {
                queue.push_back(parent.clone());
            }
        }
        Ok(seen)
    }

    fn lookup_ref(&self, name: &str) -> Option<&CommitId> {
        let candidates = [
            name.to_string(),
            format!("refs/{name}"),
            format!("refs/tags/{name}"),
            format!("refs/heads/{name}"),
            format!("refs/remotes/{name}"),
        ];
        candidates.iter().find_map(|full| self.refs.get(full))
    }

    fn lookup_hash(&self, name: &str) -> Option<CommitId> {
        if name.len() < 4 || !name.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return None;
        }
        let prefix = name.to_ascii_lowercase();
        let mut found = self
            .commits
            .keys()
            .filter(|id| id.as_str().starts_with(&prefix));
        match (found.next(), found.next()) {
            (Some(id), None) => Some(id.clone()),
            _ => None,
        }
    }

    fn newest_first(&self, ids: HashSet<CommitId>) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let commit = self.commit(&id)?;
            entries.push((commit.time, commit.seq, id));
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        Ok(entries
            .into_iter()
            .map(|(time, _, id)| LogEntry::new(id, time))
            .collect())
    }
}

impl CommitGraph for MemoryGraph {
    fn list_reference_commits(&self) -> Result<Vec<Branch>> {
        let mut branches: Vec<Branch> = self
            .refs
            .iter()
            .filter(|(name, _)| {
                name.starts_with("refs/remotes/")
                    || name.starts_with("refs/tags/")
                    || (self.local_branches && name.starts_with("refs/heads/"))
            })
            .map(|(name, id)| Branch::new(display_reference_name(name), id.clone()))
            .collect();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    fn resolve(&self, name: &str) -> Result<CommitId> {
        if name == "FETCH_HEAD" {
            return self.resolve_fetch_head();
        }
        if let Some(id) = self.lookup_ref(name) {
            return Ok(id.clone());
        }
        self.lookup_hash(name)
            .ok_or_else(|| Error::RefNotFound(name.to_string()))
    }

    fn merge_base(&self, a: &CommitId, b: &CommitId) -> Result<Option<CommitId>> {
        let left = self.ancestors(a)?;
        let right = self.ancestors(b)?;
        let common: HashSet<CommitId> = left.intersection(&right).cloned().collect();
        if common.is_empty() {
            return Ok(None);
        }

        // Best common ancestors: those not reachable from another common one.
        let mut shadowed = HashSet::new();
        for id in &common {
            for parent in &self.commit(id)?.parents {
                shadowed.extend(self.ancestors(parent)?);
            }
        }
        let best = self.newest_first(common.difference(&shadowed).cloned().collect())?;
        Ok(best.into_iter().next().map(|entry| entry.commit))
    }

    fn commit_timestamp(&self, commit: &CommitId) -> Result<i64> {
        Ok(self.commit(commit)?.time)
    }

    fn log_all(&self, reference: Option<&str>) -> Result<Vec<LogEntry>> {
        let mut reachable = HashSet::new();
        match reference {
            Some(name) => {
                let start = self.resolve(name)?;
                reachable.extend(self.ancestors(&start)?);
            }
            None => {
                for id in self.refs.values() {
                    reachable.extend(self.ancestors(id)?);
                }
            }
        }
        self.newest_first(reachable)
    }

    fn resolve_fetch_head(&self) -> Result<CommitId> {
        self.fetch_head
            .clone()
            .ok_or_else(|| Error::RefNotFound("FETCH_HEAD".to_string()))
    }

    fn traversal(&self) -> Result<Box<dyn TraversalContext + '_>> {
        Ok(Box::new(MemoryTraversal {
            graph: self,
            closures: HashMap::new(),
        }))
    }
}

struct MemoryTraversal<'g> {
    graph: &'g MemoryGraph,
    closures: HashMap<CommitId, HashSet<CommitId>>,
}

impl TraversalContext for MemoryTraversal<'_> {
    fn is_merged_into(&mut self, ancestor: &CommitId, candidate: &CommitId) -> Result<bool> {
        self.graph.commit(ancestor)?;
        if !self.closures.contains_key(candidate) {
            let closure = self.graph.ancestors(candidate)?;
            self.closures.insert(candidate.clone(), closure);
        }
        Ok(self
            .closures
            .get(candidate)
            .is_some_and(|closure| closure.contains(ancestor)))
    }

    fn commit_time(&mut self, commit: &CommitId) -> Result<i64> {
        self.graph.commit_timestamp(commit)
    }
}
