//! Build history: the idempotency ledger consulted by every selection.
//!
//! The history maps each branch name to the last build that covered it and
//! remembers the most recent build overall. Records hold commit identities,
//! so they outlive branches that have since been deleted or force-pushed.
//!
//! Mutation happens only through [`BuildHistory::record`] and
//! [`BuildHistory::record_merge`], after a build has finished checking out.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::revision::{CommitId, Revision};

/// Outcome of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Failure => "FAILURE",
            BuildResult::NotBuilt => "NOT_BUILT",
            BuildResult::Aborted => "ABORTED",
        };
        f.write_str(label)
    }
}

impl FromStr for BuildResult {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "success" => Ok(BuildResult::Success),
            "unstable" => Ok(BuildResult::Unstable),
            "failure" => Ok(BuildResult::Failure),
            "not_built" => Ok(BuildResult::NotBuilt),
            "aborted" => Ok(BuildResult::Aborted),
            _ => Err(Error::InvalidArgument(format!(
                "invalid build result '{s}': must be success, unstable, failure, not_built, or aborted"
            ))),
        }
    }
}

/// One finished build.
///
/// For a merge build, `marked` is the upstream revision that triggered the
/// build and `revision` is the merged result that was actually built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub revision: Revision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked: Option<Revision>,
    pub build_number: u64,
    pub result: BuildResult,
}

impl BuildRecord {
    pub fn new(revision: Revision, build_number: u64, result: BuildResult) -> Self {
        Self {
            revision,
            marked: None,
            build_number,
            result,
        }
    }

    pub fn merge(marked: Revision, built: Revision, build_number: u64, result: BuildResult) -> Self {
        Self {
            revision: built,
            marked: Some(marked),
            build_number,
            result,
        }
    }

    /// The revision considered before any merge.
    pub fn marked(&self) -> &Revision {
        self.marked.as_ref().unwrap_or(&self.revision)
    }

    pub fn is_merge(&self) -> bool {
        self.marked.is_some()
    }

    /// Whether this build either built or was triggered by `commit`.
    pub fn covers(&self, commit: &CommitId) -> bool {
        self.revision.commit() == commit || self.marked().commit() == commit
    }
}

/// Per-job ledger of finished builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildHistory {
    #[serde(default)]
    builds_by_branch: BTreeMap<String, BuildRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_build: Option<BuildRecord>,
}

impl BuildHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished build of `revision`.
    pub fn record(
        &mut self,
        revision: Revision,
        build_number: u64,
        result: BuildResult,
    ) -> &BuildRecord {
        self.save(BuildRecord::new(revision, build_number, result))
    }

    /// Record a merge build: `marked` triggered it, `built` is what was built.
    pub fn record_merge(
        &mut self,
        marked: Revision,
        built: Revision,
        build_number: u64,
        result: BuildResult,
    ) -> &BuildRecord {
        self.save(BuildRecord::merge(marked, built, build_number, result))
    }

    fn save(&mut self, record: BuildRecord) -> &BuildRecord {
        for name in record.marked().branch_names() {
            self.builds_by_branch.insert(name.to_string(), record.clone());
        }
        self.last_build.insert(record)
    }

    /// Whether any recorded build built or was triggered by `commit`.
    pub fn has_been_built(&self, commit: &CommitId) -> bool {
        self.last_build_of_commit(commit).is_some()
    }

    /// The build that covered `commit`: the most recent build if it did,
    /// otherwise the highest-numbered branch record that did.
    pub fn last_build_of_commit(&self, commit: &CommitId) -> Option<&BuildRecord> {
        if let Some(last) = self.last_build.as_ref().filter(|b| b.covers(commit)) {
            return Some(last);
        }
        self.builds_by_branch
            .values()
            .filter(|build| build.covers(commit))
            .max_by_key(|build| build.build_number)
    }

    pub fn last_build_of_branch(&self, name: &str) -> Option<&BuildRecord> {
        self.builds_by_branch.get(name)
    }

    pub fn last_build(&self) -> Option<&BuildRecord> {
        self.last_build.as_ref()
    }

    /// Revision of the most recent build, used as the rebuild fallback.
    pub fn last_built_revision(&self) -> Option<&Revision> {
        self.last_build.as_ref().map(|build| &build.revision)
    }

    /// Whether some branch record still names `commit` as what it built.
    pub fn has_been_referenced(&self, commit: &CommitId) -> bool {
        self.builds_by_branch
            .values()
            .any(|build| build.revision.commit() == commit)
    }

    pub fn builds_by_branch(&self) -> &BTreeMap<String, BuildRecord> {
        &self.builds_by_branch
    }

    /// Distinct branch records, newest build first.
    pub fn builds(&self) -> Vec<&BuildRecord> {
        let mut builds: Vec<&BuildRecord> = Vec::new();
        for build in self.builds_by_branch.values() {
            if !builds.iter().any(|seen| seen.build_number == build.build_number) {
                builds.push(build);
            }
        }
        builds.sort_by(|a, b| b.build_number.cmp(&a.build_number));
        builds
    }

    pub fn is_empty(&self) -> bool {
        self.last_build.is_none() && self.builds_by_branch.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(ch: char) -> CommitId {
        CommitId::parse(&ch.to_string().repeat(40)).expect("commit id")
    }

    #[test]
    fn empty_history_has_nothing_built() {
        let history = BuildHistory::new();
        assert!(history.is_empty());
        assert!(!history.has_been_built(&id('a')));
        assert!(history.last_built_revision().is_none());
    }

    #[test]
    fn record_tracks_every_branch_and_last_build() {
        let mut history = BuildHistory::new();
        let rev = Revision::new(id('a'))
            .with_branch("origin/master")
            .with_branch("refs/tags/v1");
        history.record(rev.clone(), 1, BuildResult::Success);

        assert!(history.has_been_built(&id('a')));
        assert_eq!(history.last_built_revision(), Some(&rev));
        assert_eq!(
            history
                .last_build_of_branch("refs/tags/v1")
                .map(|b| b.build_number),
            Some(1)
        );
    }

    #[test]
    fn later_build_replaces_branch_entry() {
        let mut history = BuildHistory::new();
        history.record(
            Revision::new(id('a')).with_branch("origin/master"),
            1,
            BuildResult::Failure,
        );
        history.record(
            Revision::new(id('b')).with_branch("origin/master"),
            2,
            BuildResult::Success,
        );

        let build = history.last_build_of_branch("origin/master").expect("build");
        assert_eq!(build.revision.commit(), &id('b'));
        // The earlier commit is no longer referenced by any record.
        assert!(!history.has_been_built(&id('a')));
        assert!(history.has_been_built(&id('b')));
    }

    #[test]
    fn history_survives_branch_deletion() {
        let mut history = BuildHistory::new();
        history.record(
            Revision::new(id('a')).with_branch("origin/gone"),
            7,
            BuildResult::Success,
        );
        history.record(
            Revision::new(id('b')).with_branch("origin/master"),
            8,
            BuildResult::Success,
        );
        assert!(history.has_been_built(&id('a')));
        assert_eq!(
            history.last_build_of_commit(&id('a')).map(|b| b.build_number),
            Some(7)
        );
    }

    #[test]
    fn merge_build_recognizes_marked_and_built_commits() {
        let mut history = BuildHistory::new();
        let marked = Revision::new(id('a')).with_branch("origin/feature");
        let built = Revision::new(id('e')).with_branch("origin/feature");
        history.record_merge(marked, built, 3, BuildResult::Unstable);

        assert!(history.has_been_built(&id('a')));
        assert!(history.has_been_built(&id('e')));
        let record = history.last_build().expect("last build");
        assert!(record.is_merge());
        assert_eq!(record.marked().commit(), &id('a'));
        assert_eq!(history.last_built_revision().map(|r| r.commit()), Some(&id('e')));
    }

    #[test]
    fn builds_lists_each_record_once_newest_first() {
        let mut history = BuildHistory::new();
        history.record(
            Revision::new(id('a'))
                .with_branch("origin/master")
                .with_branch("origin/release"),
            1,
            BuildResult::Success,
        );
        history.record(
            Revision::new(id('b')).with_branch("origin/feature"),
            2,
            BuildResult::Failure,
        );

        let numbers: Vec<u64> = history.builds().iter().map(|b| b.build_number).collect();
        assert_eq!(numbers, vec![2, 1]);
        assert!(history.has_been_referenced(&id('a')));
        assert!(!history.has_been_referenced(&id('c')));
    }

    #[test]
    fn build_result_parses_case_insensitively() {
        assert_eq!("SUCCESS".parse::<BuildResult>().expect("parse"), BuildResult::Success);
        assert_eq!("not-built".parse::<BuildResult>().expect("parse"), BuildResult::NotBuilt);
        assert!("green".parse::<BuildResult>().is_err());
    }

    #[test]
    fn history_serializes_with_plain_values() {
        let mut history = BuildHistory::new();
        history.record(
            Revision::new(id('a')).with_branch("origin/master"),
            1,
            BuildResult::Success,
        );
        let json = serde_json::to_string(&history).expect("serialize");
        assert!(json.contains("\"SUCCESS\""));
        let back: BuildHistory = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, history);
    }
}
