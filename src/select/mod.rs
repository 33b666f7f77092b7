//! Candidate selection strategies.
//!
//! Every strategy answers one question: given the live references, the build
//! history and a poll/build mode, which revisions should be built next, in
//! what order. Strategies hold only their compiled configuration; all
//! mutable state lives in [`BuildHistory`], which the caller updates after a
//! build finishes.
//!
//! The set of strategies is closed ([`Strategy`]). [`Strategy::from_options`]
//! builds one from configuration, validating everything up front so that a
//! bad branch spec or ancestor hash fails before any repository query.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{FixedOffset, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::CommitGraph;
use crate::history::BuildHistory;
use crate::revision::{group_by_commit, Branch, Revision};

pub mod ancestry;
pub mod default;
pub mod inverse;
pub mod queue;
pub mod time;
pub mod tips;

pub use ancestry::{age_cutoff, parse_priorities, AncestryStrategy, CompoundStrategy};
pub use default::DefaultStrategy;
pub use inverse::InverseStrategy;
pub use queue::QueueStrategy;
pub use time::{sort_oldest_first, CommitTimeComparator};
pub use tips::filter_tip_revisions;

/// Inputs shared by every strategy for one selection invocation.
pub struct SelectionContext<'a> {
    graph: &'a dyn CommitGraph,
    env: HashMap<String, String>,
    today: NaiveDate,
    offset: FixedOffset,
}

impl<'a> SelectionContext<'a> {
    /// Context over `graph` with an empty environment and the local clock.
    pub fn new(graph: &'a dyn CommitGraph) -> Self {
        let now = Local::now();
        Self {
            graph,
            env: HashMap::new(),
            today: now.date_naive(),
            offset: *now.offset(),
        }
    }

    /// Variables available to `$VAR` references in branch specs.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Pin the calendar day and UTC offset used for age cutoffs.
    pub fn with_today(mut self, today: NaiveDate, offset: FixedOffset) -> Self {
        self.today = today;
        self.offset = offset;
        self
    }

    pub fn graph(&self) -> &'a dyn CommitGraph {
        self.graph
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// The selection capability every strategy provides.
pub trait SelectCandidates {
    /// Ordered revisions to build next.
    ///
    /// `branch_spec` is the single target requested by the caller, if any.
    /// A poll call never returns a revision the history has already built.
    fn select_candidates(
        &self,
        is_poll: bool,
        branch_spec: Option<&str>,
        history: &BuildHistory,
        ctx: &SelectionContext<'_>,
    ) -> Result<Vec<Revision>>;
}

/// Strategy names as used in configuration and on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Default,
    Inverse,
    Ancestry,
    Compound,
    Queue,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Default,
        StrategyKind::Inverse,
        StrategyKind::Ancestry,
        StrategyKind::Compound,
        StrategyKind::Queue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Default => "default",
            StrategyKind::Inverse => "inverse",
            StrategyKind::Ancestry => "ancestry",
            StrategyKind::Compound => "compound",
            StrategyKind::Queue => "queue",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "unknown strategy '{s}': must be default, inverse, ancestry, compound, or queue"
                ))
            })
    }
}

/// Everything needed to build a [`Strategy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOptions {
    pub kind: StrategyKind,
    /// Strategy wrapped by `ancestry` and `compound`: `default` or `inverse`.
    pub inner: StrategyKind,
    pub branches: Vec<String>,
    pub remotes: Vec<String>,
    pub target: Option<String>,
    pub max_age_days: Option<i64>,
    pub ancestor_commit: Option<String>,
    pub priority: Vec<String>,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            kind: StrategyKind::Default,
            inner: StrategyKind::Default,
            branches: vec!["**".to_string()],
            remotes: vec!["origin".to_string()],
            target: None,
            max_age_days: None,
            ancestor_commit: None,
            priority: Vec::new(),
        }
    }
}

impl StrategyOptions {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn branches<S: Into<String>>(mut self, branches: impl IntoIterator<Item = S>) -> Self {
        self.branches = branches.into_iter().map(Into::into).collect();
        self
    }

    pub fn remotes<S: Into<String>>(mut self, remotes: impl IntoIterator<Item = S>) -> Self {
        self.remotes = remotes.into_iter().map(Into::into).collect();
        self
    }

    pub fn inner(mut self, inner: StrategyKind) -> Self {
        self.inner = inner;
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn max_age_days(mut self, days: i64) -> Self {
        self.max_age_days = Some(days);
        self
    }

    pub fn ancestor_commit(mut self, commit: impl Into<String>) -> Self {
        self.ancestor_commit = Some(commit.into());
        self
    }

    pub fn priority<S: Into<String>>(mut self, priority: impl IntoIterator<Item = S>) -> Self {
        self.priority = priority.into_iter().map(Into::into).collect();
        self
    }
}

/// The closed set of selection strategies.
#[derive(Debug, Clone)]
pub enum Strategy {
    Default(DefaultStrategy),
    Inverse(InverseStrategy),
    AgeAncestry(AncestryStrategy),
    Compound(CompoundStrategy),
    TimeOrderedQueue(QueueStrategy),
}

impl Strategy {
    /// Build and validate a strategy.
    pub fn from_options(options: &StrategyOptions) -> Result<Self> {
        match options.kind {
            StrategyKind::Default | StrategyKind::Inverse => {
                Self::base(options.kind, options)
            }
            StrategyKind::Ancestry => Ok(Strategy::AgeAncestry(Self::ancestry(options)?)),
            StrategyKind::Compound => Ok(Strategy::Compound(CompoundStrategy::new(
                Self::ancestry(options)?,
                &options.priority,
            ))),
            StrategyKind::Queue => Ok(Strategy::TimeOrderedQueue(QueueStrategy::new(
                options.target.clone(),
            ))),
        }
    }

    fn base(kind: StrategyKind, options: &StrategyOptions) -> Result<Self> {
        match kind {
            StrategyKind::Default => Ok(Strategy::Default(DefaultStrategy::new(
                &options.branches,
                &options.remotes,
            )?)),
            StrategyKind::Inverse => Ok(Strategy::Inverse(InverseStrategy::new(
                &options.branches,
            )?)),
            other => Err(Error::InvalidConfig(format!(
                "strategy '{other}' cannot be wrapped by ancestry filtering; use default or inverse"
            ))),
        }
    }

    fn ancestry(options: &StrategyOptions) -> Result<AncestryStrategy> {
        let inner = Self::base(options.inner, options)?;
        AncestryStrategy::new(
            inner,
            options.max_age_days,
            options.ancestor_commit.as_deref(),
        )
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Default(_) => StrategyKind::Default,
            Strategy::Inverse(_) => StrategyKind::Inverse,
            Strategy::AgeAncestry(_) => StrategyKind::Ancestry,
            Strategy::Compound(_) => StrategyKind::Compound,
            Strategy::TimeOrderedQueue(_) => StrategyKind::Queue,
        }
    }
}

impl SelectCandidates for Strategy {
    fn select_candidates(
        &self,
        is_poll: bool,
        branch_spec: Option<&str>,
        history: &BuildHistory,
        ctx: &SelectionContext<'_>,
    ) -> Result<Vec<Revision>> {
        match self {
            Strategy::Default(strategy) => {
                strategy.select_candidates(is_poll, branch_spec, history, ctx)
            }
            Strategy::Inverse(strategy) => {
                strategy.select_candidates(is_poll, branch_spec, history, ctx)
            }
            Strategy::AgeAncestry(strategy) => {
                strategy.select_candidates(is_poll, branch_spec, history, ctx)
            }
            Strategy::Compound(strategy) => {
                strategy.select_candidates(is_poll, branch_spec, history, ctx)
            }
            Strategy::TimeOrderedQueue(strategy) => {
                strategy.select_candidates(is_poll, branch_spec, history, ctx)
            }
        }
    }
}

/// One revision per commit from the live reference list.
pub(crate) fn reference_revisions(graph: &dyn CommitGraph) -> Result<Vec<Revision>> {
    Ok(group_by_commit(graph.list_reference_commits()?))
}

/// Keep the branches for which `keep` answers true, stopping at the first error.
pub(crate) fn retain_branches_where<F>(revision: &mut Revision, mut keep: F) -> Result<()>
where
    F: FnMut(&Branch) -> Result<bool>,
{
    let mut dropped = Vec::new();
    for branch in revision.branches() {
        if !keep(branch)? {
            dropped.push(branch.name.clone());
        }
    }
    if !dropped.is_empty() {
        revision.retain_branches(|branch| !dropped.contains(&branch.name));
    }
    Ok(())
}

/// Remove revisions the history already built.
///
/// Returns the rebuild fallback: the last built revision, with its live
/// branch set when that commit is still referenced.
pub(crate) fn drop_built(
    revisions: &mut Vec<Revision>,
    history: &BuildHistory,
) -> Option<Revision> {
    let mut fallback = history.last_built_revision().cloned();
    revisions.retain(|revision| {
        if !history.has_been_built(revision.commit()) {
            return true;
        }
        tracing::debug!(revision = %revision, "Ignoring revision because it has already been built");
        if fallback.as_ref() == Some(revision) {
            fallback = Some(revision.clone());
        }
        false
    });
    fallback
}
