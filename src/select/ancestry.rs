//! Age and ancestry bounds over another strategy, plus priority ordering.

use std::collections::HashMap;

use chrono::{Days, FixedOffset, NaiveDate, TimeZone};
use tracing::debug;

use crate::error::{Error, Result};
use crate::history::BuildHistory;
use crate::revision::{CommitId, Revision};
use crate::select::{SelectCandidates, SelectionContext, Strategy};

/// Filters the candidates of an inner strategy by commit age and ancestry.
#[derive(Debug, Clone)]
pub struct AncestryStrategy {
    inner: Box<Strategy>,
    max_age_days: Option<i64>,
    ancestor: Option<CommitId>,
}

impl AncestryStrategy {
    /// Both bounds are optional; a blank ancestor counts as absent.
    pub fn new(inner: Strategy, max_age_days: Option<i64>, ancestor: Option<&str>) -> Result<Self> {
        if let Some(days) = max_age_days {
            if days < 0 {
                return Err(Error::InvalidConfig(format!(
                    "max_age_days must be non-negative, got {days}"
                )));
            }
        }
        let ancestor = ancestor
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(CommitId::parse)
            .transpose()?;
        Ok(Self {
            inner: Box::new(inner),
            max_age_days,
            ancestor,
        })
    }

    pub fn inner(&self) -> &Strategy {
        &self.inner
    }

    pub fn max_age_days(&self) -> Option<i64> {
        self.max_age_days
    }

    pub fn ancestor(&self) -> Option<&CommitId> {
        self.ancestor.as_ref()
    }

    fn apply_bounds(
        &self,
        candidates: Vec<Revision>,
        ctx: &SelectionContext<'_>,
    ) -> Result<Vec<Revision>> {
        if self.max_age_days.is_none() && self.ancestor.is_none() {
            return Ok(candidates);
        }
        let cutoff = self
            .max_age_days
            .map(|days| age_cutoff(ctx.today(), ctx.offset(), days))
            .transpose()?;

        // One context for every candidate: reachability answers are only
        // consistent within a single traversal.
        let mut traversal = ctx.graph().traversal()?;
        if let Some(ancestor) = &self.ancestor {
            traversal.commit_time(ancestor)?;
        }

        let mut kept = Vec::with_capacity(candidates.len());
        for revision in candidates {
            if let Some(cutoff) = cutoff {
                let time = traversal.commit_time(revision.commit())?;
                if time < cutoff {
                    debug!(revision = %revision, time, cutoff, "Ignoring revision older than the maximum age");
                    continue;
                }
            }
            if let Some(ancestor) = &self.ancestor {
                if !traversal.is_merged_into(ancestor, revision.commit())? {
                    debug!(revision = %revision, ancestor = %ancestor, "Ignoring revision that does not contain the ancestor commit");
                    continue;
                }
            }
            kept.push(revision);
        }
        Ok(kept)
    }
}

impl SelectCandidates for AncestryStrategy {
    fn select_candidates(
        &self,
        is_poll: bool,
        branch_spec: Option<&str>,
        history: &BuildHistory,
        ctx: &SelectionContext<'_>,
    ) -> Result<Vec<Revision>> {
        let candidates = self
            .inner
            .select_candidates(is_poll, branch_spec, history, ctx)?;
        self.apply_bounds(candidates, ctx)
    }
}

/// Epoch seconds of midnight, `max_age_days` before `today`, at `offset`.
pub fn age_cutoff(today: NaiveDate, offset: FixedOffset, max_age_days: i64) -> Result<i64> {
    let days = u64::try_from(max_age_days).map_err(|_| {
        Error::InvalidConfig(format!("max_age_days must be non-negative, got {max_age_days}"))
    })?;
    let day = today
        .checked_sub_days(Days::new(days))
        .ok_or_else(|| Error::InvalidConfig(format!("max_age_days {max_age_days} is out of range")))?;
    offset
        .from_local_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default())
        .single()
        .map(|moment| moment.timestamp())
        .ok_or_else(|| Error::InvalidConfig(format!("no cutoff time for {day}")))
}

/// Split a prioritized-branch list: one substring per line, blanks dropped.
pub fn parse_priorities<S: AsRef<str>>(entries: &[S]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| entry.as_ref().lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Ancestry bounds followed by a stable sort on prioritized branch names.
#[derive(Debug, Clone)]
pub struct CompoundStrategy {
    ancestry: AncestryStrategy,
    priorities: Vec<String>,
}

impl CompoundStrategy {
    pub fn new<S: AsRef<str>>(ancestry: AncestryStrategy, priorities: &[S]) -> Self {
        Self {
            ancestry,
            priorities: parse_priorities(priorities),
        }
    }

    pub fn priorities(&self) -> &[String] {
        &self.priorities
    }

    /// Index of the first priority contained in any branch name.
    fn priority_of(&self, revision: &Revision) -> usize {
        self.priorities
            .iter()
            .position(|needle| revision.branch_names().any(|name| name.contains(needle.as_str())))
            .unwrap_or(usize::MAX)
    }

    fn sort_by_priority(&self, candidates: Vec<Revision>) -> Vec<Revision> {
        if self.priorities.is_empty() {
            return candidates;
        }
        let mut memo: HashMap<CommitId, usize> = HashMap::new();
        let mut ranked: Vec<(usize, Revision)> = candidates
            .into_iter()
            .map(|revision| {
                let rank = *memo
                    .entry(revision.commit().clone())
                    .or_insert_with(|| self.priority_of(&revision));
                (rank, revision)
            })
            .collect();
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.into_iter().map(|(_, revision)| revision).collect()
    }
}

impl SelectCandidates for CompoundStrategy {
    fn select_candidates(
        &self,
        is_poll: bool,
        branch_spec: Option<&str>,
        history: &BuildHistory,
        ctx: &SelectionContext<'_>,
    ) -> Result<Vec<Revision>> {
        let candidates = self
            .ancestry
            .select_candidates(is_poll, branch_spec, history, ctx)?;
        Ok(self.sort_by_priority(candidates))
    }
}
