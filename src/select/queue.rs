//! Time-ordered queue: build every commit of one line of history, one at a time.

use tracing::{debug, info};

use crate::branch_spec::{expand_vars, REGEX_SENTINEL};
use crate::error::Result;
use crate::history::BuildHistory;
use crate::revision::{Revision, DETACHED};
use crate::select::{SelectCandidates, SelectionContext};

/// Walks the commit log newest first down to the last built commit and
/// schedules the oldest commit that is newer than it.
///
/// Branch grouping, tip filtering and branch specs do not apply. Commits
/// sharing a timestamp are ordered by log position, the later entry
/// counting as newer.
#[derive(Debug, Clone, Default)]
pub struct QueueStrategy {
    target: Option<String>,
}

impl QueueStrategy {
    pub fn new(target: Option<String>) -> Self {
        Self {
            target: target
                .map(|target| target.trim().to_string())
                .filter(|target| !target.is_empty()),
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// The reference to log: a concrete `branch_spec`, else the configured target.
    fn log_target(&self, branch_spec: Option<&str>, ctx: &SelectionContext<'_>) -> Option<String> {
        let concrete = branch_spec
            .map(str::trim)
            .filter(|spec| {
                !spec.is_empty() && !spec.contains('*') && !spec.starts_with(REGEX_SENTINEL)
            });
        concrete
            .or(self.target.as_deref())
            .map(|name| expand_vars(name, ctx.env()))
    }
}

impl SelectCandidates for QueueStrategy {
    fn select_candidates(
        &self,
        is_poll: bool,
        branch_spec: Option<&str>,
        history: &BuildHistory,
        ctx: &SelectionContext<'_>,
    ) -> Result<Vec<Revision>> {
        let target = self.log_target(branch_spec, ctx);
        let label = target.clone().unwrap_or_else(|| DETACHED.to_string());

        let mut log: Vec<_> = ctx
            .graph()
            .log_all(target.as_deref())?
            .into_iter()
            .enumerate()
            .collect();
        log.sort_by(|(left_idx, left), (right_idx, right)| {
            right
                .time
                .cmp(&left.time)
                .then_with(|| right_idx.cmp(left_idx))
        });

        let last_build = history.last_build();
        let cursor = last_build.map(|build| build.marked().commit());

        // Newest first, stopping at the last built commit.
        let mut newer = Vec::new();
        for (_, entry) in log {
            if cursor == Some(&entry.commit) {
                break;
            }
            newer.push(entry);
        }
        debug!(count = newer.len(), "Commits newer than the last build");

        let Some(build) = last_build else {
            return Ok(newer
                .into_iter()
                .rev()
                .map(|entry| Revision::new(entry.commit).with_branch(label.clone()))
                .collect());
        };

        match newer.pop() {
            Some(oldest) => Ok(vec![Revision::new(oldest.commit).with_branch(label)]),
            None if !is_poll => {
                info!(revision = %build.revision, "No newer commits, repeating last build");
                Ok(vec![build.revision.clone()])
            }
            None => Ok(Vec::new()),
        }
    }
}
