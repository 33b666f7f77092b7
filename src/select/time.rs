//! Commit-time ordering of revisions.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::graph::{CommitGraph, TraversalContext};
use crate::revision::Revision;

/// Orders revisions by committer time, oldest first, ties by commit id.
///
/// Times are read from the traversal context on every comparison. The
/// first read failure is kept and reported by [`CommitTimeComparator::finish`];
/// later comparisons fall back to commit-id order.
pub struct CommitTimeComparator<'g> {
    traversal: Box<dyn TraversalContext + 'g>,
    error: Option<Error>,
}

impl<'g> CommitTimeComparator<'g> {
    pub fn new(graph: &'g dyn CommitGraph) -> Result<Self> {
        Ok(Self {
            traversal: graph.traversal()?,
            error: None,
        })
    }

    pub fn compare(&mut self, a: &Revision, b: &Revision) -> Ordering {
        if self.error.is_some() {
            return a.commit().cmp(b.commit());
        }
        let times = self
            .traversal
            .commit_time(a.commit())
            .and_then(|left| Ok((left, self.traversal.commit_time(b.commit())?)));
        match times {
            Ok((left, right)) => left.cmp(&right).then_with(|| a.commit().cmp(b.commit())),
            Err(err) => {
                self.error = Some(err);
                a.commit().cmp(b.commit())
            }
        }
    }

    /// The first error seen while comparing, if any.
    pub fn finish(self) -> Result<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Sort revisions oldest first.
pub fn sort_oldest_first(graph: &dyn CommitGraph, revisions: &mut [Revision]) -> Result<()> {
    if revisions.len() < 2 {
        return Ok(());
    }
    let mut comparator = CommitTimeComparator::new(graph)?;
    // Surface an unreadable commit before sorting rather than mid-sort.
    for revision in revisions.iter() {
        comparator.traversal.commit_time(revision.commit())?;
    }
    revisions.sort_by(|a, b| comparator.compare(a, b));
    comparator.finish()
}
