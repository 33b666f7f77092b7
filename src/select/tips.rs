//! Tip filtering: drop revisions that are ancestors of another candidate.

use tracing::debug;

use crate::error::Result;
use crate::graph::CommitGraph;
use crate::revision::Revision;

/// Keep only revisions that no other revision in the set descends from.
///
/// Compares every pair through `merge_base`. Pairs without a common ancestor
/// are unrelated and both stay; two revisions on the same commit never
/// remove each other. Input order is preserved among the survivors.
pub fn filter_tip_revisions(
    graph: &dyn CommitGraph,
    revisions: Vec<Revision>,
) -> Result<Vec<Revision>> {
    if revisions.len() < 2 {
        return Ok(revisions);
    }

    let mut keep = vec![true; revisions.len()];
    for i in 0..revisions.len() {
        for j in (i + 1)..revisions.len() {
            // An ancestor of a dropped revision is an ancestor of whatever
            // dropped it, so skipping dropped ones loses nothing.
            if !keep[i] {
                break;
            }
            if !keep[j] {
                continue;
            }
            let (left, right) = (revisions[i].commit(), revisions[j].commit());
            if left == right {
                continue;
            }
            match graph.merge_base(left, right)? {
                Some(base) if &base == left => {
                    debug!(ancestor = %left, tip = %right, "Dropping non-tip revision");
                    keep[i] = false;
                }
                Some(base) if &base == right => {
                    debug!(ancestor = %right, tip = %left, "Dropping non-tip revision");
                    keep[j] = false;
                }
                _ => {}
            }
        }
    }

    let tips: Vec<Revision> = revisions
        .into_iter()
        .zip(keep)
        .filter_map(|(revision, kept)| kept.then_some(revision))
        .collect();
    debug!(count = tips.len(), "After tip filtering");
    Ok(tips)
}
