//! Inverse strategy: build everything except the configured branches.

use tracing::{debug, info, warn};

use crate::branch_spec::{matches_any, BranchSpec};
use crate::error::Result;
use crate::history::BuildHistory;
use crate::revision::Revision;
use crate::select::{
    drop_built, filter_tip_revisions, reference_revisions, retain_branches_where,
    sort_oldest_first, SelectCandidates, SelectionContext,
};

/// Selects branches that match none of the configured specs.
///
/// The excluded branches are usually built by another, more specific job.
/// Default-branch pointers (`origin/HEAD`) are always excluded. The
/// caller's `branch_spec` is ignored.
#[derive(Debug, Clone)]
pub struct InverseStrategy {
    excluded: Vec<BranchSpec>,
    head: BranchSpec,
}

impl InverseStrategy {
    pub fn new<S: AsRef<str>>(excluded: &[S]) -> Result<Self> {
        Ok(Self {
            excluded: BranchSpec::parse_all(excluded)?,
            head: BranchSpec::head(),
        })
    }

    pub fn excluded(&self) -> &[BranchSpec] {
        &self.excluded
    }
}

impl SelectCandidates for InverseStrategy {
    fn select_candidates(
        &self,
        is_poll: bool,
        _branch_spec: Option<&str>,
        history: &BuildHistory,
        ctx: &SelectionContext<'_>,
    ) -> Result<Vec<Revision>> {
        let graph = ctx.graph();
        let mut revisions = reference_revisions(graph)?;

        for revision in &mut revisions {
            retain_branches_where(revision, |branch| {
                if branch.is_head_pointer() || self.head.matches(&branch.name, ctx.env())? {
                    return Ok(false);
                }
                let excluded = matches_any(&self.excluded, &branch.name, ctx.env())?;
                if excluded {
                    debug!(branch = %branch.name, "Ignoring branch because it matches an excluded specifier");
                }
                Ok(!excluded)
            })?;
        }
        revisions.retain(Revision::has_branches);

        let mut revisions = filter_tip_revisions(graph, revisions)?;
        if revisions.is_empty() {
            warn!(
                "All current branches were excluded from being built; \
                 either the branch specifiers are too broad or the default strategy should be used"
            );
            return Ok(revisions);
        }

        let fallback = drop_built(&mut revisions, history);
        if revisions.is_empty() {
            if !is_poll {
                if let Some(last) = fallback {
                    info!(revision = %last, "No new revisions, falling back to last built revision");
                    return Ok(vec![last]);
                }
            }
            debug!("No new revisions");
            return Ok(revisions);
        }

        sort_oldest_first(graph, &mut revisions)?;
        Ok(revisions)
    }
}
