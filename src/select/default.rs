//! Default strategy: build the newest tip of every matching branch.

use tracing::{debug, info, warn};

use crate::branch_spec::{expand_vars, matches_any, BranchSpec, REGEX_SENTINEL};
use crate::error::{Error, Result};
use crate::graph::CommitGraph;
use crate::history::BuildHistory;
use crate::revision::{looks_like_commit_prefix, CommitId, Revision, DETACHED};
use crate::select::{
    drop_built, filter_tip_revisions, reference_revisions, retain_branches_where,
    sort_oldest_first, SelectCandidates, SelectionContext,
};

const FETCH_HEAD: &str = "FETCH_HEAD";

/// Tip-tracking over the configured branch specs.
///
/// A single concrete target (no wildcard) is resolved directly; anything
/// else enumerates every reference, keeps the tips that match, and drops
/// what has already been built.
#[derive(Debug, Clone)]
pub struct DefaultStrategy {
    specs: Vec<BranchSpec>,
    remotes: Vec<String>,
}

impl DefaultStrategy {
    pub fn new<S: AsRef<str>>(branches: &[S], remotes: &[S]) -> Result<Self> {
        let remotes: Vec<String> = remotes
            .iter()
            .map(|remote| remote.as_ref().trim().to_string())
            .filter(|remote| !remote.is_empty())
            .collect();
        if remotes.iter().any(|remote| remote.contains('/')) {
            return Err(Error::InvalidConfig(
                "remote names must not contain '/'".to_string(),
            ));
        }
        Ok(Self {
            specs: BranchSpec::parse_all(branches)?,
            remotes,
        })
    }

    pub fn specs(&self) -> &[BranchSpec] {
        &self.specs
    }

    pub fn remotes(&self) -> &[String] {
        &self.remotes
    }

    /// The concrete name to resolve, when the request names exactly one branch.
    fn single_target(&self, branch_spec: Option<&str>, ctx: &SelectionContext<'_>) -> Option<String> {
        let raw = match branch_spec {
            Some(spec) => spec,
            None => match self.specs.as_slice() {
                [only] => only.name(),
                _ => return None,
            },
        };
        let expanded = expand_vars(raw.trim(), ctx.env());
        let expanded = expanded.trim();
        if expanded.is_empty() || expanded.contains('*') || expanded.starts_with(REGEX_SENTINEL) {
            return None;
        }
        Some(expanded.to_string())
    }

    /// Reference names to try for a single target, each with its display label.
    fn resolution_candidates(&self, name: &str) -> Vec<(String, String)> {
        let mut candidates: Vec<(String, String)> = Vec::new();

        if name == FETCH_HEAD {
            candidates.push((name.to_string(), name.to_string()));
            return candidates;
        }

        if !name.contains('/') {
            let tag = format!("refs/tags/{name}");
            candidates.push((tag.clone(), tag));
            for remote in &self.remotes {
                candidates.push((
                    format!("refs/remotes/{remote}/{name}"),
                    format!("{remote}/{name}"),
                ));
            }
        } else {
            for remote in &self.remotes {
                let remote_prefix = format!("{remote}/");
                let remotes_prefix = format!("remotes/{remote}/");
                if name.starts_with(&remote_prefix) {
                    candidates.push((format!("refs/remotes/{name}"), name.to_string()));
                } else if let Some(rest) = name.strip_prefix(&remotes_prefix) {
                    candidates.push((format!("refs/{name}"), format!("{remote}/{rest}")));
                } else if let Some(rest) = name.strip_prefix("refs/heads/") {
                    candidates.push((
                        format!("refs/remotes/{remote}/{rest}"),
                        format!("{remote}/{rest}"),
                    ));
                } else {
                    candidates.push((name.to_string(), name.to_string()));
                    candidates.push((
                        format!("refs/remotes/{remote}/{name}"),
                        format!("{remote}/{name}"),
                    ));
                }
            }
        }

        candidates.push((name.to_string(), name.to_string()));
        let mut seen = std::collections::HashSet::new();
        candidates.retain(|(reference, _)| seen.insert(reference.clone()));
        candidates
    }

    fn resolve_single(
        &self,
        is_poll: bool,
        name: &str,
        history: &BuildHistory,
        graph: &dyn CommitGraph,
    ) -> Result<Vec<Revision>> {
        if !is_poll && looks_like_commit_prefix(name) {
            match graph.resolve(name) {
                Ok(commit) => {
                    debug!(commit = %commit, "Building requested commit");
                    return Ok(vec![Revision::new(commit).with_branch(DETACHED)]);
                }
                Err(Error::RefNotFound(_)) => {
                    debug!(target = name, "Not a known commit, resolving as a branch");
                }
                Err(err) => return Err(err),
            }
        }

        let mut resolved: Vec<(String, CommitId)> = Vec::new();
        for (reference, label) in self.resolution_candidates(name) {
            let result = if reference == FETCH_HEAD {
                graph.resolve_fetch_head()
            } else {
                graph.resolve(&reference)
            };
            match result {
                Ok(commit) => resolved.push((label, commit)),
                Err(Error::RefNotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }

        let Some((label, commit)) = resolved.first().cloned() else {
            info!(target = name, "Couldn't find any revision to build; verify the repository and branch configuration");
            return Ok(Vec::new());
        };
        if resolved.iter().any(|(_, other)| other != &commit) {
            let others: Vec<&str> = resolved[1..].iter().map(|(l, _)| l.as_str()).collect();
            warn!(target = name, chosen = %label, ?others, "Ambiguous target, using the first match");
        }

        if is_poll && history.has_been_built(&commit) {
            debug!(commit = %commit, "Target already built");
            return Ok(Vec::new());
        }
        Ok(vec![Revision::new(commit).with_branch(label)])
    }

    fn select_advanced(
        &self,
        is_poll: bool,
        specs: &[BranchSpec],
        history: &BuildHistory,
        ctx: &SelectionContext<'_>,
    ) -> Result<Vec<Revision>> {
        let graph = ctx.graph();
        let mut revisions = reference_revisions(graph)?;

        for revision in &mut revisions {
            retain_branches_where(revision, |branch| {
                let keep = matches_any(specs, &branch.name, ctx.env())?;
                if !keep {
                    debug!(branch = %branch.name, "Ignoring branch because it doesn't match the branch specifier");
                }
                Ok(keep)
            })?;
            if revision.branches().len() > 1 {
                revision.retain_branches(|branch| !branch.is_head_pointer());
            }
        }
        revisions.retain(Revision::has_branches);

        let mut revisions = filter_tip_revisions(graph, revisions)?;
        let fallback = drop_built(&mut revisions, history);

        if revisions.is_empty() {
            if is_poll {
                debug!("No new revisions");
                return Ok(revisions);
            }
            if let Some(mut last) = fallback {
                last.sort_branches_by_specs(specs, ctx.env())?;
                info!(revision = %last, "No new revisions, falling back to last built revision");
                return Ok(vec![last]);
            }
            info!("No candidate revisions");
            return Ok(revisions);
        }

        sort_oldest_first(graph, &mut revisions)?;
        Ok(revisions)
    }
}

impl SelectCandidates for DefaultStrategy {
    fn select_candidates(
        &self,
        is_poll: bool,
        branch_spec: Option<&str>,
        history: &BuildHistory,
        ctx: &SelectionContext<'_>,
    ) -> Result<Vec<Revision>> {
        if let Some(name) = self.single_target(branch_spec, ctx) {
            return self.resolve_single(is_poll, &name, history, ctx.graph());
        }

        match branch_spec.map(str::trim).filter(|spec| !spec.is_empty()) {
            Some(spec) => {
                let specs = vec![BranchSpec::new(spec)?];
                self.select_advanced(is_poll, &specs, history, ctx)
            }
            None => self.select_advanced(is_poll, &self.specs, history, ctx),
        }
    }
}
