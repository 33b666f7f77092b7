//! revsel record command implementation

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::cli::RepoContext;
use crate::error::Result;
use crate::graph::CommitGraph;
use crate::history::BuildResult;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::revision::{Revision, DETACHED};

/// Options for the record command
pub struct RecordOptions {
    pub revision: String,
    pub build_number: u64,
    pub result: String,
    pub branches: Vec<String>,
    pub marked: Option<String>,
    pub repo: Option<PathBuf>,
    pub job: Option<String>,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct RecordReport {
    job: String,
    build_number: u64,
    result: BuildResult,
    commit: String,
    branches: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    marked: Option<String>,
    /// A branch record already named this commit before this build.
    rebuild: bool,
}

pub fn run(options: RecordOptions) -> Result<()> {
    let ctx = RepoContext::open(options.repo.as_deref(), options.job.clone())?;
    let result: BuildResult = options.result.parse()?;

    let marked = match options.marked.as_deref() {
        Some(name) => Some(revision_for(&ctx.graph, name, &options.branches, None)?),
        None => None,
    };
    let built = revision_for(
        &ctx.graph,
        &options.revision,
        &options.branches,
        marked.as_ref(),
    )?;

    let build_number = options.build_number;
    let report = ctx.store.update(&ctx.job, |history| {
        let rebuild = history.has_been_referenced(built.commit());
        let record = match marked {
            Some(marked) => history.record_merge(marked, built, build_number, result),
            None => history.record(built, build_number, result),
        };
        Ok(RecordReport {
            job: ctx.job.clone(),
            build_number: record.build_number,
            result: record.result,
            commit: record.revision.commit().to_string(),
            branches: record.marked().branch_names().map(str::to_string).collect(),
            marked: record
                .marked
                .as_ref()
                .map(|marked| marked.commit().to_string()),
            rebuild,
        })
    })?;
    info!(
        job = %report.job,
        build_number = report.build_number,
        commit = %report.commit,
        rebuild = report.rebuild,
        "Recorded build"
    );

    let mut human = HumanOutput::new(format!("Recorded build #{}", report.build_number));
    human.push_summary("job", report.job.clone());
    human.push_summary("result", report.result.to_string());
    human.push_summary("commit", report.commit.clone());
    if let Some(marked) = &report.marked {
        human.push_summary("marked", marked.clone());
    }
    human.push_summary("branches", report.branches.join(", "));
    if report.rebuild {
        human.push_warning(format!("commit {} was already built", report.commit));
    }

    emit_success(options.output, "record", &report, &human)
}

/// Resolve `name` and label it: explicit branches first, then the
/// references pointing at the commit, then the fallback's branches.
fn revision_for(
    graph: &dyn CommitGraph,
    name: &str,
    branches: &[String],
    fallback: Option<&Revision>,
) -> Result<Revision> {
    let commit = graph.resolve(name.trim())?;
    let mut revision = Revision::new(commit);

    for branch in branches.iter().map(|branch| branch.trim()) {
        if !branch.is_empty() {
            revision.add_branch(branch);
        }
    }
    if !revision.has_branches() {
        for branch in graph.list_reference_commits()? {
            if &branch.commit == revision.commit() {
                revision.add_branch(branch.name);
            }
        }
    }
    if let (false, Some(fallback)) = (revision.has_branches(), fallback) {
        for branch in fallback.branch_names() {
            revision.add_branch(branch);
        }
    }
    if !revision.has_branches() {
        revision.add_branch(DETACHED);
    }
    Ok(revision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::{synthetic_id, MemoryGraph};

    fn graph() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        graph.add_commit(synthetic_id("a"), &[], 100).expect("commit");
        graph
            .add_commit(synthetic_id("m"), &[synthetic_id("a")], 200)
            .expect("commit");
        graph
            .set_ref("refs/remotes/origin/master", &synthetic_id("a"))
            .expect("ref");
        graph.set_ref("refs/tags/v1", &synthetic_id("a")).expect("ref");
        graph
    }

    #[test]
    fn labels_with_references_at_commit() {
        let graph = graph();
        let revision = revision_for(&graph, "origin/master", &[], None).expect("revision");
        assert_eq!(revision.commit(), &synthetic_id("a"));
        assert!(revision.contains_branch("origin/master"));
        assert!(revision.contains_branch("refs/tags/v1"));
    }

    #[test]
    fn explicit_branches_win() {
        let graph = graph();
        let branches = vec!["origin/release".to_string()];
        let revision =
            revision_for(&graph, synthetic_id("a").as_str(), &branches, None).expect("revision");
        let names: Vec<&str> = revision.branch_names().collect();
        assert_eq!(names, vec!["origin/release"]);
    }

    #[test]
    fn unreferenced_commit_borrows_fallback_or_is_detached() {
        let graph = graph();
        let merged = synthetic_id("m");
        let detached = revision_for(&graph, merged.as_str(), &[], None).expect("revision");
        assert!(detached.contains_branch(DETACHED));

        let marked = Revision::new(synthetic_id("a")).with_branch("origin/master");
        let built = revision_for(&graph, merged.as_str(), &[], Some(&marked)).expect("revision");
        assert!(built.contains_branch("origin/master"));
        assert!(!built.contains_branch(DETACHED));
    }
}
