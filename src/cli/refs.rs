//! revsel refs command implementation

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;

use crate::branch_spec::BranchSpec;
use crate::cli::RepoContext;
use crate::error::Result;
use crate::graph::CommitGraph;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::revision::Branch;

/// Options for the refs command
pub struct RefsOptions {
    pub branch: Option<String>,
    pub repo: Option<PathBuf>,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct RefsReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    references: Vec<Branch>,
}

pub fn run(options: RefsOptions) -> Result<()> {
    let ctx = RepoContext::open(options.repo.as_deref(), None)?;
    let listed = ctx.graph.list_reference_commits()?;
    let total = listed.len();
    let references = match options.branch.as_deref() {
        Some(raw) => {
            let env: HashMap<String, String> = std::env::vars().collect();
            retain_matching(listed, &BranchSpec::new(raw)?, &env)?
        }
        None => listed,
    };

    let mut human = HumanOutput::new(format!("{} references", references.len()));
    if let Some(branch) = &options.branch {
        human.push_summary("branch spec", branch.clone());
        human.push_summary("listed", total.to_string());
    }
    for branch in &references {
        human.push_detail(format!("{} {}", branch.commit.short(), branch.name));
    }
    if total == 0 {
        human.push_warning("no remote branches or tags; fetch first");
    } else if references.is_empty() {
        human.push_warning("the branch spec matches none of the listed references");
    }

    let report = RefsReport {
        branch: options.branch,
        references,
    };
    emit_success(options.output, "refs", &report, &human)
}

/// References whose name `spec` matches, in listing order.
fn retain_matching(
    mut references: Vec<Branch>,
    spec: &BranchSpec,
    env: &HashMap<String, String>,
) -> Result<Vec<Branch>> {
    let names: Vec<&str> = references.iter().map(|branch| branch.name.as_str()).collect();
    let kept: HashSet<String> = spec
        .filter_matching(&names, env)?
        .into_iter()
        .map(str::to_string)
        .collect();
    references.retain(|branch| kept.contains(&branch.name));
    Ok(references)
}
