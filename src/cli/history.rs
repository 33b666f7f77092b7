//! revsel history command implementation

use std::path::PathBuf;

use glob::Pattern;
use serde::Serialize;

use crate::cli::RepoContext;
use crate::error::{Error, Result};
use crate::history::{BuildHistory, BuildRecord, BuildResult};
use crate::output::{emit_success, HumanOutput, OutputOptions};

/// Options for the history command
pub struct HistoryOptions {
    pub branch: Option<String>,
    pub repo: Option<PathBuf>,
    pub job: Option<String>,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct HistoryReport {
    job: String,
    branches: Vec<BranchBuild>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_build: Option<BuildSummary>,
    /// Every job with a history file in this repository.
    jobs: Vec<String>,
}

#[derive(Serialize)]
struct BranchBuild {
    branch: String,
    #[serde(flatten)]
    build: BuildSummary,
}

#[derive(Serialize)]
struct BuildSummary {
    build_number: u64,
    result: BuildResult,
    commit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    marked: Option<String>,
}

impl From<&BuildRecord> for BuildSummary {
    fn from(record: &BuildRecord) -> Self {
        Self {
            build_number: record.build_number,
            result: record.result,
            commit: record.revision.commit().to_string(),
            marked: record
                .marked
                .as_ref()
                .map(|marked| marked.commit().to_string()),
        }
    }
}

pub fn run(options: HistoryOptions) -> Result<()> {
    let ctx = RepoContext::open(options.repo.as_deref(), options.job.clone())?;
    let pattern = options
        .branch
        .as_deref()
        .map(|raw| {
            Pattern::new(raw).map_err(|err| {
                Error::InvalidArgument(format!("invalid branch pattern '{raw}': {err}"))
            })
        })
        .transpose()?;
    let history = ctx.store.load(&ctx.job)?;
    let mut report = history_report(&ctx.job, &history, pattern.as_ref());
    report.jobs = ctx.store.jobs()?;

    let header = if history.is_empty() {
        format!("No builds recorded for job {}", report.job)
    } else {
        format!("Build history for job {}", report.job)
    };
    let mut human = HumanOutput::new(header);
    if let Some(last) = &report.last_build {
        human.push_summary(
            "last build",
            format!("#{} {} {}", last.build_number, last.result, short(&last.commit)),
        );
    }
    human.push_summary("branches", report.branches.len().to_string());
    for entry in &report.branches {
        human.push_detail(format!(
            "{} #{} {} {}",
            entry.branch,
            entry.build.build_number,
            entry.build.result,
            short(&entry.build.commit)
        ));
    }
    if history.is_empty() {
        if let Some(other) = report.jobs.first() {
            human.push_warning(format!(
                "jobs with recorded builds: {}",
                report.jobs.join(", ")
            ));
            human.push_next_step(format!("revsel --job {other} history"));
        }
    }

    emit_success(options.output, "history", &report, &human)
}

fn history_report(job: &str, history: &BuildHistory, pattern: Option<&Pattern>) -> HistoryReport {
    let branches = history
        .builds_by_branch()
        .iter()
        .filter(|(branch, _)| pattern.map_or(true, |pattern| pattern.matches(branch)))
        .map(|(branch, record)| BranchBuild {
            branch: branch.clone(),
            build: BuildSummary::from(record),
        })
        .collect();
    HistoryReport {
        job: job.to_string(),
        branches,
        last_build: history.last_build().map(BuildSummary::from),
        jobs: Vec::new(),
    }
}

fn short(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}
