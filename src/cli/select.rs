//! revsel select command implementation
//!
//! Runs one selection against the repository (or a graph agent) and prints
//! the ordered candidates.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cli::RepoContext;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::protocol::{spawn_agent, RemoteGraph};
use crate::graph::CommitGraph;
use crate::history::BuildHistory;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::revision::Revision;
use crate::select::{
    parse_priorities, SelectCandidates, SelectionContext, Strategy, StrategyKind,
    StrategyOptions,
};

/// Options for the select command
pub struct SelectOptions {
    pub poll: bool,
    pub strategy: Option<String>,
    pub inner: Option<String>,
    pub branches: Vec<String>,
    pub target: Option<String>,
    pub max_age: Option<i64>,
    pub ancestor: Option<String>,
    pub priority: Vec<String>,
    pub env: Vec<String>,
    pub agent: Option<String>,
    pub repo: Option<PathBuf>,
    pub job: Option<String>,
    pub output: OutputOptions,
}

#[derive(Serialize)]
struct SelectReport {
    strategy: StrategyKind,
    poll: bool,
    job: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    /// The only candidate was already built and is offered again.
    rebuild: bool,
    candidates: Vec<Candidate>,
}

#[derive(Serialize)]
struct Candidate {
    commit: String,
    branches: Vec<String>,
}

impl From<&Revision> for Candidate {
    fn from(revision: &Revision) -> Self {
        Self {
            commit: revision.commit().to_string(),
            branches: revision.branch_names().map(str::to_string).collect(),
        }
    }
}

pub fn run(options: SelectOptions) -> Result<()> {
    let ctx = RepoContext::open(options.repo.as_deref(), options.job.clone())?;
    let strategy_options = strategy_options(&ctx.config, &options)?;
    let strategy = Strategy::from_options(&strategy_options)?;
    let env = selection_env(&options.env)?;
    let history = ctx.store.load(&ctx.job)?;
    let target = strategy_options.target.clone();

    let candidates = match options.agent.as_deref() {
        Some(command) => {
            debug!(command, "Selecting through graph agent");
            let (mut child, transport) =
                spawn_agent(Command::new("sh").arg("-c").arg(command))?;
            let graph = RemoteGraph::new(transport);
            let result = select_with(
                &strategy,
                &graph,
                env,
                options.poll,
                target.as_deref(),
                &history,
            );
            // Closing stdin ends the agent's session.
            drop(graph);
            match child.wait() {
                Ok(status) if !status.success() => {
                    warn!(command, %status, "Graph agent exited unsuccessfully");
                }
                Ok(_) => {}
                Err(err) => warn!(command, error = %err, "Failed to wait for graph agent"),
            }
            result?
        }
        None => select_with(
            &strategy,
            &ctx.graph,
            env,
            options.poll,
            target.as_deref(),
            &history,
        )?,
    };

    let rebuild = is_rebuild(options.poll, &candidates, &history);
    let report = SelectReport {
        strategy: strategy.kind(),
        poll: options.poll,
        job: ctx.job.clone(),
        target,
        rebuild,
        candidates: candidates.iter().map(Candidate::from).collect(),
    };

    let header = match candidates.len() {
        0 => "Nothing to build".to_string(),
        1 => "1 candidate to build".to_string(),
        n => format!("{n} candidates to build"),
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("strategy", report.strategy.to_string());
    human.push_summary("mode", if options.poll { "poll" } else { "build" });
    human.push_summary("job", report.job.clone());
    if let Some(target) = &report.target {
        human.push_summary("target", target.clone());
    }
    for revision in &candidates {
        let names: Vec<&str> = revision.branch_names().collect();
        human.push_detail(format!("{} {}", revision.commit().short(), names.join(", ")));
    }
    for warning in selection_warnings(&report, &history) {
        human.push_warning(warning);
    }
    if let (Some(first), false) = (candidates.first(), options.poll) {
        human.push_next_step(format!(
            "revsel record {} --build-number <N>",
            first.commit()
        ));
    }

    emit_success(options.output, "select", &report, &human)
}

fn select_with(
    strategy: &Strategy,
    graph: &dyn CommitGraph,
    env: HashMap<String, String>,
    poll: bool,
    target: Option<&str>,
    history: &BuildHistory,
) -> Result<Vec<Revision>> {
    let selection = SelectionContext::new(graph).with_env(env);
    strategy.select_candidates(poll, target, history, &selection)
}

/// A build call that found nothing new gets the last built revision back.
fn is_rebuild(poll: bool, candidates: &[Revision], history: &BuildHistory) -> bool {
    match candidates {
        [only] => !poll && history.has_been_built(only.commit()),
        _ => false,
    }
}

fn selection_warnings(report: &SelectReport, history: &BuildHistory) -> Vec<String> {
    let mut warnings = Vec::new();
    if report.rebuild {
        if let Some(candidate) = report.candidates.first() {
            warnings.push(format!(
                "nothing new to build; selecting already built {} again",
                candidate.commit
            ));
        }
    } else if report.candidates.is_empty() {
        let reason = match report.strategy {
            StrategyKind::Inverse => "every branch was excluded or already built",
            _ if history.is_empty() => "no reference matched the branch specs",
            _ => "every matching revision was already built or filtered out",
        };
        warnings.push(format!("nothing to build: {reason}"));
    }
    warnings
}

/// Configuration overlaid with command-line flags.
fn strategy_options(config: &Config, options: &SelectOptions) -> Result<StrategyOptions> {
    let mut resolved = config.strategy_options();
    if let Some(kind) = &options.strategy {
        resolved.kind = kind.parse()?;
    }
    if let Some(inner) = &options.inner {
        resolved.inner = inner.parse()?;
    }
    if !options.branches.is_empty() {
        resolved.branches = options.branches.clone();
    }
    if let Some(target) = &options.target {
        resolved.target = Some(target.clone());
    }
    if options.max_age.is_some() {
        resolved.max_age_days = options.max_age;
    }
    if let Some(ancestor) = &options.ancestor {
        resolved.ancestor_commit = Some(ancestor.clone());
    }
    if !options.priority.is_empty() {
        resolved.priority = parse_priorities(&options.priority);
    }
    Ok(resolved)
}

/// Process environment overlaid with `--env KEY=VALUE` pairs.
fn selection_env(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::InvalidArgument(format!("--env expects KEY=VALUE, got '{pair}'"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "--env expects KEY=VALUE, got '{pair}'"
            )));
        }
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}
