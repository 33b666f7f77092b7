//! Command-line interface for revsel
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::graph::git::{config_root, GitGraph};
use crate::output::OutputOptions;
use crate::storage::HistoryStore;

mod agent;
mod history;
mod record;
mod refs;
mod select;

/// revsel - revision candidate selection
///
/// Decides which commits of a repository should be built next, given the
/// build history of a job.
#[derive(Parser, Debug)]
#[command(name = "revsel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the repository (defaults to current directory)
    #[arg(long, global = true, env = "REVSEL_REPO")]
    pub repo: Option<PathBuf>,

    /// Job whose build history is read and written (overrides history.job)
    #[arg(long, global = true, env = "REVSEL_JOB")]
    pub job: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the revisions that should be built next
    Select {
        /// Poll mode: never repeat an already-built revision
        #[arg(long)]
        poll: bool,

        /// Strategy: default, inverse, ancestry, compound, queue
        #[arg(long)]
        strategy: Option<String>,

        /// Strategy wrapped by ancestry/compound: default or inverse
        #[arg(long)]
        inner: Option<String>,

        /// Branch spec (repeatable); replaces selection.branches
        #[arg(short, long = "branch")]
        branches: Vec<String>,

        /// Single branch, tag, or commit to build
        #[arg(short, long)]
        target: Option<String>,

        /// Ignore commits older than this many days
        #[arg(long, allow_negative_numbers = true)]
        max_age: Option<i64>,

        /// Only build commits that contain this commit
        #[arg(long)]
        ancestor: Option<String>,

        /// Prioritized branch substring (repeatable, or newline-separated)
        #[arg(long)]
        priority: Vec<String>,

        /// Variable for `$VAR` expansion in branch specs (KEY=VALUE, repeatable)
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Query the commit graph through an agent command instead of locally
        #[arg(long, value_name = "COMMAND")]
        agent: Option<String>,
    },

    /// Record a finished build in the history
    Record {
        /// Revision that was built (commit, branch, or tag)
        revision: String,

        /// Build number
        #[arg(short = 'n', long)]
        build_number: u64,

        /// Build result: success, unstable, failure, not_built, aborted
        #[arg(long, default_value = "success")]
        result: String,

        /// Branch names to record the build under (defaults to the references at the commit)
        #[arg(short, long = "branch")]
        branches: Vec<String>,

        /// Revision that triggered a merge build, when different from the built one
        #[arg(long)]
        marked: Option<String>,
    },

    /// Show the recorded build history
    History {
        /// Only show branches matching this glob
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// List the references the selection engine sees
    Refs {
        /// Only list references matching this branch spec
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Serve commit graph queries as JSON lines on stdin/stdout
    GraphAgent,
}

impl Cli {
    /// Subcommand name as typed, for the error envelope.
    pub fn command_name(&self) -> &'static str {
        match self.command {
            Commands::Select { .. } => "select",
            Commands::Record { .. } => "record",
            Commands::History { .. } => "history",
            Commands::Refs { .. } => "refs",
            Commands::GraphAgent => "graph-agent",
        }
    }

    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        match self.command {
            Commands::Select {
                poll,
                strategy,
                inner,
                branches,
                target,
                max_age,
                ancestor,
                priority,
                env,
                agent,
            } => select::run(select::SelectOptions {
                poll,
                strategy,
                inner,
                branches,
                target,
                max_age,
                ancestor,
                priority,
                env,
                agent,
                repo: self.repo,
                job: self.job,
                output,
            }),
            Commands::Record {
                revision,
                build_number,
                result,
                branches,
                marked,
            } => record::run(record::RecordOptions {
                revision,
                build_number,
                result,
                branches,
                marked,
                repo: self.repo,
                job: self.job,
                output,
            }),
            Commands::History { branch } => history::run(history::HistoryOptions {
                branch,
                repo: self.repo,
                job: self.job,
                output,
            }),
            Commands::Refs { branch } => refs::run(refs::RefsOptions {
                branch,
                repo: self.repo,
                output,
            }),
            Commands::GraphAgent => agent::run(agent::AgentOptions { repo: self.repo }),
        }
    }
}

/// Repository, configuration, and history store shared by the commands.
pub(crate) struct RepoContext {
    pub graph: GitGraph,
    pub config: Config,
    pub store: HistoryStore,
    pub job: String,
}

impl RepoContext {
    pub fn open(repo: Option<&Path>, job: Option<String>) -> Result<Self> {
        let graph = GitGraph::open(repo)?;
        let config = Config::load_from_repo(&config_root(graph.repo()))?;
        let graph = graph.with_local_branches(config.selection.local_branches);
        let store =
            HistoryStore::for_repo(graph.repo()).with_lock_timeout(config.history.lock_timeout_ms);
        let job = job
            .map(|job| job.trim().to_string())
            .filter(|job| !job.is_empty())
            .unwrap_or_else(|| config.history.job.clone());
        Ok(Self {
            graph,
            config,
            store,
            job,
        })
    }
}
