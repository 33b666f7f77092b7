//! revsel graph-agent command implementation
//!
//! Answers commit graph queries for a selecting process that cannot see the
//! repository itself. Requests arrive as JSON lines on stdin; each gets one
//! JSON line on stdout. The session ends at EOF.

use std::io::{self, BufReader};
use std::path::PathBuf;

use tracing::info;

use crate::cli::RepoContext;
use crate::error::Result;
use crate::graph::protocol::serve;

/// Options for the graph-agent command
pub struct AgentOptions {
    pub repo: Option<PathBuf>,
}

pub fn run(options: AgentOptions) -> Result<()> {
    // Repository config still applies (selection.local_branches).
    let ctx = RepoContext::open(options.repo.as_deref(), None)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    let handled = serve(&ctx.graph, BufReader::new(stdin.lock()), stdout.lock())?;
    info!(handled, "Graph agent session finished");
    Ok(())
}
