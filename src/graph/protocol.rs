//! Request/response boundary for running the commit graph elsewhere.
//!
//! The repository may live on a build agent while the build history lives
//! on a controller. The graph queries are the only calls allowed across
//! that boundary, and they carry plain serializable values. A session
//! (one connection) owns one traversal context, so reachability answers
//! for one selection invocation stay consistent.
//!
//! Wire format: one JSON object per line in each direction.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{CommitGraph, LogEntry, TraversalContext};
use crate::revision::{Branch, CommitId};

/// A graph query sent to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphRequest {
    ListReferenceCommits,
    Resolve { name: String },
    MergeBase { a: CommitId, b: CommitId },
    CommitTimestamp { commit: CommitId },
    LogAll { reference: Option<String> },
    ResolveFetchHead,
    /// Start a fresh traversal context for the following reachability queries.
    OpenTraversal,
    IsMergedInto { ancestor: CommitId, candidate: CommitId },
    CommitTime { commit: CommitId },
}

/// Failure categories preserved across the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    RefNotFound,
    MissingObject,
    InvalidCommitId,
    Repository,
}

/// An agent's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphResponse {
    References { branches: Vec<Branch> },
    Commit { commit: CommitId },
    MergeBase { commit: Option<CommitId> },
    Timestamp { time: i64 },
    Log { entries: Vec<LogEntry> },
    Merged { merged: bool },
    Opened,
    Error { error: RemoteErrorKind, message: String },
}

impl GraphResponse {
    fn from_error(err: &Error) -> Self {
        let (error, message) = match err {
            Error::RefNotFound(name) => (RemoteErrorKind::RefNotFound, name.clone()),
            Error::MissingObject(id) => (RemoteErrorKind::MissingObject, id.clone()),
            Error::InvalidCommitId(id) => (RemoteErrorKind::InvalidCommitId, id.clone()),
            other => (RemoteErrorKind::Repository, other.to_string()),
        };
        GraphResponse::Error { error, message }
    }
}

fn remote_error(kind: RemoteErrorKind, message: String) -> Error {
    match kind {
        RemoteErrorKind::RefNotFound => Error::RefNotFound(message),
        RemoteErrorKind::MissingObject => Error::MissingObject(message),
        RemoteErrorKind::InvalidCommitId => Error::InvalidCommitId(message),
        RemoteErrorKind::Repository => Error::OperationFailed(format!("graph agent: {message}")),
    }
}

/// Agent-side state for one connection.
pub struct GraphSession<'g> {
    graph: &'g dyn CommitGraph,
    traversal: Option<Box<dyn TraversalContext + 'g>>,
}

impl<'g> GraphSession<'g> {
    pub fn new(graph: &'g dyn CommitGraph) -> Self {
        Self {
            graph,
            traversal: None,
        }
    }

    /// Execute one request. Errors become [`GraphResponse::Error`].
    pub fn handle(&mut self, request: GraphRequest) -> GraphResponse {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => GraphResponse::from_error(&err),
        }
    }

    fn dispatch(&mut self, request: GraphRequest) -> Result<GraphResponse> {
        Ok(match request {
            GraphRequest::ListReferenceCommits => GraphResponse::References {
                branches: self.graph.list_reference_commits()?,
            },
            GraphRequest::Resolve { name } => GraphResponse::Commit {
                commit: self.graph.resolve(&name)?,
            },
            GraphRequest::MergeBase { a, b } => GraphResponse::MergeBase {
                commit: self.graph.merge_base(&a, &b)?,
            },
            GraphRequest::CommitTimestamp { commit } => GraphResponse::Timestamp {
                time: self.graph.commit_timestamp(&commit)?,
            },
            GraphRequest::LogAll { reference } => GraphResponse::Log {
                entries: self.graph.log_all(reference.as_deref())?,
            },
            GraphRequest::ResolveFetchHead => GraphResponse::Commit {
                commit: self.graph.resolve_fetch_head()?,
            },
            GraphRequest::OpenTraversal => {
                self.traversal = Some(self.graph.traversal()?);
                GraphResponse::Opened
            }
            GraphRequest::IsMergedInto {
                ancestor,
                candidate,
            } => GraphResponse::Merged {
                merged: self.traversal()?.is_merged_into(&ancestor, &candidate)?,
            },
            GraphRequest::CommitTime { commit } => GraphResponse::Timestamp {
                time: self.traversal()?.commit_time(&commit)?,
            },
        })
    }

    fn traversal(&mut self) -> Result<&mut (dyn TraversalContext + 'g)> {
        if self.traversal.is_none() {
            self.traversal = Some(self.graph.traversal()?);
        }
        match self.traversal.as_deref_mut() {
            Some(ctx) => Ok(ctx),
            None => Err(Error::OperationFailed(
                "traversal context unavailable".to_string(),
            )),
        }
    }
}

/// Serve JSON-line requests from `reader` until EOF. Returns the number of
/// requests handled.
pub fn serve<R: BufRead, W: Write>(
    graph: &dyn CommitGraph,
    reader: R,
    mut writer: W,
) -> Result<usize> {
    let mut session = GraphSession::new(graph);
    let mut handled = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<GraphRequest>(&line) {
            Ok(request) => {
                debug!(?request, "graph agent request");
                session.handle(request)
            }
            Err(err) => GraphResponse::Error {
                error: RemoteErrorKind::Repository,
                message: format!("malformed request: {err}"),
            },
        };
        writeln!(writer, "{}", serde_json::to_string(&response)?)?;
        writer.flush()?;
        handled += 1;
    }
    Ok(handled)
}

/// Carries one request to an agent and returns its response.
pub trait Transport {
    fn call(&self, request: &GraphRequest) -> Result<GraphResponse>;
}

/// In-process transport that still round-trips every message through JSON.
pub struct LoopbackTransport<'g> {
    session: RefCell<GraphSession<'g>>,
}

impl<'g> LoopbackTransport<'g> {
    pub fn new(graph: &'g dyn CommitGraph) -> Self {
        Self {
            session: RefCell::new(GraphSession::new(graph)),
        }
    }
}

impl Transport for LoopbackTransport<'_> {
    fn call(&self, request: &GraphRequest) -> Result<GraphResponse> {
        let wire = serde_json::to_string(request)?;
        let request: GraphRequest = serde_json::from_str(&wire)?;
        let response = self.session.borrow_mut().handle(request);
        let wire = serde_json::to_string(&response)?;
        Ok(serde_json::from_str(&wire)?)
    }
}

/// JSON-lines transport over a reader/writer pair (e.g. a child process).
pub struct LineTransport<R, W> {
    io: RefCell<(R, W)>,
}

impl<R: BufRead, W: Write> LineTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: RefCell::new((reader, writer)),
        }
    }
}

impl<R: BufRead, W: Write> Transport for LineTransport<R, W> {
    fn call(&self, request: &GraphRequest) -> Result<GraphResponse> {
        let mut io = self.io.borrow_mut();
        let (reader, writer) = &mut *io;
        writeln!(writer, "{}", serde_json::to_string(request)?)?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::Transport(
                "graph agent closed the connection".to_string(),
            ));
        }
        serde_json::from_str(line.trim())
            .map_err(|err| Error::Transport(format!("malformed response: {err}")))
    }
}

/// Spawn an agent process speaking the line protocol on stdin/stdout.
pub fn spawn_agent(
    command: &mut Command,
) -> Result<(Child, LineTransport<BufReader<ChildStdout>, ChildStdin>)> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Transport("agent stdin unavailable".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Transport("agent stdout unavailable".to_string()))?;
    Ok((child, LineTransport::new(BufReader::new(stdout), stdin)))
}

/// A [`CommitGraph`] whose queries are answered by an agent.
pub struct RemoteGraph<T> {
    transport: T,
}

impl<T: Transport> RemoteGraph<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn call(&self, request: GraphRequest) -> Result<GraphResponse> {
        match self.transport.call(&request)? {
            GraphResponse::Error { error, message } => Err(remote_error(error, message)),
            response => Ok(response),
        }
    }
}

fn unexpected(response: GraphResponse) -> Error {
    Error::Transport(format!("unexpected response: {response:?}"))
}

impl<T: Transport> CommitGraph for RemoteGraph<T> {
    fn list_reference_commits(&self) -> Result<Vec<Branch>> {
        match self.call(GraphRequest::ListReferenceCommits)? {
            GraphResponse::References { branches } => Ok(branches),
            other => Err(unexpected(other)),
        }
    }

    fn resolve(&self, name: &str) -> Result<CommitId> {
        match self.call(GraphRequest::Resolve {
            name: name.to_string(),
        })? {
            GraphResponse::Commit { commit } => Ok(commit),
            other => Err(unexpected(other)),
        }
    }

    fn merge_base(&self, a: &CommitId, b: &CommitId) -> Result<Option<CommitId>> {
        match self.call(GraphRequest::MergeBase {
            a: a.clone(),
            b: b.clone(),
        })? {
            GraphResponse::MergeBase { commit } => Ok(commit),
            other => Err(unexpected(other)),
        }
    }

    fn commit_timestamp(&self, commit: &CommitId) -> Result<i64> {
        match self.call(GraphRequest::CommitTimestamp {
            commit: commit.clone(),
        })? {
            GraphResponse::Timestamp { time } => Ok(time),
            other => Err(unexpected(other)),
        }
    }

    fn log_all(&self, reference: Option<&str>) -> Result<Vec<LogEntry>> {
        match self.call(GraphRequest::LogAll {
            reference: reference.map(str::to_string),
        })? {
            GraphResponse::Log { entries } => Ok(entries),
            other => Err(unexpected(other)),
        }
    }

    fn resolve_fetch_head(&self) -> Result<CommitId> {
        match self.call(GraphRequest::ResolveFetchHead)? {
            GraphResponse::Commit { commit } => Ok(commit),
            other => Err(unexpected(other)),
        }
    }

    fn traversal(&self) -> Result<Box<dyn TraversalContext + '_>> {
        match self.call(GraphRequest::OpenTraversal)? {
            GraphResponse::Opened => Ok(Box::new(RemoteTraversal { graph: self })),
            other => Err(unexpected(other)),
        }
    }
}

struct RemoteTraversal<'r, T> {
    graph: &'r RemoteGraph<T>,
}

impl<T: Transport> TraversalContext for RemoteTraversal<'_, T> {
    fn is_merged_into(&mut self, ancestor: &CommitId, candidate: &CommitId) -> Result<bool> {
        match self.graph.call(GraphRequest::IsMergedInto {
            ancestor: ancestor.clone(),
            candidate: candidate.clone(),
        })? {
            GraphResponse::Merged { merged } => Ok(merged),
            other => Err(unexpected(other)),
        }
    }

    fn commit_time(&mut self, commit: &CommitId) -> Result<i64> {
        match self.graph.call(GraphRequest::CommitTime {
            commit: commit.clone(),
        })? {
            GraphResponse::Timestamp { time } => Ok(time),
            other => Err(unexpected(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::{synthetic_id, MemoryGraph};

    fn sample() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        let root = synthetic_id("root");
        let tip = synthetic_id("tip");
        graph.add_commit(root.clone(), &[], 10).expect("root");
        graph.add_commit(tip.clone(), &[root], 20).expect("tip");
        graph
            .set_ref("refs/remotes/origin/master", &tip)
            .expect("ref");
        graph
    }

    #[test]
    fn remote_graph_answers_like_local_graph() {
        let local = sample();
        let remote = RemoteGraph::new(LoopbackTransport::new(&local));

        assert_eq!(
            remote.list_reference_commits().expect("remote refs"),
            local.list_reference_commits().expect("local refs")
        );
        let tip = remote.resolve("origin/master").expect("resolve");
        assert_eq!(tip, synthetic_id("tip"));
        assert_eq!(remote.commit_timestamp(&tip).expect("time"), 20);
        assert_eq!(
            remote
                .merge_base(&tip, &synthetic_id("root"))
                .expect("merge base"),
            Some(synthetic_id("root"))
        );
        assert_eq!(remote.log_all(None).expect("log").len(), 2);

        let mut ctx = remote.traversal().expect("traversal");
        assert!(ctx
            .is_merged_into(&synthetic_id("root"), &tip)
            .expect("merged"));
        assert_eq!(ctx.commit_time(&tip).expect("time"), 20);
    }

    #[test]
    fn error_kinds_survive_the_boundary() {
        let local = sample();
        let remote = RemoteGraph::new(LoopbackTransport::new(&local));
        assert!(matches!(
            remote.resolve("origin/nope"),
            Err(Error::RefNotFound(_))
        ));
        assert!(matches!(
            remote.resolve_fetch_head(),
            Err(Error::RefNotFound(_))
        ));
        assert!(matches!(
            remote.commit_timestamp(&synthetic_id("ghost")),
            Err(Error::MissingObject(_))
        ));
    }

    #[test]
    fn serve_answers_each_line() {
        let graph = sample();
        let input = concat!(
            "{\"op\":\"resolve\",\"name\":\"origin/master\"}\n",
            "\n",
            "not json\n",
        );
        let mut output = Vec::new();
        let handled = serve(&graph, input.as_bytes(), &mut output).expect("serve");
        assert_eq!(handled, 2);

        let text = String::from_utf8(output).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        let first: GraphResponse = serde_json::from_str(lines[0]).expect("first");
        assert_eq!(
            first,
            GraphResponse::Commit {
                commit: synthetic_id("tip")
            }
        );
        let second: GraphResponse = serde_json::from_str(lines[1]).expect("second");
        assert!(matches!(second, GraphResponse::Error { .. }));
    }

    #[test]
    fn line_transport_talks_to_serve_output() {
        let graph = sample();
        let mut output = Vec::new();
        serve(
            &graph,
            "{\"op\":\"list_reference_commits\"}\n".as_bytes(),
            &mut output,
        )
        .expect("serve");

        let transport = LineTransport::new(output.as_slice(), Vec::new());
        let response = transport
            .call(&GraphRequest::ListReferenceCommits)
            .expect("call");
        assert!(matches!(response, GraphResponse::References { branches } if branches.len() == 1));
        assert!(transport.call(&GraphRequest::ListReferenceCommits).is_err());
    }
}
