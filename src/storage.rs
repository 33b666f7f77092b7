//! Persistent build history.
//!
//! Histories live in the shared git directory so every worktree of a clone
//! sees the same ledger:
//!
//! ```text
//! .git/revsel/                  # Shared local (per-clone, ignored)
//!   history/
//!     <job>.json                # BuildHistory for one job
//!     <job>.json.lock           # fs2 lock guarding reads and writes
//! ```
//!
//! Every read and write holds the job's lock, so a reader always sees a
//! whole file and two writers never interleave.

use std::fs;
use std::path::{Path, PathBuf};

use git2::Repository;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::graph::git::common_dir;
use crate::history::BuildHistory;
use crate::lock::{self, lock_path_for, FileLock, DEFAULT_LOCK_TIMEOUT_MS};

/// Name of the shared directory within .git
pub const SHARED_DIR: &str = "revsel";

/// File-backed store of build histories, keyed by job.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    /// Path to the shared `.git/revsel/` directory
    shared_dir: PathBuf,
    lock_timeout_ms: u64,
}

impl HistoryStore {
    /// Store rooted at `<git_dir>/revsel`.
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            shared_dir: git_dir.as_ref().join(SHARED_DIR),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    /// Store in the common git directory of `repo` (shared by worktrees).
    pub fn for_repo(repo: &Repository) -> Self {
        Self::new(common_dir(repo))
    }

    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    pub fn history_dir(&self) -> PathBuf {
        self.shared_dir.join("history")
    }

    pub fn history_file(&self, job: &str) -> PathBuf {
        self.history_dir().join(format!("{}.json", history_key(job)))
    }

    /// Consistent snapshot of a job's history; empty when none was recorded.
    pub fn load(&self, job: &str) -> Result<BuildHistory> {
        let path = self.history_file(job);
        let _lock = FileLock::acquire(lock_path_for(&path), self.lock_timeout_ms)?;
        read_json_or_default(&path)
    }

    /// Read, mutate and atomically rewrite a job's history under its lock.
    pub fn update<T, F>(&self, job: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut BuildHistory) -> Result<T>,
    {
        let path = self.history_file(job);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let _lock = FileLock::acquire(lock_path_for(&path), self.lock_timeout_ms)?;

        let mut history: BuildHistory = read_json_or_default(&path)?;
        let result = f(&mut history)?;
        write_json(&path, &history)?;
        debug!(job, path = %path.display(), "Saved build history");
        Ok(result)
    }

    /// Jobs with a recorded history, sorted.
    pub fn jobs(&self) -> Result<Vec<String>> {
        let dir = self.history_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                jobs.push(stem.to_string());
            }
        }
        jobs.sort();
        Ok(jobs)
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&content)?)
}

fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    lock::write_atomic(path, json.as_bytes())
}

/// File-name-safe form of a job key.
fn history_key(job: &str) -> String {
    let mut key = String::new();
    for ch in job.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
            key.push(ch);
        } else {
            key.push('_');
        }
    }
    if key.is_empty() || key.chars().all(|ch| ch == '.') {
        "_".to_string()
    } else {
        key
    }
}
