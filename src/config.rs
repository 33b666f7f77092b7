//! Configuration loading and management
//!
//! Handles parsing of `.revsel.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::branch_spec::BranchSpec;
use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::revision::CommitId;
use crate::select::{parse_priorities, StrategyKind, StrategyOptions};

/// File name looked up at the repository root.
pub const CONFIG_FILE: &str = ".revsel.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Strategy and branch selection
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Age and ancestry bounds
    #[serde(default)]
    pub ancestry: AncestryConfig,

    /// Prioritized branch substrings for the compound strategy
    #[serde(default)]
    pub priority: PriorityConfig,

    /// Build history location
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Strategy and branch selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Branch specs to build (or to exclude, for the inverse strategy)
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,

    /// Remotes tried, in order, when qualifying an unqualified target
    #[serde(default = "default_remotes")]
    pub remotes: Vec<String>,

    /// Single branch to build when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Also list local `refs/heads/*` branches
    #[serde(default)]
    pub local_branches: bool,
}

fn default_branches() -> Vec<String> {
    vec!["**".to_string()]
}

fn default_remotes() -> Vec<String> {
    vec!["origin".to_string()]
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            branches: default_branches(),
            remotes: default_remotes(),
            target: None,
            local_branches: false,
        }
    }
}

/// Age and ancestry bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncestryConfig {
    /// Strategy whose candidates are bounded (`default` or `inverse`)
    #[serde(default)]
    pub inner: StrategyKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ancestor_commit: Option<String>,
}

impl Default for AncestryConfig {
    fn default() -> Self {
        Self {
            inner: StrategyKind::Default,
            max_age_days: None,
            ancestor_commit: None,
        }
    }
}

/// Prioritized branches, as one newline-separated string or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriorityList {
    Text(String),
    List(Vec<String>),
}

impl Default for PriorityList {
    fn default() -> Self {
        PriorityList::List(Vec::new())
    }
}

impl PriorityList {
    /// Individual substrings, blank lines dropped.
    pub fn entries(&self) -> Vec<String> {
        match self {
            PriorityList::Text(text) => parse_priorities(&[text]),
            PriorityList::List(items) => parse_priorities(items),
        }
    }
}

/// Prioritized branch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorityConfig {
    #[serde(default)]
    pub branches: PriorityList,
}

/// Build history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Key naming this job's history file
    #[serde(default = "default_job")]
    pub job: String,

    /// How long to wait for another process holding the history lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_job() -> String {
    "default".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            job: default_job(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a `.revsel.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from repo root, or return defaults when absent.
    ///
    /// A file that exists but does not parse or validate is an error.
    pub fn load_from_repo(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Strategy options described by this configuration.
    pub fn strategy_options(&self) -> StrategyOptions {
        StrategyOptions {
            kind: self.selection.strategy,
            inner: self.ancestry.inner,
            branches: self.selection.branches.clone(),
            remotes: self.selection.remotes.clone(),
            target: self.selection.target.clone(),
            max_age_days: self.ancestry.max_age_days,
            ancestor_commit: self.ancestry.ancestor_commit.clone(),
            priority: self.priority.branches.entries(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.selection.validate()?;
        self.ancestry.validate()?;
        if self.history.job.trim().is_empty() {
            return Err(Error::InvalidConfig("history.job must not be empty".to_string()));
        }
        Ok(())
    }
}

impl SelectionConfig {
    fn validate(&self) -> Result<()> {
        BranchSpec::parse_all(&self.branches)?;
        if self.remotes.iter().any(|remote| remote.trim().is_empty() || remote.contains('/')) {
            return Err(Error::InvalidConfig(
                "selection.remotes entries must be non-empty names without '/'".to_string(),
            ));
        }
        if let Some(target) = &self.target {
            BranchSpec::new(target)?;
        }
        Ok(())
    }
}

impl AncestryConfig {
    fn validate(&self) -> Result<()> {
        if !matches!(self.inner, StrategyKind::Default | StrategyKind::Inverse) {
            return Err(Error::InvalidConfig(format!(
                "ancestry.inner must be default or inverse, got {}",
                self.inner
            )));
        }
        if let Some(days) = self.max_age_days {
            if days < 0 {
                return Err(Error::InvalidConfig(format!(
                    "ancestry.max_age_days must be non-negative, got {days}"
                )));
            }
        }
        if let Some(commit) = self.ancestor_commit.as_deref().map(str::trim) {
            if !commit.is_empty() {
                CommitId::parse(commit)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.selection.strategy, StrategyKind::Default);
        assert_eq!(cfg.selection.branches, vec!["**".to_string()]);
        assert_eq!(cfg.selection.remotes, vec!["origin".to_string()]);
        assert!(cfg.selection.target.is_none());
        assert!(!cfg.selection.local_branches);
        assert_eq!(cfg.ancestry.inner, StrategyKind::Default);
        assert!(cfg.ancestry.max_age_days.is_none());
        assert!(cfg.priority.branches.entries().is_empty());
        assert_eq!(cfg.history.job, "default");
        assert_eq!(cfg.history.lock_timeout_ms, DEFAULT_LOCK_TIMEOUT_MS);
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
[selection]
strategy = "compound"
branches = ["release/*", ":feature-[0-9]+"]
remotes = ["upstream", "origin"]
local_branches = true

[ancestry]
inner = "inverse"
max_age_days = 14
ancestor_commit = "0123456789abcdef0123456789abcdef01234567"

[priority]
branches = """
CRITICAL
RELEASE
"""

[history]
job = "nightly"
lock_timeout_ms = 250
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.selection.strategy, StrategyKind::Compound);
        assert_eq!(cfg.selection.remotes, vec!["upstream", "origin"]);
        assert!(cfg.selection.local_branches);
        assert_eq!(cfg.ancestry.inner, StrategyKind::Inverse);
        assert_eq!(cfg.ancestry.max_age_days, Some(14));
        assert_eq!(cfg.history.job, "nightly");
        assert_eq!(cfg.history.lock_timeout_ms, 250);

        let options = cfg.strategy_options();
        assert_eq!(options.kind, StrategyKind::Compound);
        assert_eq!(options.priority, vec!["CRITICAL", "RELEASE"]);
        assert_eq!(options.branches.len(), 2);
    }

    #[test]
    fn priority_accepts_list() {
        let cfg: Config = toml::from_str("[priority]\nbranches = [\"hotfix\", \" \", \"main\"]")
            .expect("parse");
        assert_eq!(cfg.priority.branches.entries(), vec!["hotfix", "main"]);
    }

    #[test]
    fn invalid_values_rejected() {
        let cases = [
            "[selection]\nstrategy = \"digg\"",
            "[selection]\nbranches = [\":(\"]",
            "[selection]\nbranches = [\":(origin/master$\"]",
            "[selection]\nremotes = [\"a/b\"]",
            "[ancestry]\nmax_age_days = -1",
            "[ancestry]\nancestor_commit = \"xyz\"",
            "[ancestry]\ninner = \"queue\"",
            "[history]\njob = \"  \"",
        ];
        for content in cases {
            let dir = tempfile::tempdir().expect("tempdir");
            let path = dir.path().join(CONFIG_FILE);
            fs::write(&path, content).expect("write config");
            let err = Config::load(&path).expect_err(content);
            assert!(err.is_config_error(), "{content}: {err:?}");
        }
    }

    #[test]
    fn load_from_repo_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_repo(dir.path()).expect("defaults");
        assert_eq!(cfg.history.job, "default");
    }

    #[test]
    fn load_from_repo_reports_bad_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE), "[ancestry]\nmax_age_days = -5")
            .expect("write config");
        assert!(Config::load_from_repo(dir.path()).is_err());
    }
}
