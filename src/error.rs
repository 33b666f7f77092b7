//! Error types for revsel
//!
//! Exit codes:
//! - 0: Success
//! - 2: Configuration or user error (bad args, bad branch spec, bad commit id)
//! - 4: Repository access failed (git error, missing object, I/O)
//!
//! An empty candidate set is never an error.

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the revsel CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const REPOSITORY_FAILED: i32 = 4;
}

/// Main error type for revsel operations
#[derive(Error, Debug)]
pub enum Error {
    // Configuration / user errors (exit code 2)
    #[error("Not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("Repository not found from {0}")]
    RepoNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid branch spec '{spec}': {reason}")]
    InvalidBranchSpec { spec: String, reason: String },

    #[error("Invalid commit id '{0}'")]
    InvalidCommitId(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Repository access failures (exit code 4)
    #[error("Reference not found: {0}")]
    RefNotFound(String),

    #[error("Missing object: {0}")]
    MissingObject(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Graph agent transport failed: {0}")]
    Transport(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotARepo(_)
            | Error::RepoNotFound(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::InvalidBranchSpec { .. }
            | Error::InvalidCommitId(_)
            | Error::TomlParse(_) => exit_codes::USER_ERROR,

            Error::RefNotFound(_)
            | Error::MissingObject(_)
            | Error::Git(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::LockFailed(_)
            | Error::Transport(_)
            | Error::OperationFailed(_) => exit_codes::REPOSITORY_FAILED,
        }
    }

    /// Whether this error reports a configuration problem rather than a
    /// repository access failure.
    pub fn is_config_error(&self) -> bool {
        self.exit_code() == exit_codes::USER_ERROR
    }

    /// Error class named in the JSON envelope, one per exit code.
    pub fn kind(&self) -> &'static str {
        if self.is_config_error() {
            "user_error"
        } else {
            "repository_failed"
        }
    }

    /// What the user can do about this error, when there is something.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::RepoNotFound(_) | Error::NotARepo(_) => {
                Some("run inside a git repository or pass --repo <path>")
            }
            Error::InvalidConfig(_) | Error::TomlParse(_) => Some("fix .revsel.toml then retry"),
            Error::InvalidBranchSpec { .. } => {
                Some("check the regular expression after ':' in the branch spec")
            }
            Error::RefNotFound(_) => Some("revsel refs"),
            Error::LockFailed(_) => Some("retry once the other revsel process finishes"),
            Error::Transport(_) => Some("run the agent command by hand to see why it stopped"),
            _ => None,
        }
    }

    /// Structured details for the JSON error envelope, when the variant has any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::InvalidBranchSpec { spec, reason } => Some(serde_json::json!({
                "spec": spec,
                "reason": reason,
            })),
            Error::RefNotFound(name) => Some(serde_json::json!({ "reference": name })),
            Error::LockFailed(path) => Some(serde_json::json!({ "lock": path })),
            _ => None,
        }
    }
}

/// Result type alias for revsel operations
pub type Result<T> = std::result::Result<T, Error>;
