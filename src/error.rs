//! Error taxonomy for the journal pipeline.
//!
//! The four kinds mirror the policy table in the design notes: recoverable
//! errors are captured at a component boundary and turned into fallback
//! content or a `QualityMetadata` note; `DataIntegrity` aborts the worker
//! without writing anything; `Fatal` aborts the process. None of these ever
//! propagate back to the git hook as a failed exit code.

use std::path::PathBuf;
use thiserror::Error;

/// A single database's reason for contributing nothing to a `ChatWindow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseFailureReason {
    OpenError,
    QueryError,
    ParseError,
    Timeout,
    Permission,
}

impl std::fmt::Display for DatabaseFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OpenError => "open_error",
            Self::QueryError => "query_error",
            Self::ParseError => "parse_error",
            Self::Timeout => "timeout",
            Self::Permission => "permission",
        };
        f.write_str(s)
    }
}

/// Top-level error type for anything that can abort a stage outright.
///
/// Single-database failures and per-section LLM failures are *not*
/// represented here — those are recovered inline (see `QualityMetadata` and
/// `Section::generator_status`) and never reach this type.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal path {0:?} escapes the repository's journal root")]
    PathTraversal(PathBuf),

    #[error("malformed commit hash: {0:?}")]
    MalformedCommitHash(String),

    #[error("config at {0:?} is not valid YAML: {1}")]
    InvalidConfig(PathBuf, #[source] serde_yaml::Error),

    #[error("repository not found at {0:?}")]
    RepoNotFound(PathBuf),

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker budget of {0:?} exhausted before the pipeline finished")]
    BudgetExceeded(std::time::Duration),

    #[error("the AI provider is unavailable: {0}")]
    AiUnavailable(String),
}

impl JournalError {
    /// Exit code reserved for `--sync` debug invocations, per the external
    /// interface contract. Background (hook) mode never surfaces this.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(..) => 1,
            Self::RepoNotFound(_) => 2,
            Self::BudgetExceeded(_) => 3,
            Self::PathTraversal(_) | Self::MalformedCommitHash(_) => 1,
            Self::Git(_) | Self::Io(_) | Self::AiUnavailable(_) => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
