//! Automated git-commit journaling: extracts local AI chat history,
//! correlates it to a commit's time window, sanitizes secrets, and uses LLM
//! calls to synthesize a narrative markdown journal entry per commit plus
//! periodic daily-summary roll-ups.

pub mod ai;
pub mod chat;
pub mod config;
pub mod error;
pub mod file_type;
pub mod git;
pub mod journal;
pub mod model;
pub mod sanitize;
pub mod worker;

pub use config::Config;
pub use error::{JournalError, Result};
pub use worker::{AbortReason, WorkerOutcome, WorkerState};
