//! Chat extraction pipeline: discover databases (C1), read raw sessions out
//! of each one (C1), then merge overlapping sessions into one chronological
//! window (C2).

pub mod discovery;
pub mod reader;
pub mod session;

use std::path::PathBuf;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use std::sync::Arc;

use crate::model::{ChatWindow, DatabaseStatus};

/// Bounded-concurrency fan-out over every discovered database, per §5: "C1
/// scans N databases concurrently, bounded at 8 concurrent SQLite opens."
const MAX_CONCURRENT_OPENS: usize = 8;

/// Discover every candidate database, read each one under a bounded
/// semaphore, and reconstruct the merged `ChatWindow` for `[window_start_ms,
/// window_end_ms]`. Never fails: a database that cannot be opened or queried
/// simply contributes nothing and is recorded in `QualityMetadata`.
pub async fn collect_window(
    lookback: Option<Duration>,
    window_start_ms: i64,
    window_end_ms: i64,
) -> ChatWindow {
    let roots = discovery::discover_database_roots();
    let databases = discovery::discover_databases(&roots, lookback);
    collect_window_from(&databases, window_start_ms, window_end_ms).await
}

/// As [`collect_window`] but over an explicit list of database paths —
/// exposed separately so tests can skip filesystem discovery entirely.
pub async fn collect_window_from(
    databases: &[PathBuf],
    window_start_ms: i64,
    window_end_ms: i64,
) -> ChatWindow {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_OPENS));

    let outcomes: Vec<(String, reader::ReadOutcome)> = stream::iter(databases.iter().cloned())
        .map(|path| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let path_str = path.to_string_lossy().to_string();
                let outcome = reader::read(&path).await;
                (path_str, outcome)
            }
        })
        .buffer_unordered(MAX_CONCURRENT_OPENS)
        .collect()
        .await;

    let databases_scanned = outcomes.len();
    let mut databases_failed: Vec<DatabaseStatus> = Vec::new();
    let mut db_sessions = Vec::with_capacity(outcomes.len());

    for (path, outcome) in outcomes {
        if outcome.status.failed {
            databases_failed.push(outcome.status);
        }
        db_sessions.push((path, outcome.sessions));
    }

    session::reconstruct(
        &db_sessions,
        window_start_ms,
        window_end_ms,
        databases_scanned,
        databases_failed,
    )
}
