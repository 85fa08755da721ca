//! Hook Worker (C11): orchestrates every other component end to end. This is
//! the only thing the git `post-commit` hook actually invokes.
//!
//! State machine (§4.11): `start -> collecting -> filtering -> generating ->
//! assembling -> triggering_summary -> done | aborted`. Any stage failure
//! jumps straight to `aborted`; `assembling` is attempted anyway wherever
//! fallback content is available, since a full-fallback entry is always
//! preferable to no entry at all, and a partial (half-written) entry is
//! forbidden.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{info, warn};

use crate::ai::boundary;
use crate::ai::client::{AiClient, InvokeOptions};
use crate::ai::sections;
use crate::chat;
use crate::config::Config;
use crate::git::collector as git_collector;
use crate::journal::{assembler, reader as journal_reader, summary};
use crate::error::JournalError;
use crate::model::{ChatWindow, Commit, GeneratorStatus, JournalContext, JournalEntry, Section, SectionContent};
use crate::sanitize::sanitize;

/// Bounded concurrency for the seven section generators, per §5.
const SECTION_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Done,
    Aborted,
}

/// Why an aborted run produced nothing, kept narrow enough to map onto the
/// exit codes in §6 without exposing every internal `JournalError` variant to
/// `--sync` callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    RepoNotFound,
    BudgetExceeded,
    Other,
}

/// What the worker actually did — used by `--sync` to choose an exit code,
/// and by the hook's log line. The hook itself never inspects this; its exit
/// code is always 0 regardless.
pub struct WorkerOutcome {
    pub state: WorkerState,
    pub journal_path: Option<PathBuf>,
    pub summary_paths: Vec<PathBuf>,
    pub all_sections_fallback: bool,
    pub abort_reason: Option<AbortReason>,
}

/// Run the full pipeline for `commit_sha` in `repo_root`, bounded by
/// `config.ai_total_budget_seconds`. Never panics, never returns `Err` — every
/// internal failure is logged and absorbed into `WorkerOutcome`.
pub async fn run(
    repo_root: &Path,
    commit_sha: &str,
    config: &Config,
    client: &dyn AiClient,
) -> WorkerOutcome {
    let budget = Duration::from_secs(config.ai_total_budget_seconds);
    let started = Instant::now();

    match tokio::time::timeout(budget, run_stages(repo_root, commit_sha, config, client, started, budget))
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                stage = "budget",
                elapsed_ms = started.elapsed().as_millis() as u64,
                "worker exceeded its total time budget before an entry could be assembled; nothing written"
            );
            WorkerOutcome {
                state: WorkerState::Aborted,
                journal_path: None,
                summary_paths: Vec::new(),
                all_sections_fallback: true,
                abort_reason: Some(AbortReason::BudgetExceeded),
            }
        }
    }
}

async fn run_stages(
    repo_root: &Path,
    commit_sha: &str,
    config: &Config,
    client: &dyn AiClient,
    started: Instant,
    budget: Duration,
) -> WorkerOutcome {
    let journal_root = config.journal_root(repo_root);
    let aborted = |all_fallback: bool, reason: AbortReason| WorkerOutcome {
        state: WorkerState::Aborted,
        journal_path: None,
        summary_paths: Vec::new(),
        all_sections_fallback: all_fallback,
        abort_reason: Some(reason),
    };

    // --- collecting: C4 and the previous commit's timestamp concurrently ---
    let stage_start = Instant::now();
    let (commit_result, prev_commit_ts) = tokio::join!(
        git_collector::collect(repo_root, commit_sha, config),
        git_collector::previous_commit_timestamp(repo_root, commit_sha),
    );
    let commit = match commit_result {
        Ok(commit) => commit,
        Err(err) => {
            warn!(stage = "collecting", error = %err, "git context collection failed, aborting");
            let reason = match err {
                JournalError::RepoNotFound(_) => AbortReason::RepoNotFound,
                _ => AbortReason::Other,
            };
            return aborted(true, reason);
        }
    };
    info!(
        stage = "collecting",
        duration_ms = stage_start.elapsed().as_millis() as u64,
        outcome = "ok"
    );

    let short_hash = commit.short_hash().to_string();
    let local_date = commit.timestamp.with_timezone(&Local).date_naive();
    let journal_file = assembler::journal_file_path(&journal_root, local_date);

    if assembler::already_recorded(&journal_file, &short_hash) {
        info!(stage = "idempotency", commit = %short_hash, "commit already journaled, skipping");
        return WorkerOutcome {
            state: WorkerState::Done,
            journal_path: Some(journal_file),
            summary_paths: Vec::new(),
            all_sections_fallback: false,
            abort_reason: None,
        };
    }

    // --- filtering: C1/C2/C5 concurrently, then C3, then C7 ---
    let stage_start = Instant::now();
    let window_end_ms = commit.timestamp.timestamp_millis();
    let window_start_ms = match prev_commit_ts {
        Ok(Some(dt)) => dt.timestamp_millis(),
        Ok(None) | Err(_) => window_end_ms - config.chat_lookback().as_millis() as i64,
    };

    let (chat_window, previous_entry) = tokio::join!(
        chat::collect_window(Some(config.chat_lookback()), window_start_ms, window_end_ms),
        async { journal_reader::most_recent_entry(&journal_root, local_date) },
    );

    let commit = sanitize_commit(commit);
    let chat_window = sanitize_window(chat_window);

    let ai_opts = InvokeOptions {
        model: config.ai_model.clone(),
        timeout: Duration::from_secs(config.ai_timeout_seconds),
        ..InvokeOptions::default()
    };

    let chat_window = if config.ai_enabled {
        boundary::apply(client, chat_window, &commit, Some(previous_entry.as_str()), &ai_opts).await
    } else {
        chat_window
    };
    info!(
        stage = "filtering",
        duration_ms = stage_start.elapsed().as_millis() as u64,
        outcome = "ok",
        messages = chat_window.messages.len()
    );

    let ctx = JournalContext {
        commit: commit.clone(),
        chat: chat_window,
        previous_entry_markdown: if previous_entry.trim().is_empty() {
            None
        } else {
            Some(previous_entry)
        },
        config: config.view(),
    };

    // --- generating: seven independent section calls, bounded by whatever
    // of the total budget remains ---
    let stage_start = Instant::now();
    let remaining = budget.checked_sub(started.elapsed()).unwrap_or_default();
    let (mut rendered_sections, all_fallback) = if !config.ai_enabled {
        (sections::fallback_all(&ctx), true)
    } else {
        match tokio::time::timeout(
            remaining,
            sections::generate_all(client, &ctx, &ai_opts, SECTION_CONCURRENCY),
        )
        .await
        {
            Ok(generated) => {
                let all_fallback = generated
                    .iter()
                    .all(|s| s.generator_status == GeneratorStatus::Fallback);
                (generated, all_fallback)
            }
            Err(_) => {
                warn!(
                    stage = "generating",
                    "section generation exceeded the remaining time budget, using full fallback"
                );
                (sections::fallback_all(&ctx), true)
            }
        }
    };
    for section in &mut rendered_sections {
        sanitize_section(section);
    }
    info!(
        stage = "generating",
        duration_ms = stage_start.elapsed().as_millis() as u64,
        outcome = if all_fallback { "fallback" } else { "ok" }
    );

    // --- assembling ---
    let stage_start = Instant::now();
    let entry = JournalEntry {
        commit_hash: commit.hash.clone(),
        timestamp: commit.timestamp,
        sections: rendered_sections,
    };
    let journal_path = match assembler::append_entry(&journal_root, &entry) {
        Ok(path) => path,
        Err(err) => {
            warn!(stage = "assembling", error = %err, "failed to append the journal entry");
            return aborted(all_fallback, AbortReason::Other);
        }
    };
    info!(
        stage = "assembling",
        duration_ms = stage_start.elapsed().as_millis() as u64,
        outcome = "ok",
        path = %journal_path.display()
    );

    // --- triggering_summary ---
    let stage_start = Instant::now();
    let summary_paths = summary::run_pending(&journal_root, client, &ai_opts).await;
    info!(
        stage = "triggering_summary",
        duration_ms = stage_start.elapsed().as_millis() as u64,
        outcome = "ok",
        count = summary_paths.len()
    );

    WorkerOutcome {
        state: WorkerState::Done,
        journal_path: Some(journal_path),
        summary_paths,
        all_sections_fallback: all_fallback,
        abort_reason: None,
    }
}

fn sanitize_commit(mut commit: Commit) -> Commit {
    commit.message = sanitize(&commit.message);
    for diff in commit.diffs.values_mut() {
        *diff = sanitize(diff);
    }
    commit
}

fn sanitize_window(mut window: ChatWindow) -> ChatWindow {
    for message in &mut window.messages {
        message.text = sanitize(&message.text);
    }
    window
}

/// Every LLM response that gets appended is sanitized again before write
/// (§3 invariant) — the transcript going in was already sanitized, but the
/// model could still echo back something sensitive from the commit diff.
fn sanitize_section(section: &mut Section) {
    match &mut section.content {
        SectionContent::Text(text) => *text = sanitize(text),
        SectionContent::Fields(fields) => {
            for value in fields.values_mut() {
                sanitize_json_value(value);
            }
        }
    }
}

fn sanitize_json_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => *s = sanitize(s),
        serde_json::Value::Array(items) => {
            for item in items {
                sanitize_json_value(item);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values_mut() {
                sanitize_json_value(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::mock::MockAiClient;
    use git2::Repository;
    use std::fs;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        repo
    }

    fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
        let mut index = repo.index().unwrap();
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = repo.signature().unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap()
    }

    #[tokio::test]
    async fn writes_a_full_fallback_entry_when_ai_is_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = init_repo(tmp.path());
        fs::write(tmp.path().join("README.md"), "hello\n").unwrap();
        let oid = commit_all(&repo, "initial commit");
        drop(repo);

        let mut config = Config::discover(tmp.path()).unwrap();
        config.ai_enabled = false;
        let client = MockAiClient::always_ok("should never be called");

        let outcome = run(tmp.path(), &oid.to_string(), &config, &client).await;
        assert_eq!(outcome.state, WorkerState::Done);
        assert!(outcome.all_sections_fallback);
        let content = fs::read_to_string(outcome.journal_path.unwrap()).unwrap();
        assert!(content.contains("— Commit"));
        assert!(content.contains("initial commit"));
    }

    #[tokio::test]
    async fn is_idempotent_for_an_already_recorded_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = init_repo(tmp.path());
        fs::write(tmp.path().join("README.md"), "hello\n").unwrap();
        let oid = commit_all(&repo, "initial commit");
        drop(repo);

        let mut config = Config::discover(tmp.path()).unwrap();
        config.ai_enabled = false;
        let client = MockAiClient::always_ok("unused");

        let first = run(tmp.path(), &oid.to_string(), &config, &client).await;
        assert_eq!(first.state, WorkerState::Done);
        let content_after_first = fs::read_to_string(first.journal_path.as_ref().unwrap()).unwrap();

        let second = run(tmp.path(), &oid.to_string(), &config, &client).await;
        assert_eq!(second.state, WorkerState::Done);
        let content_after_second = fs::read_to_string(second.journal_path.unwrap()).unwrap();
        assert_eq!(content_after_first, content_after_second);
    }

    #[tokio::test]
    async fn aborts_without_writing_when_the_repository_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::discover(tmp.path()).unwrap();
        let client = MockAiClient::always_ok("unused");

        let outcome = run(tmp.path(), "deadbeef", &config, &client).await;
        assert_eq!(outcome.state, WorkerState::Aborted);
        assert!(outcome.journal_path.is_none());
    }
}
