use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commit_journal::ai::client::{AiClient, CIRCUIT_BREAKER, HttpAiClient};
use commit_journal::config::Config;
use commit_journal::worker::{self, AbortReason, WorkerState};

/// Journals the given commit's local AI chat history and git context into a
/// narrative markdown entry. Invoked by the repository's `post-commit` hook;
/// `--sync` exists for debugging and tests, where the usual detach-and-return
/// behavior would otherwise hide failures.
#[derive(Parser)]
#[command(name = "commit-journal")]
#[command(about = "Generates narrative engineering journals from git commits and local AI chat history")]
struct Cli {
    /// Repository root. Defaults to discovering one from the current directory.
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Commit to journal.
    #[arg(long, default_value = "HEAD")]
    commit: String,

    /// Explicit config file path, bypassing upward discovery.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run the worker in-process and wait for it, instead of detaching.
    #[arg(long)]
    sync: bool,

    /// Reset the process-wide AI circuit breaker and exit.
    #[arg(long)]
    reset_circuit_breaker: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.reset_circuit_breaker {
        CIRCUIT_BREAKER.reset();
        tracing::info!("circuit breaker reset");
        return;
    }

    let repo_root = cli.repo.clone().unwrap_or_else(discover_repo_root);

    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(&repo_root),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            if cli.sync {
                std::process::exit(err.exit_code());
            }
            return;
        }
    };

    if config.journal_background && !cli.sync {
        spawn_detached(&cli, &repo_root, &config);
        return;
    }

    let exit_code = run_sync(&repo_root, &cli.commit, &config);
    std::process::exit(exit_code);
}

fn discover_repo_root() -> PathBuf {
    git2::Repository::discover(".")
        .ok()
        .and_then(|repo| repo.workdir().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Re-exec this same binary with `--sync`, stdout/stderr redirected to a log
/// file under the journal root, and don't wait on it — the whole point is
/// that the hook (and the commit) returns immediately regardless of how long
/// the worker takes (§4.11 "never block the hook").
fn spawn_detached(cli: &Cli, repo_root: &Path, config: &Config) {
    let journal_root = config.journal_root(repo_root);
    if let Err(err) = std::fs::create_dir_all(&journal_root) {
        tracing::warn!(error = %err, "failed to create journal root, aborting detach");
        return;
    }

    let log_path = journal_root.join("worker.log");
    let stdout_file = match std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(err) => {
            tracing::warn!(error = %err, path = %log_path.display(), "failed to open worker log file, aborting detach");
            return;
        }
    };
    let stderr_file = match stdout_file.try_clone() {
        Ok(f) => f,
        Err(err) => {
            tracing::warn!(error = %err, "failed to duplicate worker log handle, aborting detach");
            return;
        }
    };

    let exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(err) => {
            tracing::warn!(error = %err, "failed to resolve current executable, aborting detach");
            return;
        }
    };

    let mut command = Command::new(exe);
    command
        .arg("--repo")
        .arg(repo_root)
        .arg("--commit")
        .arg(&cli.commit)
        .arg("--sync")
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file));
    if let Some(config_path) = &cli.config {
        command.arg("--config").arg(config_path);
    }

    match command.spawn() {
        // The child's `Child` handle is intentionally dropped unwaited — it
        // keeps running after this process exits.
        Ok(_child) => {}
        Err(err) => {
            tracing::warn!(error = %err, "failed to spawn detached worker");
        }
    }
}

fn run_sync(repo_root: &Path, commit_sha: &str, config: &Config) -> i32 {
    let client = build_client(config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "failed to start async runtime");
            return 4;
        }
    };

    let outcome = runtime.block_on(worker::run(repo_root, commit_sha, config, client.as_ref()));
    match outcome.state {
        WorkerState::Done if outcome.all_sections_fallback => 4,
        WorkerState::Done => 0,
        WorkerState::Aborted => match outcome.abort_reason {
            Some(AbortReason::RepoNotFound) => 2,
            Some(AbortReason::BudgetExceeded) => 3,
            Some(AbortReason::Other) | None => 4,
        },
    }
}

fn build_client(config: &Config) -> Box<dyn AiClient> {
    match (&config.ai_api_key, config.ai_enabled) {
        (Some(key), true) => Box::new(HttpAiClient::new(key.clone())),
        _ => Box::new(NoopAiClient),
    }
}

/// Used whenever AI calls are disabled (missing/unresolved API key) — every
/// call fails immediately so the pipeline takes its fallback path instead of
/// attempting doomed network requests.
struct NoopAiClient;

#[async_trait::async_trait]
impl AiClient for NoopAiClient {
    async fn invoke(
        &self,
        _prompt: &str,
        _opts: &commit_journal::ai::client::InvokeOptions,
    ) -> Result<String, commit_journal::ai::client::AiError> {
        Err(commit_journal::ai::client::AiError::NoApiKey)
    }
}
