//! Git Context Collector (C4): turns a repository + commit sha into an
//! immutable `Commit` value — metadata, per-file stats, and bounded diffs.
//!
//! All `git2` calls are synchronous and run inside `tokio::task::spawn_blocking`,
//! grounded on the same pattern the teacher's other-example git client uses
//! for its own blocking `Repository::open`/diff calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use git2::{Delta, Repository};
use tracing::warn;

use crate::config::Config;
use crate::error::{JournalError, Result};
use crate::file_type::classify;
use crate::model::{Commit, FileChange};

/// The well-known empty-tree object ID, used as the "parent" for diffing the
/// repository's initial commit (§4.4).
const EMPTY_TREE_OID: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

pub struct DiffCaps {
    pub per_file_bytes: usize,
    pub total_bytes: usize,
}

impl Default for DiffCaps {
    fn default() -> Self {
        Self {
            per_file_bytes: 10 * 1024,
            total_bytes: 200 * 1024,
        }
    }
}

/// Collect a `Commit` for `commit_sha` (accepts `"HEAD"` or a full/short OID)
/// out of the repository at `repo_root`, honoring `config.git_exclude_patterns`
/// and the default byte caps.
pub async fn collect(repo_root: &Path, commit_sha: &str, config: &Config) -> Result<Commit> {
    let repo_root = repo_root.to_path_buf();
    let commit_sha = commit_sha.to_string();
    let exclude_patterns = config.git_exclude_patterns.clone();
    let caps = DiffCaps::default();

    tokio::task::spawn_blocking(move || {
        collect_blocking(&repo_root, &commit_sha, &exclude_patterns, &caps)
    })
    .await
    .map_err(|e| JournalError::Io(std::io::Error::other(e)))?
}

fn collect_blocking(
    repo_root: &Path,
    commit_sha: &str,
    exclude_patterns: &[String],
    caps: &DiffCaps,
) -> Result<Commit> {
    let repo = Repository::open(repo_root)
        .map_err(|_| JournalError::RepoNotFound(repo_root.to_path_buf()))?;

    let commit = resolve_commit(&repo, commit_sha)?;

    let author = commit.author();
    let author_name = format!(
        "{} <{}>",
        author.name().unwrap_or("unknown"),
        author.email().unwrap_or("unknown")
    );
    let message = commit.message().unwrap_or("").to_string();
    let timestamp = commit_timestamp(&commit);

    let commit_tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        let empty_oid = git2::Oid::from_str(EMPTY_TREE_OID)?;
        Some(repo.find_tree(empty_oid)?)
    };

    let mut diff_opts = git2::DiffOptions::new();
    diff_opts.context_lines(3);
    let mut diff =
        repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), Some(&mut diff_opts))?;

    let is_excluded = |path: &str| exclude_patterns_match(exclude_patterns, path);

    let mut files = Vec::new();
    let mut diffs = HashMap::new();
    let mut total_diff_bytes = 0usize;

    let num_deltas = diff.deltas().count();
    for idx in 0..num_deltas {
        let Some(delta) = diff.get_delta(idx) else {
            continue;
        };
        let path = delta_path(&delta).unwrap_or_default();
        if path.is_empty() || is_excluded(&path) {
            continue;
        }

        let (additions, deletions) = match git2::Patch::from_diff(&mut diff, idx) {
            Ok(Some(patch)) => patch.line_stats().map(|(_, a, d)| (a, d)).unwrap_or((0, 0)),
            _ => (0, 0),
        };

        files.push(FileChange {
            path: path.clone(),
            additions,
            deletions,
            file_type: classify(&path).to_string(),
        });

        if total_diff_bytes >= caps.total_bytes {
            continue;
        }
        if let Ok(Some(mut patch)) = git2::Patch::from_diff(&mut diff, idx) {
            if let Ok(buf) = patch.to_buf() {
                let text = String::from_utf8_lossy(&buf).into_owned();
                let (capped, truncated) = cap_utf8(&text, caps.per_file_bytes);
                let remaining = caps.total_bytes - total_diff_bytes;
                let (capped, truncated) = if capped.len() > remaining {
                    let (further, _) = cap_utf8(&capped, remaining);
                    (further, true)
                } else {
                    (capped, truncated)
                };
                total_diff_bytes += capped.len();
                let rendered = if truncated {
                    format!("{capped}\n[TRUNCATED]")
                } else {
                    capped
                };
                diffs.insert(path, rendered);
            }
        }
    }

    Ok(Commit {
        hash: commit.id().to_string(),
        author: author_name,
        timestamp,
        message,
        files,
        diffs,
    })
}

/// The parent commit's timestamp, used by the worker to compute the commit
/// window `[t_prev_commit, t_commit]` for chat correlation (§3). `None` for
/// the repository's initial commit.
pub async fn previous_commit_timestamp(
    repo_root: &Path,
    commit_sha: &str,
) -> Result<Option<DateTime<Utc>>> {
    let repo_root = repo_root.to_path_buf();
    let commit_sha = commit_sha.to_string();

    tokio::task::spawn_blocking(move || -> Result<Option<DateTime<Utc>>> {
        let repo = Repository::open(&repo_root)
            .map_err(|_| JournalError::RepoNotFound(repo_root.clone()))?;
        let commit = resolve_commit(&repo, &commit_sha)?;
        if commit.parent_count() == 0 {
            return Ok(None);
        }
        Ok(Some(commit_timestamp(&commit.parent(0)?)))
    })
    .await
    .map_err(|e| JournalError::Io(std::io::Error::other(e)))?
}

fn resolve_commit<'a>(
    repo: &'a Repository,
    commit_sha: &str,
) -> Result<git2::Commit<'a>> {
    if commit_sha.eq_ignore_ascii_case("HEAD") {
        return Ok(repo.head()?.peel_to_commit()?);
    }
    let oid = git2::Oid::from_str(commit_sha)
        .map_err(|_| JournalError::MalformedCommitHash(commit_sha.to_string()))?;
    Ok(repo.find_commit(oid)?)
}

fn commit_timestamp(commit: &git2::Commit) -> DateTime<Utc> {
    let time = commit.time();
    let dt = Utc
        .timestamp_opt(time.seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now);
    if dt > Utc::now() {
        // §4.4: future-dated commits are accepted with a logged warning, never rejected.
        warn!(commit_time = %dt, "commit timestamp is in the future");
    }
    dt
}

fn delta_path(delta: &git2::DiffDelta) -> Option<String> {
    delta
        .new_file()
        .path()
        .or_else(|| delta.old_file().path())
        .and_then(|p| p.to_str())
        .map(String::from)
}

fn exclude_patterns_match(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|pat| crate::config::glob_match(pat, path))
}

/// Truncate `text` at a `char` boundary so the per-file byte cap never
/// produces invalid UTF-8 (§9 supplemented feature). Returns the capped text
/// and whether truncation actually happened.
fn cap_utf8(text: &str, max_bytes: usize) -> (String, bool) {
    if text.len() <= max_bytes {
        return (text.to_string(), false);
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    (text[..end].to_string(), true)
}

#[allow(dead_code)]
fn delta_status_label(status: Delta) -> &'static str {
    match status {
        Delta::Added => "added",
        Delta::Deleted => "deleted",
        Delta::Modified => "modified",
        Delta::Renamed => "renamed",
        _ => "modified",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    async fn collects_initial_commit_against_empty_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = init_repo(tmp.path());
        fs::write(tmp.path().join("README.md"), "hello\n").unwrap();
        let oid = commit_all(&repo, "initial commit");
        drop(repo);

        let config = Config::discover(tmp.path()).unwrap();
        let commit = collect(tmp.path(), &oid.to_string(), &config).await.unwrap();

        assert_eq!(commit.files.len(), 1);
        assert_eq!(commit.files[0].path, "README.md");
        assert_eq!(commit.files[0].additions, 1);
        assert_eq!(commit.files[0].deletions, 0);
        assert_eq!(commit.message, "initial commit");
    }

    #[tokio::test]
    async fn excludes_configured_patterns() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = init_repo(tmp.path());
        fs::create_dir_all(tmp.path().join("journal/daily")).unwrap();
        fs::write(tmp.path().join("journal/daily/2025-01-01-journal.md"), "x").unwrap();
        fs::write(tmp.path().join("src.rs"), "fn main() {}\n").unwrap();
        let oid = commit_all(&repo, "add files");
        drop(repo);

        let config = Config::discover(tmp.path()).unwrap();
        let commit = collect(tmp.path(), &oid.to_string(), &config).await.unwrap();

        assert!(commit.files.iter().all(|f| f.path != "journal/daily/2025-01-01-journal.md"));
        assert!(commit.files.iter().any(|f| f.path == "src.rs"));
    }

    #[test]
    fn caps_diff_at_char_boundary() {
        let text = "€".repeat(10); // each char is 3 bytes in UTF-8
        let (capped, truncated) = cap_utf8(&text, 5);
        assert!(truncated);
        assert!(String::from_utf8(capped.into_bytes()).is_ok());
    }
}
