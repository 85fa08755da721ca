//! Journal Assembler (C9): renders a `JournalEntry` to canonical markdown and
//! appends it to the day's file, atomically.
//!
//! Atomicity has two concerns: surviving a crash mid-write (solved with
//! temp-file + rename, so no reader ever observes a half-written file) and
//! two worker processes racing on a rapid commit sequence (solved with a
//! short-lived advisory lock file — §5 allows either approach, and a plain
//! `create_new` lock file needs no extra dependency beyond what the teacher
//! already pulls in).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use serde_json::Value;

use crate::error::{JournalError, Result};
use crate::model::{GeneratorStatus, JournalEntry, Section, SectionContent};

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The on-disk path for `date`'s journal file, rooted at `journal_root`.
/// Every caller must route through this function — it is the single place
/// that guarantees the §8 invariant "journal path is always a descendant of
/// `<journal_root>/daily/`".
pub fn journal_file_path(journal_root: &Path, date: NaiveDate) -> PathBuf {
    journal_root
        .join("daily")
        .join(format!("{}-journal.md", date.format("%Y-%m-%d")))
}

/// Render one entry to canonical markdown: H3 entry header, H4 per non-empty
/// section, single blank line between sections. A section with empty
/// content (status `ok`/`empty`, sections 4 and 5 legitimately empty) is
/// omitted entirely rather than rendered with an empty body.
pub fn render_entry(entry: &JournalEntry) -> String {
    let local_time = entry.timestamp.with_timezone(&Local);
    let short_hash = &entry.commit_hash[..entry.commit_hash.len().min(7)];
    let mut out = format!(
        "### {} — Commit {}\n",
        local_time.format("%I:%M %p"),
        short_hash
    );

    for section in &entry.sections {
        if section.content.is_empty() {
            continue;
        }
        out.push_str("\n#### ");
        out.push_str(section.name.header());
        out.push('\n');
        match &section.content {
            SectionContent::Text(text) => {
                out.push('\n');
                out.push_str(text.trim());
                out.push('\n');
            }
            SectionContent::Fields(fields) => {
                out.push('\n');
                out.push_str(&flatten_fields(fields));
            }
        }
    }

    out
}

/// Render a field-structured section (e.g. Technical Synopsis returned as a
/// dictionary) to markdown: keys become bold leads, array values become
/// bullet lists, everything else a single `**Key**: value` line. Keys are
/// sorted for determinism — the model's own field order is not guaranteed
/// stable across calls.
fn flatten_fields(fields: &HashMap<String, Value>) -> String {
    let mut keys: Vec<&String> = fields.keys().collect();
    keys.sort();

    let mut out = String::new();
    for key in keys {
        let label = title_case(key);
        match &fields[key] {
            Value::Array(items) => {
                out.push_str(&format!("**{label}**:\n"));
                for item in items {
                    out.push_str(&format!("- {}\n", value_to_line(item)));
                }
            }
            other => {
                out.push_str(&format!("**{label}**: {}\n", value_to_line(other)));
            }
        }
    }
    out
}

fn value_to_line(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `technicalChanges` -> `Technical Changes`; `summary` -> `Summary`.
fn title_case(key: &str) -> String {
    let mut out = String::new();
    for (i, ch) in key.chars().enumerate() {
        if ch == '_' || ch == '-' {
            out.push(' ');
            continue;
        }
        if ch.is_uppercase() && i > 0 {
            out.push(' ');
        }
        if out.ends_with(' ') || i == 0 {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Whether `journal_file` already contains an entry header for `short_hash`
/// — the idempotency guard from §6/§8 invariant 6. Avoids re-running any LLM
/// call for a commit the hook has already journaled (e.g. a hook re-invoked
/// manually, or a rebase replaying the same commit).
pub fn already_recorded(journal_file: &Path, short_hash: &str) -> bool {
    let Ok(content) = std::fs::read_to_string(journal_file) else {
        return false;
    };
    let marker = format!("— Commit {short_hash}");
    content.lines().any(|line| line.starts_with("### ") && line.contains(&marker))
}

/// Append `entry` to the journal file for its commit's local date, creating
/// the file (and `daily/`) on demand. Returns the path written.
pub fn append_entry(journal_root: &Path, entry: &JournalEntry) -> Result<PathBuf> {
    let local_date = entry.timestamp.with_timezone(&Local).date_naive();
    let path = journal_file_path(journal_root, local_date);
    let rendered = render_entry(entry);

    let daily_dir = path.parent().expect("journal_file_path always has a parent");
    std::fs::create_dir_all(daily_dir)?;

    let _lock = FileLock::acquire(&path)?;

    let existing = std::fs::read_to_string(&path).unwrap_or_default();
    let new_content = if existing.trim().is_empty() {
        rendered
    } else {
        format!("{}\n---\n\n{}", existing.trim_end(), rendered)
    };

    write_atomic(&path, &new_content)?;
    Ok(path)
}

/// Temp-file + rename, shared with the daily-summary writer (C10) since both
/// need the same crash-safety guarantee over a single target file.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "tmp-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    ));
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// A short-lived advisory lock implemented with `create_new` on a sibling
/// `.lock` file — no dependency beyond `std`. Spins with a timeout rather
/// than blocking indefinitely, since a stuck lock must never hang a hook.
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    fn acquire(target: &Path) -> Result<Self> {
        let lock_path = target.with_extension("lock");
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(Self { path: lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        // Stale lock from a crashed process — break it rather
                        // than hang the hook forever.
                        let _ = std::fs::remove_file(&lock_path);
                        continue;
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(JournalError::Io(e)),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
