//! Daily-Summary Trigger (C10): stateless — after every successful append,
//! the worker calls `run_pending` to roll up any day that has a journal file
//! but no summary yet.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::warn;

use crate::ai::client::{AiClient, InvokeOptions};
use crate::error::Result;
use crate::journal::assembler::{journal_file_path, write_atomic};
use crate::journal::reflection::extract_reflections;
use crate::model::{DailySummary, GeneratorStatus, Section, SectionContent, SectionName};

/// Find every date with a journal entry file, a later date's journal file
/// also present, but no corresponding summary file yet; generate and write
/// each (oldest first); return the summary file paths written. Per the
/// invariant "a summary for date D exists iff a later journal file was
/// created and D's journal file exists", the most recent journal date itself
/// is never summarized — there is no guarantee the day is over.
pub async fn run_pending(
    journal_root: &Path,
    client: &dyn AiClient,
    ai_opts: &InvokeOptions,
) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for date in pending_dates(journal_root) {
        match generate_for_date(journal_root, date, client, ai_opts).await {
            Ok(path) => written.push(path),
            Err(err) => {
                warn!(date = %date, error = %err, "failed to write daily summary, will retry next run");
            }
        }
    }
    written
}

fn summary_file_path(journal_root: &Path, date: NaiveDate) -> PathBuf {
    journal_root
        .join("summaries")
        .join("daily")
        .join(format!("{}-summary.md", date.format("%Y-%m-%d")))
}

/// Dates with a journal file, a strictly later journal date also present, and
/// no summary file yet, oldest first. Idempotent by construction — once a
/// summary file exists for a date it never appears here again.
fn pending_dates(journal_root: &Path) -> Vec<NaiveDate> {
    let daily_dir = journal_root.join("daily");
    let Ok(entries) = std::fs::read_dir(&daily_dir) else {
        return Vec::new();
    };

    let mut dates: Vec<NaiveDate> = entries
        .flatten()
        .filter_map(|e| crate::journal::reader::parse_journal_date(&e.file_name().to_string_lossy()))
        .collect();
    dates.sort();
    dates.dedup();

    let Some(&most_recent) = dates.last() else {
        return Vec::new();
    };

    dates
        .into_iter()
        .filter(|d| *d < most_recent)
        .filter(|d| !summary_file_path(journal_root, *d).is_file())
        .collect()
}

async fn generate_for_date(
    journal_root: &Path,
    date: NaiveDate,
    client: &dyn AiClient,
    ai_opts: &InvokeOptions,
) -> Result<PathBuf> {
    let entries_path = journal_file_path(journal_root, date);
    let content = std::fs::read_to_string(&entries_path)?;
    let reflections = extract_reflections(&content);

    let prompt = build_prompt(date, &content);
    let section = match client.invoke(&prompt, ai_opts).await {
        Ok(raw) if !raw.trim().is_empty() => Section {
            name: SectionName::Summary,
            content: SectionContent::Text(raw.trim().to_string()),
            generator_status: GeneratorStatus::Ok,
        },
        Ok(_) => Section {
            name: SectionName::Summary,
            content: SectionContent::Text(fallback_summary(&content)),
            generator_status: GeneratorStatus::Fallback,
        },
        Err(err) => {
            warn!(date = %date, error = %err, "daily summary LLM call failed, using fallback");
            Section {
                name: SectionName::Summary,
                content: SectionContent::Text(fallback_summary(&content)),
                generator_status: GeneratorStatus::Fallback,
            }
        }
    };

    let summary = DailySummary {
        date,
        sections: vec![section],
        reflections,
    };

    let path = summary_file_path(journal_root, date);
    let daily_dir = path.parent().expect("summary_file_path always has a parent");
    std::fs::create_dir_all(daily_dir)?;
    write_atomic(&path, &render(&summary))?;
    Ok(path)
}

fn build_prompt(date: NaiveDate, entries_markdown: &str) -> String {
    format!(
        "Summarize the engineering work recorded across these journal entries for {}. \
         Write 2-5 sentences of narrative prose covering the day's main themes. Only state \
         what the entries actually show; do not invent details.\n\n{}",
        date.format("%Y-%m-%d"),
        entries_markdown
    )
}

/// Count of `### ... — Commit ...` headers, used by the fallback text when
/// the LLM is unavailable.
fn commit_entry_count(entries_markdown: &str) -> usize {
    entries_markdown
        .lines()
        .filter(|l| l.starts_with("### ") && l.contains("— Commit"))
        .count()
}

fn fallback_summary(entries_markdown: &str) -> String {
    let count = commit_entry_count(entries_markdown);
    format!(
        "{} commit{} recorded; see the day's journal entries for details.",
        count,
        if count == 1 { "" } else { "s" }
    )
}

fn render(summary: &DailySummary) -> String {
    let mut out = format!("## Summary — {}\n", summary.date.format("%Y-%m-%d"));
    for section in &summary.sections {
        if section.content.is_empty() {
            continue;
        }
        if let SectionContent::Text(text) = &section.content {
            out.push('\n');
            out.push_str(text.trim());
            out.push('\n');
        }
    }
    if !summary.reflections.is_empty() {
        out.push_str("\n## Reflections\n");
        for reflection in &summary.reflections {
            out.push_str(&format!("\n### {} — Reflection\n\n", reflection.timestamp_label));
            out.push_str(&reflection.body);
            out.push('\n');
        }
    }
    out
}
