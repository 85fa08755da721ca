//! Journal Reader (C5): bounded-tail read of the most recent prior entry,
//! used only to give the AI Boundary Filter (C7) and the section generators
//! (C8) a continuity hint. Never fails — a missing or unreadable journal
//! simply contributes an empty string.

use std::path::Path;

use chrono::NaiveDate;

const TAIL_BYTES: usize = 8 * 1024;

/// Return the tail of the most recent journal entry on or before `on_or_before`.
/// Scans `<journal_root>/daily/` for files named `<date>-journal.md`.
pub fn most_recent_entry(journal_root: &Path, on_or_before: NaiveDate) -> String {
    let daily_dir = journal_root.join("daily");
    let Ok(entries) = std::fs::read_dir(&daily_dir) else {
        return String::new();
    };

    let mut candidates: Vec<NaiveDate> = entries
        .flatten()
        .filter_map(|e| parse_journal_date(&e.file_name().to_string_lossy()))
        .filter(|d| *d <= on_or_before)
        .collect();
    candidates.sort();

    let Some(latest) = candidates.last() else {
        return String::new();
    };

    let path = daily_dir.join(format!("{}-journal.md", latest.format("%Y-%m-%d")));
    let Ok(content) = std::fs::read_to_string(&path) else {
        return String::new();
    };

    tail(&content, TAIL_BYTES)
}

pub fn parse_journal_date(filename: &str) -> Option<NaiveDate> {
    let date_str = filename.strip_suffix("-journal.md")?;
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()
}

/// Last `max_bytes` of `text`, snapped forward to the next `char` boundary so
/// the result is always valid UTF-8.
fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn returns_empty_string_when_no_journal_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let out = most_recent_entry(tmp.path(), NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        assert_eq!(out, "");
    }

    #[test]
    fn finds_most_recent_entry_on_or_before_target_date() {
        let tmp = tempfile::tempdir().unwrap();
        let daily = tmp.path().join("daily");
        fs::create_dir_all(&daily).unwrap();
        fs::write(daily.join("2025-01-08-journal.md"), "day 8 content").unwrap();
        fs::write(daily.join("2025-01-09-journal.md"), "day 9 content").unwrap();
        fs::write(daily.join("2025-01-11-journal.md"), "day 11 content, should be ignored").unwrap();

        let out = most_recent_entry(tmp.path(), NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        assert_eq!(out, "day 9 content");
    }

    #[test]
    fn tails_long_content_at_char_boundary() {
        let text = "x".repeat(20_000);
        let out = tail(&text, TAIL_BYTES);
        assert_eq!(out.len(), TAIL_BYTES);
    }
}
