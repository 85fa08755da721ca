//! Verbatim extraction of human-authored Reflection blocks from a journal
//! file (§9 supplemented feature). A line-oriented scan, not a full
//! CommonMark parser — consistent with the Non-goal on markdown parsing;
//! the Journal Reader (C5) only needs bounded-tail text, and this only needs
//! to recognize one fixed header shape.

use crate::model::Reflection;

const HEADER_PREFIX: &str = "### ";
const HEADER_SUFFIX: &str = " — Reflection";

/// Extract every `### HH:MM AM/PM — Reflection` block from `markdown`,
/// preserving its body verbatim up to the next H3 header or `---` separator.
pub fn extract_reflections(markdown: &str) -> Vec<Reflection> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut reflections = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if let Some(timestamp_label) = parse_reflection_header(line) {
            let mut body_lines = Vec::new();
            let mut j = i + 1;
            while j < lines.len() {
                let candidate = lines[j];
                if candidate.trim() == "---" || candidate.starts_with(HEADER_PREFIX) {
                    break;
                }
                body_lines.push(candidate);
                j += 1;
            }
            // Trim surrounding blank lines but keep interior formatting verbatim.
            while body_lines.first().is_some_and(|l| l.trim().is_empty()) {
                body_lines.remove(0);
            }
            while body_lines.last().is_some_and(|l| l.trim().is_empty()) {
                body_lines.pop();
            }
            reflections.push(Reflection {
                timestamp_label,
                body: body_lines.join("\n"),
            });
            i = j;
        } else {
            i += 1;
        }
    }

    reflections
}

fn parse_reflection_header(line: &str) -> Option<String> {
    let rest = line.strip_prefix(HEADER_PREFIX)?;
    let timestamp_label = rest.strip_suffix(HEADER_SUFFIX)?;
    Some(timestamp_label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_reflection_block() {
        let markdown = "### 09:15 AM — Commit abc1234\n\n#### Summary\n\nDid stuff.\n\n---\n\n### 10:00 AM — Reflection\n\nThis was a tricky one, glad it's done.\n\n---\n";
        let reflections = extract_reflections(markdown);
        assert_eq!(reflections.len(), 1);
        assert_eq!(reflections[0].timestamp_label, "10:00 AM");
        assert_eq!(reflections[0].body, "This was a tricky one, glad it's done.");
    }

    #[test]
    fn stops_at_next_h3_header_without_separator() {
        let markdown = "### 10:00 AM — Reflection\n\nFirst reflection.\n### 11:00 AM — Commit def5678\n";
        let reflections = extract_reflections(markdown);
        assert_eq!(reflections.len(), 1);
        assert_eq!(reflections[0].body, "First reflection.");
    }

    #[test]
    fn no_reflections_returns_empty_vec() {
        let markdown = "### 09:15 AM — Commit abc1234\n\n#### Summary\n\nOnly code, no reflections.\n";
        assert!(extract_reflections(markdown).is_empty());
    }
}
