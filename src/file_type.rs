//! Extension-based file-type classification (§9 supplemented feature), used
//! by the Git Context Collector (C4) to populate `FileChange::file_type` and
//! by the Commit Details section generator to group files in its summary.

use std::path::Path;

/// Classify a repository-relative path into a coarse category. Falls back to
/// `"other"` for anything unrecognized, per §4.4 "File-type classification
/// uses extension heuristics."
pub fn classify(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match ext.as_deref() {
        Some("rs") => "rust",
        Some("py") => "python",
        Some("js" | "mjs" | "cjs") => "javascript",
        Some("ts" | "tsx") => "typescript",
        Some("go") => "go",
        Some("java") => "java",
        Some("rb") => "ruby",
        Some("c" | "h") => "c",
        Some("cpp" | "cc" | "cxx" | "hpp") => "cpp",
        Some("md" | "mdx" | "rst" | "txt") => "docs",
        Some("yaml" | "yml" | "toml" | "json" | "ini" | "cfg") => "config",
        Some("sh" | "bash" | "zsh") => "shell",
        Some("sql") => "sql",
        Some("html" | "css" | "scss") => "web",
        None if path.ends_with("Dockerfile") => "config",
        _ => "other",
    }
}
