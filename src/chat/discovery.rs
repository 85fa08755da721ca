//! Discovers candidate chat database files on disk (C1, discovery half).
//!
//! Editors that store chat history locally keep one SQLite file per
//! workspace under a per-platform root. We never ask the user where these
//! live — we walk the known roots and filter by modification time.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::debug;

/// Name of the chat-capable editor we scan. Kept generic since several
/// editors share this on-disk layout (VS Code-family `workspaceStorage`).
const EDITOR_DIR_NAMES: &[&str] = &["Cursor", "Code", "Code - Insiders"];

const DB_FILENAME: &str = "state.vscdb";

/// Returns every `workspaceStorage/*/state.vscdb` file under the editor's
/// storage root(s) for this platform, newest-first.
pub fn discover_database_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Some(config) = dirs::config_dir() {
        for name in EDITOR_DIR_NAMES {
            roots.push(config.join(name).join("User").join("workspaceStorage"));
        }
    }
    if let Some(data) = dirs::data_dir() {
        for name in EDITOR_DIR_NAMES {
            roots.push(data.join(name).join("User").join("workspaceStorage"));
        }
    }
    if let Some(wsl_root) = wsl_windows_appdata() {
        for name in EDITOR_DIR_NAMES {
            roots.push(wsl_root.join(name).join("User").join("workspaceStorage"));
        }
    }

    roots
}

/// Detects a WSL environment and, if found, returns the Windows `%APPDATA%`
/// path translated to its `/mnt/c/...` mount point.
fn wsl_windows_appdata() -> Option<PathBuf> {
    let version = std::fs::read_to_string("/proc/version").ok()?;
    if !version.to_lowercase().contains("microsoft") {
        return None;
    }
    let user = std::env::var("USER").ok().or_else(|| std::env::var("LOGNAME").ok())?;
    Some(PathBuf::from(format!(
        "/mnt/c/Users/{user}/AppData/Roaming"
    )))
}

/// Walks the given roots and collects every `state.vscdb` file, optionally
/// filtering to files modified within `lookback` (the 48h default from
/// `chat.lookback_hours`).
pub fn discover_databases(roots: &[PathBuf], lookback: Option<Duration>) -> Vec<PathBuf> {
    let cutoff = lookback.map(|d| SystemTime::now() - d);
    let mut found = Vec::new();

    for root in roots {
        let Ok(entries) = std::fs::read_dir(root) else {
            continue;
        };
        for entry in entries.flatten() {
            let workspace_dir = entry.path();
            if !workspace_dir.is_dir() {
                continue;
            }
            let db_path = workspace_dir.join(DB_FILENAME);
            if !db_path.is_file() {
                continue;
            }
            if let Some(cutoff) = cutoff {
                match db_path.metadata().and_then(|m| m.modified()) {
                    Ok(mtime) if mtime < cutoff => {
                        debug!(path = %db_path.display(), "skipping dormant chat database");
                        continue;
                    }
                    Err(_) => continue,
                    _ => {}
                }
            }
            found.push(db_path);
        }
    }

    found
}

/// Convenience: discover under every platform root with the default 48h
/// lookback.
pub fn discover_default() -> Vec<PathBuf> {
    discover_databases(&discover_database_roots(), Some(Duration::from_secs(48 * 3600)))
}

pub fn is_database_file(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()) == Some(DB_FILENAME)
}
