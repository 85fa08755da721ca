//! Configuration loading (§6 "Configuration file", expanded in SPEC_FULL
//! §4.12). Discovers `.mcp-commit-storyrc.yaml` by walking upward from a
//! start directory, falls back to documented defaults for anything absent,
//! and interpolates `${VAR}` occurrences in string fields from the process
//! environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{JournalError, Result};

fn default_journal_path() -> String {
    "journal".into()
}
fn default_true() -> bool {
    true
}
fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_budget_seconds() -> u64 {
    180
}
fn default_lookback_hours() -> u64 {
    48
}
fn default_max_messages() -> usize {
    200
}
fn default_exclude_patterns() -> Vec<String> {
    vec!["journal/**".into(), ".mcp-commit-storyrc.yaml".into()]
}

const CONFIG_FILENAME: &str = ".mcp-commit-storyrc.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalSection {
    #[serde(default = "default_journal_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub background: bool,
}

impl Default for JournalSection {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
            background: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_budget_seconds")]
    pub total_budget_seconds: u64,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
            total_budget_seconds: default_budget_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            max_messages: default_max_messages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitSection {
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// Raw config shape as read from YAML, before environment interpolation.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    journal: JournalSection,
    ai: AiSection,
    chat: ChatSection,
    git: GitSection,
}

/// Fully resolved configuration: YAML values (or defaults) with `${VAR}`
/// interpolation already applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub journal_path: String,
    pub journal_background: bool,
    pub ai_provider: String,
    pub ai_model: String,
    pub ai_api_key: Option<String>,
    pub ai_timeout_seconds: u64,
    pub ai_total_budget_seconds: u64,
    /// Flips to `false` when a required `${VAR}` interpolation (currently
    /// only `ai.api_key`) could not be resolved — per §6, this degrades the
    /// whole run to fallback-only mode rather than failing to load.
    pub ai_enabled: bool,
    pub chat_lookback_hours: u64,
    pub chat_max_messages: usize,
    pub git_exclude_patterns: Vec<String>,
}

impl Config {
    /// Walk upward from `start_dir` looking for `.mcp-commit-storyrc.yaml`.
    /// Absent file -> pure defaults, never an error.
    pub fn discover(start_dir: &Path) -> Result<Self> {
        match find_config_file(start_dir) {
            Some(path) => Self::load_file(&path),
            None => Ok(Self::from_raw(RawConfig::default())),
        }
    }

    /// Load configuration from an explicit path, bypassing upward discovery
    /// — used when `--config` is passed on the command line.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_file(path)
    }

    fn load_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: RawConfig = serde_yaml::from_str(&text)
            .map_err(|e| JournalError::InvalidConfig(path.to_path_buf(), e))?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let mut ai_enabled = true;
        let ai_api_key = raw.ai.api_key.as_deref().and_then(|v| match interpolate(v) {
            Ok(resolved) => Some(resolved),
            Err(var) => {
                warn!(
                    variable = %var,
                    "unresolved ${{VAR}} in ai.api_key — disabling AI calls, fallback-only mode"
                );
                ai_enabled = false;
                None
            }
        });
        // No key configured at all is still allowed to run (e.g. a local
        // provider with no auth) — most remote providers will simply fail at
        // call time and fall back per §7 Recoverable-global.

        Self {
            journal_path: raw.journal.path,
            journal_background: raw.journal.background,
            ai_provider: raw.ai.provider,
            ai_model: raw.ai.model,
            ai_api_key,
            ai_timeout_seconds: raw.ai.timeout_seconds,
            ai_total_budget_seconds: raw.ai.total_budget_seconds,
            ai_enabled,
            chat_lookback_hours: raw.chat.lookback_hours,
            chat_max_messages: raw.chat.max_messages,
            git_exclude_patterns: raw.git.exclude_patterns,
        }
    }

    /// The journal root, resolved relative to the repository root.
    pub fn journal_root(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.journal_path)
    }

    /// Narrow view handed to section generators — see `model::ConfigView`.
    pub fn view(&self) -> crate::model::ConfigView {
        crate::model::ConfigView {
            ai_model: self.ai_model.clone(),
            ai_provider: self.ai_provider.clone(),
        }
    }

    pub fn chat_lookback(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.chat_lookback_hours * 3600)
    }

    /// Whether `path` (repo-relative, forward-slash separated) matches any of
    /// `git.exclude_patterns`.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.git_exclude_patterns
            .iter()
            .any(|pat| glob_match(pat, path))
    }
}

fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = Some(start_dir.to_path_buf());
    while let Some(d) = dir {
        let candidate = d.join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent().map(Path::to_path_buf);
    }
    None
}

/// Replace every `${VAR}` in `value` with the corresponding environment
/// variable. Returns `Err(var_name)` for the first variable that is unset.
fn interpolate(value: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            out.push_str(rest);
            return Ok(out);
        };
        out.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        match std::env::var(var_name) {
            Ok(v) => out.push_str(&v),
            Err(_) => return Err(var_name.to_string()),
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Minimal glob matcher supporting `*` (any run of characters within a path
/// segment) and `**` (any run of characters including `/`). Deliberately
/// hand-rolled rather than pulling in a dedicated glob crate — the exclude
/// list is short and the patterns in practice are simple prefixes like
/// `journal/**`.
pub(crate) fn glob_match(pattern: &str, path: &str) -> bool {
    fn compile(pattern: &str) -> String {
        let mut regex = String::from("^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    if chars.peek() == Some(&'*') {
                        chars.next();
                        regex.push_str(".*");
                    } else {
                        regex.push_str("[^/]*");
                    }
                }
                '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                    regex.push('\\');
                    regex.push(c);
                }
                other => regex.push(other),
            }
        }
        regex.push('$');
        regex
    }

    regex::Regex::new(&compile(pattern))
        .map(|re| re.is_match(path))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_no_file_present() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::discover(tmp.path()).unwrap();
        assert_eq!(config.journal_path, "journal");
        assert!(config.journal_background);
        assert_eq!(config.ai_provider, "openai");
        assert_eq!(config.chat_lookback_hours, 48);
    }

    #[test]
    fn loads_yaml_and_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(tmp.path().join(CONFIG_FILENAME)).unwrap();
        writeln!(
            file,
            "journal:\n  path: notes\nai:\n  provider: anthropic\n  model: claude-sonnet\nchat:\n  lookback_hours: 12\n"
        )
        .unwrap();

        let config = Config::discover(tmp.path()).unwrap();
        assert_eq!(config.journal_path, "notes");
        assert_eq!(config.ai_provider, "anthropic");
        assert_eq!(config.ai_model, "claude-sonnet");
        assert_eq!(config.chat_lookback_hours, 12);
    }

    #[test]
    fn discovers_by_walking_up_from_a_subdirectory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILENAME), "journal:\n  path: lore\n").unwrap();
        let nested = tmp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config::discover(&nested).unwrap();
        assert_eq!(config.journal_path, "lore");
    }

    #[test]
    fn unresolved_env_var_disables_ai() {
        std::env::remove_var("COMMIT_JOURNAL_TEST_UNSET_VAR");
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "ai:\n  api_key: ${COMMIT_JOURNAL_TEST_UNSET_VAR}\n",
        )
        .unwrap();

        let config = Config::discover(tmp.path()).unwrap();
        assert!(!config.ai_enabled);
        assert!(config.ai_api_key.is_none());
    }

    #[test]
    fn resolved_env_var_is_interpolated() {
        std::env::set_var("COMMIT_JOURNAL_TEST_KEY", "secret-value");
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILENAME),
            "ai:\n  api_key: ${COMMIT_JOURNAL_TEST_KEY}\n",
        )
        .unwrap();

        let config = Config::discover(tmp.path()).unwrap();
        assert!(config.ai_enabled);
        assert_eq!(config.ai_api_key.as_deref(), Some("secret-value"));
        std::env::remove_var("COMMIT_JOURNAL_TEST_KEY");
    }

    #[test]
    fn glob_matches_double_star_prefix() {
        assert!(glob_match("journal/**", "journal/daily/2025-01-01-journal.md"));
        assert!(!glob_match("journal/**", "src/main.rs"));
        assert!(glob_match(".mcp-commit-storyrc.yaml", ".mcp-commit-storyrc.yaml"));
    }

    #[test]
    fn is_excluded_uses_configured_patterns() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::discover(tmp.path()).unwrap();
        assert!(config.is_excluded("journal/daily/2025-01-01-journal.md"));
        assert!(config.is_excluded(".mcp-commit-storyrc.yaml"));
        assert!(!config.is_excluded("src/lib.rs"));
    }
}
