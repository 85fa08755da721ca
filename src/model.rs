//! The data model shared by every component in the pipeline.
//!
//! Timestamps follow the editor's own representation (milliseconds since the
//! Unix epoch) wherever a value is compared against data read straight out of
//! a chat database, so that sort keys and window-overlap checks never round
//! through a lossy conversion. Git-side timestamps use `chrono::DateTime<Utc>`
//! since `git2` already hands those back as calendar values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One changed file within a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub additions: usize,
    pub deletions: usize,
    pub file_type: String,
}

/// Immutable snapshot of a single commit, as collected by the Git Context
/// Collector (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub files: Vec<FileChange>,
    /// path -> diff text, each already capped at the configured per-file byte
    /// limit and suffixed with `[TRUNCATED]` when cut short.
    pub diffs: HashMap<String, String>,
}

impl Commit {
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(7)]
    }

    pub fn total_additions(&self) -> usize {
        self.files.iter().map(|f| f.additions).sum()
    }

    pub fn total_deletions(&self) -> usize {
        self.files.iter().map(|f| f.deletions).sum()
    }
}

/// Which side of a conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// A single chat message. Construction is expected to go through
/// [`ChatMessage::new`], which enforces the "empty-text messages are never
/// constructed" invariant from the spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp_ms: i64,
    pub composer_id: String,
    pub bubble_id: String,
    /// Position within its originating session's raw message list, used only
    /// as the final deterministic tie-break key — never shown to a user.
    pub original_index: usize,
}

impl ChatMessage {
    /// Returns `None` for empty (or whitespace-only) text, per the spec
    /// invariant that empty messages are never constructed.
    pub fn new(
        speaker: Speaker,
        text: impl Into<String>,
        timestamp_ms: i64,
        composer_id: impl Into<String>,
        bubble_id: impl Into<String>,
        original_index: usize,
    ) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            speaker,
            text,
            timestamp_ms,
            composer_id: composer_id.into(),
            bubble_id: bubble_id.into(),
            original_index,
        })
    }
}

/// A reconstructed chat session: a composer's metadata plus its ordered raw
/// messages, before cross-session merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub composer_id: String,
    pub created_at_ms: i64,
    pub last_updated_at_ms: i64,
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// A session overlaps the commit window `[window_start, window_end]` iff
    /// `last_updated_at > window_start && created_at < window_end`.
    pub fn overlaps(&self, window_start_ms: i64, window_end_ms: i64) -> bool {
        self.last_updated_at_ms > window_start_ms && self.created_at_ms < window_end_ms
    }
}

/// Deterministic sort key for merging messages across sessions and
/// databases: `(timestamp, composer_id, original_index, db_path)`. The final
/// field is an unspecified-in-the-spec tie-break the implementer is invited
/// to add (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    pub timestamp_ms: i64,
    pub composer_id: String,
    pub original_index: usize,
    pub source_db: String,
}

/// Per-database scan outcome, folded into `QualityMetadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStatus {
    pub path: String,
    pub failed: bool,
    pub reason: Option<crate::error::DatabaseFailureReason>,
}

/// Quality/provenance metadata attached to every `ChatWindow`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QualityMetadata {
    pub databases_scanned: usize,
    pub databases_failed: Vec<DatabaseStatus>,
    pub messages_total: usize,
    pub messages_after_filter: usize,
    pub session_count: usize,
    pub confidence_score: f32,
    /// Set by the AI Boundary Filter when it trimmed with confidence 5-7.
    pub ambiguous_boundary: bool,
}

/// Merged, chronologically sorted window of chat messages spanning one or
/// more overlapping sessions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatWindow {
    pub messages: Vec<ChatMessage>,
    pub quality: QualityMetadata,
}

impl ChatWindow {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Summary view of configuration handed to generators — deliberately narrow
/// so section prompts cannot accidentally leak credentials or unrelated
/// settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigView {
    pub ai_model: String,
    pub ai_provider: String,
}

/// The single input every section generator (C8) and the boundary filter
/// (C7) receive.
#[derive(Debug, Clone)]
pub struct JournalContext {
    pub commit: Commit,
    pub chat: ChatWindow,
    pub previous_entry_markdown: Option<String>,
    pub config: ConfigView,
}

/// Whether a section's content came from a real LLM call, a deterministic
/// git-derived fallback, or was legitimately empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorStatus {
    Ok,
    Fallback,
    Empty,
}

/// The seven fixed section names, in canonical rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionName {
    Summary,
    TechnicalSynopsis,
    Accomplishments,
    FrustrationsChallenges,
    ToneMood,
    DiscussionNotes,
    CommitDetails,
}

impl SectionName {
    pub const ALL: [SectionName; 7] = [
        SectionName::Summary,
        SectionName::TechnicalSynopsis,
        SectionName::Accomplishments,
        SectionName::FrustrationsChallenges,
        SectionName::ToneMood,
        SectionName::DiscussionNotes,
        SectionName::CommitDetails,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::TechnicalSynopsis => "Technical Synopsis",
            Self::Accomplishments => "Accomplishments",
            Self::FrustrationsChallenges => "Frustrations / Challenges",
            Self::ToneMood => "Tone / Mood",
            Self::DiscussionNotes => "Discussion Notes",
            Self::CommitDetails => "Commit Details",
        }
    }
}

/// Content for a rendered section: either flat prose or a structured map (the
/// shape an LLM tends to return when asked for field-like content, e.g.
/// Technical Synopsis).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionContent {
    Text(String),
    Fields(HashMap<String, serde_json::Value>),
}

impl SectionContent {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Fields(m) => m.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub name: SectionName,
    pub content: SectionContent,
    pub generator_status: GeneratorStatus,
}

/// One commit's worth of rendered journal content.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub commit_hash: String,
    pub timestamp: DateTime<Utc>,
    pub sections: Vec<Section>,
}

/// A human-authored, timestamped block preserved verbatim from a journal file
/// into that day's summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub timestamp_label: String,
    pub body: String,
}

/// A roll-up of one calendar day's entries.
#[derive(Debug, Clone)]
pub struct DailySummary {
    pub date: chrono::NaiveDate,
    pub sections: Vec<Section>,
    pub reflections: Vec<Reflection>,
}
