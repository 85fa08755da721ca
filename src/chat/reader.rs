//! Chat Database Reader (C1): opens one workspace database read-only and
//! extracts raw sessions and messages from it.
//!
//! Schema (matches the on-disk layout of the supported editors):
//!   - `ItemTable(key TEXT, value TEXT)` — a single row keyed
//!     `composer.composerData` holds a JSON blob describing every composer
//!     (chat session) in the workspace: `composerId`, `createdAt`,
//!     `lastUpdatedAt`.
//!   - `cursorDiskKV(key TEXT, value TEXT)` — one row per chat bubble, keyed
//!     `bubbleId:<composerId>:<bubbleId>`, whose JSON value carries the
//!     message `type` (1 = user, 2 = assistant), the message `text`, and,
//!     for assistant bubbles, optional `thinking`/`toolFormerData` fields we
//!     deliberately never read.
//!
//! A single-database failure never propagates as an `Err` from `read` — it
//! is folded into the returned `DatabaseStatus`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::error::DatabaseFailureReason;
use crate::model::{ChatMessage, ChatSession, DatabaseStatus, Speaker};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct RawComposerData {
    #[serde(rename = "allComposers", alias = "all_composers")]
    all_composers: Vec<RawComposerMeta>,
}

#[derive(Deserialize)]
struct RawComposerMeta {
    #[serde(rename = "composerId", alias = "composer_id")]
    composer_id: String,
    #[serde(rename = "createdAt", alias = "created_at")]
    created_at: i64,
    #[serde(rename = "lastUpdatedAt", alias = "last_updated_at")]
    last_updated_at: i64,
}

#[derive(Deserialize)]
struct RawBubble {
    /// 1 = user, 2 = assistant; anything else is ignored.
    #[serde(rename = "type")]
    kind: i32,
    text: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    thinking: Option<serde_json::Value>,
    #[serde(default, rename = "toolFormerData")]
    #[allow(dead_code)]
    tool_former_data: Option<serde_json::Value>,
}

/// Result of scanning a single database.
pub struct ReadOutcome {
    pub sessions: Vec<ChatSession>,
    pub status: DatabaseStatus,
}

/// Open `db_path` read-only with a bounded busy timeout and pull every
/// session + its bubbles out of it. Never panics and never returns `Err` for
/// a per-database problem — see `ReadOutcome::status`.
pub async fn read(db_path: &Path) -> ReadOutcome {
    let path_str = db_path.to_string_lossy().to_string();

    let pool = match open_read_only(db_path).await {
        Ok(pool) => pool,
        Err(reason) => {
            return ReadOutcome {
                sessions: Vec::new(),
                status: DatabaseStatus {
                    path: path_str,
                    failed: true,
                    reason: Some(reason),
                },
            };
        }
    };

    match tokio::time::timeout(QUERY_TIMEOUT, read_all_sessions(&pool)).await {
        Ok(Ok(sessions)) => ReadOutcome {
            sessions,
            status: DatabaseStatus {
                path: path_str,
                failed: false,
                reason: None,
            },
        },
        Ok(Err(reason)) => ReadOutcome {
            sessions: Vec::new(),
            status: DatabaseStatus {
                path: path_str,
                failed: true,
                reason: Some(reason),
            },
        },
        Err(_) => ReadOutcome {
            sessions: Vec::new(),
            status: DatabaseStatus {
                path: path_str,
                failed: true,
                reason: Some(DatabaseFailureReason::Timeout),
            },
        },
    }
}

async fn open_read_only(db_path: &Path) -> Result<SqlitePool, DatabaseFailureReason> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| {
            warn!(path = %db_path.display(), error = %e, "failed to open chat database");
            if e.to_string().to_lowercase().contains("permission") {
                DatabaseFailureReason::Permission
            } else {
                DatabaseFailureReason::OpenError
            }
        })
}

async fn read_all_sessions(pool: &SqlitePool) -> Result<Vec<ChatSession>, DatabaseFailureReason> {
    let composer_row = sqlx::query("SELECT value FROM ItemTable WHERE key = ?")
        .bind("composer.composerData")
        .fetch_optional(pool)
        .await
        .map_err(|_| DatabaseFailureReason::QueryError)?;

    let Some(row) = composer_row else {
        return Ok(Vec::new());
    };
    let json: String = row.try_get(0).map_err(|_| DatabaseFailureReason::ParseError)?;
    let composer_data: RawComposerData =
        serde_json::from_str(&json).map_err(|_| DatabaseFailureReason::ParseError)?;

    let mut sessions = Vec::with_capacity(composer_data.all_composers.len());
    for meta in composer_data.all_composers {
        let messages = read_bubbles(
            pool,
            &meta.composer_id,
            meta.created_at,
            meta.last_updated_at,
        )
        .await?;
        sessions.push(ChatSession {
            composer_id: meta.composer_id,
            created_at_ms: meta.created_at,
            last_updated_at_ms: meta.last_updated_at,
            messages,
        });
    }

    Ok(sessions)
}

/// Bubbles carry no per-message timestamp in this schema — only bubble
/// insertion order (preserved by `ORDER BY key`). We interpolate a timestamp
/// linearly across the session's `[created_at, last_updated_at]` span so
/// that cross-session merging in the Session Reconstructor still produces a
/// sensible chronological order instead of every message from one session
/// colliding on the same instant.
async fn read_bubbles(
    pool: &SqlitePool,
    composer_id: &str,
    created_at_ms: i64,
    last_updated_at_ms: i64,
) -> Result<Vec<ChatMessage>, DatabaseFailureReason> {
    let like_pattern = format!("bubbleId:{composer_id}:%");
    let rows = sqlx::query("SELECT key, value FROM cursorDiskKV WHERE key LIKE ? ORDER BY key")
        .bind(like_pattern)
        .fetch_all(pool)
        .await
        .map_err(|_| DatabaseFailureReason::QueryError)?;

    let mut raw = Vec::with_capacity(rows.len());
    for row in &rows {
        let key: String = row.try_get(0).map_err(|_| DatabaseFailureReason::ParseError)?;
        let value: String = row.try_get(1).map_err(|_| DatabaseFailureReason::ParseError)?;

        let Ok(bubble) = serde_json::from_str::<RawBubble>(&value) else {
            continue;
        };
        let speaker = match bubble.kind {
            1 => Speaker::User,
            2 => Speaker::Assistant,
            _ => continue,
        };
        let Some(text) = bubble.text else { continue };
        let bubble_id = key.rsplit(':').next().unwrap_or(&key).to_string();
        raw.push((speaker, text, bubble_id));
    }

    let span_ms = (last_updated_at_ms - created_at_ms).max(0);
    let denom = raw.len().saturating_sub(1).max(1) as i64;

    let mut messages = Vec::with_capacity(raw.len());
    for (index, (speaker, text, bubble_id)) in raw.into_iter().enumerate() {
        let timestamp_ms = created_at_ms + (span_ms * index as i64) / denom;
        if let Some(msg) =
            ChatMessage::new(speaker, text, timestamp_ms, composer_id, bubble_id, index)
        {
            messages.push(msg);
        }
    }

    Ok(messages)
}
