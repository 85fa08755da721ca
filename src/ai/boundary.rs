//! AI Boundary Filter (C7): asks the LLM to identify the first and last
//! message in a `ChatWindow` that belong to the current commit's work, then
//! applies the confidence policy from §4.7.

use serde::Deserialize;
use tracing::warn;

use crate::ai::client::{AiClient, InvokeOptions};
use crate::model::{ChatWindow, Commit};

#[derive(Debug, Deserialize)]
struct BoundaryResponse {
    first_bubble_id: String,
    last_bubble_id: String,
    confidence: u8,
}

/// Trim `window` to the commit-relevant slice the model identifies, per the
/// confidence policy:
///   - >= 8: trim strictly
///   - 5-7: trim, but record "ambiguous" in quality metadata
///   - < 5, model error, or unresolved bubble ids: keep the entire window
pub async fn apply(
    client: &dyn AiClient,
    window: ChatWindow,
    commit: &Commit,
    previous_entry: Option<&str>,
    opts: &InvokeOptions,
) -> ChatWindow {
    if window.is_empty() {
        return window;
    }

    let prompt = build_prompt(&window, commit, previous_entry);
    let raw = match client.invoke(&prompt, opts).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "boundary filter call failed, keeping entire chat window");
            return window;
        }
    };

    match parse_response(&raw) {
        Some(resp) => apply_policy(window, resp),
        None => {
            warn!(raw = %raw, "boundary filter returned an unparseable response, keeping entire chat window");
            window
        }
    }
}

fn apply_policy(mut window: ChatWindow, resp: BoundaryResponse) -> ChatWindow {
    if resp.confidence < 5 {
        window.quality.messages_after_filter = window.messages.len();
        return window;
    }

    let start = window
        .messages
        .iter()
        .position(|m| m.bubble_id == resp.first_bubble_id);
    let end = window
        .messages
        .iter()
        .position(|m| m.bubble_id == resp.last_bubble_id);

    let (Some(start), Some(end)) = (start, end) else {
        warn!("boundary filter bubble ids did not resolve to messages in the window, keeping entire window");
        window.quality.messages_after_filter = window.messages.len();
        return window;
    };
    if start > end {
        warn!("boundary filter returned an inverted range, keeping entire window");
        window.quality.messages_after_filter = window.messages.len();
        return window;
    }

    window.messages = window.messages[start..=end].to_vec();
    window.quality.ambiguous_boundary = resp.confidence < 8;
    window.quality.messages_after_filter = window.messages.len();
    window
}

fn build_prompt(window: &ChatWindow, commit: &Commit, previous_entry: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are trimming a chat transcript to the slice of conversation that belongs to one \
         git commit's work. Some of this conversation may belong to a previous commit or an \
         unrelated thread — find where THIS commit's relevant discussion begins and ends.\n\n",
    );
    prompt.push_str(&format!(
        "Commit {} — {}\n\n",
        commit.short_hash(),
        commit.message.lines().next().unwrap_or("")
    ));
    if let Some(prev) = previous_entry {
        if !prev.trim().is_empty() {
            prompt.push_str("Previous journal entry (for continuity context):\n");
            prompt.push_str(prev);
            prompt.push_str("\n\n");
        }
    }
    prompt.push_str("Transcript (one line per message, `bubbleId | speaker: text`):\n");
    for msg in &window.messages {
        prompt.push_str(&format!(
            "{} | {}: {}\n",
            msg.bubble_id,
            match msg.speaker {
                crate::model::Speaker::User => "user",
                crate::model::Speaker::Assistant => "assistant",
            },
            msg.text
        ));
    }
    prompt.push_str(
        "\nRespond with ONLY a JSON object: \
         {\"first_bubble_id\": \"...\", \"last_bubble_id\": \"...\", \"confidence\": <1-10>}",
    );
    prompt
}

/// Extract the first top-level `{...}` object from `raw` and parse it — the
/// model sometimes wraps JSON in a markdown code fence or adds commentary.
fn parse_response(raw: &str) -> Option<BoundaryResponse> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}
