//! Section Generators (C8): one independent LLM invocation per journal
//! section, each with its own directive, bounded concurrency, and a
//! deterministic git-derived fallback if the call fails or returns nothing
//! usable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::ai::client::{AiClient, InvokeOptions};
use crate::model::{
    Commit, GeneratorStatus, JournalContext, Section, SectionContent, SectionName, Speaker,
};

/// Per-generator budget, independent of the AI client's own HTTP timeout —
/// a single hung section must never consume the whole pipeline's time
/// budget.
const GENERATOR_TIMEOUT: Duration = Duration::from_secs(20);

/// Sentinel the model is instructed to return verbatim when a section
/// legitimately has nothing to say (only valid for sections 4-6).
const NONE_SENTINEL: &str = "NONE";

/// Run all seven section generators and return them in `SectionName::ALL`
/// order regardless of completion order. Six make an LLM call (bounded to
/// `max_concurrent` in flight); Commit Details never does.
pub async fn generate_all(
    client: &dyn AiClient,
    ctx: &JournalContext,
    ai_opts: &InvokeOptions,
    max_concurrent: usize,
) -> Vec<Section> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let llm_sections: Vec<SectionName> = SectionName::ALL
        .into_iter()
        .filter(|n| *n != SectionName::CommitDetails)
        .collect();

    let futures = llm_sections.into_iter().map(|name| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("section generator semaphore is never closed");
            generate_section(client, name, ctx, ai_opts).await
        }
    });

    let mut sections = futures::future::join_all(futures).await;
    sections.push(build_commit_details(&ctx.commit));
    sections.sort_by_key(|s| SectionName::ALL.iter().position(|n| *n == s.name).unwrap());
    sections
}

/// Every section as a git-derived fallback, with no model call at all — used
/// by the worker when the total time budget is exhausted before generation
/// finishes (§4.11 "on budget exhaustion partial results are written with
/// generator_status=fallback for unfinished sections").
pub fn fallback_all(ctx: &JournalContext) -> Vec<Section> {
    let mut sections: Vec<Section> = SectionName::ALL
        .into_iter()
        .filter(|n| *n != SectionName::CommitDetails)
        .map(|name| Section {
            name,
            content: fallback_content(name, ctx),
            generator_status: GeneratorStatus::Fallback,
        })
        .collect();
    sections.push(build_commit_details(&ctx.commit));
    sections
}

async fn generate_section(
    client: &dyn AiClient,
    name: SectionName,
    ctx: &JournalContext,
    ai_opts: &InvokeOptions,
) -> Section {
    let prompt = build_prompt(name, ctx);
    let allows_empty = matches!(
        name,
        SectionName::FrustrationsChallenges | SectionName::ToneMood | SectionName::DiscussionNotes
    );

    let outcome = tokio::time::timeout(GENERATOR_TIMEOUT, client.invoke(&prompt, ai_opts)).await;

    match outcome {
        Ok(Ok(raw)) if raw.trim().eq_ignore_ascii_case(NONE_SENTINEL) && allows_empty => Section {
            name,
            content: SectionContent::Text(String::new()),
            generator_status: GeneratorStatus::Empty,
        },
        Ok(Ok(raw)) if raw.trim().is_empty() => Section {
            name,
            content: fallback_content(name, ctx),
            generator_status: GeneratorStatus::Fallback,
        },
        Ok(Ok(raw)) => Section {
            name,
            content: parse_content(name, &raw),
            generator_status: GeneratorStatus::Ok,
        },
        Ok(Err(err)) => {
            warn!(section = name.header(), error = %err, "section generator call failed, using fallback");
            Section {
                name,
                content: fallback_content(name, ctx),
                generator_status: GeneratorStatus::Fallback,
            }
        }
        Err(_) => {
            warn!(section = name.header(), "section generator timed out, using fallback");
            Section {
                name,
                content: fallback_content(name, ctx),
                generator_status: GeneratorStatus::Fallback,
            }
        }
    }
}

/// Technical Synopsis is the one section asked for structured JSON; every
/// other section is read as prose. A Technical Synopsis response that fails
/// to parse as JSON still degrades gracefully to prose rather than falling
/// back, since the text itself may well be usable.
fn parse_content(name: SectionName, raw: &str) -> SectionContent {
    if name == SectionName::TechnicalSynopsis {
        if let Some(fields) = extract_json_object(raw) {
            return SectionContent::Fields(fields);
        }
    }
    SectionContent::Text(raw.trim().to_string())
}

fn extract_json_object(raw: &str) -> Option<HashMap<String, serde_json::Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

fn build_prompt(name: SectionName, ctx: &JournalContext) -> String {
    let mut prompt = context_block(ctx);
    prompt.push_str("\n\n");
    prompt.push_str(directive(name));
    prompt
}

fn context_block(ctx: &JournalContext) -> String {
    let commit = &ctx.commit;
    let mut block = format!(
        "Commit {} by {}\nMessage: {}\nFiles changed: {} (+{} -{})\n",
        commit.short_hash(),
        commit.author,
        commit.message,
        commit.files.len(),
        commit.total_additions(),
        commit.total_deletions(),
    );
    for file in &commit.files {
        block.push_str(&format!(
            "  - {} ({}, +{} -{})\n",
            file.path, file.file_type, file.additions, file.deletions
        ));
    }
    if !ctx.chat.messages.is_empty() {
        block.push_str("\nRelevant chat transcript:\n");
        for msg in &ctx.chat.messages {
            let speaker = match msg.speaker {
                Speaker::User => "user",
                Speaker::Assistant => "assistant",
            };
            block.push_str(&format!("{speaker}: {}\n", msg.text));
        }
    } else {
        block.push_str("\nNo chat transcript is available for this commit.\n");
    }
    if let Some(prev) = &ctx.previous_entry_markdown {
        if !prev.trim().is_empty() {
            block.push_str("\nPrevious journal entry, for continuity:\n");
            block.push_str(prev);
        }
    }
    block
}

const ANTI_HALLUCINATION: &str = "Only state what the commit and chat transcript actually show. \
Do not invent details, file names, or quotes that are not present above.";

fn directive(name: SectionName) -> String {
    match name {
        SectionName::Summary => format!(
            "Write a short narrative overview (2-4 sentences) of the work this commit \
             represents, in plain prose. {ANTI_HALLUCINATION}"
        ),
        SectionName::TechnicalSynopsis => format!(
            "Describe the technical approach taken, as a JSON object with string or \
             array-of-string values (e.g. {{\"summary\": \"...\", \"keyChanges\": [\"...\"]}}). \
             Respond with ONLY the JSON object. {ANTI_HALLUCINATION}"
        ),
        SectionName::Accomplishments => format!(
            "List concrete accomplishments from this commit as short bullet points, one per \
             line, each starting with \"- \". {ANTI_HALLUCINATION}"
        ),
        SectionName::FrustrationsChallenges => format!(
            "List any frustrations, blockers, or difficulties that are explicitly expressed in \
             the chat transcript, as short bullet points starting with \"- \". If the transcript \
             shows no such signal, respond with exactly \"{NONE_SENTINEL}\". \
             Do not infer frustration from silence or from difficult code alone. {ANTI_HALLUCINATION}"
        ),
        SectionName::ToneMood => format!(
            "Describe the overall tone or mood expressed in the chat transcript, in one or two \
             sentences, ONLY if the transcript contains explicit emotional language. If it does \
             not, respond with exactly \"{NONE_SENTINEL}\". {ANTI_HALLUCINATION}"
        ),
        SectionName::DiscussionNotes => format!(
            "Select 1-4 of the most informative lines from the transcript above and quote them \
             verbatim, each prefixed with its speaker (e.g. \"user: ...\" or \"assistant: ...\"). \
             Prefer analytical or decision-relevant lines over purely emotional ones. If there is \
             no transcript, respond with exactly \"{NONE_SENTINEL}\". Do not paraphrase — copy the \
             text exactly as shown. {ANTI_HALLUCINATION}"
        ),
        SectionName::CommitDetails => unreachable!("Commit Details never calls the model"),
    }
}

/// Deterministic fallback built only from git-derived data, used when a
/// generator's LLM call fails, times out, or returns unusable output. Per
/// §4.8, this never applies to Commit Details (which is always this path).
fn fallback_content(name: SectionName, ctx: &JournalContext) -> SectionContent {
    let commit = &ctx.commit;
    match name {
        SectionName::Summary => SectionContent::Text(fallback_summary(commit)),
        SectionName::TechnicalSynopsis => {
            let mut fields = HashMap::new();
            fields.insert(
                "filesChanged".to_string(),
                serde_json::Value::Array(
                    commit
                        .files
                        .iter()
                        .map(|f| serde_json::Value::String(format!("{} ({})", f.path, f.file_type)))
                        .collect(),
                ),
            );
            SectionContent::Fields(fields)
        }
        SectionName::Accomplishments => {
            let first_line = commit.message.lines().next().unwrap_or("").trim();
            SectionContent::Text(format!("- {first_line}"))
        }
        SectionName::FrustrationsChallenges | SectionName::ToneMood => {
            SectionContent::Text(String::new())
        }
        SectionName::DiscussionNotes => SectionContent::Text(fallback_discussion_notes(ctx)),
        SectionName::CommitDetails => unreachable!("Commit Details never falls back"),
    }
}

fn fallback_summary(commit: &Commit) -> String {
    format!(
        "Committed \"{}\" ({} file{} changed, +{} -{}).",
        commit.message.lines().next().unwrap_or("").trim(),
        commit.files.len(),
        if commit.files.len() == 1 { "" } else { "s" },
        commit.total_additions(),
        commit.total_deletions(),
    )
}

/// A deterministic substitute for Discussion Notes when the model is
/// unavailable: the first and last real messages in the window, quoted
/// verbatim exactly as generated prose would be expected to.
fn fallback_discussion_notes(ctx: &JournalContext) -> String {
    let messages = &ctx.chat.messages;
    if messages.is_empty() {
        return String::new();
    }
    let first = messages.first().unwrap();
    let last = messages.last().unwrap();
    let line = |m: &crate::model::ChatMessage| {
        let speaker = match m.speaker {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        };
        format!("{speaker}: {}", m.text)
    };
    if messages.len() == 1 {
        line(first)
    } else {
        format!("{}\n{}", line(first), line(last))
    }
}

/// Commit Details (C8, §4.8 section 7): never calls the model, cannot fail
/// if the Git Context Collector (C4) succeeded.
fn build_commit_details(commit: &Commit) -> Section {
    let mut fields = HashMap::new();
    fields.insert(
        "files".to_string(),
        serde_json::Value::Array(
            commit
                .files
                .iter()
                .map(|f| {
                    serde_json::Value::String(format!(
                        "{} (+{} -{})",
                        f.path, f.additions, f.deletions
                    ))
                })
                .collect(),
        ),
    );
    fields.insert(
        "additions".to_string(),
        serde_json::Value::Number(commit.total_additions().into()),
    );
    fields.insert(
        "deletions".to_string(),
        serde_json::Value::Number(commit.total_deletions().into()),
    );
    fields.insert(
        "author".to_string(),
        serde_json::Value::String(commit.author.clone()),
    );

    Section {
        name: SectionName::CommitDetails,
        content: SectionContent::Fields(fields),
        generator_status: GeneratorStatus::Ok,
    }
}
