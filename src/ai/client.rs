//! AI Invocation Client (C6): a thin request/response contract over the LLM
//! provider, plus the process-wide circuit breaker from §4.6.
//!
//! The provider is modeled behind the `AiClient` trait so every caller
//! (boundary filter, section generators, daily-summary trigger) can be
//! exercised against a deterministic mock in tests instead of issuing real
//! HTTP calls — grounded on the same `LlmProvider` trait shape the pack's
//! agent-gateway example uses to abstract over its several providers.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::warn;

/// Options governing a single `invoke` call.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub retry_count: u32,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            max_output_tokens: 1024,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            retry_count: 2,
        }
    }
}

/// Tagged failure returned instead of thrown, per §4.6 "on terminal failure
/// returns a tagged error value rather than throwing."
#[derive(Debug, Clone, thiserror::Error)]
pub enum AiError {
    #[error("AI provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error contacting AI provider: {0}")]
    Network(String),
    #[error("AI provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("AI provider authentication failed")]
    Auth,
    #[error("AI provider response was malformed: {0}")]
    Malformed(String),
    #[error("circuit breaker is open, short-circuiting AI calls")]
    CircuitOpen,
    #[error("no API key configured")]
    NoApiKey,
}

impl AiError {
    /// Transient failures are retried (network/5xx); auth and malformed
    /// responses and non-429 4xx are not, per §4.6.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            AiError::Timeout(_) | AiError::Network(_) | AiError::Api { status: 500..=599, .. } | AiError::Api { status: 429, .. }
        )
    }
}

#[async_trait]
pub trait AiClient: Send + Sync {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, AiError>;
}

// --- Circuit breaker -------------------------------------------------------

const FAILURE_THRESHOLD: u32 = 5;
const FAILURE_WINDOW: Duration = Duration::from_secs(60);
const COOLDOWN: Duration = Duration::from_secs(60);

struct CircuitBreakerState {
    consecutive_failures: u32,
    window_start: Option<Instant>,
    open_until: Option<Instant>,
}

/// Process-wide circuit breaker, per §4.6: "a process-wide circuit breaker
/// opens after K consecutive failures within a window." One worker process
/// lives for one pipeline run, so process-wide and call-wide coincide here
/// (see design note in DESIGN.md on why this is sufficient).
pub struct CircuitBreaker {
    state: Mutex<CircuitBreakerState>,
}

impl CircuitBreaker {
    const fn new() -> Self {
        Self {
            state: Mutex::new(CircuitBreakerState {
                consecutive_failures: 0,
                window_start: None,
                open_until: None,
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        let state = self.state.lock().expect("circuit breaker mutex poisoned");
        matches!(state.open_until, Some(until) if Instant::now() < until)
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        state.consecutive_failures = 0;
        state.window_start = None;
        state.open_until = None;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        let now = Instant::now();
        match state.window_start {
            Some(start) if now.duration_since(start) <= FAILURE_WINDOW => {
                state.consecutive_failures += 1;
            }
            _ => {
                state.window_start = Some(now);
                state.consecutive_failures = 1;
            }
        }
        if state.consecutive_failures >= FAILURE_THRESHOLD {
            warn!(
                failures = state.consecutive_failures,
                "AI circuit breaker opening for {:?}", COOLDOWN
            );
            state.open_until = Some(now + COOLDOWN);
        }
    }

    /// Explicit reset entry point required by §4.6 for tests.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        state.consecutive_failures = 0;
        state.window_start = None;
        state.open_until = None;
    }
}

pub static CIRCUIT_BREAKER: Lazy<CircuitBreaker> = Lazy::new(CircuitBreaker::new);

// --- HTTP client ------------------------------------------------------------

/// Production `AiClient` backed by an OpenAI-compatible chat completions
/// endpoint over `reqwest`, wrapped by the process-wide circuit breaker and
/// the retry/backoff policy from §4.6.
pub struct HttpAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HttpAiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn send_once(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, AiError> {
        let body = serde_json::json!({
            "model": opts.model,
            "temperature": opts.temperature,
            "max_tokens": opts.max_output_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(opts.timeout, request)
            .await
            .map_err(|_| AiError::Timeout(opts.timeout))?
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AiError::Auth);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AiError::Malformed(e.to_string()))?;

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AiError::Malformed("missing choices[0].message.content".into()))
    }
}

#[async_trait]
impl AiClient for HttpAiClient {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, AiError> {
        if CIRCUIT_BREAKER.is_open() {
            return Err(AiError::CircuitOpen);
        }

        let mut attempt = 0;
        loop {
            match self.send_once(prompt, opts).await {
                Ok(text) => {
                    CIRCUIT_BREAKER.record_success();
                    return Ok(text);
                }
                Err(err) => {
                    CIRCUIT_BREAKER.record_failure();
                    if attempt >= opts.retry_count || !err.is_retryable() {
                        return Err(err);
                    }
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// A deterministic `AiClient` for tests — never performs I/O. Public (not
/// `#[cfg(test)]`) so integration tests under `tests/` can depend on it too.
pub mod mock {
    use super::*;
    use std::sync::Mutex as StdMutex;

    pub struct MockAiClient {
        default: Option<String>,
        queue: StdMutex<Vec<Result<String, AiError>>>,
    }

    impl MockAiClient {
        /// Every call returns `Ok(text)`.
        pub fn always_ok(text: impl Into<String>) -> Self {
            Self {
                default: Some(text.into()),
                queue: StdMutex::new(Vec::new()),
            }
        }

        /// Pops one scripted response per call, in order; once exhausted,
        /// further calls fall back to an empty `Ok("")`.
        pub fn queue(responses: Vec<Result<String, AiError>>) -> Self {
            Self {
                default: None,
                queue: StdMutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl AiClient for MockAiClient {
        async fn invoke(&self, _prompt: &str, _opts: &InvokeOptions) -> Result<String, AiError> {
            let mut queue = self.queue.lock().unwrap();
            if !queue.is_empty() {
                return queue.remove(0);
            }
            Ok(self.default.clone().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new();
        cb.reset();
        for _ in 0..FAILURE_THRESHOLD {
            cb.record_failure();
        }
        assert!(cb.is_open());
        cb.reset();
        assert!(!cb.is_open());
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = CircuitBreaker::new();
        cb.reset();
        for _ in 0..FAILURE_THRESHOLD - 1 {
            cb.record_failure();
        }
        cb.record_success();
        cb.record_failure();
        assert!(!cb.is_open());
    }
}
