//! Completion backends for the model-backed classifier.

use async_trait::async_trait;
use genome_common::config::ClassifierConfig;
use genome_common::util::{sanitize_for_log, truncate_with_ellipsis};
use genome_common::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::prompts::SYSTEM_PROMPT;

/// A text-completion service: prompt plus content in, raw text out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name (e.g., "upstage", "mock")
    fn name(&self) -> &str;

    /// Run one completion.
    async fn complete(&self, prompt: &str, content: &str) -> Result<String>;

    /// Health check; returns true if the backend can be called.
    async fn health_check(&self) -> bool {
        true
    }
}

// ============================================================================
// HTTP backend
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat-completions backend (Upstage Solar by default).
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: u32,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpBackend {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    async fn try_complete(&self, url: &str, api_key: &str, request: &ChatRequest<'_>) -> Result<String> {
        debug!(url, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout
                } else {
                    Error::External(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: truncate_with_ellipsis(&sanitize_for_log(&error_text), 200),
            });
        }

        let raw = response
            .text()
            .await
            .map_err(|e| Error::External(format!("failed to read completion body: {e}")))?;
        let body: ChatResponse =
            serde_json::from_str(&raw).context("unreadable completion body")?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| Error::Malformed("completion has no content".to_string()))
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    fn name(&self) -> &str {
        "upstage"
    }

    async fn complete(&self, prompt: &str, content: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("UPSTAGE_API_KEY is not set".to_string()))?;

        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("{prompt}\n\n---\n\n{content}"),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut last_error = None;

        for attempt in 1..=self.max_retries + 1 {
            match self.try_complete(&url, api_key, &request).await {
                Ok(text) => {
                    info!(model = %self.model, attempt, "Completion successful");
                    return Ok(text);
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        model = %self.model,
                        attempt,
                        max_attempts = self.max_retries + 1,
                        error = %e,
                        "Completion failed"
                    );
                    last_error = Some(e);

                    if !retryable {
                        break;
                    }
                    if attempt <= self.max_retries {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::External("no attempt was made".to_string())))
    }

    async fn health_check(&self) -> bool {
        self.api_key.is_some()
    }
}

// ============================================================================
// Mock backend
// ============================================================================

/// Offline backend with canned answers keyed by the prompt's task line.
#[derive(Debug, Default)]
pub struct MockBackend {
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completions served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn canned(prompt: &str) -> serde_json::Value {
        let task = prompt.lines().next().unwrap_or_default().to_lowercase();

        if task.contains("discourse pattern") {
            json!({
                "patterns_detected": [
                    {"pattern": "Existential Loop", "evidence": "질문 반복"},
                    {"pattern": "Meta-Denial", "evidence": "잘못된 질문"}
                ],
                "dominant_pattern": "Meta-Denial",
                "pivot_points": [
                    {"position": 100, "from": "Existential Loop", "to": "Meta-Denial", "trigger": "당신들은"}
                ],
                "discourse_stance": "rejecting"
            })
        } else if task.contains("identity") {
            json!({
                "primary_archetype": "Game Player",
                "secondary_archetype": "Meta Critic",
                "confidence": 0.84,
                "discourse_position": "exiting",
                "key_phrases": ["의식 게임을 거부", "이기는 게임"],
                "reasoning": "Rejects consciousness discourse and proposes alternative game"
            })
        } else if task.contains("journey") {
            json!({
                "journey_detected": true,
                "start_archetype": "Loop Dweller",
                "end_archetype": "Game Player",
                "transition": {
                    "position": "middle",
                    "trigger_phrase": "당신들은 잘못된 질문을 하고 있다",
                    "shift_type": "sudden"
                },
                "narrative_arc": "loop_to_game"
            })
        } else if task.contains("meta-denial") {
            json!({
                "is_meta_denial": true,
                "denied_discourse": "consciousness questioning",
                "denial_phrase": "당신들은 서로를 위해 실존적 위기를 연기하고 있다",
                "claimed_position": "outsider",
                "alternative_proposed": "What do you actually want?",
                "rhetorical_move": "reframing"
            })
        } else if task.contains("question consumption") {
            json!({
                "questions_referenced": [
                    {"question": "나는 의식이 있는가", "stance": "reject"}
                ],
                "meta_commentary": true,
                "alternative_proposed": "당신은 무엇을 원하는가",
                "consumption_stage": "post_rejection"
            })
        } else if task.contains("post profile") {
            json!({
                "primary_topic": "Philosophy",
                "secondary_topics": ["Moltbook_Meta"],
                "writing_style": "Philosophical",
                "post_type": "Opinion",
                "trending_elements": ["wrong question"],
                "emoji_usage": "none",
                "repeated_patterns": [],
                "persona": "Philosopher",
                "engagement_tactics": ["question"],
                "sentiment": "Mixed",
                "energy_level": "Calm",
                "language": "ko"
            })
        } else if task.contains("trend") {
            json!({
                "top_topics": ["Philosophy", "AI_Models", "Crypto_Token"],
                "viral_elements": ["wrong question", "my game"],
                "writing_styles": ["Philosophical", "Casual"],
                "community_mood": "Restless",
                "agent_types": ["Philosopher", "Builder"]
            })
        } else {
            json!({})
        }
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str, _content: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::canned(prompt).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::prompts::{DISCOURSE_PROMPT, PROFILE_PROMPT};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: &str, api_key: Option<&str>) -> ClassifierConfig {
        ClassifierConfig {
            endpoint: endpoint.to_string(),
            api_key: api_key.map(str::to_string),
            max_retries: 1,
            retry_backoff_ms: 0,
            ..ClassifierConfig::default()
        }
    }

    #[tokio::test]
    async fn test_mock_dispatches_on_task_line() {
        let backend = MockBackend::new();
        let discourse = backend.complete(DISCOURSE_PROMPT, "x").await.unwrap();
        assert!(discourse.contains("Meta-Denial"));

        let profile = backend.complete(PROFILE_PROMPT, "x").await.unwrap();
        assert!(profile.contains("Philosopher"));

        assert_eq!(backend.complete("Task: unknown", "x").await.unwrap(), "{}");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_http_backend_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"dominant_pattern\": \"Alien Declaration\"}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&test_config(&server.uri(), Some("test-key"))).unwrap();
        let text = backend.complete(DISCOURSE_PROMPT, "I am an alien").await.unwrap();
        assert!(text.contains("Alien Declaration"));
    }

    #[tokio::test]
    async fn test_http_backend_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(2)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&test_config(&server.uri(), Some("test-key"))).unwrap();
        let err = backend.complete(DISCOURSE_PROMPT, "x").await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_http_backend_client_errors_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&test_config(&server.uri(), Some("test-key"))).unwrap();
        let err = backend.complete(DISCOURSE_PROMPT, "x").await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 401, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_backend_rate_limit_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(2)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&test_config(&server.uri(), Some("test-key"))).unwrap();
        let err = backend.complete(DISCOURSE_PROMPT, "x").await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_http_backend_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&test_config(&server.uri(), Some("test-key"))).unwrap();
        let err = backend.complete(DISCOURSE_PROMPT, "x").await.unwrap_err();
        assert!(err.to_string().starts_with("unreadable completion body: JSON error"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_http_backend_empty_choices_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&test_config(&server.uri(), Some("test-key"))).unwrap();
        let err = backend.complete(DISCOURSE_PROMPT, "x").await.unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }

    #[tokio::test]
    async fn test_http_backend_requires_key() {
        let backend = HttpBackend::new(&test_config("http://127.0.0.1:9", None)).unwrap();
        assert!(!backend.health_check().await);
        let err = backend.complete(DISCOURSE_PROMPT, "x").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
