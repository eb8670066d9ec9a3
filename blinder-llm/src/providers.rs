//! LLM provider abstraction (C13, §4.13): a single polymorphic client
//! trait over Ollama (local), OpenAI-compatible, and Anthropic Messages
//! backends. Privacy guarantee lives one layer up - by the time a
//! message reaches any provider here, [`blinder_pipeline`] has already
//! pseudonymized it.

use async_trait::async_trait;
use blinder_core::{BlinderError, BlinderResult, LlmConfig, LlmError, Role};
use futures_util::{Stream, StreamExt};
use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

/// One turn in a chat exchange, provider-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

/// A lazily-produced sequence of content deltas. Finite, not restartable
/// (§4.13).
pub type ChatStream = Pin<Box<dyn Stream<Item = BlinderResult<String>> + Send>>;

/// Known context window sizes in tokens (§4.13). Models absent from this
/// table fall back to a provider-specific default.
static CONTEXT_WINDOWS: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    HashMap::from([
        ("gpt-4o", 128_000),
        ("gpt-4o-mini", 128_000),
        ("gpt-4-turbo", 128_000),
        ("gpt-4", 8_192),
        ("gpt-3.5-turbo", 16_385),
        ("o1", 200_000),
        ("o1-mini", 128_000),
        ("o3-mini", 200_000),
        ("claude-sonnet-4-5-20250929", 200_000),
        ("claude-haiku-4-5-20251001", 200_000),
        ("claude-3-5-sonnet-20241022", 200_000),
        ("claude-3-haiku-20240307", 200_000),
    ])
});

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Polymorphic LLM backend (§4.13).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Streaming chat completion - yields content deltas as they arrive.
    async fn chat_stream(&self, messages: &[ChatMessage]) -> BlinderResult<ChatStream>;

    /// Non-streaming chat completion - returns the full response text.
    async fn chat_complete(&self, messages: &[ChatMessage]) -> BlinderResult<String>;

    /// The model's context window size in tokens.
    async fn context_window_size(&self) -> BlinderResult<usize>;

    /// Whether the provider is reachable and the model is available.
    async fn is_available(&self) -> bool;

    fn model_name(&self) -> &str;
    fn provider_name(&self) -> &str;
}

fn map_reqwest_err(provider: &str, err: &reqwest::Error) -> BlinderError {
    if err.is_timeout() {
        LlmError::Timeout.into()
    } else {
        LlmError::ProviderUnreachable(format!("{provider}: {err}")).into()
    }
}

async fn map_error_response(provider: &str, response: reqwest::Response) -> BlinderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or(body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::ProviderError { status: 429, message }.into()
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        LlmError::ProviderError { status: 401, message }.into()
    } else {
        tracing::warn!(provider, status = status.as_u16(), "LLM provider returned an error");
        LlmError::ProviderError { status: status.as_u16(), message }.into()
    }
}

/// Split a byte stream into complete lines, buffering partial lines across
/// chunk boundaries. Shared by the NDJSON (Ollama) and SSE (OpenAI,
/// Anthropic) framings below.
fn line_stream(
    mut bytes: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin + Send + 'static,
    provider: &'static str,
) -> impl Stream<Item = BlinderResult<String>> + Send {
    async_stream::stream! {
        let mut buf = String::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(map_reqwest_err(provider, &e));
                    return;
                }
            };
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim_end_matches('\r').to_string();
                buf.drain(..=pos);
                if !line.is_empty() {
                    yield Ok(line);
                }
            }
        }
        if !buf.trim().is_empty() {
            yield Ok(buf.trim().to_string());
        }
    }
}

// ---------------------------------------------------------------------
// Ollama (local)
// ---------------------------------------------------------------------

pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn payload(&self, messages: &[ChatMessage], stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": messages.iter().map(|m| json!({"role": role_str(m.role), "content": m.content})).collect::<Vec<_>>(),
            "stream": stream,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat_stream(&self, messages: &[ChatMessage]) -> BlinderResult<ChatStream> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&self.payload(messages, true))
            .send()
            .await
            .map_err(|e| map_reqwest_err("ollama", &e))?;

        if !response.status().is_success() {
            return Err(map_error_response("ollama", response).await);
        }

        let lines = line_stream(response.bytes_stream(), "ollama");
        let deltas = lines.filter_map(|line| async move {
            let line = match line {
                Ok(l) => l,
                Err(e) => return Some(Err(e)),
            };
            let data: Value = serde_json::from_str(&line).ok()?;
            if data.get("done").and_then(Value::as_bool) == Some(true) {
                return None;
            }
            let content = data.get("message")?.get("content")?.as_str()?.to_string();
            if content.is_empty() { None } else { Some(Ok(content)) }
        });
        Ok(Box::pin(deltas))
    }

    async fn chat_complete(&self, messages: &[ChatMessage]) -> BlinderResult<String> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&self.payload(messages, false))
            .send()
            .await
            .map_err(|e| map_reqwest_err("ollama", &e))?;

        if !response.status().is_success() {
            return Err(map_error_response("ollama", response).await);
        }
        let data: Value = response.json().await.map_err(|e| map_reqwest_err("ollama", &e))?;
        Ok(data
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn context_window_size(&self) -> BlinderResult<usize> {
        let result = self
            .http
            .post(format!("{}/api/show", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .json(&json!({"name": self.model}))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let Ok(response) = result else {
            tracing::warn!("could not determine Ollama context window, defaulting to 4096");
            return Ok(4096);
        };
        let Ok(info) = response.json::<Value>().await else {
            return Ok(4096);
        };
        if let Some(model_info) = info.get("model_info").and_then(Value::as_object) {
            for (key, value) in model_info {
                if key.to_lowercase().contains("context") {
                    if let Some(n) = value.as_u64() {
                        return Ok(n as usize);
                    }
                }
            }
        }
        Ok(4096)
    }

    async fn is_available(&self) -> bool {
        let Ok(response) = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        else {
            return false;
        };
        let Ok(data) = response.json::<Value>().await else { return false };
        data.get("models")
            .and_then(Value::as_array)
            .map(|models| {
                models.iter().any(|m| {
                    m.get("name")
                        .and_then(Value::as_str)
                        .map(|n| n.starts_with(&self.model))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

// ---------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------

pub struct OpenAiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { http: Client::new(), api_key: api_key.into(), model: model.into() }
    }

    fn payload(&self, messages: &[ChatMessage], stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": messages.iter().map(|m| json!({"role": role_str(m.role), "content": m.content})).collect::<Vec<_>>(),
            "stream": stream,
        })
    }
}

fn parse_sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat_stream(&self, messages: &[ChatMessage]) -> BlinderResult<ChatStream> {
        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&self.payload(messages, true))
            .send()
            .await
            .map_err(|e| map_reqwest_err("openai", &e))?;

        if !response.status().is_success() {
            return Err(map_error_response("openai", response).await);
        }

        let lines = line_stream(response.bytes_stream(), "openai");
        let deltas = lines.filter_map(|line| async move {
            let line = match line {
                Ok(l) => l,
                Err(e) => return Some(Err(e)),
            };
            let data_str = parse_sse_data(&line)?;
            if data_str.trim() == "[DONE]" {
                return None;
            }
            let data: Value = serde_json::from_str(data_str).ok()?;
            let content = data
                .get("choices")?
                .get(0)?
                .get("delta")?
                .get("content")?
                .as_str()?
                .to_string();
            if content.is_empty() { None } else { Some(Ok(content)) }
        });
        Ok(Box::pin(deltas))
    }

    async fn chat_complete(&self, messages: &[ChatMessage]) -> BlinderResult<String> {
        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&self.payload(messages, false))
            .send()
            .await
            .map_err(|e| map_reqwest_err("openai", &e))?;

        if !response.status().is_success() {
            return Err(map_error_response("openai", response).await);
        }
        let data: Value = response.json().await.map_err(|e| map_reqwest_err("openai", &e))?;
        Ok(data
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn context_window_size(&self) -> BlinderResult<usize> {
        Ok(CONTEXT_WINDOWS.get(self.model.as_str()).copied().unwrap_or(128_000))
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        self.http
            .get("https://api.openai.com/v1/models")
            .bearer_auth(&self.api_key)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

// ---------------------------------------------------------------------
// Anthropic (Claude)
// ---------------------------------------------------------------------

pub struct AnthropicClient {
    http: Client,
    api_key: String,
    model: String,
}

const ANTHROPIC_MAX_TOKENS: u32 = 8192;

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { http: Client::new(), api_key: api_key.into(), model: model.into() }
    }

    /// Separates the system prompt from the turn-by-turn messages, which
    /// Anthropic's API requires as a distinct top-level field.
    fn convert_messages(&self, messages: &[ChatMessage]) -> (String, Vec<Value>) {
        let mut system = String::new();
        let mut rest = Vec::new();
        for m in messages {
            if m.role == Role::System {
                system.push_str(&m.content);
                system.push('\n');
            } else {
                rest.push(json!({"role": role_str(m.role), "content": m.content}));
            }
        }
        (system.trim().to_string(), rest)
    }

    fn payload(&self, messages: &[ChatMessage], stream: bool) -> Value {
        let (system, user_messages) = self.convert_messages(messages);
        let mut payload = json!({
            "model": self.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "messages": user_messages,
            "stream": stream,
        });
        if !system.is_empty() {
            payload["system"] = Value::String(system);
        }
        payload
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat_stream(&self, messages: &[ChatMessage]) -> BlinderResult<ChatStream> {
        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(REQUEST_TIMEOUT)
            .json(&self.payload(messages, true))
            .send()
            .await
            .map_err(|e| map_reqwest_err("anthropic", &e))?;

        if !response.status().is_success() {
            return Err(map_error_response("anthropic", response).await);
        }

        let lines = line_stream(response.bytes_stream(), "anthropic");
        let deltas = lines.filter_map(|line| async move {
            let line = match line {
                Ok(l) => l,
                Err(e) => return Some(Err(e)),
            };
            let data_str = parse_sse_data(&line)?;
            let data: Value = serde_json::from_str(data_str).ok()?;
            match data.get("type").and_then(Value::as_str) {
                Some("content_block_delta") => {
                    let text = data.get("delta")?.get("text")?.as_str()?.to_string();
                    if text.is_empty() { None } else { Some(Ok(text)) }
                }
                _ => None,
            }
        });
        Ok(Box::pin(deltas))
    }

    async fn chat_complete(&self, messages: &[ChatMessage]) -> BlinderResult<String> {
        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(REQUEST_TIMEOUT)
            .json(&self.payload(messages, false))
            .send()
            .await
            .map_err(|e| map_reqwest_err("anthropic", &e))?;

        if !response.status().is_success() {
            return Err(map_error_response("anthropic", response).await);
        }
        let data: Value = response.json().await.map_err(|e| map_reqwest_err("anthropic", &e))?;
        Ok(data
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| blocks.iter().find(|b| b.get("type").and_then(Value::as_str) == Some("text")))
            .and_then(|b| b.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn context_window_size(&self) -> BlinderResult<usize> {
        Ok(CONTEXT_WINDOWS.get(self.model.as_str()).copied().unwrap_or(200_000))
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        self.http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(PROBE_TIMEOUT)
            .json(&json!({
                "model": self.model,
                "max_tokens": 1,
                "messages": [{"role": "user", "content": "hi"}],
            }))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

/// Look up a model's context window from the fixed table (§4.13),
/// without constructing a client or making a network call. Used by the
/// `/api/models` inventory route to report a size for models it already
/// knows about; local (Ollama) models are probed live instead via
/// [`LlmClient::context_window_size`].
pub fn known_context_window(model: &str) -> Option<usize> {
    CONTEXT_WINDOWS.get(model).copied()
}

/// Construct the configured provider's client, failing fast (before any
/// network call) when required credentials are absent (§4.13).
pub fn create_client(config: &LlmConfig, provider: Option<&str>, model: Option<&str>) -> BlinderResult<Box<dyn LlmClient>> {
    let provider = provider.unwrap_or(&config.default_provider);
    match provider {
        "ollama" => Ok(Box::new(OllamaClient::new(
            config.ollama_base_url.clone(),
            model.unwrap_or(&config.ollama_model),
        ))),
        "openai" => {
            if config.openai_api_key.is_empty() {
                return Err(LlmError::ProviderMisconfigured { setting: "OPENAI_API_KEY".to_string() }.into());
            }
            Ok(Box::new(OpenAiClient::new(
                config.openai_api_key.clone(),
                model.unwrap_or(&config.openai_model),
            )))
        }
        "anthropic" => {
            if config.anthropic_api_key.is_empty() {
                return Err(LlmError::ProviderMisconfigured { setting: "ANTHROPIC_API_KEY".to_string() }.into());
            }
            Ok(Box::new(AnthropicClient::new(
                config.anthropic_api_key.clone(),
                model.unwrap_or(&config.anthropic_model),
            )))
        }
        other => Err(LlmError::ProviderMisconfigured { setting: format!("DEFAULT_PROVIDER={other}") }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_window_table_has_known_models() {
        assert_eq!(CONTEXT_WINDOWS.get("gpt-4o"), Some(&128_000));
        assert_eq!(CONTEXT_WINDOWS.get("claude-sonnet-4-5-20250929"), Some(&200_000));
    }

    #[test]
    fn create_client_fails_fast_without_openai_key() {
        let config = LlmConfig { default_provider: "openai".to_string(), ..LlmConfig::default() };
        let err = create_client(&config, None, None).unwrap_err();
        assert!(matches!(err, BlinderError::Llm(LlmError::ProviderMisconfigured { .. })));
    }

    #[test]
    fn create_client_fails_fast_without_anthropic_key() {
        let config = LlmConfig { default_provider: "anthropic".to_string(), ..LlmConfig::default() };
        assert!(create_client(&config, None, None).is_err());
    }

    #[test]
    fn create_client_succeeds_for_ollama_without_credentials() {
        let config = LlmConfig::default();
        let client = create_client(&config, None, None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn create_client_respects_explicit_model_override() {
        let config = LlmConfig::default();
        let client = create_client(&config, Some("ollama"), Some("mistral")).unwrap();
        assert_eq!(client.model_name(), "mistral");
    }

    #[test]
    fn parse_sse_data_strips_prefix() {
        assert_eq!(parse_sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(parse_sse_data("event: ping"), None);
    }

    #[tokio::test]
    async fn context_window_size_reports_model_default() {
        let client = OpenAiClient::new("key", "gpt-4o");
        assert_eq!(client.context_window_size().await.unwrap(), 128_000);
    }

    #[tokio::test]
    async fn is_available_reports_false_without_credentials() {
        let client = AnthropicClient::new("", "claude-sonnet-4-5-20250929");
        assert!(!client.is_available().await);
    }
}
