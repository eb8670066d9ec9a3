//! Shared test infrastructure for the Blinder workspace:
//! - deterministic mock providers (`EmbeddingProvider`, `NerProvider`)
//!   so crates downstream of the out-of-scope model boundaries (§1) can
//!   be exercised without a real model,
//! - proptest generators for arbitrary PII corpora and pseudonym-grammar
//!   strings, shared by every crate's `[dev-dependencies]`.

use async_trait::async_trait;
use blinder_core::BlinderResult;
use blinder_llm::{ChatMessage, ChatStream, LlmClient};
use blinder_pii::{NerProvider, Span};
use blinder_retrieval::EmbeddingProvider;
use proptest::prelude::*;

/// Deterministic byte-sum embedding: no ML model, but stable across runs
/// and sensitive enough to input to exercise cosine-similarity ranking
/// meaningfully.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    model_id: String,
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self { model_id: model_id.into(), dimensions }
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut data = vec![0.0f32; self.dimensions];
        for (i, byte) in text.bytes().enumerate() {
            let idx = i % self.dimensions;
            data[idx] += byte as f32 / 255.0;
        }
        blinder_retrieval::l2_normalize(&mut data);
        data
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new("mock-embedder-v1", 384)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> BlinderResult<Vec<f32>> {
        Ok(self.generate(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> BlinderResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.generate(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// A scripted Gate B provider: returns a fixed set of spans regardless
/// of input, for deterministic pipeline/orchestrator tests that need a
/// stand-in NER model (§4.3 Gate B is out of scope per §1).
#[derive(Debug, Clone, Default)]
pub struct ScriptedNerProvider {
    pub spans: Vec<Span>,
}

impl ScriptedNerProvider {
    pub fn new(spans: Vec<Span>) -> Self {
        Self { spans }
    }
}

#[async_trait]
impl NerProvider for ScriptedNerProvider {
    async fn detect(&self, _text: &str) -> Vec<Span> {
        self.spans.clone()
    }
}

/// A non-streaming, scripted LLM client: `chat_complete`/`chat_stream`
/// both return a fixed response regardless of the messages sent. Used by
/// orchestrator and API tests that need a deterministic stand-in for the
/// out-of-scope LLM providers (§1).
pub struct ScriptedLlmClient {
    pub response: String,
    pub context_window: usize,
    pub provider: &'static str,
    pub model: String,
}

impl ScriptedLlmClient {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            context_window: 128_000,
            provider: "scripted",
            model: "scripted-model".to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat_stream(&self, _messages: &[ChatMessage]) -> BlinderResult<ChatStream> {
        let response = self.response.clone();
        Ok(Box::pin(futures_util::stream::once(async move { Ok(response) })))
    }

    async fn chat_complete(&self, _messages: &[ChatMessage]) -> BlinderResult<String> {
        Ok(self.response.clone())
    }

    async fn context_window_size(&self) -> BlinderResult<usize> {
        Ok(self.context_window)
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        self.provider
    }
}

/// A proptest strategy producing strings that read as realistic PII
/// surface forms (emails, SSNs, person-like names) for invariant tests
/// such as "no real value survives blinding" (§8).
pub fn arbitrary_pii_value() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{3,8}\\.[a-z]{3,8}@[a-z]{3,8}\\.com".prop_map(|s| s),
        "[0-9]{3}-[0-9]{2}-[0-9]{4}".prop_map(|s| s),
        "[A-Z][a-z]{2,8} [A-Z][a-z]{2,8}".prop_map(|s| s),
        "[0-9]{3}-[0-9]{3}-[0-9]{4}".prop_map(|s| s),
    ]
}

/// A proptest strategy producing strings matching the pseudonym grammar
/// `\[[A-Z][A-Z0-9_]*_\d+\]` (§4.4), for depseudonymiser round-trip and
/// substring-safety tests.
pub fn arbitrary_pseudonym() -> impl Strategy<Value = String> {
    ("[A-Z][A-Z_]{1,10}", 1u32..1000).prop_map(|(ty, n)| format!("[{ty}_{n}]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embedding_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::default();
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[tokio::test]
    async fn mock_embedding_provider_differs_by_input() {
        let provider = MockEmbeddingProvider::default();
        let a = provider.embed("alpha").await.unwrap();
        let b = provider.embed("beta").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn scripted_llm_client_returns_fixed_response() {
        let client = ScriptedLlmClient::new("hello from the mock");
        assert_eq!(client.chat_complete(&[]).await.unwrap(), "hello from the mock");
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_pseudonym_matches_grammar(p in arbitrary_pseudonym()) {
            let re = regex::Regex::new(blinder_core::PSEUDONYM_PATTERN).unwrap();
            proptest::prop_assert!(re.is_match(&p));
        }
    }
}
