//! Shared `AppState` builder for route-level tests: one canonical test
//! fixture rather than re-deriving it in every route module.
#![cfg(test)]

use std::sync::{Arc, RwLock};

use blinder_core::{ChunkConfig, ContextConfig, LlmConfig, PiiConfig, RetrievalConfig};
use blinder_orchestrator::RequestOrchestrator;
use blinder_storage::{MockStorage, StorageTrait};
use blinder_test_utils::ScriptedLlmClient;

use crate::config::ApiConfig;
use crate::state::{AppState, NoopAuth};

pub const TEST_MASTER_KEY: &str = "a-sufficiently-long-test-master-key-value";

/// Builds route-test state with a scripted, non-networked LLM client
/// factory - route tests exercise the HTTP boundary, not the out-of-scope
/// LLM providers (§1), so they must not depend on a reachable Ollama.
pub fn test_state() -> AppState {
    let storage: Arc<dyn StorageTrait> = Arc::new(MockStorage::new());
    let llm_config = LlmConfig::default();
    let orchestrator = Arc::new(RequestOrchestrator::with_client_factory(
        storage.clone(),
        None,
        None,
        TEST_MASTER_KEY.to_string(),
        10,
        60,
        |_provider, _model| Ok(Box::new(ScriptedLlmClient::new("This is a test response from Mars.")) as Box<_>),
    ));
    AppState {
        storage,
        orchestrator,
        ner: None,
        embedder: None,
        document_extractor: None,
        master_key: Arc::new(TEST_MASTER_KEY.to_string()),
        model_settings: Arc::new(RwLock::new(AppState::initial_model_settings(&llm_config))),
        llm_config: Arc::new(llm_config),
        pii_config: Arc::new(PiiConfig::default()),
        chunk_config: Arc::new(ChunkConfig::default()),
        retrieval_config: Arc::new(RetrievalConfig::default()),
        context_config: Arc::new(ContextConfig::default()),
        api_config: Arc::new(ApiConfig::default()),
        auth: Arc::new(NoopAuth),
    }
}
