//! Shared application state for the Axum router, built with the
//! `FromRef`-derived substate pattern so each handler extracts only the
//! pieces it needs.

use std::sync::{Arc, RwLock};

use blinder_core::{ChunkConfig, ContextConfig, LlmConfig, PiiConfig, RetrievalConfig};
use blinder_orchestrator::RequestOrchestrator;
use blinder_pii::NerProvider;
use blinder_retrieval::EmbeddingProvider;
use blinder_storage::StorageTrait;

use crate::config::ApiConfig;
use crate::extractor::DocumentExtractor;
use crate::types::ModelSettings;

/// Seam for a future authentication scheme. Unauthenticated by default
/// since the HTTP surface has no auth scheme in its brief; a real
/// deployment fronts this crate with its own gateway or swaps this trait
/// object for one that checks credentials.
pub trait AuthLayer: Send + Sync {
    fn is_authorized(&self, _bearer_token: Option<&str>) -> bool {
        true
    }
}

/// The default no-op layer: every request is authorized.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuth;
impl AuthLayer for NoopAuth {}

/// Application-wide state shared across every route.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageTrait>,
    pub orchestrator: Arc<RequestOrchestrator>,
    pub ner: Option<Arc<dyn NerProvider>>,
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    /// Injected extractor for formats `blinder-api` cannot parse itself
    /// (PDF/DOCX/XLSX, out of scope per §1). `None` restricts uploads to
    /// the plain-text formats [`crate::extractor::PlainTextExtractor`]
    /// handles directly.
    pub document_extractor: Option<Arc<dyn DocumentExtractor>>,
    pub master_key: Arc<String>,
    pub llm_config: Arc<LlmConfig>,
    pub pii_config: Arc<PiiConfig>,
    pub chunk_config: Arc<ChunkConfig>,
    pub retrieval_config: Arc<RetrievalConfig>,
    pub context_config: Arc<ContextConfig>,
    pub api_config: Arc<ApiConfig>,
    pub auth: Arc<dyn AuthLayer>,
    /// Process-wide default provider/model, mutable via `POST
    /// /api/models/settings` (§6). Per-request overrides on
    /// [`blinder_orchestrator::ChatRequest`] still take priority over
    /// this.
    pub model_settings: Arc<RwLock<ModelSettings>>,
}

impl AppState {
    /// Builds the mutable model-settings cell from the boot-time LLM
    /// config's configured default provider.
    pub fn initial_model_settings(llm_config: &LlmConfig) -> ModelSettings {
        ModelSettings {
            default_provider: llm_config.default_provider.clone(),
            default_model: None,
        }
    }
}

crate::impl_from_ref!(Arc<dyn StorageTrait>, storage);
crate::impl_from_ref!(Arc<RequestOrchestrator>, orchestrator);
crate::impl_from_ref!(Arc<ApiConfig>, api_config);
crate::impl_from_ref!(Arc<RwLock<ModelSettings>>, model_settings);
