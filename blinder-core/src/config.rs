//! Per-component, env-var-driven configuration structs, each with a
//! `from_env`/`Default` pair built on the same small idiom:
//! `std::env::var(name).ok().and_then(|s| s.parse().ok()).unwrap_or(default)`.

use serde::{Deserialize, Serialize};

/// Crypto (C1) tuning — the PBKDF2 iteration count is fixed, not
/// configurable, but kept here so the whole ambient config surface lives
/// in one place per crate convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CryptoConfig {
    pub pbkdf2_iterations: u32,
    pub derived_key_len: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: 600_000,
            derived_key_len: 32,
        }
    }
}

/// PII detection (C3) tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PiiConfig {
    pub confidence_threshold: f32,
    pub gate_a_window_chars: usize,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            gate_a_window_chars: 5_000,
        }
    }
}

impl PiiConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            confidence_threshold: std::env::var("PII_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.confidence_threshold),
            ..default
        }
    }
}

/// Chunking (C9) tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dimensions: 384,
        }
    }
}

impl ChunkConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            chunk_size: std::env::var("CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.chunk_size),
            chunk_overlap: std::env::var("CHUNK_OVERLAP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.chunk_overlap),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .ok()
                .unwrap_or(default.embedding_model),
            embedding_dimensions: std::env::var("EMBEDDING_DIMENSIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.embedding_dimensions),
        }
    }
}

/// Retrieval (C10) tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RetrievalConfig {
    pub rag_top_k: usize,
    pub rrf_k: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rag_top_k: 10,
            rrf_k: 60,
        }
    }
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            rag_top_k: std::env::var("RAG_TOP_K")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.rag_top_k),
            rrf_k: std::env::var("RRF_K")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.rrf_k),
        }
    }
}

/// Context builder (C12) / request orchestrator (C14) tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ContextConfig {
    /// Fraction of the model's context window below which documents are
    /// stuffed directly rather than retrieved (§4.12, §4.14 step 7).
    pub context_window_threshold: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_window_threshold: 0.8,
        }
    }
}

impl ContextConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            context_window_threshold: std::env::var("CONTEXT_WINDOW_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.context_window_threshold),
        }
    }
}

/// LLM provider selection and credentials (C13, §6 "Environment
/// configuration"). Credentials are intentionally not `Default`-derived
/// with placeholder values - an empty string means "not configured" and
/// is caught by the provider factory before any network call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LlmConfig {
    pub default_provider: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub anthropic_api_key: String,
    pub anthropic_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "ollama".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3".to_string(),
            openai_api_key: String::new(),
            openai_model: "gpt-4o".to_string(),
            anthropic_api_key: String::new(),
            anthropic_model: "claude-sonnet-4-5-20250929".to_string(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            default_provider: std::env::var("DEFAULT_PROVIDER").unwrap_or(default.default_provider),
            ollama_base_url: std::env::var("OLLAMA_BASE_URL").unwrap_or(default.ollama_base_url),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or(default.ollama_model),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(default.openai_api_key),
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or(default.openai_model),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or(default.anthropic_api_key),
            anthropic_model: std::env::var("ANTHROPIC_MODEL").unwrap_or(default.anthropic_model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6() {
        assert_eq!(CryptoConfig::default().pbkdf2_iterations, 600_000);
        assert_eq!(PiiConfig::default().confidence_threshold, 0.7);
        assert_eq!(ChunkConfig::default().chunk_size, 512);
        assert_eq!(ChunkConfig::default().chunk_overlap, 50);
        assert_eq!(RetrievalConfig::default().rag_top_k, 10);
        assert_eq!(RetrievalConfig::default().rrf_k, 60);
        assert_eq!(ContextConfig::default().context_window_threshold, 0.8);
        assert_eq!(LlmConfig::default().default_provider, "ollama");
    }
}
