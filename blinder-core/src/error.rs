//! Error taxonomy (§7 ERROR HANDLING DESIGN).
//!
//! Each domain gets its own `thiserror` enum; [`BlinderError`] unifies
//! them with `#[from]` conversions so any crate can propagate with `?`
//! while the HTTP boundary (`blinder-api`) still gets a single type to
//! match on for status-code mapping.

use crate::entities::ThreatDetail;

/// Crypto primitive failures (C1, §4.1).
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-GCM tag verification failed: wrong key, wrong nonce, or the
    /// ciphertext was tampered with. Never distinguished further - doing
    /// so would leak an oracle.
    #[error("authentication failed: ciphertext could not be verified")]
    AuthenticationFailed,
    #[error("master key must decode to at least 32 bytes of entropy")]
    WeakMasterKey,
}

/// PII detector failures (C3, §4.3). Partial failures (one gate down) are
/// recovered locally by the pipeline, never surfaced as this error.
#[derive(Debug, thiserror::Error)]
pub enum PiiError {
    #[error("NER provider failed: {0}")]
    NerProviderFailed(String),
}

/// Vault failures (C4, §4.4).
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("alias registration failed: pseudonym {0:?} is not known to this vault")]
    UnknownPseudonym(String),
}

/// Prompt filter failures (C6, §4.6). The filter is a pure function and
/// does not fail in practice; kept for symmetry with the rest of the
/// taxonomy and to leave a seam if a future signal needs fallible setup.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid context window configuration: {0}")]
    InvalidConfig(String),
}

/// Pipeline orchestrator failures (C8, §4.8).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A high-severity threat was detected; the caller must not proceed
    /// to the LLM. Carries every threat detected, not just the
    /// high-severity ones, so the caller can surface full context.
    #[error("high-severity threat detected ({} threat(s))", .threats.len())]
    HighSeverityThreat { threats: Vec<ThreatDetail> },
}

/// Chunking/embedding/retrieval failures (C9, C10, C11).
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("embedding provider failed: {0}")]
    EmbeddingFailed(String),
    #[error("full-text or vector index unavailable")]
    IndexUnavailable,
}

/// LLM client abstraction failures (C13, §4.13).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// A required configuration key is missing - surfaced before any
    /// network call is made.
    #[error("provider misconfigured: missing or invalid setting {setting}")]
    ProviderMisconfigured { setting: String },
    #[error("provider returned an error (status {status}): {message}")]
    ProviderError { status: u16, message: String },
    #[error("provider unreachable: {0}")]
    ProviderUnreachable(String),
    #[error("provider request timed out")]
    Timeout,
}

impl LlmError {
    /// The fixed, safe user-facing message mandated by §4.14's final
    /// paragraph. Raw provider/exception text is never surfaced past this
    /// mapping.
    pub fn safe_message(&self) -> &'static str {
        match self {
            LlmError::ProviderMisconfigured { .. } => "provider is not configured",
            LlmError::ProviderError { status: 401, .. } => "authentication failed",
            LlmError::ProviderError { status: 429, .. } => "rate limit exceeded",
            LlmError::ProviderError { status: 404, .. } => "model not found",
            LlmError::ProviderError { .. } => "the language model provider returned an error",
            LlmError::ProviderUnreachable(_) => "cannot connect to the language model provider",
            LlmError::Timeout => "the language model provider timed out",
        }
    }
}

/// Request orchestrator failures (C14) not already covered by a
/// lower-level domain error.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("session {0} not found")]
    SessionNotFound(String),
}

/// Storage-layer failures (§6 persisted state).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: String, id: String },
    #[error("insert of {entity_type} failed: {reason}")]
    InsertFailed { entity_type: String, reason: String },
    #[error("storage connection failed: {0}")]
    ConnectionFailed(String),
}

/// Request validation failures (HTTP boundary, 4xx).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Boot-time configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingRequired(String),
    #[error("BLINDER_MASTER_KEY must decode to at least 32 hex characters")]
    WeakMasterKey,
}

/// Unified error type for the whole workspace: every per-domain error enum
/// below is folded in via `#[from]` so call sites can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum BlinderError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Pii(#[from] PiiError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("payload too large")]
    PayloadTooLarge,
    /// Anything else: logged with full detail internally, never shown to
    /// the caller verbatim (§7: "Raw exception text is never leaked").
    #[error("internal error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type BlinderResult<T> = Result<T, BlinderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_error_safe_messages_never_leak_raw_text() {
        let err = LlmError::ProviderError {
            status: 401,
            message: "sk-super-secret-leaked-detail".into(),
        };
        assert_eq!(err.safe_message(), "authentication failed");
        assert!(!err.safe_message().contains("secret"));
    }

    #[test]
    fn pipeline_error_carries_full_threat_list() {
        let threats = vec![ThreatDetail {
            threat_type: "prompt_injection".into(),
            description: "x".into(),
            severity: crate::Severity::High,
            matched_pattern: "ignore previous instructions".into(),
        }];
        let err = PipelineError::HighSeverityThreat {
            threats: threats.clone(),
        };
        match err {
            PipelineError::HighSeverityThreat { threats: t } => assert_eq!(t.len(), 1),
        }
    }
}
