//! Top-level orchestrator (C8, §4.8) tying the threat sanitiser, PII
//! detector, prompt filter, and vault together into the three operations
//! every document/prompt goes through on its way to and from an LLM.

use blinder_core::{PipelineError, Severity, ThreatDetail};
use blinder_pii::{NerProvider, Span};
use blinder_vault::Vault;
use std::sync::Arc;
use tracing::info;

/// Ties Gate B's NER provider to the rest of the request pipeline. Stored
/// once per process (or per provider configuration); the vault it
/// operates on is supplied per call since it is per-session state, not
/// pipeline state.
pub struct BlinderPipeline {
    ner: Option<Arc<dyn NerProvider>>,
}

impl BlinderPipeline {
    pub fn new(ner: Option<Arc<dyn NerProvider>>) -> Self {
        Self { ner }
    }

    /// Blind a document before storing or sending it to an LLM (§4.8 step
    /// 1). Raises [`PipelineError::HighSeverityThreat`] carrying every
    /// detected threat - not only the high-severity ones - so the caller
    /// can surface full context on the rejection.
    pub async fn process_document(
        &self,
        text: &str,
        skip_ner: bool,
        vault: &mut Vault,
    ) -> Result<(String, usize, Vec<ThreatDetail>), PipelineError> {
        let sanitize_result = blinder_sanitize::sanitize(text);
        reject_if_high_severity(&sanitize_result.threats)?;

        let cleaned = sanitize_result.cleaned_text;
        let entities = blinder_pii::detect(&cleaned, skip_ner, self.ner.as_ref()).await;
        let blinded_text = vault.pseudonymize_text(&cleaned, &entities);

        info!(
            pii_count = entities.len(),
            threat_count = sanitize_result.threats.len(),
            "document processed"
        );
        Ok((blinded_text, entities.len(), sanitize_result.threats))
    }

    /// Blind a document using pre-detected entities, skipping a fresh
    /// detection pass (§4.8 step 2; used for tabular ingestion, where
    /// column-based sampling already produced entities with correct
    /// offsets). If sanitisation altered the text, the pre-computed
    /// offsets are no longer valid against it, so this falls back to a
    /// pattern-only (Gate A) detection pass on the cleaned text.
    pub async fn process_document_with_entities(
        &self,
        text: &str,
        entities: Vec<Span>,
        vault: &mut Vault,
    ) -> Result<(String, usize, Vec<ThreatDetail>), PipelineError> {
        let sanitize_result = blinder_sanitize::sanitize(text);
        reject_if_high_severity(&sanitize_result.threats)?;

        let cleaned = sanitize_result.cleaned_text;
        let entities = if cleaned != text {
            blinder_pii::detect(&cleaned, true, None).await
        } else {
            entities
        };
        let blinded_text = vault.pseudonymize_text(&cleaned, &entities);

        info!(
            pii_count = entities.len(),
            threat_count = sanitize_result.threats.len(),
            "document processed from pre-detected entities"
        );
        Ok((blinded_text, entities.len(), sanitize_result.threats))
    }

    /// Blind a user prompt, suppressing analytical-parameter false
    /// positives and resolving surviving entities against the existing
    /// vault so repeat mentions across a conversation share one
    /// pseudonym (§4.8 step 3).
    pub async fn process_prompt(
        &self,
        prompt: &str,
        vault: &mut Vault,
    ) -> Result<(String, Vec<ThreatDetail>), PipelineError> {
        let sanitize_result = blinder_sanitize::sanitize(prompt);
        reject_if_high_severity(&sanitize_result.threats)?;

        let cleaned = sanitize_result.cleaned_text;
        let entities = blinder_pii::detect(&cleaned, false, self.ner.as_ref()).await;
        let entities = blinder_filter::filter(&cleaned, &entities);
        let resolved = blinder_vault::resolve_prompt_entities(vault, entities);
        let blinded_prompt = vault.pseudonymize_text(&cleaned, &resolved);

        info!(
            pii_count = resolved.len(),
            threat_count = sanitize_result.threats.len(),
            "prompt processed"
        );
        Ok((blinded_prompt, sanitize_result.threats))
    }

    /// Replace pseudonyms in an LLM response with their real values
    /// (§4.8 step 4).
    pub fn restore_response(&self, vault: &Vault, response: &str) -> String {
        blinder_vault::restore(vault, response)
    }
}

fn reject_if_high_severity(threats: &[ThreatDetail]) -> Result<(), PipelineError> {
    if threats.iter().any(|t| t.severity == Severity::High) {
        return Err(PipelineError::HighSeverityThreat {
            threats: threats.to_vec(),
        });
    }
    Ok(())
}
