//! Cross-document entity resolution (C5, §4.5).
//!
//! When the same real-world entity appears under slightly different
//! surface forms across documents ("Dr. Jane Smith" vs "Jane Smith" vs
//! "J. Smith"), this module resolves later mentions onto the pseudonym
//! already allocated for the first, so a reader sees one consistent
//! `[PERSON_N]` rather than several.

use crate::Vault;
use blinder_pii::Span;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static TITLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(mr|mrs|ms|miss|dr|prof|judge|justice|hon|sr|jr)\.?\s+").unwrap()
});

const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Resolve `spans` detected in a new prompt/document against entities
/// already known to `vault`, mutating the vault's forward map so that a
/// matched span pseudonymizes onto the existing pseudonym rather than
/// minting a new one (§4.5 step 3-4).
///
/// Strategies are tried in order, per span, and the first hit wins:
/// 1. Exact match against the vault's forward map (includes aliases).
/// 2. Same `entity_type`, normalized text equal (title-stripped, folded).
/// 3. Same `entity_type`, normalized text token-overlap >= 2.
///
/// A span that matches is registered as an alias of the matching
/// pseudonym so future mentions of the same surface form resolve
/// directly via strategy 1. A span with no match is returned unchanged;
/// the caller (the pipeline, via `Vault::pseudonymize_text`) is
/// responsible for minting a fresh pseudonym for it.
pub fn resolve_prompt_entities(vault: &mut Vault, spans: Vec<Span>) -> Vec<Span> {
    let mut resolved = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some(pseudonym) = find_match(vault, &span.text, &span.label) {
            let is_exact = vault.get_pseudonym(&span.text) == Some(pseudonym.as_str());
            if !is_exact {
                // add_alias cannot fail here: find_match only ever returns
                // a pseudonym it has just observed to exist in the vault.
                let _ = vault.add_alias(&pseudonym, &span.text);
            }
        }
        resolved.push(span);
    }
    resolved
}

/// Try each matching strategy in turn; return the pseudonym of the first
/// hit, if any.
fn find_match(vault: &Vault, text: &str, entity_type: &str) -> Option<String> {
    if let Some(p) = vault.get_pseudonym(text) {
        return Some(p.to_string());
    }

    let normalized_text = normalize(text);
    let text_tokens: HashSet<&str> = normalized_text.split_whitespace().collect();

    let mut normalized_hit: Option<String> = None;
    let mut overlap_hit: Option<String> = None;

    for (candidate, pseudonym) in vault.forward_entries() {
        // Skip pseudonym-shaped keys; only real surface forms are
        // eligible as match candidates.
        if candidate.starts_with('[') && candidate.ends_with(']') {
            continue;
        }
        let Some(entry) = vault.entry(pseudonym) else {
            continue;
        };
        if entry.entity_type.as_str() != entity_type {
            continue;
        }

        let normalized_candidate = normalize(candidate);
        if normalized_candidate == normalized_text {
            normalized_hit.get_or_insert_with(|| pseudonym.to_string());
            continue;
        }

        if overlap_hit.is_none() {
            let candidate_tokens: HashSet<&str> = normalized_candidate.split_whitespace().collect();
            if text_tokens.intersection(&candidate_tokens).count() >= 2 {
                overlap_hit = Some(pseudonym.to_string());
            }
        }
    }

    normalized_hit.or(overlap_hit)
}

/// Fold to lowercase, strip a leading title, and trim surrounding
/// punctuation (§4.5 step 2).
fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = TITLE_PATTERN.replace(&lower, "");
    stripped
        .trim_matches(|c: char| PUNCTUATION.contains(c) || c == ' ')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinder_pii::Gate;

    fn span(text: &str, label: &str) -> Span {
        Span {
            text: text.to_string(),
            label: label.to_string(),
            start: 0,
            end: text.len(),
            confidence: 0.9,
            gate: Gate::PatternA,
        }
    }

    #[test]
    fn normalize_strips_title_and_punctuation() {
        assert_eq!(normalize("Dr. Jane Smith"), "jane smith");
        assert_eq!(normalize("Jane Smith,"), "jane smith");
        assert_eq!(normalize("  Prof Jane Smith  "), "jane smith");
    }

    #[test]
    fn second_mention_resolves_onto_first_pseudonym() {
        let mut v = Vault::new([0u8; 32], [1u8; 32]);
        let p = v.add_entity("Jane Smith", "PERSON");

        let spans = resolve_prompt_entities(&mut v, vec![span("Dr. Jane Smith", "PERSON")]);
        assert_eq!(spans.len(), 1);
        assert_eq!(v.get_pseudonym("Dr. Jane Smith"), Some(p.as_str()));
    }

    #[test]
    fn token_overlap_resolves_partial_name() {
        let mut v = Vault::new([0u8; 32], [1u8; 32]);
        let p = v.add_entity("Jane Elizabeth Smith", "PERSON");

        resolve_prompt_entities(&mut v, vec![span("Jane Smith", "PERSON")]);
        assert_eq!(v.get_pseudonym("Jane Smith"), Some(p.as_str()));
    }

    #[test]
    fn different_entity_type_never_matches() {
        let mut v = Vault::new([0u8; 32], [1u8; 32]);
        v.add_entity("Acme Corp", "ORG");

        resolve_prompt_entities(&mut v, vec![span("Acme Corp", "PERSON")]);
        assert_eq!(v.get_pseudonym("Acme Corp"), Some("[ORG_1]"));
        assert!(v.entry("[PERSON_1]").is_none());
    }

    #[test]
    fn no_match_leaves_vault_untouched() {
        let mut v = Vault::new([0u8; 32], [1u8; 32]);
        v.add_entity("Jane Smith", "PERSON");

        resolve_prompt_entities(&mut v, vec![span("Totally Different Person", "PERSON")]);
        assert!(v.get_pseudonym("Totally Different Person").is_none());
    }

    proptest::proptest! {
        #[test]
        fn resolving_never_creates_new_entries(a in "[a-zA-Z ]{1,20}", b in "[a-zA-Z ]{1,20}") {
            let mut v = Vault::new([0u8; 32], [1u8; 32]);
            v.add_entity(&a, "PERSON");
            let before = v.get_all_entries().len();
            resolve_prompt_entities(&mut v, vec![span(&b, "PERSON")]);
            let after = v.get_all_entries().len();
            proptest::prop_assert_eq!(before, after);
        }
    }
}
