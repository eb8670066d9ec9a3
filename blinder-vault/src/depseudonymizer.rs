//! Depseudonymisation (C7, §4.7): restore real values into an LLM's
//! blinded response before it reaches the human caller.

use crate::Vault;
use blinder_core::PSEUDONYM_PATTERN;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static PSEUDONYM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(PSEUDONYM_PATTERN).unwrap());

/// Friendly fallback names for pseudonyms the vault cannot resolve -
/// typically an LLM hallucinating a plausible-looking `[TYPE_N]` token
/// that was never actually minted for this session (§4.7 step 3).
const HUMANIZE_TABLE: &[(&str, &str)] = &[
    ("PROF", "the professor"),
    ("PROFESSOR", "the professor"),
    ("ARTICLE", "the article"),
    ("PAPER", "the paper"),
    ("STUDY", "the study"),
    ("REPORT", "the report"),
    ("AUTHOR", "the author"),
    ("RESEARCHER", "the researcher"),
    ("DOCTOR", "the doctor"),
    ("COMPANY", "the company"),
    ("PARTY", "the party"),
    ("CLIENT", "the client"),
    ("WITNESS", "the witness"),
    ("JUDGE", "the judge"),
    ("DEFENDANT", "the defendant"),
    ("PLAINTIFF", "the plaintiff"),
];

/// Replace every pseudonym occurrence in `text` with the real value the
/// vault has on record, or a humanized fallback when the vault has never
/// seen that pseudonym (§4.7).
///
/// Pseudonyms are processed longest-first (e.g. `[PERSON_10]` before
/// `[PERSON_1]`) so that a shorter pseudonym which happens to be a
/// substring prefix of a longer one's digits never partially matches
/// first. Possessive forms (`[PERSON_1]'s`) are replaced before the bare
/// form so the apostrophe-s is preserved on the restored name.
pub fn restore(vault: &Vault, text: &str) -> String {
    let mut seen = HashSet::new();
    let mut pseudonyms: Vec<String> = Vec::new();
    for m in PSEUDONYM_RE.find_iter(text) {
        let full = m.as_str().to_string();
        if seen.insert(full.clone()) {
            pseudonyms.push(full);
        }
    }
    pseudonyms.sort_by_key(|p| std::cmp::Reverse(p.len()));

    let mut result = text.to_string();
    for pseudonym in pseudonyms {
        let inner = pseudonym.trim_start_matches('[').trim_end_matches(']');
        let replacement = match vault.get_real_value(&pseudonym) {
            Some(real) => real.to_string(),
            None => humanize(inner),
        };

        let possessive = format!("{pseudonym}'s");
        result = result.replace(&possessive, &format!("{replacement}'s"));
        result = result.replace(&pseudonym, &replacement);
    }
    result
}

/// Turn an unresolved pseudonym's inner label into a friendly phrase,
/// falling back to the bare label (no brackets) when the entity type
/// isn't in [`HUMANIZE_TABLE`].
fn humanize(inner: &str) -> String {
    let entity_type = inner.rsplit_once('_').map(|(t, _)| t).unwrap_or(inner);
    for (key, friendly) in HUMANIZE_TABLE {
        if *key == entity_type {
            return friendly.to_string();
        }
    }
    inner.to_string()
}
