//! PII detector (C3, §4.3): Gate A (always-on pattern/regex engine) and
//! Gate B (pluggable NER, suppressed when `skip_ner` is set). Spans from
//! both gates are merged by overlap resolution.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Which gate produced a [`Span`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    PatternA,
    NerB,
}

/// A single PII/entity detection (§4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    pub gate: Gate,
}

/// Gate B: a pluggable named-entity-recognition provider. The model
/// itself is out of scope (§1); this crate consumes it only through this
/// trait so a real NER model can be slotted in without touching the
/// detection/merge logic. `blinder-test-utils` supplies a deterministic
/// mock implementation.
#[async_trait]
pub trait NerProvider: Send + Sync {
    /// Return spans for the labels this provider recognises
    /// (`PERSON, ORG, LOCATION, DATE, LEGAL_REF, NORP` per §4.3), each
    /// with confidence fixed at 0.80 per spec.
    async fn detect(&self, text: &str) -> Vec<Span>;
}

/// Characters per Gate A chunking window (§4.3).
const GATE_A_CHUNK_SIZE: usize = 5_000;

struct PatternRule {
    label: &'static str,
    regex: Lazy<Regex>,
    confidence: f32,
}

macro_rules! pattern_rule {
    ($label:expr, $pat:expr, $confidence:expr) => {
        PatternRule {
            label: $label,
            regex: Lazy::new(|| Regex::new($pat).unwrap()),
            confidence: $confidence,
        }
    };
}

/// Gate A's fixed regex/dictionary rules (§4.3). Confidence values follow
/// the corpus convention of higher confidence for narrowly-specified
/// patterns (credit cards, SSNs) and lower for loosely-specified ones
/// (generic bank account numbers).
static PATTERN_RULES: &[PatternRule] = &[
    pattern_rule!(
        "EMAIL",
        r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b",
        0.95
    ),
    pattern_rule!(
        "PHONE",
        r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
        0.85
    ),
    pattern_rule!("SSN", r"\b\d{3}-\d{2}-\d{4}\b", 0.9),
    pattern_rule!(
        "CREDIT_CARD",
        r"\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|3[47][0-9]{13}|6(?:011|5[0-9]{2})[0-9]{12})\b",
        0.9
    ),
    pattern_rule!(
        "IP_ADDRESS",
        r"\b(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\b",
        0.85
    ),
    pattern_rule!(
        "URL",
        r"(?i)\bhttps?://[^\s<>\x22]+",
        0.9
    ),
    pattern_rule!(
        "IBAN",
        r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b",
        0.85
    ),
    pattern_rule!(
        "BANK_ACCOUNT",
        r"\b\d{8,17}\b",
        0.6
    ),
    pattern_rule!(
        "DRIVER_LICENSE",
        r"(?i)\b[A-Z]{1,2}\d{5,8}\b",
        0.6
    ),
    pattern_rule!(
        "PASSPORT",
        r"\b[A-Z]\d{8}\b",
        0.7
    ),
    pattern_rule!(
        "MEDICAL_LICENSE",
        r"\b[A-Z]{2}\d{7}\b",
        0.75
    ),
    pattern_rule!(
        "LEGAL_CASE_NUMBER",
        r"\b\d{2}-[A-Z]{2}-\d{5}\b",
        0.85
    ),
];

/// Run Gate A over a window no larger than [`GATE_A_CHUNK_SIZE`].
fn gate_a_window(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    for rule in PATTERN_RULES {
        for m in rule.regex.find_iter(text) {
            spans.push(Span {
                text: m.as_str().to_string(),
                label: rule.label.to_string(),
                start: m.start(),
                end: m.end(),
                confidence: rule.confidence,
                gate: Gate::PatternA,
            });
        }
    }
    spans
}

/// Gate A: pattern-driven engine. Chunks input at line boundaries into
/// windows of at most [`GATE_A_CHUNK_SIZE`] characters so large documents
/// stay fast, translating each window's offsets back to absolute ones
/// (§4.3).
pub fn gate_a(text: &str) -> Vec<Span> {
    if text.len() <= GATE_A_CHUNK_SIZE {
        return gate_a_window(text);
    }

    let mut spans = Vec::new();
    let mut offset = 0usize;
    let mut chunk = String::new();

    for line in text.split_inclusive('\n') {
        if chunk.len() + line.len() > GATE_A_CHUNK_SIZE && !chunk.is_empty() {
            for mut s in gate_a_window(&chunk) {
                s.start += offset;
                s.end += offset;
                spans.push(s);
            }
            offset += chunk.len();
            chunk.clear();
        }
        chunk.push_str(line);
    }
    if !chunk.is_empty() {
        for mut s in gate_a_window(&chunk) {
            s.start += offset;
            s.end += offset;
            spans.push(s);
        }
    }
    spans
}

/// Merge spans from both gates, keeping the best (longest, then highest
/// confidence) non-overlapping span for each region (§4.3). Two spans
/// overlap iff `a.start < b.end && a.end > b.start`. Returned sorted by
/// start offset.
pub fn merge_detections(mut all: Vec<Span>) -> Vec<Span> {
    all.sort_by(|a, b| {
        let len_a = a.end - a.start;
        let len_b = b.end - b.start;
        len_b
            .cmp(&len_a)
            .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap())
    });

    let mut merged: Vec<Span> = Vec::new();
    let mut occupied: Vec<(usize, usize)> = Vec::new();

    for span in all {
        let overlaps = occupied
            .iter()
            .any(|&(occ_start, occ_end)| span.start < occ_end && span.end > occ_start);
        if !overlaps {
            occupied.push((span.start, span.end));
            merged.push(span);
        }
    }

    merged.sort_by_key(|s| s.start);
    merged
}

/// Run full detection: Gate A always, Gate B unless `skip_ner` is set.
/// The two gates run concurrently when both are active (§4.3, §5).
pub async fn detect(text: &str, skip_ner: bool, ner: Option<&Arc<dyn NerProvider>>) -> Vec<Span> {
    if skip_ner || ner.is_none() {
        return merge_detections(gate_a(text));
    }

    let ner = ner.unwrap().clone();
    let text_for_a = text.to_string();
    let text_for_b = text.to_string();
    let (gate_a_results, gate_b_results) = tokio::join!(
        tokio::task::spawn_blocking(move || gate_a(&text_for_a)),
        async move { ner.detect(&text_for_b).await },
    );

    let mut all = gate_a_results.unwrap_or_default();
    all.extend(gate_b_results);
    merge_detections(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_a_detects_email_and_ssn() {
        let spans = gate_a("contact jane@example.com, ssn 123-45-6789");
        assert!(spans.iter().any(|s| s.label == "EMAIL"));
        assert!(spans.iter().any(|s| s.label == "SSN"));
    }

    #[test]
    fn gate_a_detects_legal_case_number() {
        let spans = gate_a("see docket 24-CV-00123 for details");
        assert!(spans
            .iter()
            .any(|s| s.label == "LEGAL_CASE_NUMBER" && s.confidence == 0.85));
    }

    #[test]
    fn merge_keeps_longer_overlapping_span() {
        let spans = vec![
            Span {
                text: "123-45-6789".into(),
                label: "SSN".into(),
                start: 0,
                end: 11,
                confidence: 0.9,
                gate: Gate::PatternA,
            },
            Span {
                text: "45-6789".into(),
                label: "BOGUS".into(),
                start: 4,
                end: 11,
                confidence: 0.99,
                gate: Gate::PatternA,
            },
        ];
        let merged = merge_detections(spans);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].label, "SSN");
    }

    #[test]
    fn merge_never_returns_overlapping_spans() {
        let spans = vec![
            Span { text: "abc".into(), label: "A".into(), start: 0, end: 5, confidence: 0.9, gate: Gate::PatternA },
            Span { text: "bcd".into(), label: "B".into(), start: 3, end: 8, confidence: 0.8, gate: Gate::PatternA },
            Span { text: "xyz".into(), label: "C".into(), start: 9, end: 12, confidence: 0.7, gate: Gate::PatternA },
        ];
        let merged = merge_detections(spans);
        for i in 0..merged.len() {
            for j in (i + 1)..merged.len() {
                let overlap = merged[i].start < merged[j].end && merged[i].end > merged[j].start;
                assert!(!overlap);
            }
        }
    }

    #[tokio::test]
    async fn detect_skips_ner_when_requested() {
        struct AlwaysFindsPerson;
        #[async_trait]
        impl NerProvider for AlwaysFindsPerson {
            async fn detect(&self, _text: &str) -> Vec<Span> {
                vec![Span {
                    text: "Jane Doe".into(),
                    label: "PERSON".into(),
                    start: 0,
                    end: 8,
                    confidence: 0.80,
                    gate: Gate::NerB,
                }]
            }
        }
        let ner: Arc<dyn NerProvider> = Arc::new(AlwaysFindsPerson);
        let spans = detect("Jane Doe called", true, Some(&ner)).await;
        assert!(!spans.iter().any(|s| s.label == "PERSON"));
    }

    #[tokio::test]
    async fn detect_merges_both_gates() {
        struct AlwaysFindsPerson;
        #[async_trait]
        impl NerProvider for AlwaysFindsPerson {
            async fn detect(&self, _text: &str) -> Vec<Span> {
                vec![Span {
                    text: "Jane Doe".into(),
                    label: "PERSON".into(),
                    start: 8,
                    end: 16,
                    confidence: 0.80,
                    gate: Gate::NerB,
                }]
            }
        }
        let ner: Arc<dyn NerProvider> = Arc::new(AlwaysFindsPerson);
        let spans = detect("contact: Jane Doe, jane@example.com", false, Some(&ner)).await;
        assert!(spans.iter().any(|s| s.label == "PERSON"));
        assert!(spans.iter().any(|s| s.label == "EMAIL"));
    }

    proptest::proptest! {
        #[test]
        fn merge_is_always_overlap_free(starts in proptest::collection::vec(0usize..100, 1..20)) {
            let spans: Vec<Span> = starts
                .into_iter()
                .enumerate()
                .map(|(i, start)| Span {
                    text: "x".into(),
                    label: "T".into(),
                    start,
                    end: start + 5,
                    confidence: (i as f32) / 20.0,
                    gate: Gate::PatternA,
                })
                .collect();
            let merged = merge_detections(spans);
            for i in 0..merged.len() {
                for j in (i + 1)..merged.len() {
                    let overlap = merged[i].start < merged[j].end && merged[i].end > merged[j].start;
                    proptest::prop_assert!(!overlap);
                }
            }
        }
    }
}
