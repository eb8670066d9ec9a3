//! Prompt-aware PII filter (C6, §4.6).
//!
//! Analysts ask questions full of numbers, dates, and locations that are
//! query parameters rather than PII ("show everyone hired after 2020",
//! "average salary over 100K"). This filter looks at the text surrounding
//! each detected span and suppresses the ones that read as analytical
//! parameters rather than real personal data, before the vault ever sees
//! them.
//!
//! Three categories, evaluated in order:
//! - **Always PII** (`PERSON`, `EMAIL`, `SSN`, ...) - kept unconditionally.
//! - **Context-dependent** (`DATE`, `DATE_TIME`, `LOCATION`, `ORG`, `NORP`)
//!   - suppressed only when the local context reads as analytical.
//! - Anything else - kept by default.

use blinder_core::entity_types::{ALWAYS_PII, CONTEXT_DEPENDENT, DATE, DATE_TIME, LOCATION, ORG};
use blinder_pii::Span;
use once_cell::sync::Lazy;
use regex::Regex;

/// Characters of context inspected on each side of a span (§4.6).
const CONTEXT_WINDOW: usize = 60;

/// Distance within which a `PERSON` span "rescues" an otherwise-suppressed
/// date/location/org span (§4.6).
const PERSON_PROXIMITY: usize = 80;

static THRESHOLD_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(over|under|above|below|more than|less than|fewer than|greater than|",
        r"at least|at most|between|exceeds?|older than|younger than|",
        r"higher than|lower than)\b",
    ))
    .unwrap()
});

static AGGREGATION_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(how many|count|average|avg|mean|total|sum|max|min|median|",
        r"top|bottom|first|last|highest|lowest|oldest|youngest|largest|smallest|",
        r"percentile|quartile|standard deviation|stdev|variance)\b",
    ))
    .unwrap()
});

static FILTER_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(group by|by|in|from|per|for each|break down|segment|",
        r"filter|where|records? from|records? in|records? after|records? before|",
        r"hired in|filed in|joined in|created in|admitted in|cases? from|",
        r"show all|list all|list everyone)\b",
    ))
    .unwrap()
});

static RANGE_CONTEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(between|range|from .+ to)\b").unwrap());

static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[$€£₹]|(\d[KkMmBb]\b)|\b(dollars?|euros?|pounds?|thousand|million|billion)\b")
        .unwrap()
});

static PERCENTAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\d\s*%|\bpercent\b|\brate\b").unwrap());

static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(19|20)\d{2}$").unwrap());

fn context_window(text: &str, start: usize, end: usize) -> &str {
    let ctx_start = start.saturating_sub(CONTEXT_WINDOW);
    let ctx_end = (end + CONTEXT_WINDOW).min(text.len());
    &text[ctx_start..ctx_end]
}

/// A standalone number, with the formatting an analyst would type around
/// one (`$`, `€`, `£`, `₹`, commas, `%`, `+`, `-`, `K`/`M` suffixes) peeled
/// off first.
fn is_standalone_number(text: &str) -> bool {
    let stripped: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | '$' | '€' | '£' | '₹' | '%' | '+' | '-' | 'K' | 'k' | 'M' | 'm'))
        .collect();
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}

fn is_year_only(text: &str) -> bool {
    YEAR_RE.is_match(text.trim())
}

fn has_person_nearby(start: usize, end: usize, all_spans: &[Span]) -> bool {
    all_spans.iter().any(|other| {
        other.label == "PERSON"
            && (other.start.abs_diff(end) < PERSON_PROXIMITY
                || start.abs_diff(other.end) < PERSON_PROXIMITY)
    })
}

/// Filter false-positive PII detections out of a user prompt (§4.6).
///
/// Each span's `_has_person_nearby` check is evaluated against the full
/// original `spans` set rather than the set being built up, so
/// suppression decisions never depend on filtering order.
pub fn filter(text: &str, spans: &[Span]) -> Vec<Span> {
    if spans.is_empty() {
        return Vec::new();
    }
    spans
        .iter()
        .filter(|span| keep(text, span, spans))
        .cloned()
        .collect()
}

fn keep(text: &str, span: &Span, all_spans: &[Span]) -> bool {
    if ALWAYS_PII.contains(&span.label.as_str()) {
        return true;
    }
    if !CONTEXT_DEPENDENT.contains(&span.label.as_str()) {
        return true;
    }

    let ctx = context_window(text, span.start, span.end);

    if span.label == DATE || span.label == DATE_TIME {
        if is_standalone_number(&span.text)
            && (THRESHOLD_CONTEXT.is_match(ctx)
                || AGGREGATION_CONTEXT.is_match(ctx)
                || CURRENCY_RE.is_match(ctx)
                || PERCENTAGE_RE.is_match(ctx)
                || RANGE_CONTEXT.is_match(ctx))
        {
            return false;
        }

        if is_year_only(&span.text)
            && FILTER_CONTEXT.is_match(ctx)
            && !has_person_nearby(span.start, span.end, all_spans)
        {
            return false;
        }

        if (FILTER_CONTEXT.is_match(ctx) || RANGE_CONTEXT.is_match(ctx))
            && !has_person_nearby(span.start, span.end, all_spans)
        {
            return false;
        }
    }

    if span.label == LOCATION
        && (FILTER_CONTEXT.is_match(ctx) || AGGREGATION_CONTEXT.is_match(ctx))
        && !DIGIT_RE.is_match(&span.text)
    {
        return false;
    }

    if span.label == ORG
        && (AGGREGATION_CONTEXT.is_match(ctx) || FILTER_CONTEXT.is_match(ctx))
        && !has_person_nearby(span.start, span.end, all_spans)
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinder_pii::Gate;

    fn span(label: &str, text: &str, start: usize) -> Span {
        Span {
            text: text.to_string(),
            label: label.to_string(),
            start,
            end: start + text.len(),
            confidence: 0.8,
            gate: Gate::NerB,
        }
    }

    #[test]
    fn person_is_never_suppressed() {
        let text = "over 60 years old, John Smith";
        let spans = vec![span("PERSON", "John Smith", 20)];
        assert_eq!(filter(text, &spans).len(), 1);
    }

    #[test]
    fn standalone_number_suppressed_in_threshold_context() {
        let text = "show everyone with salary over 60";
        let spans = vec![span("DATE", "60", 32)];
        assert!(filter(text, &spans).is_empty());
    }

    #[test]
    fn standalone_number_kept_without_analytical_context() {
        let text = "he turned 60 yesterday";
        let spans = vec![span("DATE", "60", 11)];
        assert_eq!(filter(text, &spans).len(), 1);
    }

    #[test]
    fn year_suppressed_in_filter_context_without_person() {
        let text = "list everyone hired in 2020";
        let spans = vec![span("DATE", "2020", 24)];
        assert!(filter(text, &spans).is_empty());
    }

    #[test]
    fn year_kept_when_person_nearby() {
        let text = "John Smith was hired in 2020";
        let spans = vec![span("PERSON", "John Smith", 0), span("DATE", "2020", 25)];
        let out = filter(text, &spans);
        assert!(out.iter().any(|s| s.label == "DATE"));
    }

    #[test]
    fn location_suppressed_as_grouping_dimension() {
        let text = "count of patients by California";
        let spans = vec![span("LOCATION", "California", 22)];
        assert!(filter(text, &spans).is_empty());
    }

    #[test]
    fn location_with_digits_is_kept_as_address() {
        let text = "records from 123 Main Street California";
        let spans = vec![span("LOCATION", "123 Main Street", 13)];
        assert_eq!(filter(text, &spans).len(), 1);
    }

    #[test]
    fn org_suppressed_in_aggregation_context_without_person() {
        let text = "average salary at Acme Corp";
        let spans = vec![span("ORG", "Acme Corp", 19)];
        assert!(filter(text, &spans).is_empty());
    }

    #[test]
    fn org_kept_when_person_nearby() {
        let text = "Jane Doe works at Acme Corp";
        let spans = vec![span("PERSON", "Jane Doe", 0), span("ORG", "Acme Corp", 18)];
        let out = filter(text, &spans);
        assert!(out.iter().any(|s| s.label == "ORG"));
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(filter("anything", &[]).is_empty());
    }

    proptest::proptest! {
        #[test]
        fn filtering_never_grows_the_set(n in 0usize..5) {
            let text = "some analytical text over 60 percent";
            let spans: Vec<Span> = (0..n).map(|i| span("PERSON", "John Smith", i * 10)).collect();
            let out = filter(text, &spans);
            proptest::prop_assert!(out.len() <= spans.len());
        }
    }
}
