//! Citation extraction (§4.14 step 11): after the LLM's response is
//! restored, link it back to the sources that informed it. Tries inline
//! `[N]` markers first; falls back to a BM25-lite post-hoc scoring pass
//! over re-chunked document text.

use blinder_core::Citation;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const DEFAULT_MAX_CITATIONS: usize = 3;
const MIN_SCORE: f32 = 0.05;
const SNIPPET_WORDS: usize = 40;
const CHUNK_SIZE: usize = 512;
const CHUNK_OVERLAP: usize = 50;

static INLINE_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "was", "are", "not", "but", "has", "had", "have",
    "been", "from", "they", "will", "would", "could", "should", "may", "can", "its", "his", "her",
    "their", "our", "all", "any", "each", "one", "two", "also", "than", "then", "when", "where",
    "which", "who", "whom", "how", "what", "into", "out",
];

fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// One numbered source available for inline citation: its document
/// identity plus the blinded text it was built from.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub index: usize,
    pub document_id: Uuid,
    pub filename: String,
    pub text_blinded: String,
}

struct PreparedChunk<'a> {
    document_id: Uuid,
    filename: &'a str,
    chunk_index: i32,
    text: String,
}

fn prepare_chunks(documents: &[SourceDocument]) -> Vec<PreparedChunk<'_>> {
    let mut out = Vec::new();
    for doc in documents {
        let words: Vec<&str> = doc.text_blinded.split_whitespace().collect();
        if words.len() <= CHUNK_SIZE {
            out.push(PreparedChunk {
                document_id: doc.document_id,
                filename: &doc.filename,
                chunk_index: 0,
                text: doc.text_blinded.clone(),
            });
            continue;
        }
        let mut start = 0usize;
        let mut chunk_index = 0i32;
        while start < words.len() {
            let end = (start + CHUNK_SIZE).min(words.len());
            out.push(PreparedChunk {
                document_id: doc.document_id,
                filename: &doc.filename,
                chunk_index,
                text: words[start..end].join(" "),
            });
            chunk_index += 1;
            if end == words.len() {
                break;
            }
            start = end - CHUNK_OVERLAP;
        }
    }
    out
}

/// Pick the `SNIPPET_WORDS`-word window of `text` that maximises overlap
/// with `response_tokens` (§4.14 step 11).
fn extract_snippet(text: &str, response_tokens: &HashSet<String>) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= SNIPPET_WORDS {
        return text.to_string();
    }

    let mut best_score = -1i64;
    let mut best_start = 0usize;
    for i in 0..=(words.len() - SNIPPET_WORDS) {
        let window = &words[i..i + SNIPPET_WORDS];
        let window_tokens: HashSet<String> = window
            .iter()
            .map(|w| w.trim_matches(|c: char| ".,;:!?\"'()[]".contains(c)).to_lowercase())
            .collect();
        let overlap = window_tokens.intersection(response_tokens).count() as i64;
        if overlap > best_score {
            best_score = overlap;
            best_start = i;
        }
    }

    let mut snippet = words[best_start..best_start + SNIPPET_WORDS].join(" ");
    if best_start > 0 {
        snippet = format!("...{snippet}");
    }
    if best_start + SNIPPET_WORDS < words.len() {
        snippet.push_str("...");
    }
    snippet
}

/// Find `[N]` markers in `response_text`, cross-reference `sources`, and
/// for each marker score a 40-word snippet by token-set overlap (§4.14
/// step 11, inline path). Returns an empty vec if no markers match a
/// known source - the caller falls back to [`extract_post_hoc`].
pub fn extract_inline(response_text: &str, sources: &[SourceDocument]) -> Vec<Citation> {
    let markers: HashSet<u32> = INLINE_MARKER_RE
        .captures_iter(response_text)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    if markers.is_empty() {
        return Vec::new();
    }

    let by_index: HashMap<usize, &SourceDocument> = sources.iter().map(|s| (s.index, s)).collect();
    let response_tokens = tokenize(response_text);
    let response_token_set: HashSet<String> = response_tokens.iter().cloned().collect();

    let mut sorted_markers: Vec<u32> = markers.into_iter().collect();
    sorted_markers.sort_unstable();

    let mut citations = Vec::new();
    for marker in sorted_markers {
        let Some(source) = by_index.get(&(marker as usize)) else { continue };
        let snippet = extract_snippet(&source.text_blinded, &response_token_set);
        let source_tokens: HashSet<String> = tokenize(&source.text_blinded).into_iter().collect();
        let overlap = response_token_set.intersection(&source_tokens).count() as f32;
        let total = if response_token_set.is_empty() { 1.0 } else { response_token_set.len() as f32 };
        let score = (overlap / total).min(1.0);

        citations.push(Citation {
            document_id: source.document_id,
            filename: source.filename.clone(),
            chunk_index: 0,
            score,
            snippet_blinded: snippet,
            snippet_clear: String::new(),
            marker: Some(marker),
        });
    }
    citations
}

/// BM25-lite post-hoc scoring: re-chunk every source, score each chunk
/// against the response's tokens by summed IDF of overlapping terms,
/// normalise by the maximum score, drop anything below `min_score`,
/// dedupe by document keeping the best chunk, cap at `max_citations`
/// (§4.14 step 11, fallback path).
pub fn extract_post_hoc(response_text: &str, sources: &[SourceDocument], max_citations: usize) -> Vec<Citation> {
    let chunks = prepare_chunks(sources);
    if chunks.is_empty() {
        return Vec::new();
    }

    let response_tokens = tokenize(response_text);
    if response_tokens.is_empty() {
        return Vec::new();
    }

    let doc_count = chunks.len() as f32;
    let mut doc_freq: HashMap<String, usize> = HashMap::new();
    let chunk_token_sets: Vec<HashSet<String>> = chunks
        .iter()
        .map(|c| {
            let tokens: HashSet<String> = tokenize(&c.text).into_iter().collect();
            for t in &tokens {
                *doc_freq.entry(t.clone()).or_insert(0) += 1;
            }
            tokens
        })
        .collect();

    let mut scored: Vec<(f32, usize)> = chunks
        .iter()
        .enumerate()
        .map(|(idx, _)| {
            let tokens = &chunk_token_sets[idx];
            let score: f32 = response_tokens
                .iter()
                .filter(|t| tokens.contains(t.as_str()))
                .map(|t| {
                    let df = *doc_freq.get(t).unwrap_or(&0) as f32;
                    ((doc_count - df + 0.5) / (df + 0.5) + 1.0).ln()
                })
                .sum();
            (score, idx)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());

    let max_score = if scored[0].0 > 0.0 { scored[0].0 } else { 1.0 };
    let response_token_set: HashSet<String> = response_tokens.into_iter().collect();

    let mut seen_docs: HashSet<Uuid> = HashSet::new();
    let mut citations = Vec::new();
    for (score, idx) in scored {
        if citations.len() >= max_citations {
            break;
        }
        let normalized = score / max_score;
        if normalized < MIN_SCORE {
            break;
        }
        let chunk = &chunks[idx];
        if !seen_docs.insert(chunk.document_id) {
            continue;
        }
        let snippet = extract_snippet(&chunk.text, &response_token_set);
        citations.push(Citation {
            document_id: chunk.document_id,
            filename: chunk.filename.to_string(),
            chunk_index: chunk.chunk_index,
            score: normalized,
            snippet_blinded: snippet,
            snippet_clear: String::new(),
            marker: None,
        });
    }
    citations
}

/// Extract citations for one response: try inline markers first, fall
/// back to post-hoc scoring if none resolve (§4.14 step 11). Never fails
/// - an extraction failure degrades to an empty citation list rather
/// than failing the whole response (§7).
pub fn extract_citations(response_text: &str, sources: &[SourceDocument], max_citations: usize) -> Vec<Citation> {
    let inline = extract_inline(response_text, sources);
    if !inline.is_empty() {
        return inline;
    }
    extract_post_hoc(response_text, sources, max_citations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(index: usize, filename: &str, text: &str) -> SourceDocument {
        SourceDocument {
            index,
            document_id: Uuid::new_v4(),
            filename: filename.to_string(),
            text_blinded: text.to_string(),
        }
    }

    #[test]
    fn inline_markers_resolve_to_matching_sources() {
        let sources = vec![
            source(1, "contract.txt", "The agreement specifies a salary of [CURRENCY_1] per year."),
            source(2, "memo.txt", "This memo discusses unrelated logistics."),
        ];
        let citations = extract_inline("The salary is stated clearly [1].", &sources);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].marker, Some(1));
        assert_eq!(citations[0].filename, "contract.txt");
    }

    #[test]
    fn inline_returns_empty_when_no_markers_present() {
        let sources = vec![source(1, "a.txt", "some content")];
        assert!(extract_inline("no markers here", &sources).is_empty());
    }

    #[test]
    fn post_hoc_scores_overlapping_chunks_higher() {
        let sources = vec![
            source(1, "financial.txt", "quarterly revenue growth exceeded analyst expectations significantly"),
            source(2, "unrelated.txt", "gardening tips for growing tomatoes in containers"),
        ];
        let citations = extract_post_hoc("revenue growth exceeded expectations", &sources, 3);
        assert!(!citations.is_empty());
        assert_eq!(citations[0].filename, "financial.txt");
    }

    #[test]
    fn post_hoc_deduplicates_by_document() {
        let long_text = (0..600).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let sources = vec![source(1, "long.txt", &long_text)];
        let citations = extract_post_hoc(&long_text[..200], &sources, 5);
        let unique_docs: HashSet<_> = citations.iter().map(|c| c.document_id).collect();
        assert_eq!(unique_docs.len(), citations.len());
    }

    #[test]
    fn extract_citations_falls_back_to_post_hoc() {
        let sources = vec![source(1, "a.txt", "quarterly revenue growth report details")];
        let citations = extract_citations("revenue growth was strong this quarter", &sources, DEFAULT_MAX_CITATIONS);
        assert!(citations.iter().all(|c| c.marker.is_none()));
    }
}
