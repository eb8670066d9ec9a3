//! Hybrid retriever (C10, §4.10): Reciprocal Rank Fusion over three
//! independent signals - pseudonym-exact match, BM25-style lexical
//! ranking, and cosine similarity over embeddings.

use crate::embedder::cosine_similarity;
use blinder_core::{Chunk, PSEUDONYM_PATTERN};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Each per-signal ranking is capped to this many chunk identifiers
/// (§4.10).
const SIGNAL_CAP: usize = 50;

/// Rank assigned to a chunk absent from a signal's ranked list - one
/// past the cap, so it always scores strictly worse than anything that
/// made the list (§4.10).
const MISSING_RANK: usize = SIGNAL_CAP + 1;

const WEIGHT_PSEUDONYM: f32 = 2.0;
const WEIGHT_LEXICAL: f32 = 1.0;
const WEIGHT_VECTOR: f32 = 1.0;

static PSEUDONYM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(PSEUDONYM_PATTERN).unwrap());

/// English stop words filtered out of lexical tokenisation (§4.14 step 11
/// uses the same list for citation scoring; kept here as this crate's own
/// copy rather than a shared dependency since it's a handful of words).
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "to", "of", "and", "or",
    "in", "on", "at", "for", "with", "by", "from", "this", "that", "it", "as", "do", "does",
];

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Rank chunks by the count of distinct query pseudonyms present as a
/// bracketed substring of their content, descending. Empty if the query
/// contains no pseudonyms (§4.10 signal 1).
fn pseudonym_ranking(query_text: &str, chunks: &[Chunk]) -> Vec<Uuid> {
    let pseudonyms: HashSet<String> = PSEUDONYM_RE
        .find_iter(query_text)
        .map(|m| m.as_str().to_string())
        .collect();
    if pseudonyms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(Uuid, usize)> = chunks
        .iter()
        .map(|c| {
            let count = pseudonyms.iter().filter(|p| c.content.contains(p.as_str())).count();
            (c.chunk_id, count)
        })
        .filter(|&(_, count)| count > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(SIGNAL_CAP);
    scored.into_iter().map(|(id, _)| id).collect()
}

/// BM25 scoring (k1=1.5, b=0.75) of `chunks` against `query_text`,
/// descending, truncated to [`SIGNAL_CAP`] (§4.10 signal 2).
fn lexical_ranking(query_text: &str, chunks: &[Chunk]) -> Vec<Uuid> {
    let query_tokens = tokenize(query_text);
    if query_tokens.is_empty() || chunks.is_empty() {
        return Vec::new();
    }

    let docs: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.content)).collect();
    let n = docs.len() as f32;
    let avg_len: f32 = docs.iter().map(|d| d.len() as f32).sum::<f32>() / n.max(1.0);

    let mut df: HashMap<&str, usize> = HashMap::new();
    for doc in &docs {
        let unique: HashSet<&str> = doc.iter().map(|s| s.as_str()).collect();
        for term in unique {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    const K1: f32 = 1.5;
    const B: f32 = 0.75;

    let mut scored: Vec<(Uuid, f32)> = chunks
        .iter()
        .zip(docs.iter())
        .map(|(chunk, doc)| {
            let doc_len = doc.len() as f32;
            let mut tf: HashMap<&str, usize> = HashMap::new();
            for term in doc {
                *tf.entry(term.as_str()).or_insert(0) += 1;
            }
            let score: f32 = query_tokens
                .iter()
                .map(|qt| {
                    let f = *tf.get(qt.as_str()).unwrap_or(&0) as f32;
                    if f == 0.0 {
                        return 0.0;
                    }
                    let n_q = *df.get(qt.as_str()).unwrap_or(&0) as f32;
                    let idf = ((n - n_q + 0.5) / (n_q + 0.5) + 1.0).ln();
                    idf * (f * (K1 + 1.0)) / (f + K1 * (1.0 - B + B * doc_len / avg_len.max(1.0)))
                })
                .sum();
            (chunk.chunk_id, score)
        })
        .filter(|&(_, score)| score > 0.0)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.truncate(SIGNAL_CAP);
    scored.into_iter().map(|(id, _)| id).collect()
}

/// Cosine similarity ranking against `query_embedding`, descending,
/// truncated to [`SIGNAL_CAP`] (§4.10 signal 3).
fn vector_ranking(query_embedding: &[f32], chunks: &[Chunk]) -> Vec<Uuid> {
    let mut scored: Vec<(Uuid, f32)> = chunks
        .iter()
        .filter_map(|c| {
            let embedding = c.embedding.as_ref()?;
            let sim = cosine_similarity(query_embedding, embedding).ok()?;
            Some((c.chunk_id, sim))
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.truncate(SIGNAL_CAP);
    scored.into_iter().map(|(id, _)| id).collect()
}

fn rank_of(ranking: &[Uuid], chunk_id: Uuid) -> usize {
    ranking
        .iter()
        .position(|&id| id == chunk_id)
        .map(|pos| pos + 1)
        .unwrap_or(MISSING_RANK)
}

/// Run the three signals and fuse them via Reciprocal Rank Fusion,
/// returning chunks sorted by descending score and truncated to
/// `top_k` (§4.10).
pub fn hybrid_search(
    query_text: &str,
    query_embedding: Option<&[f32]>,
    chunks: &[Chunk],
    top_k: usize,
    rrf_k: u32,
) -> Vec<(Chunk, f32)> {
    let pseudonym_rank = pseudonym_ranking(query_text, chunks);
    let lexical_rank = lexical_ranking(query_text, chunks);
    let vector_rank = query_embedding
        .map(|e| vector_ranking(e, chunks))
        .unwrap_or_default();

    let rrf_k = rrf_k as f32;
    let mut scored: Vec<(Chunk, f32)> = chunks
        .iter()
        .map(|chunk| {
            let score = WEIGHT_PSEUDONYM / (rrf_k + rank_of(&pseudonym_rank, chunk.chunk_id) as f32)
                + WEIGHT_LEXICAL / (rrf_k + rank_of(&lexical_rank, chunk.chunk_id) as f32)
                + WEIGHT_VECTOR / (rrf_k + rank_of(&vector_rank, chunk.chunk_id) as f32);
            (chunk.clone(), score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.truncate(top_k);
    scored
}

/// Adaptive `top_k` for a given context budget (§4.10 "Adaptive top-k").
pub fn adaptive_top_k(
    context_window: usize,
    history_tokens: usize,
    prompt_tokens: usize,
    configured_cap: usize,
) -> usize {
    let budget = ((0.8 * context_window as f32) - history_tokens as f32 - prompt_tokens as f32 - 1500.0)
        .max(1000.0);
    let by_budget = (budget / 512.0) as usize;
    configured_cap.min(by_budget.max(3))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            chunk_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            index: 0,
            content: content.to_string(),
            embedding,
            token_count: content.split_whitespace().count() as i32,
        }
    }

    #[test]
    fn pseudonym_exact_match_dominates_ranking() {
        let chunks = vec![
            chunk("unrelated content about weather", None),
            chunk("Row: [PERSON_1] | 30 | NYC", None),
        ];
        let results = hybrid_search("What is [PERSON_1]'s age?", None, &chunks, 2, 60);
        assert_eq!(results[0].0.content, "Row: [PERSON_1] | 30 | NYC");
    }

    #[test]
    fn lexical_signal_ranks_keyword_overlap_higher() {
        let chunks = vec![
            chunk("the quarterly financial report discusses revenue growth", None),
            chunk("a completely unrelated paragraph about gardening", None),
        ];
        let results = hybrid_search("quarterly financial revenue", None, &chunks, 2, 60);
        assert!(results[0].0.content.contains("financial"));
    }

    #[test]
    fn vector_signal_ranks_closest_embedding_higher() {
        let chunks = vec![
            chunk("doc a", Some(vec![1.0, 0.0])),
            chunk("doc b", Some(vec![0.0, 1.0])),
        ];
        let results = hybrid_search("irrelevant text", Some(&[1.0, 0.0]), &chunks, 2, 60);
        assert_eq!(results[0].0.content, "doc a");
    }

    #[test]
    fn top_k_truncates_results() {
        let chunks: Vec<Chunk> = (0..10).map(|i| chunk(&format!("chunk number {i}"), None)).collect();
        let results = hybrid_search("chunk", None, &chunks, 3, 60);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn adaptive_top_k_respects_configured_cap() {
        let k = adaptive_top_k(8000, 0, 0, 10);
        assert!(k <= 10);
    }

    #[test]
    fn adaptive_top_k_never_drops_below_three() {
        let k = adaptive_top_k(100, 1_000_000, 0, 10);
        assert!(k >= 3);
    }
}
