//! Embedder (C9, §4.9): produces L2-normalised dense vectors. The model
//! itself is out of scope (§1); this crate consumes it only through
//! [`EmbeddingProvider`] so a real model can be slotted in without
//! touching chunking or retrieval logic. `blinder-test-utils` supplies a
//! deterministic byte-sum-based mock for tests.

use async_trait::async_trait;
use blinder_core::{BlinderResult, RetrievalError};

/// Maximum batch size a provider is expected to accept in one call
/// (§4.9).
pub const EMBED_BATCH_SIZE: usize = 64;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text, returning an L2-normalised vector of
    /// [`EmbeddingProvider::dimensions`] length.
    async fn embed(&self, text: &str) -> BlinderResult<Vec<f32>>;

    /// Embed multiple texts in one call. Implementations should batch in
    /// groups of at most [`EMBED_BATCH_SIZE`] internally.
    async fn embed_batch(&self, texts: &[&str]) -> BlinderResult<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn model_id(&self) -> &str;
}

/// L2-normalise a vector in place. A zero vector is left unchanged
/// (normalising it would divide by zero).
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two embeddings of equal length. Returns an
/// error if dimensions mismatch, matching [`RetrievalError`]'s role as
/// the domain error for every retrieval-stage failure.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> BlinderResult<f32> {
    if a.len() != b.len() {
        return Err(RetrievalError::EmbeddingFailed(format!(
            "dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        ))
        .into());
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_rejects_dimension_mismatch() {
        assert!(cosine_similarity(&[1.0, 2.0], &[1.0]).is_err());
    }
}
