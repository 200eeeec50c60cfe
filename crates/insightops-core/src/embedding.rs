//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus pure helper functions for vector serialization and
//! distance computation.
//!
//! Concrete providers (OpenAI, Ollama, fastembed) live in the `insightops`
//! app crate. Providers are constructed once by the application and passed
//! by `Arc` to the indexer and query engine.

use std::cmp::Ordering;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// An embedding backend: `embed(texts) -> vectors`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts. The output holds one vector per input, in
    /// input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use insightops_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, and zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance: `1 - cosine_similarity`, in `[0.0, 2.0]`.
///
/// Returns `None` when the vectors cannot be compared (length mismatch,
/// empty, or non-finite components), so callers can rank such hits last
/// instead of treating them as orthogonal.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let distance = 1.0 - cosine_similarity(a, b);
    distance.is_finite().then_some(distance)
}

/// Closest-first ordering over optional distances. Missing and non-finite
/// distances sort after every real one. Total, so safe for `sort_by`.
pub fn compare_distance(a: Option<f32>, b: Option<f32>) -> Ordering {
    let a = a.filter(|d| d.is_finite());
    let b = b.filter(|d| d.is_finite());
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider;

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&v, &v).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_distance(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b).unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_undefined_for_mismatched_lengths() {
        assert_eq!(cosine_distance(&[1.0, 2.0], &[1.0]), None);
        assert_eq!(cosine_distance(&[], &[]), None);
    }

    #[test]
    fn non_finite_components_have_no_distance() {
        assert_eq!(cosine_distance(&[f32::NAN, 1.0], &[1.0, 1.0]), None);
        assert_eq!(cosine_distance(&[f32::MAX, f32::MAX], &[1.0, 1.0]), None);
        assert_eq!(cosine_distance(&[f32::INFINITY, 0.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn nan_distances_sort_last_without_panicking() {
        let mut distances: Vec<Option<f32>> = (0..40)
            .map(|i| if i % 3 == 0 { Some(f32::NAN) } else { Some(i as f32 / 100.0) })
            .collect();
        distances.push(None);
        distances.sort_by(|a, b| compare_distance(*a, *b));

        let finite = distances.iter().take_while(|d| d.is_some_and(f32::is_finite)).count();
        assert_eq!(finite, 26);
        assert!(distances[..finite].windows(2).all(|w| w[0] <= w[1]));
        assert!(distances[finite..]
            .iter()
            .all(|d| d.map_or(true, |d| d.is_nan())));
    }

    #[tokio::test]
    async fn embed_query_returns_first_vector() {
        let v = FixedProvider.embed_query("abc").await.unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }
}
