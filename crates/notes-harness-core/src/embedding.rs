//! Embedding provider trait, vector utilities, and the distance law.
//!
//! Concrete providers (OpenAI-compatible, Ollama) live in the
//! `notes-harness` app crate. This module fixes the contract every provider
//! must honor and the single distance convention the ranking core relies on.
//!
//! # Distance law
//!
//! After L2 normalization, the distance between two vectors is the cosine
//! distance `1 − cos(θ)`, ranging over `[0, 2]` (`0` identical, `2`
//! opposite). Similarity is always `1 − distance / 2`, and a similarity
//! threshold `t` maps to the distance cutoff `2 × (1 − t)`.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Trait for embedding providers.
///
/// `embed` must return exactly one vector of length [`dims`](Self::dims) per
/// input text, in input order. Callers treat a count or length mismatch as
/// fatal.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed one query text and L2-normalize it.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let mut vectors = provider.embed(&[text.to_string()]).await?;
    ensure_count(1, vectors.len())?;
    let mut vector = vectors.remove(0);
    ensure_dims(provider.dims(), vector.len())?;
    l2_normalize(&mut vector);
    Ok(vector)
}

/// Fail with [`Error::EmbeddingCountMismatch`] unless `actual == expected`.
pub fn ensure_count(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::EmbeddingCountMismatch { expected, actual });
    }
    Ok(())
}

/// Fail with [`Error::Embedding`] unless a vector has the provider's
/// declared, non-zero length.
pub fn ensure_dims(expected: usize, actual: usize) -> Result<()> {
    if actual == 0 || actual != expected {
        return Err(Error::Embedding {
            message: format!(
                "embedding provider returned a {}-dimension vector, expected {}",
                actual, expected
            ),
        });
    }
    Ok(())
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `None` for empty vectors, vectors of different lengths, or
/// zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return None;
    }

    Some((dot / denom).clamp(-1.0, 1.0))
}

/// Cosine distance in `[0, 2]`; unrelated or malformed pairs count as `1.0`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b).unwrap_or(0.0)
}

pub fn distance_to_similarity(distance: f64) -> f64 {
    1.0 - distance / 2.0
}

pub fn similarity_to_distance(similarity: f64) -> f64 {
    2.0 * (1.0 - similarity)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Vec<Vec<f32>>);

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_malformed() {
        assert_eq!(cosine_similarity(&[], &[]), None);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn test_distance_range() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_similarity_law() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert_eq!(distance_to_similarity(2.0), 0.0);
        assert_eq!(similarity_to_distance(0.6), 0.8);
        for d in [0.0, 0.3, 0.8, 1.4, 2.0] {
            assert!((similarity_to_distance(distance_to_similarity(d)) - d).abs() < 1e-12);
        }
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0f32, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_ensure_count() {
        assert!(ensure_count(3, 3).is_ok());
        assert!(matches!(
            ensure_count(3, 2),
            Err(Error::EmbeddingCountMismatch { expected: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn test_embed_query_normalizes() {
        let provider = FixedProvider(vec![vec![0.0, 2.0]]);
        let v = embed_query(&provider, "q").await.unwrap();
        assert_eq!(v, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_embed_query_rejects_extra_vectors() {
        let provider = FixedProvider(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let err = embed_query(&provider, "q").await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingCountMismatch { expected: 1, actual: 2 }));
    }

    #[test]
    fn test_ensure_dims() {
        assert!(ensure_dims(2, 2).is_ok());
        assert!(matches!(ensure_dims(2, 3), Err(Error::Embedding { .. })));
        assert!(matches!(ensure_dims(0, 0), Err(Error::Embedding { .. })));
    }

    #[tokio::test]
    async fn test_embed_query_rejects_wrong_dimension() {
        let provider = FixedProvider(vec![vec![1.0, 0.0, 0.0]]);
        let err = embed_query(&provider, "q").await.unwrap_err();
        assert!(matches!(err, Error::Embedding { .. }));
        assert!(err.to_string().contains("3-dimension vector, expected 2"));
    }
}
