//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus the distance function used for nearest-file ranking.
//!
//! Concrete provider implementations (OpenAI, Ollama) live in the
//! `context-splice` app crate.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// What a text is being embedded as.
///
/// Some providers embed documents and queries differently; providers that
/// don't may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedRole {
    Document,
    Query,
}

/// Trait for embedding providers.
///
/// Implementations are created by the application and injected into
/// [`NearestFileIndex`](crate::nearest::NearestFileIndex).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    ///
    /// Cached vectors are only reused for the model that produced them.
    fn model_name(&self) -> &str;

    /// Fail fast when the provider cannot possibly succeed, e.g. because
    /// its API credential is missing. Called before any embedding request.
    fn check_credentials(&self) -> Result<()> {
        Ok(())
    }

    /// Embed a batch of texts, returning one vector per text in input order.
    async fn embed_batch(&self, texts: &[String], role: EmbedRole) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()], role).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))
    }
}

/// Euclidean (L2) distance between two embedding vectors.
///
/// No normalization is applied: lower means more similar. Vectors of
/// different lengths, or empty vectors, are infinitely far apart so they
/// sort after every comparable vector.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::INFINITY;
    }

    let distance = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt();

    // Overflowed or NaN components rank last.
    if distance.is_finite() {
        distance
    } else {
        f32::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(euclidean_distance(&v, &v), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        let d = euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_is_not_cosine() {
        // Same direction, different magnitude: cosine would call these equal.
        let d = euclidean_distance(&[1.0, 0.0], &[10.0, 0.0]);
        assert!((d - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_non_finite_is_infinity() {
        assert_eq!(euclidean_distance(&[0.0], &[f32::NAN]), f32::INFINITY);
        assert_eq!(
            euclidean_distance(&[f32::INFINITY], &[f32::INFINITY]),
            f32::INFINITY
        );
        assert_eq!(euclidean_distance(&[0.0], &[f32::MAX]), f32::INFINITY);
    }

    #[test]
    fn test_distance_mismatched_lengths() {
        assert_eq!(euclidean_distance(&[1.0, 2.0], &[1.0]), f32::INFINITY);
        assert_eq!(euclidean_distance(&[], &[]), f32::INFINITY);
    }

    struct Echo;

    #[async_trait]
    impl EmbeddingProvider for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn embed_batch(&self, texts: &[String], _role: EmbedRole) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_one_delegates_to_batch() {
        let v = Echo.embed_one("abcd", EmbedRole::Query).await.unwrap();
        assert_eq!(v, vec![4.0]);
        assert!(Echo.check_credentials().is_ok());
    }
}
