use std::time::Duration;

use tracing::warn;

use engram_types::EMBEDDING_DIM;

use crate::client::OllamaClient;
use crate::Error;

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub model: String,
    /// `false` forces the synthetic path (degraded mode by choice).
    pub use_real: bool,
    /// Short: embedding models answer in well under a second locally.
    pub timeout: Duration,
    pub dimension: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: "all-minilm".to_string(),
            use_real: true,
            timeout: Duration::from_secs(10),
            dimension: EMBEDDING_DIM,
        }
    }
}

/// A produced embedding plus how it was produced.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    /// True when the synthetic fallback vector was used.
    pub degraded: bool,
}

/// Fixed-dimension embedding generation with a deterministic fallback.
///
/// The row must stay shape-valid even when the embedding model is down,
/// so every failure path yields a synthetic vector rather than an error.
#[derive(Debug, Clone)]
pub struct Embedder {
    client: OllamaClient,
    config: EmbedderConfig,
}

impl Embedder {
    pub fn new(client: OllamaClient, config: EmbedderConfig) -> Self {
        Self { client, config }
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub async fn embed(&self, text: &str) -> Embedding {
        if !self.config.use_real {
            return Embedding {
                vector: synthetic_vector(text, self.config.dimension),
                degraded: true,
            };
        }

        match self.try_embed(text).await {
            Ok(vector) => Embedding {
                vector,
                degraded: false,
            },
            Err(err) => {
                warn!(error = %err, "embedder unavailable, using synthetic vector");
                Embedding {
                    vector: synthetic_vector(text, self.config.dimension),
                    degraded: true,
                }
            }
        }
    }

    async fn try_embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        let vector = self
            .client
            .embeddings(&self.config.model, text, self.config.timeout)
            .await?;

        if vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Deterministic stand-in vector for degraded mode.
///
/// Seeded from a byte sum of the input so the same text always maps to
/// the same vector while distinct texts diverge. Components stay in
/// [-1, 1], keeping cosine distances computable downstream.
pub fn synthetic_vector(text: &str, dimension: usize) -> Vec<f32> {
    let seed = text.bytes().fold(0u32, |acc, b| acc.wrapping_add(b as u32)) % 1000;
    (0..dimension)
        .map(|i| (((i as u32 + seed) as f32) * 0.1).sin())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_vector_dimension() {
        assert_eq!(synthetic_vector("hello", EMBEDDING_DIM).len(), EMBEDDING_DIM);
    }

    #[test]
    fn test_synthetic_vector_deterministic() {
        assert_eq!(
            synthetic_vector("same input", EMBEDDING_DIM),
            synthetic_vector("same input", EMBEDDING_DIM)
        );
    }

    #[test]
    fn test_synthetic_vector_varies_with_input() {
        assert_ne!(
            synthetic_vector("one", EMBEDDING_DIM),
            synthetic_vector("two", EMBEDDING_DIM)
        );
    }

    #[test]
    fn test_synthetic_vector_components_bounded() {
        assert!(synthetic_vector("bounds", EMBEDDING_DIM)
            .iter()
            .all(|v| (-1.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_degrades() {
        let config = EmbedderConfig {
            timeout: Duration::from_millis(200),
            ..EmbedderConfig::default()
        };
        // Port 9 (discard) is never an Ollama endpoint.
        let embedder = Embedder::new(OllamaClient::new("http://127.0.0.1:9"), config);
        let embedding = embedder.embed("text").await;
        assert!(embedding.degraded);
        assert_eq!(embedding.vector.len(), EMBEDDING_DIM);
        assert_eq!(embedding.vector, synthetic_vector("text", EMBEDDING_DIM));
    }

    #[tokio::test]
    async fn test_real_embeddings_disabled_degrades() {
        let config = EmbedderConfig {
            use_real: false,
            ..EmbedderConfig::default()
        };
        let embedder = Embedder::new(OllamaClient::new("http://127.0.0.1:9"), config);
        assert!(embedder.embed("text").await.degraded);
    }
}
