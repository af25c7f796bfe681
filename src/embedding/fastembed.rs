//! FastEmbed embedding provider implementation.
//!
//! This module provides an implementation of the `EmbeddingProvider` trait
//! using the fastembed library for local embedding generation.
//!
//! The default model is the multilingual paraphrase MiniLM (384 dimensions),
//! which handles non-English titles and abstracts. Vectors are returned with
//! unit L2 norm.

use super::{l2_normalize, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Model used when none is specified.
pub const DEFAULT_MODEL: EmbeddingModel = EmbeddingModel::ParaphraseMLMiniLML12V2;

/// FastEmbed embedding provider.
///
/// Holds one loaded model shared across clones.
#[derive(Clone)]
pub struct FastEmbedProvider {
    /// The embedding model instance (wrapped in Arc<Mutex> for thread-safety)
    model: Arc<Mutex<TextEmbedding>>,

    /// Model identifier
    model_name: String,

    /// Expected dimension of the embedding vectors
    embedding_dimension: usize,
}

/// Output dimension for the models this crate knows about.
///
/// Other models are measured from a sample embedding when loaded.
pub fn known_dimension(model: &EmbeddingModel) -> Option<usize> {
    match model {
        EmbeddingModel::AllMiniLML6V2 => Some(384),
        EmbeddingModel::BGESmallENV15 => Some(384),
        EmbeddingModel::BGEBaseENV15 => Some(768),
        EmbeddingModel::BGELargeENV15 => Some(1024),
        EmbeddingModel::NomicEmbedTextV1 => Some(768),
        EmbeddingModel::NomicEmbedTextV15 => Some(768),
        EmbeddingModel::ParaphraseMLMiniLML12V2 => Some(384),
        EmbeddingModel::ParaphraseMLMpnetBaseV2 => Some(768),
        _ => None,
    }
}

fn measure_dimension(model: &mut TextEmbedding) -> EmbeddingResult<usize> {
    let sample = model
        .embed(vec!["dimension sample".to_string()], None)
        .map_err(|e| EmbeddingError::ConfigError(format!("Failed to measure model dimension: {}", e)))?;
    match sample.first().map(Vec::len) {
        Some(dimension) if dimension > 0 => Ok(dimension),
        _ => Err(EmbeddingError::ConfigError(
            "Model returned an empty sample embedding".to_string(),
        )),
    }
}

impl FastEmbedProvider {
    /// Create a new FastEmbed embedding provider.
    ///
    /// # Arguments
    /// * `model` - Optional model to use (defaults to [`DEFAULT_MODEL`])
    /// * `cache_dir` - Optional cache directory for model files
    ///
    /// # Errors
    /// Returns `EmbeddingError::ConfigError` if model initialization fails
    /// or the dimension of an unlisted model cannot be measured
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model_type = model.unwrap_or(DEFAULT_MODEL);
        let model_name = format!("{:?}", model_type);
        let known = known_dimension(&model_type);

        let mut init_options = InitOptions::new(model_type);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(dir);
        }

        let mut text_embedding = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ConfigError(format!("Failed to initialize FastEmbed model: {}", e))
        })?;

        let embedding_dimension = match known {
            Some(dimension) => dimension,
            None => measure_dimension(&mut text_embedding)?,
        };

        debug!(model = %model_name, dimension = embedding_dimension, "FastEmbed model loaded");

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name,
            embedding_dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Other("No embedding generated".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if texts.iter().any(|text| text.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "All texts must be non-empty".to_string(),
            ));
        }

        let mut model = self.model.lock().await;

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let mut embeddings = model
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::Other(format!("Batch embedding generation failed: {}", e)))?;

        for embedding in embeddings.iter_mut() {
            l2_normalize(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

// TextEmbedding does not implement Debug.
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("embedding_dimension", &self.embedding_dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_dimension() {
        assert_eq!(known_dimension(&DEFAULT_MODEL), Some(crate::DEFAULT_EMBEDDING_DIMENSION));
        assert_eq!(known_dimension(&EmbeddingModel::BGEBaseENV15), Some(768));
        assert_eq!(known_dimension(&EmbeddingModel::BGELargeENV15), Some(1024));
    }

    #[test]
    fn test_unlisted_model_has_no_assumed_dimension() {
        assert_eq!(known_dimension(&EmbeddingModel::AllMiniLML12V2), None);
    }

    #[tokio::test]
    #[ignore = "downloads the ONNX model on first run"]
    async fn test_unlisted_model_dimension_is_measured() {
        let provider = FastEmbedProvider::new(Some(EmbeddingModel::AllMiniLML12V2), None)
            .expect("model should load");
        assert_eq!(provider.dimension(), 384);

        let embedding = provider.embed("Graph neural networks").await.unwrap();
        assert_eq!(embedding.len(), provider.dimension());
    }

    #[tokio::test]
    #[ignore = "downloads the ONNX model on first run"]
    async fn test_embed_batch_is_normalized_and_ordered() {
        let provider = FastEmbedProvider::new(None, None).expect("model should load");
        let texts = ["Quantum computing basics", "Protein folding survey"];

        let embeddings = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        for embedding in &embeddings {
            assert_eq!(embedding.len(), provider.dimension());
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3);
        }

        let single = provider.embed(texts[1]).await.unwrap();
        let dist: f32 = single
            .iter()
            .zip(&embeddings[1])
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(dist < 1e-3, "batch and single embedding should agree");
    }

    #[tokio::test]
    #[ignore = "downloads the ONNX model on first run"]
    async fn test_embed_batch_rejects_blank_text() {
        let provider = FastEmbedProvider::new(None, None).expect("model should load");
        let result = provider.embed_batch(&["Valid text", "  "]).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }
}
