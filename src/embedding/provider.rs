/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// `embed` returns exactly one vector per input text, in input order.
/// `dimension` never changes during the provider's lifetime.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Generate the embedding for a single text
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed(&[text.to_string()])?;
        let [embedding]: [Vec<f32>; 1] =
            embeddings
                .try_into()
                .map_err(|rest: Vec<Vec<f32>>| EmbeddingError::CountMismatch {
                    expected: 1,
                    actual: rest.len(),
                })?;
        Ok(embedding)
    }
}

/// Check a batch result against the request before it reaches the index
pub(crate) fn verify_batch(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if embeddings.len() != expected_count {
        return Err(EmbeddingError::CountMismatch {
            expected: expected_count,
            actual: embeddings.len(),
        });
    }

    for embedding in embeddings {
        if embedding.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: embedding.len(),
            });
        }
    }

    Ok(())
}

/// FastEmbed provider for local embedding generation
///
/// Runs fully offline once the model is cached.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on first use into `cache_dir`
    /// (or fastembed's default cache). Supported models:
    /// - all-MiniLM-L6-v2: 90MB (384 dims)
    /// - bge-small-en-v1.5: 130MB (384 dims)
    /// - bge-base-en-v1.5: 440MB (768 dims)
    /// - paraphrase-multilingual-minilm-l12-v2: 470MB (384 dims), non-English text
    /// - multilingual-e5-small: 470MB (384 dims)
    pub fn new(
        model_name: &str,
        cache_dir: Option<PathBuf>,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension, model_size_mb) = resolve_model(model_name)?;

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let mut init_options =
            InitOptions::new(embedding_model).with_show_download_progress(true);
        if let Some(cache_dir) = cache_dir {
            init_options = init_options.with_cache_dir(cache_dir);
        }

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }
}

/// Map a configured model identifier to (model, dimension, download size MB)
fn resolve_model(model_name: &str) -> Result<(EmbeddingModel, usize, usize), EmbeddingError> {
    match model_name.to_lowercase().as_str() {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384, 90)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384, 130)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768, 440)),
        "paraphrase-multilingual-minilm-l12-v2" => {
            Ok((EmbeddingModel::ParaphraseMLMiniLML12V2, 384, 470))
        }
        "multilingual-e5-small" => Ok((EmbeddingModel::MultilingualE5Small, 384, 470)),
        _ => Err(EmbeddingError::InitializationError(format!(
            "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, \
             bge-base-en-v1.5, paraphrase-multilingual-minilm-l12-v2, multilingual-e5-small",
            model_name
        ))),
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        verify_batch(&embeddings, texts.len(), self.dimension)?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_is_rejected_before_download() {
        let result = FastEmbedProvider::new("gpt2", None, 32);
        assert!(matches!(
            result,
            Err(EmbeddingError::InitializationError(_))
        ));
    }

    #[test]
    fn test_model_names_are_case_insensitive() {
        let (_, dimension, _) = resolve_model("All-MiniLM-L6-v2").unwrap();
        assert_eq!(dimension, 384);
        let (_, dimension, _) = resolve_model("bge-base-en-v1.5").unwrap();
        assert_eq!(dimension, 768);
    }

    #[test]
    fn test_verify_batch() {
        let good = vec![vec![0.0; 3], vec![1.0; 3]];
        assert!(verify_batch(&good, 2, 3).is_ok());
        assert!(matches!(
            verify_batch(&good, 3, 3),
            Err(EmbeddingError::CountMismatch { .. })
        ));
        assert!(matches!(
            verify_batch(&good, 2, 4),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_provider_creation() {
        let provider = FastEmbedProvider::new("all-MiniLM-L6-v2", None, 32).unwrap();
        assert_eq!(provider.dimension(), 384);
        assert_eq!(provider.model_name(), "all-MiniLM-L6-v2");
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_batch_preserves_order_and_count() {
        let provider = FastEmbedProvider::new("all-MiniLM-L6-v2", None, 2).unwrap();
        let texts = vec![
            "First test sentence.".to_string(),
            String::new(),
            "Third test sentence.".to_string(),
        ];

        let embeddings = provider.embed(&texts).unwrap();
        assert_eq!(embeddings.len(), 3);

        let first_again = provider.embed_one("First test sentence.").unwrap();
        let distance: f32 = embeddings[0]
            .iter()
            .zip(&first_again)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        assert!(distance < 1e-4);
    }
}
