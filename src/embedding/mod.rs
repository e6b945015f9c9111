/// Embedding & Indexing
///
/// Local embedding generation and exact nearest-neighbour search.
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding
/// - FlatIndex for exhaustive L2 search with checksummed persistence
/// - EmbeddingCapability so callers branch on availability, not on backends
mod provider;
mod vector_index;

pub(crate) use provider::verify_batch;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub(crate) use vector_index::write_atomically;
pub use vector_index::{FlatIndex, Neighbor, VectorIndexError};

use crate::config::EmbeddingConfig;
use std::sync::Arc;

/// Outcome of trying to bring up an embedding provider
#[derive(Clone)]
pub enum EmbeddingCapability {
    Available(Arc<dyn EmbeddingProvider>),
    Unavailable(String),
}

impl EmbeddingCapability {
    /// Try to initialize the configured FastEmbed model
    ///
    /// Failure is reported as `Unavailable`, never as an error.
    pub fn probe(config: &EmbeddingConfig) -> Self {
        match FastEmbedProvider::new(&config.model, config.cache_dir.clone(), config.batch_size)
        {
            Ok(provider) => {
                tracing::info!("Embedding model loaded: {}", provider.model_name());
                Self::Available(Arc::new(provider))
            }
            Err(e) => {
                tracing::warn!(
                    "Could not load embedding model {}: {}. Semantic search is disabled.",
                    config.model,
                    e
                );
                Self::Unavailable(e.to_string())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn provider(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        match self {
            Self::Available(provider) => Some(Arc::clone(provider)),
            Self::Unavailable(_) => None,
        }
    }
}

impl std::fmt::Debug for EmbeddingCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(provider) => f
                .debug_tuple("Available")
                .field(&provider.model_name())
                .finish(),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}
