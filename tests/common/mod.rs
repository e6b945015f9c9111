//! Shared fixtures for integration tests
#![allow(dead_code)]

use sanad::embedding::{EmbeddingCapability, EmbeddingError, EmbeddingProvider};
use sanad::search::{DocumentSearchService, IndexArtifacts};
use sanad::storage::{DocumentStore, StorageManager};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

pub const DIMENSION: usize = 256;

/// Deterministic hashed bag-of-words embedding
///
/// Each lowercase alphanumeric token lands in a blake3-chosen bucket; the
/// vector is L2-normalized so documents sharing words end up close.
#[derive(Default)]
pub struct HashedProvider {
    pub texts_embedded: AtomicUsize,
}

impl HashedProvider {
    pub fn embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }
}

pub fn hashed_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSION];
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let hash = blake3::hash(token.as_bytes());
        let bucket = u16::from_le_bytes([hash.as_bytes()[0], hash.as_bytes()[1]]) as usize;
        vector[bucket % DIMENSION] += 1.0;
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

impl EmbeddingProvider for HashedProvider {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| hashed_embedding(text)).collect())
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "hashed-bow"
    }
}

/// Provider whose every call fails
pub struct FailingProvider;

impl EmbeddingProvider for FailingProvider {
    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::GenerationError(
            "model crashed".to_string(),
        ))
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

pub fn open_storage(dir: &Path) -> StorageManager {
    StorageManager::new(dir.to_path_buf(), Path::new("documents.sqlite"))
        .expect("Failed to open storage")
}

pub fn artifacts(dir: &Path) -> IndexArtifacts {
    IndexArtifacts::new(
        dir.join("index/documents_index.vec"),
        dir.join("index/documents_mapping.json"),
    )
}

/// Search service over `storage`, registered for post-commit rebuilds
pub fn search_service(
    storage: &StorageManager,
    provider: Arc<dyn EmbeddingProvider>,
) -> Arc<DocumentSearchService> {
    let store: Arc<dyn DocumentStore> = storage.documents.clone();
    let service = Arc::new(DocumentSearchService::new(
        store,
        EmbeddingCapability::Available(provider),
        artifacts(storage.base_path()),
    ));

    let observer: Weak<DocumentSearchService> = Arc::downgrade(&service);
    storage.documents.register_observer(observer);
    service
}
