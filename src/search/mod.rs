//! Semantic document search with lexical fallback
//!
//! [`DocumentSearchService`] owns the embedding provider and the current
//! index snapshot. Rebuilds construct a complete new snapshot and swap it in
//! under a single write lock, so readers always see an index whose size
//! matches its id sequence.

mod persist;

pub use persist::{IndexArtifacts, PersistError};

use crate::embedding::{
    EmbeddingCapability, EmbeddingError, EmbeddingProvider, FlatIndex, VectorIndexError,
};
use crate::error::SanadError;
use crate::storage::{Document, DocumentChange, DocumentObserver, DocumentStore};
use ahash::AHashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Semantic search is unavailable: no embedding model loaded")]
    SemanticUnavailable,

    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector search failed: {0}")]
    Index(#[from] VectorIndexError),

    #[error("Document store error: {0}")]
    Store(#[from] SanadError),
}

/// Which retrieval path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchMode {
    #[serde(rename = "semantic")]
    Semantic,
    #[serde(rename = "simple")]
    Lexical,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Lexical => "simple",
        }
    }
}

/// Ranked documents plus how they were found
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub documents: Vec<Document>,
    pub mode: SearchMode,
    /// Set when the semantic path failed and lexical search stood in
    pub warning: Option<String>,
}

/// An index together with the document id of every position
#[derive(Debug)]
pub struct IndexSnapshot {
    pub index: FlatIndex,
    pub document_ids: Vec<i64>,
}

impl IndexSnapshot {
    fn empty(dimension: usize) -> Self {
        Self {
            index: FlatIndex::new(dimension),
            document_ids: Vec::new(),
        }
    }
}

/// Text embedded for a document
pub fn embedding_text(document: &Document) -> String {
    format!("{}\n{}", document.title, document.content)
}

/// Semantic search over the document store
pub struct DocumentSearchService {
    store: Arc<dyn DocumentStore>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    rebuild_lock: Mutex<()>,
    artifacts: IndexArtifacts,
}

impl DocumentSearchService {
    /// Create the service, loading the persisted index or rebuilding it
    ///
    /// Never fails: an unavailable provider leaves the index unavailable and
    /// every search takes the lexical path.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedding: EmbeddingCapability,
        artifacts: IndexArtifacts,
    ) -> Self {
        let service = Self {
            store,
            provider: embedding.provider(),
            snapshot: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            artifacts,
        };

        let Some(provider) = service.provider.clone() else {
            if let EmbeddingCapability::Unavailable(reason) = &embedding {
                tracing::warn!("Semantic index disabled ({}); using lexical search", reason);
            }
            return service;
        };

        match service.artifacts.load(provider.dimension()) {
            Some((index, document_ids)) => {
                tracing::info!("Loaded index with {} documents", document_ids.len());
                service.install(IndexSnapshot {
                    index,
                    document_ids,
                });
            }
            None => {
                service.install(IndexSnapshot::empty(provider.dimension()));
                tracing::info!("Created new index ({}D)", provider.dimension());
                if let Err(e) = service.rebuild_index() {
                    tracing::warn!("Initial index build failed: {}", e);
                }
            }
        }

        service
    }

    /// Rebuild the whole index from the store
    ///
    /// Returns the number of documents indexed. The previous snapshot stays
    /// in place if anything fails before the swap; a failure to persist the
    /// new snapshot is logged only.
    pub fn rebuild_index(&self) -> Result<usize, SearchError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(SearchError::SemanticUnavailable)?;
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let documents = self.store.list_all()?;
        let mut snapshot = IndexSnapshot::empty(provider.dimension());

        if documents.is_empty() {
            tracing::info!("No documents to index");
        } else {
            tracing::info!("Rebuilding index for {} documents...", documents.len());

            let texts: Vec<String> = documents.iter().map(embedding_text).collect();
            let embeddings = provider.embed(&texts)?;
            crate::embedding::verify_batch(&embeddings, texts.len(), provider.dimension())?;

            snapshot.index.add(&embeddings)?;
            snapshot.document_ids = documents.iter().map(|doc| doc.id).collect();
        }

        let count = snapshot.document_ids.len();
        let snapshot = self.install(snapshot);

        if let Err(e) = self
            .artifacts
            .save(&snapshot.index, &snapshot.document_ids)
        {
            tracing::warn!("Error saving index: {}", e);
        }

        tracing::info!("Index rebuilt successfully with {} documents", count);
        Ok(count)
    }

    /// Ranked documents for `query`, see [`DocumentSearchService::search`]
    pub fn search_similar(&self, query: &str, limit: usize) -> crate::Result<Vec<Document>> {
        Ok(self.search(query, limit)?.documents)
    }

    /// Search semantically when possible, lexically otherwise
    ///
    /// Only document store errors are returned; every embedding or index
    /// failure turns into a lexical search.
    pub fn search(&self, query: &str, limit: usize) -> crate::Result<SearchOutcome> {
        let (Some(provider), Some(snapshot)) = (self.provider.as_deref(), self.snapshot()) else {
            return self.lexical_search(query, limit, None);
        };

        match self.semantic_search(provider, &snapshot, query, limit) {
            Ok(documents) => Ok(SearchOutcome {
                documents,
                mode: SearchMode::Semantic,
                warning: None,
            }),
            Err(e) => {
                tracing::warn!("Error in semantic search: {}. Falling back to lexical search", e);
                self.lexical_search(query, limit, Some(format!("Semantic search failed: {}", e)))
            }
        }
    }

    fn semantic_search(
        &self,
        provider: &dyn EmbeddingProvider,
        snapshot: &IndexSnapshot,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Document>, SearchError> {
        let query_embedding = provider.embed_one(query)?;

        let k = limit.min(snapshot.index.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let neighbors = snapshot.index.search(&query_embedding, k)?;
        let ranked_ids: Vec<i64> = neighbors
            .iter()
            .filter_map(|neighbor| snapshot.document_ids.get(neighbor.position).copied())
            .collect();

        let mut by_id: AHashMap<i64, Document> = self
            .store
            .filter_by_ids(&ranked_ids)?
            .into_iter()
            .map(|doc| (doc.id, doc))
            .collect();

        // Ids deleted since the last rebuild are simply absent
        Ok(ranked_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    fn lexical_search(
        &self,
        query: &str,
        limit: usize,
        warning: Option<String>,
    ) -> crate::Result<SearchOutcome> {
        let mut documents = self.store.filter_text_contains(query)?;
        documents.truncate(limit);

        Ok(SearchOutcome {
            documents,
            mode: SearchMode::Lexical,
            warning,
        })
    }

    fn install(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// The current index snapshot, if semantic search is available
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether both the embedding provider and the index are usable
    pub fn is_semantic_available(&self) -> bool {
        self.provider.is_some() && self.snapshot().is_some()
    }

    /// Number of documents in the current index
    pub fn indexed_count(&self) -> usize {
        self.snapshot()
            .map(|snapshot| snapshot.document_ids.len())
            .unwrap_or(0)
    }

    /// Name of the loaded embedding model
    pub fn model_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|provider| provider.model_name())
    }
}

impl DocumentObserver for DocumentSearchService {
    fn on_documents_changed(&self, change: &DocumentChange) -> anyhow::Result<()> {
        if self.provider.is_none() {
            return Ok(());
        }

        tracing::debug!("Rebuilding index after {:?}", change);
        self.rebuild_index()?;
        Ok(())
    }
}
