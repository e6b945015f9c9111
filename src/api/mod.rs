//! Request-level operations
//!
//! [`App`] is the single entry point the binary (or any other front end)
//! talks to. Request structs are validated here; the services below assume
//! well-formed input.

use crate::config::Config;
use crate::embedding::EmbeddingCapability;
use crate::error::{Result, SanadError};
use crate::generation::GenerativeAnswerer;
use crate::qa::QAService;
use crate::search::{DocumentSearchService, IndexArtifacts, SearchMode};
use crate::storage::{
    Document, DocumentStore, DocumentUpdate, NewDocument, StorageManager,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Falls back to `search.default_limit`
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<Document>,
    pub count: usize,
    pub search_type: SearchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub document_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    pub relevant_documents: Vec<Document>,
    pub documents_count: usize,
    /// A generation backend was selected, even if this answer fell back
    pub llm_used: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildResponse {
    pub documents_indexed: usize,
}

/// Snapshot of the pipeline state
#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    pub document_count: usize,
    pub data_dir_size: u64,
    pub semantic_search: bool,
    pub embedding_model: Option<String>,
    pub indexed_documents: usize,
    pub llm_backend: Option<String>,
}

pub struct App {
    config: Config,
    storage: StorageManager,
    search: Arc<DocumentSearchService>,
    qa: QAService,
}

impl App {
    /// Open storage and bring up the embedding and generation backends
    pub fn new(config: Config) -> Result<Self> {
        let embedding = EmbeddingCapability::probe(&config.embedding);
        let answerer = GenerativeAnswerer::from_config(&config.llm);
        Self::with_components(config, embedding, answerer)
    }

    /// Build the app around an already negotiated provider and answerer
    pub fn with_components(
        config: Config,
        embedding: EmbeddingCapability,
        answerer: GenerativeAnswerer,
    ) -> Result<Self> {
        let storage = StorageManager::new(config.data_dir()?, &config.storage.database_file)?;
        let store: Arc<dyn DocumentStore> = storage.documents.clone();

        let artifacts = IndexArtifacts::from_config(&config)?;
        let search = Arc::new(DocumentSearchService::new(
            Arc::clone(&store),
            embedding,
            artifacts,
        ));

        let observer: Weak<DocumentSearchService> = Arc::downgrade(&search);
        storage.documents.register_observer(observer);

        let qa = QAService::new(Arc::clone(&search), store, answerer);

        Ok(Self {
            config,
            storage,
            search,
            qa,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SanadError::validation("query", "must not be empty"));
        }

        let limit = request.limit.unwrap_or(self.config.search.default_limit);
        let max = self.config.search.max_limit;
        if limit == 0 || limit > max {
            return Err(SanadError::validation(
                "limit",
                format!("must be between 1 and {}", max),
            ));
        }

        let outcome = self.search.search(query, limit)?;

        Ok(SearchResponse {
            query: query.to_string(),
            count: outcome.documents.len(),
            results: outcome.documents,
            search_type: outcome.mode,
            warning: outcome.warning,
        })
    }

    pub fn ask(&self, request: &AskRequest) -> Result<AskResponse> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(SanadError::validation("question", "must not be empty"));
        }

        let answer = self
            .qa
            .answer_question(question, request.document_ids.as_deref())?;

        Ok(AskResponse {
            question: question.to_string(),
            answer: answer.text,
            documents_count: answer.documents.len(),
            relevant_documents: answer.documents,
            llm_used: self.qa.llm_available(),
        })
    }

    /// Re-embed every document and replace the index
    pub fn rebuild_index(&self) -> Result<RebuildResponse> {
        let documents_indexed = self
            .search
            .rebuild_index()
            .map_err(|e| SanadError::Index(e.to_string()))?;

        Ok(RebuildResponse { documents_indexed })
    }

    pub fn create_document(&self, title: &str, content: &str) -> Result<Document> {
        if title.trim().is_empty() {
            return Err(SanadError::validation("title", "must not be empty"));
        }
        self.storage
            .documents
            .create(&NewDocument::new(title.trim(), content))
    }

    pub fn update_document(&self, id: i64, update: &DocumentUpdate) -> Result<Document> {
        if matches!(&update.title, Some(title) if title.trim().is_empty()) {
            return Err(SanadError::validation("title", "must not be empty"));
        }
        self.storage.documents.update(id, update)
    }

    pub fn delete_document(&self, id: i64) -> Result<()> {
        self.storage.documents.delete(id)
    }

    pub fn get_document(&self, id: i64) -> Result<Document> {
        self.storage
            .documents
            .get(id)?
            .ok_or(SanadError::DocumentNotFound { id })
    }

    pub fn list_documents(&self) -> Result<Vec<Document>> {
        self.storage.documents.list_all()
    }

    pub fn status(&self) -> Result<AppStatus> {
        let stats = self.storage.stats()?;
        Ok(AppStatus {
            document_count: stats.document_count,
            data_dir_size: stats.data_dir_size,
            semantic_search: self.search.is_semantic_available(),
            embedding_model: self.search.model_name().map(str::to_string),
            indexed_documents: self.search.indexed_count(),
            llm_backend: self.qa.llm_backend().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingProvider};
    use crate::generation::{GenerationError, TextGenerator};
    use tempfile::TempDir;

    /// Letter-frequency embedding, enough to rank by shared vocabulary
    struct LetterProvider;

    impl EmbeddingProvider for LetterProvider {
        fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; 26];
                    let lower = text.to_lowercase();
                    let letters: Vec<usize> = lower
                        .bytes()
                        .filter(u8::is_ascii_lowercase)
                        .map(|b| (b - b'a') as usize)
                        .collect();
                    for &i in &letters {
                        v[i] += 1.0 / letters.len() as f32;
                    }
                    v
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            26
        }

        fn model_name(&self) -> &str {
            "letters"
        }
    }

    fn config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = temp.path().to_path_buf();
        config
    }

    fn semantic_app(temp: &TempDir) -> App {
        App::with_components(
            config(temp),
            EmbeddingCapability::Available(Arc::new(LetterProvider)),
            GenerativeAnswerer::unavailable(),
        )
        .unwrap()
    }

    #[test]
    fn test_search_validation() {
        let temp = TempDir::new().unwrap();
        let app = semantic_app(&temp);

        let err = app.search(&SearchRequest::new("   ")).unwrap_err();
        assert!(err.is_validation());

        let err = app.search(&SearchRequest::new("x").with_limit(0)).unwrap_err();
        assert!(err.is_validation());

        let err = app.search(&SearchRequest::new("x").with_limit(21)).unwrap_err();
        assert!(err.is_validation());

        assert!(app.search(&SearchRequest::new("x").with_limit(20)).is_ok());
    }

    #[test]
    fn test_writes_keep_index_in_sync() {
        let temp = TempDir::new().unwrap();
        let app = semantic_app(&temp);

        let first = app.create_document("Alpha", "aaaa").unwrap();
        app.create_document("Zulu", "zzzz").unwrap();
        assert_eq!(app.status().unwrap().indexed_documents, 2);

        let response = app.search(&SearchRequest::new("zzz").with_limit(1)).unwrap();
        assert_eq!(response.search_type, SearchMode::Semantic);
        assert_eq!(response.results[0].title, "Zulu");
        assert!(response.warning.is_none());

        app.delete_document(first.id).unwrap();
        assert_eq!(app.status().unwrap().indexed_documents, 1);
    }

    #[test]
    fn test_lexical_app_reports_simple() {
        let temp = TempDir::new().unwrap();
        let app = App::with_components(
            config(&temp),
            EmbeddingCapability::Unavailable("offline".to_string()),
            GenerativeAnswerer::unavailable(),
        )
        .unwrap();

        app.create_document("Lamp", "Bright LAMP oil").unwrap();
        app.create_document("Chair", "wooden").unwrap();

        let response = app.search(&SearchRequest::new("lamp")).unwrap();
        assert_eq!(response.search_type, SearchMode::Lexical);
        assert_eq!(response.count, 1);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["search_type"], "simple");

        let status = app.status().unwrap();
        assert!(!status.semantic_search);
        assert_eq!(status.document_count, 2);
        assert!(status.llm_backend.is_none());
    }

    #[test]
    fn test_ask_uses_extractive_answer() {
        let temp = TempDir::new().unwrap();
        let app = semantic_app(&temp);
        let doc = app.create_document("Tea", "Green tea is steamed.").unwrap();

        let err = app
            .ask(&AskRequest {
                question: " ".to_string(),
                document_ids: None,
            })
            .unwrap_err();
        assert!(err.is_validation());

        let response = app
            .ask(&AskRequest {
                question: "How is tea made?".to_string(),
                document_ids: Some(vec![doc.id]),
            })
            .unwrap();
        assert!(!response.llm_used);
        assert_eq!(response.documents_count, 1);
        assert!(response.answer.contains("1. Tea:"));
    }

    struct Unreachable;

    impl TextGenerator for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerationError> {
            Err(GenerationError::Backend {
                status: 503,
                body: "service unavailable".to_string(),
            })
        }
    }

    #[test]
    fn test_llm_used_reports_selected_backend_on_fallback() {
        let temp = TempDir::new().unwrap();
        let app = App::with_components(
            config(&temp),
            EmbeddingCapability::Available(Arc::new(LetterProvider)),
            GenerativeAnswerer::with_backend(Box::new(Unreachable)),
        )
        .unwrap();
        app.create_document("Tea", "Green tea is steamed.").unwrap();

        let response = app
            .ask(&AskRequest {
                question: "tea".to_string(),
                document_ids: None,
            })
            .unwrap();

        assert!(response.llm_used);
        assert!(response.answer.starts_with("Found 1 relevant document(s):"));
    }

    #[test]
    fn test_document_crud() {
        let temp = TempDir::new().unwrap();
        let app = semantic_app(&temp);

        assert!(app.create_document("  ", "body").unwrap_err().is_validation());

        let doc = app.create_document("Title", "body").unwrap();
        let updated = app
            .update_document(
                doc.id,
                &DocumentUpdate {
                    content: Some("new body".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "Title");
        assert_eq!(app.get_document(doc.id).unwrap().content, "new body");

        app.delete_document(doc.id).unwrap();
        assert!(matches!(
            app.get_document(doc.id),
            Err(SanadError::DocumentNotFound { .. })
        ));
        assert_eq!(app.rebuild_index().unwrap().documents_indexed, 0);
    }
}
