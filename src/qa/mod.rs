//! Question answering over retrieved documents
//!
//! Relevant documents come either from an explicit id list or from semantic
//! search. Their contents are assembled into a bounded context that is handed
//! to the generative backend; when no backend is available, or generation
//! fails, a deterministic extractive answer is produced instead.

use crate::error::Result;
use crate::generation::GenerativeAnswerer;
use crate::search::DocumentSearchService;
use crate::storage::{Document, DocumentStore};
use std::sync::Arc;

/// Documents retrieved for a question when none are named explicitly
pub const QUESTION_SEARCH_LIMIT: usize = 5;

/// Characters of each document's content placed in the generation context
pub const CONTEXT_CHARS_PER_DOCUMENT: usize = 2000;

const PREVIEW_CHARS: usize = 300;
const PREVIEW_DOCUMENTS: usize = 3;

pub const NO_RELEVANT_DOCUMENTS: &str = "Unfortunately, no relevant documents were found.";

pub const NO_MATCHING_DOCUMENTS: &str = "Unfortunately, no documents related to your question were found. \
     Please rephrase your question or try different keywords.";

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub documents: Vec<Document>,
    /// True when `text` came from the generative backend
    pub generated: bool,
}

pub struct QAService {
    search: Arc<DocumentSearchService>,
    store: Arc<dyn DocumentStore>,
    answerer: GenerativeAnswerer,
}

impl QAService {
    pub fn new(
        search: Arc<DocumentSearchService>,
        store: Arc<dyn DocumentStore>,
        answerer: GenerativeAnswerer,
    ) -> Self {
        Self {
            search,
            store,
            answerer,
        }
    }

    pub fn llm_available(&self) -> bool {
        self.answerer.is_available()
    }

    pub fn llm_backend(&self) -> Option<&str> {
        self.answerer.backend_name()
    }

    /// Answer `question` from the stored documents
    ///
    /// A non-empty `document_ids` restricts the answer to those documents
    /// (in store order); otherwise the most similar documents are used.
    pub fn answer_question(&self, question: &str, document_ids: Option<&[i64]>) -> Result<Answer> {
        let documents = match document_ids {
            Some(ids) if !ids.is_empty() => self.store.filter_by_ids(ids)?,
            _ => self.search.search_similar(question, QUESTION_SEARCH_LIMIT)?,
        };

        if documents.is_empty() {
            return Ok(Answer {
                text: NO_RELEVANT_DOCUMENTS.to_string(),
                documents,
                generated: false,
            });
        }

        if self.answerer.is_available() {
            let prompt = build_prompt(&build_context(&documents), question);
            match self.answerer.generate(&prompt) {
                Ok(text) => {
                    return Ok(Answer {
                        text,
                        documents,
                        generated: true,
                    })
                }
                Err(e) => {
                    tracing::warn!("Error generating answer with LLM: {}", e);
                }
            }
        }

        Ok(Answer {
            text: simple_answer(&documents),
            documents,
            generated: false,
        })
    }
}

/// Join documents into labeled context blocks
pub fn build_context(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| {
            format!(
                "=== Document: {} ===\n{}",
                doc.title,
                truncate_chars(&doc.content, CONTEXT_CHARS_PER_DOCUMENT)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an intelligent assistant that answers user questions based on the provided documents.\n\
         \n\
         Relevant documents:\n\
         {context}\n\
         \n\
         User question: {question}\n\
         \n\
         Please give an accurate and detailed answer to the user's question based on the information \
         in the documents above. If the answer is not in the documents, say honestly that not enough \
         information is available.\n\
         \n\
         Answer:"
    )
}

/// Extractive answer listing the first documents with a short preview
pub fn simple_answer(documents: &[Document]) -> String {
    if documents.is_empty() {
        return NO_MATCHING_DOCUMENTS.to_string();
    }

    let mut parts = vec![format!(
        "Found {} relevant document(s):\n",
        documents.len()
    )];

    for (i, doc) in documents.iter().take(PREVIEW_DOCUMENTS).enumerate() {
        let mut preview = truncate_chars(&doc.content, PREVIEW_CHARS).to_string();
        if doc.content.chars().count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        parts.push(format!("{}. {}:\n{}\n", i + 1, doc.title, preview));
    }

    if documents.len() > PREVIEW_DOCUMENTS {
        parts.push(format!(
            "\nAnd {} more relevant document(s) were found.",
            documents.len() - PREVIEW_DOCUMENTS
        ));
    }

    parts.push("\nFor more details, please refer to the full documents.".to_string());

    parts.join("\n")
}

/// First `max` characters of `text`, on a char boundary
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingCapability;
    use crate::generation::{GenerationError, TextGenerator};
    use crate::search::IndexArtifacts;
    use crate::storage::{NewDocument, StorageManager};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixed {
        output: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl TextGenerator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.to_string())
        }
    }

    struct Broken;

    impl TextGenerator for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerationError> {
            Err(GenerationError::Backend {
                status: 500,
                body: "boom".to_string(),
            })
        }
    }

    fn document(id: i64, title: &str, content: String) -> Document {
        Document {
            id,
            title: title.to_string(),
            content,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn setup(temp: &TempDir, answerer: GenerativeAnswerer) -> (StorageManager, QAService) {
        let storage =
            StorageManager::new(temp.path().to_path_buf(), Path::new("docs.sqlite")).unwrap();
        let store: Arc<dyn DocumentStore> = storage.documents.clone();
        let search = Arc::new(DocumentSearchService::new(
            Arc::clone(&store),
            EmbeddingCapability::Unavailable("test".to_string()),
            IndexArtifacts::new(temp.path().join("v.vec"), temp.path().join("m.json")),
        ));
        let qa = QAService::new(search, store, answerer);
        (storage, qa)
    }

    #[test]
    fn test_context_truncates_each_document() {
        let docs = vec![
            document(1, "Long", "a".repeat(2500)),
            document(2, "Short", "b".repeat(100)),
        ];

        let context = build_context(&docs);
        let blocks: Vec<&str> = context.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], format!("=== Document: Long ===\n{}", "a".repeat(2000)));
        assert_eq!(blocks[1], format!("=== Document: Short ===\n{}", "b".repeat(100)));
    }

    #[test]
    fn test_context_truncation_counts_characters() {
        let docs = vec![document(1, "Persian", "س".repeat(2100))];
        let context = build_context(&docs);
        let content = context.split_once('\n').unwrap().1;
        assert_eq!(content.chars().count(), 2000);
    }

    #[test]
    fn test_simple_answer_lists_three_and_counts_rest() {
        let docs: Vec<Document> = (1..=5)
            .map(|i| document(i, &format!("Doc {}", i), "x".repeat(400)))
            .collect();

        let answer = simple_answer(&docs);
        assert!(answer.starts_with("Found 5 relevant document(s):\n"));
        assert!(answer.contains("1. Doc 1:\n"));
        assert!(answer.contains("3. Doc 3:\n"));
        assert!(!answer.contains("Doc 4"));
        assert!(answer.contains(&format!("{}...", "x".repeat(300))));
        assert!(!answer.contains(&"x".repeat(301)));
        assert!(answer.contains("And 2 more relevant document(s) were found."));
        assert!(answer.ends_with("For more details, please refer to the full documents."));
    }

    #[test]
    fn test_simple_answer_short_content_has_no_ellipsis() {
        let answer = simple_answer(&[document(1, "Note", "short body".to_string())]);
        assert!(answer.contains("1. Note:\nshort body\n"));
        assert!(!answer.contains("..."));
        assert!(!answer.contains("more relevant"));
        assert_eq!(simple_answer(&[]), NO_MATCHING_DOCUMENTS);
    }

    #[test]
    fn test_no_documents_skips_generation() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let answerer = GenerativeAnswerer::with_backend(Box::new(Fixed {
            output: "generated",
            calls: Arc::clone(&calls),
        }));
        let (_storage, qa) = setup(&temp, answerer);

        let answer = qa.answer_question("anything", None).unwrap();
        assert_eq!(answer.text, NO_RELEVANT_DOCUMENTS);
        assert!(answer.documents.is_empty());
        assert!(!answer.generated);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_generated_answer_is_used() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let answerer = GenerativeAnswerer::with_backend(Box::new(Fixed {
            output: "  Paris.  ",
            calls: Arc::clone(&calls),
        }));
        let (storage, qa) = setup(&temp, answerer);
        storage
            .documents
            .create(&NewDocument::new("France", "The capital of France is Paris."))
            .unwrap();

        let answer = qa.answer_question("capital of France", None).unwrap();
        assert_eq!(answer.text, "Paris.");
        assert!(answer.generated);
        assert_eq!(answer.documents.len(), 1);
        assert!(qa.llm_available());
    }

    #[test]
    fn test_empty_generation_falls_back() {
        let temp = TempDir::new().unwrap();
        let answerer = GenerativeAnswerer::with_backend(Box::new(Fixed {
            output: "   ",
            calls: Arc::new(AtomicUsize::new(0)),
        }));
        let (storage, qa) = setup(&temp, answerer);
        storage
            .documents
            .create(&NewDocument::new("Rust", "Rust has ownership."))
            .unwrap();

        let answer = qa.answer_question("rust", None).unwrap();
        assert!(!answer.generated);
        assert!(answer.text.starts_with("Found 1 relevant document(s):"));
    }

    #[test]
    fn test_failed_generation_falls_back() {
        let temp = TempDir::new().unwrap();
        let (storage, qa) = setup(&temp, GenerativeAnswerer::with_backend(Box::new(Broken)));
        storage
            .documents
            .create(&NewDocument::new("Rust", "Rust has ownership."))
            .unwrap();

        let answer = qa.answer_question("ownership", None).unwrap();
        assert!(!answer.generated);
        assert_eq!(answer.documents.len(), 1);
    }

    #[test]
    fn test_explicit_ids_use_store_filter() {
        let temp = TempDir::new().unwrap();
        let (storage, qa) = setup(&temp, GenerativeAnswerer::unavailable());
        let a = storage
            .documents
            .create(&NewDocument::new("A", "alpha"))
            .unwrap();
        let b = storage
            .documents
            .create(&NewDocument::new("B", "beta"))
            .unwrap();
        storage
            .documents
            .create(&NewDocument::new("C", "gamma"))
            .unwrap();

        // Question text matches nothing; the ids decide
        let answer = qa
            .answer_question("unrelated", Some(&[a.id, b.id]))
            .unwrap();
        let ids: Vec<i64> = answer.documents.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        // An empty id list means "search"
        let answer = qa.answer_question("gamma", Some(&[])).unwrap();
        assert_eq!(answer.documents.len(), 1);
        assert_eq!(answer.documents[0].title, "C");
    }
}
