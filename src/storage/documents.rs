//! Document store
//!
//! The retrieval pipeline only reads documents through [`DocumentStore`].
//! [`SqliteDocumentStore`] additionally owns the write path and notifies
//! registered [`DocumentObserver`]s after every committed change.

use super::Database;
use crate::error::{Result, SanadError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{PoisonError, RwLock, Weak};

/// A stored text document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Partial update of a document, `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Committed change to the document set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentChange {
    Created(i64),
    Updated(i64),
    Deleted(i64),
}

impl DocumentChange {
    pub fn document_id(&self) -> i64 {
        match self {
            Self::Created(id) | Self::Updated(id) | Self::Deleted(id) => *id,
        }
    }
}

/// Post-commit hook invoked by the store's write path
///
/// Errors are logged by the store and never reach the writer.
pub trait DocumentObserver: Send + Sync {
    fn on_documents_changed(&self, change: &DocumentChange) -> anyhow::Result<()>;
}

/// Read access to documents
///
/// All listings use the default order: most recently created first.
pub trait DocumentStore: Send + Sync {
    /// Every document
    fn list_all(&self) -> Result<Vec<Document>>;

    /// Documents whose id is in `ids`, in default order rather than input order
    fn filter_by_ids(&self, ids: &[i64]) -> Result<Vec<Document>>;

    /// Documents whose title or content contains `needle`, ignoring case
    fn filter_text_contains(&self, needle: &str) -> Result<Vec<Document>>;

    /// Number of documents
    fn count(&self) -> Result<usize>;
}

/// Case-insensitive substring match on title or content
pub fn matches_text(document: &Document, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    document.title.to_lowercase().contains(&needle)
        || document.content.to_lowercase().contains(&needle)
}

const SELECT_COLUMNS: &str = "SELECT id, title, content, created_at, updated_at FROM documents";
const DEFAULT_ORDER: &str = "ORDER BY created_at DESC, id DESC";

/// SQLite-backed document store
pub struct SqliteDocumentStore {
    database: Database,
    observers: RwLock<Vec<Weak<dyn DocumentObserver>>>,
}

impl SqliteDocumentStore {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register a post-commit hook
    ///
    /// The store holds a weak reference so observers may own the store.
    pub fn register_observer(&self, observer: Weak<dyn DocumentObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Fetch a single document
    pub fn get(&self, id: i64) -> Result<Option<Document>> {
        let conn = self.database.get_conn()?;
        let document = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    /// Insert a document and notify observers
    pub fn create(&self, new: &NewDocument) -> Result<Document> {
        let now = Utc::now().timestamp_millis();
        let id = {
            let conn = self.database.get_conn()?;
            conn.execute(
                "INSERT INTO documents (title, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![new.title, new.content, now, now],
            )?;
            conn.last_insert_rowid()
        };

        let document = self.get(id)?.ok_or(SanadError::DocumentNotFound { id })?;
        tracing::debug!("Created document {} ({})", id, document.title);

        self.notify(DocumentChange::Created(id));
        Ok(document)
    }

    /// Apply a partial update and notify observers
    pub fn update(&self, id: i64, update: &DocumentUpdate) -> Result<Document> {
        let mut document = self.get(id)?.ok_or(SanadError::DocumentNotFound { id })?;

        if let Some(title) = &update.title {
            document.title = title.clone();
        }
        if let Some(content) = &update.content {
            document.content = content.clone();
        }
        let now = Utc::now();

        {
            let conn = self.database.get_conn()?;
            conn.execute(
                "UPDATE documents SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
                params![document.title, document.content, now.timestamp_millis(), id],
            )?;
        }
        document.updated_at = from_millis(now.timestamp_millis());

        self.notify(DocumentChange::Updated(id));
        Ok(document)
    }

    /// Delete a document and notify observers
    pub fn delete(&self, id: i64) -> Result<()> {
        let removed = {
            let conn = self.database.get_conn()?;
            conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?
        };

        if removed == 0 {
            return Err(SanadError::DocumentNotFound { id });
        }

        self.notify(DocumentChange::Deleted(id));
        Ok(())
    }

    /// Run every live observer, swallowing failures
    fn notify(&self, change: DocumentChange) {
        let observers: Vec<_> = {
            let mut observers = self
                .observers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            observers.retain(|weak| weak.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };

        for observer in observers {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| observer.on_documents_changed(&change)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        "Post-commit hook failed for document {}: {:#}",
                        change.document_id(),
                        e
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        "Post-commit hook panicked for document {}",
                        change.document_id()
                    );
                }
            }
        }
    }

    fn query_documents<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Document>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let documents = stmt
            .query_map(params, row_to_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(documents)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn list_all(&self) -> Result<Vec<Document>> {
        self.query_documents(&format!("{} {}", SELECT_COLUMNS, DEFAULT_ORDER), params![])
    }

    fn filter_by_ids(&self, ids: &[i64]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Single bound parameter regardless of id count
        let ids_json = serde_json::to_string(ids).map_err(|e| SanadError::Json {
            source: e,
            context: "Failed to encode document ids".to_string(),
        })?;
        let sql = format!(
            "{} WHERE id IN (SELECT value FROM json_each(?1)) {}",
            SELECT_COLUMNS, DEFAULT_ORDER
        );
        self.query_documents(&sql, params![ids_json])
    }

    fn filter_text_contains(&self, needle: &str) -> Result<Vec<Document>> {
        // SQLite LIKE only folds ASCII, so matching happens here
        let documents = self.list_all()?;
        Ok(documents
            .into_iter()
            .filter(|doc| matches_text(doc, needle))
            .collect())
    }

    fn count(&self) -> Result<usize> {
        let conn = self.database.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        created_at: from_millis(row.get(3)?),
        updated_at: from_millis(row.get(4)?),
    })
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}
