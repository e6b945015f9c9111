//! Storage layer for Sanad
//!
//! Owns the data directory, the SQLite document database and the store
//! that the retrieval pipeline reads from.

pub mod database;
pub mod documents;

use crate::error::{Result, SanadError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use database::{Database, DbPool};
pub use documents::{
    matches_text, Document, DocumentChange, DocumentObserver, DocumentStore, DocumentUpdate,
    NewDocument, SqliteDocumentStore,
};

/// Storage manager that lays out the data directory and opens the store
pub struct StorageManager {
    pub documents: Arc<SqliteDocumentStore>,
    base_path: PathBuf,
}

impl StorageManager {
    /// Create the data directory (if needed) and open the document database
    ///
    /// A relative `database_file` is resolved against `base_path`.
    pub fn new(base_path: PathBuf, database_file: &Path) -> Result<Self> {
        std::fs::create_dir_all(&base_path).map_err(|e| SanadError::Io {
            source: e,
            context: format!("Failed to create data directory: {}", base_path.display()),
        })?;

        let db_path = if database_file.is_absolute() {
            database_file.to_path_buf()
        } else {
            base_path.join(database_file)
        };
        let database = Database::new(&db_path)?;

        Ok(Self {
            documents: Arc::new(SqliteDocumentStore::new(database)),
            base_path,
        })
    }

    /// Root of the data directory
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get combined storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            document_count: self.documents.count()?,
            data_dir_size: Self::dir_size(&self.base_path)?,
        })
    }

    /// Calculate directory size recursively
    fn dir_size(path: &Path) -> Result<u64> {
        let mut size = 0u64;

        if path.is_dir() {
            for entry in std::fs::read_dir(path).map_err(|e| SanadError::Io {
                source: e,
                context: format!(
                    "Failed to read directory for size calculation: {}",
                    path.display()
                ),
            })? {
                let entry = entry.map_err(|e| SanadError::Io {
                    source: e,
                    context: "Failed to read directory entry for size calculation".to_string(),
                })?;
                let path = entry.path();

                if path.is_dir() {
                    size += Self::dir_size(&path)?;
                } else {
                    size += entry
                        .metadata()
                        .map_err(|e| SanadError::Io {
                            source: e,
                            context: format!("Failed to get file metadata: {}", path.display()),
                        })?
                        .len();
                }
            }
        }

        Ok(size)
    }
}

/// Storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub document_count: usize,
    pub data_dir_size: u64,
}

impl StorageStats {
    /// Format size as human-readable string
    pub fn format_size(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
