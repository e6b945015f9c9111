//! Paired on-disk artifacts for the semantic index
//!
//! The vectors file holds the [`FlatIndex`]; the mapping file holds the
//! position → document id sequence plus the checksum of the vectors file it
//! was written with. A pair only loads when both halves agree.

use crate::config::Config;
use crate::embedding::{write_atomically, FlatIndex, VectorIndexError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Index artifacts not found")]
    Missing,

    #[error("Vector index error: {0}")]
    Index(#[from] VectorIndexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mapping file error: {0}")]
    Mapping(#[from] serde_json::Error),

    #[error("Artifacts do not match: {0}")]
    Mismatch(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    dimension: usize,
    vectors_checksum: String,
    document_ids: Vec<i64>,
}

/// Locations of the vectors file and the id mapping file
#[derive(Debug, Clone)]
pub struct IndexArtifacts {
    pub vectors_path: PathBuf,
    pub mapping_path: PathBuf,
}

impl IndexArtifacts {
    pub fn new(vectors_path: impl Into<PathBuf>, mapping_path: impl Into<PathBuf>) -> Self {
        Self {
            vectors_path: vectors_path.into(),
            mapping_path: mapping_path.into(),
        }
    }

    /// Artifact paths from config, relative ones resolved under the data dir
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self::new(
            config.resolve_data_path(&config.index.vectors_file)?,
            config.resolve_data_path(&config.index.mapping_file)?,
        ))
    }

    /// Whether both files are present
    pub fn exist(&self) -> bool {
        self.vectors_path.exists() && self.mapping_path.exists()
    }

    /// Write the index and its id sequence
    pub fn save(&self, index: &FlatIndex, document_ids: &[i64]) -> Result<(), PersistError> {
        if index.len() != document_ids.len() {
            return Err(PersistError::Mismatch(format!(
                "index holds {} vectors but {} ids were given",
                index.len(),
                document_ids.len()
            )));
        }

        index.save(&self.vectors_path)?;
        let vectors_checksum = blake3::hash(&fs::read(&self.vectors_path)?)
            .to_hex()
            .to_string();

        let mapping = MappingFile {
            dimension: index.dimension(),
            vectors_checksum,
            document_ids: document_ids.to_vec(),
        };
        write_atomically(&self.mapping_path, &serde_json::to_vec(&mapping)?)?;

        tracing::debug!(
            "Saved index artifacts ({} vectors) to {} and {}",
            index.len(),
            self.vectors_path.display(),
            self.mapping_path.display()
        );
        Ok(())
    }

    /// Load both artifacts, or `None` if either is missing or invalid
    pub fn load(&self, expected_dimension: usize) -> Option<(FlatIndex, Vec<i64>)> {
        match self.try_load(expected_dimension) {
            Ok(pair) => Some(pair),
            Err(PersistError::Missing) => {
                tracing::info!("No persisted index found");
                None
            }
            Err(e) => {
                tracing::warn!("Error loading index: {}. Rebuilding...", e);
                None
            }
        }
    }

    pub(crate) fn try_load(
        &self,
        expected_dimension: usize,
    ) -> Result<(FlatIndex, Vec<i64>), PersistError> {
        if !self.exist() {
            return Err(PersistError::Missing);
        }

        let mapping: MappingFile = serde_json::from_slice(&fs::read(&self.mapping_path)?)?;
        if mapping.dimension != expected_dimension {
            return Err(PersistError::Mismatch(format!(
                "mapping dimension {} differs from embedding dimension {}",
                mapping.dimension, expected_dimension
            )));
        }

        let vectors_bytes = fs::read(&self.vectors_path)?;
        if blake3::hash(&vectors_bytes).to_hex().as_str() != mapping.vectors_checksum {
            return Err(PersistError::Mismatch(
                "mapping was written for a different vectors file".to_string(),
            ));
        }

        let index = FlatIndex::load(&self.vectors_path, expected_dimension)?;
        if index.len() != mapping.document_ids.len() {
            return Err(PersistError::Mismatch(format!(
                "{} vectors but {} document ids",
                index.len(),
                mapping.document_ids.len()
            )));
        }

        Ok((index, mapping.document_ids))
    }
}
