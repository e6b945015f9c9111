/// Flat (exhaustive) L2 vector index
use ndarray::{Array2, ArrayView1, Axis};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"SNDV";
const FORMAT_VERSION: u32 = 1;
/// magic + version + blake3 checksum
const HEADER_LEN: usize = 4 + 4 + 32;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Corrupt index file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Search hit: insertion position and squared Euclidean distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Exhaustive nearest-neighbour index over squared L2 distance
///
/// Vectors are stored row by row; a vector's row number is its position.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Array2<f32>,
}

impl FlatIndex {
    /// Create an empty index of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dimension)),
        }
    }

    /// Append vectors; their order defines their positions
    ///
    /// Every vector is checked before any is appended, so a failed call
    /// leaves the index unchanged.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), VectorIndexError> {
        let dimension = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(VectorIndexError::InvalidDimension {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.vectors.reserve_rows(vectors.len()).map_err(|e| {
            VectorIndexError::SerializationError(format!("Failed to grow index: {}", e))
        })?;
        for vector in vectors {
            self.vectors
                .push_row(ArrayView1::from(vector.as_slice()))
                .map_err(|e| {
                    VectorIndexError::SerializationError(format!("Failed to append row: {}", e))
                })?;
        }

        Ok(())
    }

    /// Find the `k` nearest vectors to `query`
    ///
    /// Returns `min(k, len)` hits ordered by ascending distance, equal
    /// distances ordered by ascending position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorIndexError> {
        if query.len() != self.dimension() {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Neighbor> = self
            .vectors
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: row
                    .iter()
                    .zip(query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum(),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// Write the index to `path` atomically
    pub fn save(&self, path: &Path) -> Result<(), VectorIndexError> {
        let mut body = Vec::with_capacity(16 + self.vectors.len() * 4);
        body.extend_from_slice(&(self.dimension() as u64).to_le_bytes());
        body.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in self.vectors.iter() {
            body.extend_from_slice(&value.to_le_bytes());
        }

        let checksum = blake3::hash(&body);
        let compressed = zstd::encode_all(&body[..], 3)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + compressed.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(checksum.as_bytes());
        bytes.extend_from_slice(&compressed);

        write_atomically(path, &bytes)?;
        Ok(())
    }

    /// Read an index written by [`FlatIndex::save`]
    ///
    /// Fails on any I/O or format problem and when the stored dimension
    /// differs from `expected_dimension`.
    pub fn load(path: &Path, expected_dimension: usize) -> Result<Self, VectorIndexError> {
        let bytes = fs::read(path)?;
        let corrupt = |reason: &str| VectorIndexError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(corrupt("missing header"));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(corrupt(&format!("unsupported format version {}", version)));
        }

        let body = zstd::decode_all(&bytes[HEADER_LEN..]).map_err(|_| corrupt("bad compression"))?;
        if blake3::hash(&body).as_bytes() != &bytes[8..HEADER_LEN] {
            return Err(corrupt("checksum mismatch"));
        }

        if body.len() < 16 {
            return Err(corrupt("truncated body"));
        }
        let dimension = read_u64(&body[0..8]) as usize;
        let count = read_u64(&body[8..16]) as usize;

        if dimension != expected_dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: expected_dimension,
                actual: dimension,
            });
        }

        let data = &body[16..];
        let expected_len = dimension
            .checked_mul(count)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| corrupt("size overflow"))?;
        if data.len() != expected_len {
            return Err(corrupt("vector data length does not match header"));
        }

        let values: Vec<f32> = data
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let vectors = Array2::from_shape_vec((count, dimension), values)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;

        Ok(Self { vectors })
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Write to a sibling temp file, sync, then rename over `path`
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(dimension: usize, axis: usize, value: f32) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[axis] = value;
        v
    }

    #[test]
    fn test_index_creation() {
        let index = FlatIndex::new(384);
        assert_eq!(index.dimension(), 384);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_orders_by_distance() {
        let mut index = FlatIndex::new(3);
        index
            .add(&[unit(3, 0, 1.0), unit(3, 1, 1.0), vec![0.9, 0.1, 0.0]])
            .unwrap();

        let results = index.search(&unit(3, 0, 1.0), 3).unwrap();
        let positions: Vec<usize> = results.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 2, 1]);
        assert_eq!(results[0].distance, 0.0);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_squared_euclidean_distance() {
        let mut index = FlatIndex::new(2);
        index.add(&[vec![3.0, 4.0]]).unwrap();

        let results = index.search(&[0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].distance, 25.0);
    }

    #[test]
    fn test_ties_break_by_position() {
        let mut index = FlatIndex::new(2);
        index
            .add(&[
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![0.0, -1.0],
                vec![-1.0, 0.0],
            ])
            .unwrap();

        let results = index.search(&[0.0, 0.0], 4).unwrap();
        let positions: Vec<usize> = results.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_result_length_is_min_of_k_and_size() {
        let mut index = FlatIndex::new(2);
        assert!(index.search(&[0.0, 0.0], 5).unwrap().is_empty());

        index.add(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
        assert_eq!(index.search(&[0.0, 0.0], 5).unwrap().len(), 2);
        assert_eq!(index.search(&[0.0, 0.0], 1).unwrap().len(), 1);
        assert!(index.search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_validation() {
        let mut index = FlatIndex::new(4);
        index.add(&[vec![1.0; 4]]).unwrap();

        let result = index.add(&[vec![1.0; 4], vec![1.0; 3]]);
        assert!(matches!(
            result,
            Err(VectorIndexError::InvalidDimension { .. })
        ));
        // Nothing from the rejected batch was appended
        assert_eq!(index.len(), 1);

        assert!(index.search(&[1.0; 5], 1).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("vectors.vec");

        let mut index = FlatIndex::new(3);
        index
            .add(&[vec![0.5, -1.25, 3.0], vec![1.0, 2.0, 3.0]])
            .unwrap();
        index.save(&path).unwrap();

        let loaded = FlatIndex::load(&path, 3).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.search(&[1.0, 2.0, 3.0], 2).unwrap(),
            index.search(&[1.0, 2.0, 3.0], 2).unwrap()
        );
    }

    #[test]
    fn test_load_rejects_other_dimension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vectors.vec");
        FlatIndex::new(8).save(&path).unwrap();

        assert!(matches!(
            FlatIndex::load(&path, 16),
            Err(VectorIndexError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn test_load_rejects_corruption() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vectors.vec");

        let mut index = FlatIndex::new(2);
        index.add(&[vec![1.0, 2.0]]).unwrap();
        index.save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[10] ^= 0xFF; // inside the checksum
        fs::write(&path, &bytes).unwrap();
        assert!(FlatIndex::load(&path, 2).is_err());

        fs::write(&path, b"not an index").unwrap();
        assert!(matches!(
            FlatIndex::load(&path, 2),
            Err(VectorIndexError::Corrupt { .. })
        ));

        assert!(FlatIndex::load(&temp.path().join("missing.vec"), 2).is_err());
    }
}
