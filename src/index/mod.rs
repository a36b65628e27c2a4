//! In-memory similarity index over paper embeddings.
//!
//! A thin capability wrapper: append a vector, search the k nearest by
//! inner product, serialize to bytes. All I/O policy (where the bytes go,
//! when they are written) lives in [`crate::cache`], not here.
//!
//! Positions are append-only and 0-based: the n-th vector added occupies
//! position n. No deletion or compaction is defined; position n is the
//! join key into the paper metadata store for the life of the deployment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::Embedding;
use crate::{Error, Result};

/// Flat inner-product index over unit-norm vectors.
///
/// Exhaustive O(n) scan per query. Stored values round-trip exactly through
/// [`VectorIndex::to_bytes`] / [`VectorIndex::from_bytes`]: a vector added,
/// serialized, and reloaded search-matches identically.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    /// Embedding dimensions; every stored and queried vector must match.
    dimensions: usize,
    /// Stored vectors, position == insertion order.
    vectors: Vec<Vec<f32>>,
}

/// On-disk shape of a serialized index.
#[derive(Serialize, Deserialize)]
struct IndexData {
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Creates an empty index for vectors of the given dimensionality.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: Vec::new(),
        }
    }

    /// Loads a serialized index from a local file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the path does not exist (callers use
    /// this to decide whether to fetch from the remote store), or
    /// [`Error::CorruptIndex`] if the file exists but cannot be read or
    /// decoded.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "index file {} does not exist",
                path.display()
            )));
        }

        let bytes = std::fs::read(path)
            .map_err(|e| Error::CorruptIndex(format!("{}: {e}", path.display())))?;
        Self::from_bytes(&bytes)
    }

    /// Reconstructs an index from serialized bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptIndex`] if the bytes are malformed or the
    /// stored vectors disagree on dimensionality.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let data: IndexData = serde_json::from_slice(bytes)
            .map_err(|e| Error::CorruptIndex(format!("failed to decode index: {e}")))?;

        if let Some(bad) = data
            .vectors
            .iter()
            .position(|v| v.len() != data.dimensions)
        {
            return Err(Error::CorruptIndex(format!(
                "vector at position {bad} has {} dimensions, index declares {}",
                data.vectors[bad].len(),
                data.dimensions
            )));
        }

        Ok(Self {
            dimensions: data.dimensions,
            vectors: data.vectors,
        })
    }

    /// Serializes the full index to bytes.
    ///
    /// Serialization is deterministic: the same index state always produces
    /// the same bytes, so re-uploading an unchanged snapshot is idempotent.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let data = IndexData {
            dimensions: self.dimensions,
            vectors: self.vectors.clone(),
        };
        serde_json::to_vec(&data).map_err(|e| Error::OperationFailed {
            operation: "serialize_index".to_string(),
            cause: e.to_string(),
        })
    }

    /// Appends a vector and returns its assigned position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the vector does not match
    /// the index dimensionality. Never fails for well-formed input.
    pub fn add(&mut self, vector: &Embedding) -> Result<usize> {
        self.validate_dimensions(vector)?;
        self.vectors.push(vector.as_slice().to_vec());
        Ok(self.vectors.len() - 1)
    }

    /// Returns up to `k` nearest neighbors as `(score, position)` pairs,
    /// similarity descending.
    ///
    /// If the index holds fewer than `k` vectors, all of them are returned
    /// with no padding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `k` is 0 or the index is empty,
    /// [`Error::DimensionMismatch`] for a query of the wrong width.
    pub fn search(&self, query: &Embedding, k: usize) -> Result<Vec<(f32, usize)>> {
        if k == 0 {
            return Err(Error::InvalidInput("k must be positive".to_string()));
        }
        if self.vectors.is_empty() {
            return Err(Error::InvalidInput("index is empty".to_string()));
        }
        self.validate_dimensions(query)?;

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, stored)| (query.dot(stored), position))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Number of stored vectors; also the next position to be assigned.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns `true` if no vectors have been added.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Embedding dimensions the index was built with.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn validate_dimensions(&self, vector: &Embedding) -> Result<()> {
        if vector.dimensions() == self.dimensions {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.dimensions(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn embedding(dimensions: usize, seed: f32) -> Embedding {
        let raw: Vec<f32> = (0..dimensions).map(|i| (i as f32 + seed).sin()).collect();
        Embedding::new(raw).expect("valid embedding")
    }

    #[test]
    fn test_add_assigns_monotonic_positions() {
        let mut index = VectorIndex::new(8);
        for expected in 0..5 {
            let position = index.add(&embedding(8, expected as f32)).expect("add failed");
            assert_eq!(position, expected);
        }
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_add_rejects_wrong_dimensions() {
        let mut index = VectorIndex::new(8);
        let result = index.add(&embedding(4, 0.0));
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_search_returns_descending_scores() {
        let mut index = VectorIndex::new(16);
        for i in 0..5 {
            index.add(&embedding(16, i as f32)).expect("add failed");
        }

        let results = index.search(&embedding(16, 2.0), 3).expect("search failed");
        assert_eq!(results.len(), 3);
        // Exact match ranks first with similarity ~1.
        assert_eq!(results[0].1, 2);
        assert!((results[0].0 - 1.0).abs() < 1e-5);
        assert!(results[0].0 >= results[1].0);
        assert!(results[1].0 >= results[2].0);
    }

    #[test]
    fn test_search_under_k_returns_available_count() {
        let mut index = VectorIndex::new(8);
        index.add(&embedding(8, 0.0)).expect("add failed");
        index.add(&embedding(8, 1.0)).expect("add failed");

        let results = index.search(&embedding(8, 0.0), 10).expect("search failed");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_search_rejects_zero_k_and_empty_index() {
        let mut index = VectorIndex::new(8);
        assert!(matches!(
            index.search(&embedding(8, 0.0), 10),
            Err(Error::InvalidInput(_))
        ));

        index.add(&embedding(8, 0.0)).expect("add failed");
        assert!(matches!(
            index.search(&embedding(8, 0.0), 0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_round_trip_preserves_search_results() {
        let mut index = VectorIndex::new(12);
        for i in 0..7 {
            index.add(&embedding(12, i as f32)).expect("add failed");
        }

        let query = embedding(12, 3.5);
        let before = index.search(&query, 5).expect("search failed");

        let bytes = index.to_bytes().expect("serialize failed");
        let reloaded = VectorIndex::from_bytes(&bytes).expect("reload failed");
        let after = reloaded.search(&query, 5).expect("search failed");

        assert_eq!(reloaded, index);
        assert_eq!(before, after);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let mut index = VectorIndex::new(8);
        index.add(&embedding(8, 1.0)).expect("add failed");

        let first = index.to_bytes().expect("serialize failed");
        let second = index.to_bytes().expect("serialize failed");
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_distinguishes_missing_from_corrupt() {
        let dir = TempDir::new().expect("tempdir failed");

        let missing = dir.path().join("absent.idx");
        assert!(matches!(
            VectorIndex::load(&missing),
            Err(Error::NotFound(_))
        ));

        let corrupt = dir.path().join("corrupt.idx");
        std::fs::write(&corrupt, b"not an index").expect("write failed");
        assert!(matches!(
            VectorIndex::load(&corrupt),
            Err(Error::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_from_bytes_rejects_inconsistent_dimensions() {
        let bytes = br#"{"dimensions":3,"vectors":[[1.0,0.0,0.0],[1.0,0.0]]}"#;
        assert!(matches!(
            VectorIndex::from_bytes(bytes),
            Err(Error::CorruptIndex(_))
        ));
    }
}
