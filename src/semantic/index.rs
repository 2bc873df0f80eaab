//! In-memory vector index with cosine similarity search.
//!
//! Stores one org-tagged embedding per file record and serves
//! tenant-scoped nearest-neighbor queries.

use std::collections::HashMap;

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Tenant the vector belongs to; search never crosses this boundary
    pub org_id: String,
    /// The embedding vector
    pub embedding: Vec<f32>,
}

/// In-memory vector index for semantic search.
///
/// Keyed by file record id, supporting insert/overwrite/remove and
/// org-scoped cosine similarity search with score-floor filtering.
pub struct VectorIndex {
    entries: HashMap<u64, VectorEntry>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Scored candidate from the vector index.
#[derive(Debug, Clone)]
pub struct ScoredId {
    pub id: u64,
    /// Cosine similarity (higher = more relevant)
    pub score: f32,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or fully overwrite the entry for `id`.
    ///
    /// Returns an error if the embedding has the wrong dimensionality or
    /// zero norm (cannot be scored).
    pub fn insert(
        &mut self,
        id: u64,
        org_id: String,
        embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        let norm = Self::l2_norm(&embedding);
        if norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.entries.insert(id, VectorEntry { org_id, embedding });

        Ok(())
    }

    pub fn remove(&mut self, id: u64) -> Option<VectorEntry> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&VectorEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &VectorEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Tenant-scoped similarity search.
    ///
    /// The org filter is applied while scanning, before any ranking or
    /// limiting, so the candidate cap is computed only among same-tenant
    /// vectors. Results above `floor` come back sorted by score
    /// descending, at most `limit` of them.
    pub fn search(
        &self,
        query: &[f32],
        org_id: &str,
        floor: f32,
        limit: usize,
    ) -> Result<Vec<ScoredId>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = Self::l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<ScoredId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.org_id == org_id)
            .filter_map(|(id, entry)| {
                let score = Self::cosine_similarity(query, &entry.embedding, query_norm);
                if score > floor {
                    Some(ScoredId { id: *id, score })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        results.truncate(limit);

        Ok(results)
    }

    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Cosine similarity with the query norm precomputed.
    fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
        let target_norm = Self::l2_norm(target);
        if target_norm < f32::EPSILON {
            return 0.0;
        }

        let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
        dot_product / (query_norm * target_norm)
    }

    /// Bulk load entries, used when loading from storage.
    pub fn bulk_load(&mut self, entries: Vec<(u64, String, Vec<f32>)>) -> Result<(), IndexError> {
        for (id, org_id, embedding) in entries {
            self.insert(id, org_id, embedding)?;
        }
        Ok(())
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(index: &mut VectorIndex, id: u64, org: &str, embedding: Vec<f32>) {
        index.insert(id, org.to_string(), embedding).unwrap();
    }

    #[test]
    fn test_new_index() {
        let index = VectorIndex::new(768);
        assert_eq!(index.dimensions(), 768);
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = VectorIndex::new(3);
        insert(&mut index, 1, "org1", vec![1.0, 0.0, 0.0]);

        assert!(index.contains(1));
        let entry = index.get(1).unwrap();
        assert_eq!(entry.org_id, "org1");
        assert_eq!(entry.embedding, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_insert_overwrites() {
        let mut index = VectorIndex::new(3);
        insert(&mut index, 1, "org1", vec![1.0, 0.0, 0.0]);
        insert(&mut index, 1, "org1", vec![0.0, 1.0, 0.0]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(1).unwrap().embedding, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let result = index.insert(1, "org1".to_string(), vec![1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_insert_zero_norm_rejected() {
        let mut index = VectorIndex::new(3);
        let result = index.insert(1, "org1".to_string(), vec![0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_remove() {
        let mut index = VectorIndex::new(3);
        insert(&mut index, 1, "org1", vec![1.0, 0.0, 0.0]);

        assert!(index.remove(1).is_some());
        assert!(!index.contains(1));
        assert!(index.remove(1).is_none());
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let mut index = VectorIndex::new(3);
        insert(&mut index, 1, "org1", vec![1.0, 0.0, 0.0]);
        insert(&mut index, 2, "org1", vec![0.0, 1.0, 0.0]);

        let results = index.search(&[1.0, 0.1, 0.0], "org1", 0.0, 10).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_search_never_crosses_orgs() {
        let mut index = VectorIndex::new(3);
        insert(&mut index, 1, "org1", vec![1.0, 0.0, 0.0]);
        insert(&mut index, 2, "org2", vec![1.0, 0.0, 0.0]);

        let results = index.search(&[1.0, 0.0, 0.0], "org1", 0.0, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 1);

        // exact match only: a prefix of the org id is a different tenant
        let results = index.search(&[1.0, 0.0, 0.0], "org", 0.0, 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_applies_floor() {
        let mut index = VectorIndex::new(3);
        insert(&mut index, 1, "org1", vec![1.0, 0.0, 0.0]);
        insert(&mut index, 2, "org1", vec![0.0, 1.0, 0.0]);

        let results = index.search(&[1.0, 0.0, 0.0], "org1", 0.9, 10).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 1);
        assert!((results[0].score - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_score_at_floor_is_dropped() {
        let mut index = VectorIndex::new(2);
        // orthogonal vector scores exactly 0.0 against the query
        insert(&mut index, 1, "org1", vec![0.0, 1.0]);

        let results = index.search(&[1.0, 0.0], "org1", 0.0, 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_with_limit() {
        let mut index = VectorIndex::new(3);
        for i in 0..10 {
            insert(&mut index, i, "org1", vec![1.0, i as f32 * 0.1, 0.0]);
        }

        let results = index.search(&[1.0, 0.0, 0.0], "org1", 0.0, 3).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_bulk_load() {
        let mut index = VectorIndex::new(3);
        index
            .bulk_load(vec![
                (1, "org1".to_string(), vec![1.0, 0.0, 0.0]),
                (2, "org2".to_string(), vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();
        assert_eq!(index.len(), 2);
    }
}
