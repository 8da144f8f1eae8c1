//! In-memory [`VectorIndex`] implementation for tests.
//!
//! Brute-force scoring behind `std::sync::RwLock`: cosine (or dot/negative
//! euclidean, per the collection's distance strategy) over the dense space,
//! sparse dot products over the sparse space, fused with the same
//! [`fusion::fuse`] rule the production adapter uses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::fusion;
use crate::models::{Passage, ScoredPassage};

use super::{CollectionConfig, DistanceStrategy, HybridQuery, PassageFilter, VectorIndex};

struct MemCollection {
    config: CollectionConfig,
    points: HashMap<String, Passage>,
}

/// In-memory dual-space index.
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, MemCollection>>,
    upsert_calls: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    /// Number of passages stored in a collection (0 when absent).
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    /// Number of `upsert` calls received, for pipeline assertions.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of a collection's passages, for pipeline assertions.
    pub fn passages(&self, collection: &str) -> Vec<Passage> {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map(|c| c.points.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Metadata of a stored passage, for patch assertions.
    pub fn metadata_of(
        &self,
        collection: &str,
        passage_id: &str,
    ) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .and_then(|c| c.points.get(passage_id))
            .map(|p| p.metadata.clone())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn dense_score(strategy: DistanceStrategy, query: &[f32], point: &[f32]) -> f32 {
    match strategy {
        DistanceStrategy::Cosine => cosine_sim(query, point),
        DistanceStrategy::Dot => query.iter().zip(point.iter()).map(|(x, y)| x * y).sum(),
        DistanceStrategy::Euclid => {
            if query.len() != point.len() {
                return 0.0;
            }
            let dist: f32 = query
                .iter()
                .zip(point.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f32>()
                .sqrt();
            -dist
        }
    }
}

fn top_k(mut candidates: Vec<ScoredPassage>, k: usize) -> Vec<ScoredPassage> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);
    candidates
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(&self, name: &str, config: &CollectionConfig) -> Result<bool> {
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(name) {
            return Ok(false);
        }
        collections.insert(
            name.to_string(),
            MemCollection {
                config: config.clone(),
                points: HashMap::new(),
            },
        );
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.write().unwrap().remove(name).is_some())
    }

    async fn upsert(&self, collection: &str, passages: &[Passage]) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write().unwrap();
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow::anyhow!("collection '{collection}' does not exist"))?;
        for passage in passages {
            col.points.insert(passage.id.clone(), passage.clone());
        }
        Ok(())
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        query: &HybridQuery,
        filter: Option<&PassageFilter>,
    ) -> Result<Vec<ScoredPassage>> {
        let collections = self.collections.read().unwrap();
        let col = match collections.get(collection) {
            Some(c) => c,
            // Missing collection is "no results", never a crash.
            None => return Ok(Vec::new()),
        };

        let matching: Vec<&Passage> = col
            .points
            .values()
            .filter(|p| filter.map(|f| f.matches(&p.metadata)).unwrap_or(true))
            .collect();

        let dense_candidates = if query.dense.is_empty() {
            Vec::new()
        } else {
            top_k(
                matching
                    .iter()
                    .filter(|p| !p.dense_vector.is_empty())
                    .map(|p| ScoredPassage {
                        id: p.id.clone(),
                        score: dense_score(col.config.distance, &query.dense, &p.dense_vector),
                        payload: p.payload(),
                    })
                    .collect(),
                query.limit,
            )
        };

        let sparse_candidates = if query.sparse.is_empty() {
            Vec::new()
        } else {
            top_k(
                matching
                    .iter()
                    .filter_map(|p| {
                        let score = query.sparse.dot(&p.sparse_vector);
                        (score > 0.0).then(|| ScoredPassage {
                            id: p.id.clone(),
                            score,
                            payload: p.payload(),
                        })
                    })
                    .collect(),
                query.limit,
            )
        };

        Ok(fusion::fuse(
            vec![sparse_candidates, dense_candidates],
            query.limit,
            query.score_threshold,
        ))
    }

    async fn update_metadata(
        &self,
        collection: &str,
        filter: &PassageFilter,
        new_fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool> {
        let mut collections = self.collections.write().unwrap();
        let col = match collections.get_mut(collection) {
            Some(c) => c,
            None => return Ok(false),
        };
        let mut matched = false;
        for passage in col.points.values_mut() {
            if filter.matches(&passage.metadata) {
                for (key, value) in new_fields {
                    passage.metadata.insert(key.clone(), value.clone());
                }
                matched = true;
            }
        }
        Ok(matched)
    }

    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let filter = PassageFilter::for_document(document_id, user_id);
        let mut collections = self.collections.write().unwrap();
        if let Some(col) = collections.get_mut(collection) {
            col.points.retain(|_, p| !filter.matches(&p.metadata));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SparseVector;

    fn passage(id: &str, user: &str, doc: &str, dense: Vec<f32>, sparse: SparseVector) -> Passage {
        let mut metadata = serde_json::Map::new();
        metadata.insert("document_id".into(), doc.into());
        metadata.insert("user_id".into(), user.into());
        metadata.insert("document_type".into(), "Project Document".into());
        Passage {
            id: id.to_string(),
            source: format!("{doc}.pdf"),
            title: format!("{doc}.pdf"),
            excerpt: format!("excerpt of {id}"),
            excerpt_page_number: 1,
            dense_vector: dense,
            sparse_vector: sparse,
            metadata,
        }
    }

    fn sparse(indices: &[u32]) -> SparseVector {
        SparseVector {
            indices: indices.to_vec(),
            values: vec![1.0; indices.len()],
        }
    }

    fn query(dense: Vec<f32>, sparse: SparseVector) -> HybridQuery {
        HybridQuery {
            dense,
            sparse,
            limit: 5,
            score_threshold: 0.0,
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let index = InMemoryIndex::new();
        let config = CollectionConfig::new(3);
        assert!(index.ensure_collection("docs", &config).await.unwrap());
        assert!(!index.ensure_collection("docs", &config).await.unwrap());
        assert_eq!(index.count("docs"), 0);
    }

    #[tokio::test]
    async fn delete_collection_reports_existence() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("docs", &CollectionConfig::new(3))
            .await
            .unwrap();
        assert!(index.delete_collection("docs").await.unwrap());
        assert!(!index.delete_collection("docs").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_into_missing_collection_fails() {
        let index = InMemoryIndex::new();
        let p = passage("p1", "u1", "d1", vec![1.0, 0.0, 0.0], sparse(&[1]));
        assert!(index.upsert("missing", &[p]).await.is_err());
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("docs", &CollectionConfig::new(3))
            .await
            .unwrap();
        let p = passage("p1", "u1", "d1", vec![1.0, 0.0, 0.0], sparse(&[1]));
        index.upsert("docs", &[p.clone()]).await.unwrap();
        index.upsert("docs", &[p]).await.unwrap();
        assert_eq!(index.count("docs"), 1);
        assert_eq!(index.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn search_on_fresh_collection_returns_empty() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("docs", &CollectionConfig::new(3))
            .await
            .unwrap();
        let hits = index
            .hybrid_search("docs", &query(vec![0.3, 0.2, 0.1], sparse(&[7, 9])), None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn search_on_missing_collection_returns_empty() {
        let index = InMemoryIndex::new();
        let hits = index
            .hybrid_search("missing", &query(vec![1.0], sparse(&[1])), None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn dense_only_query_finds_nearest_passage() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("docs", &CollectionConfig::new(3))
            .await
            .unwrap();
        index
            .upsert(
                "docs",
                &[
                    passage("near", "u1", "d1", vec![1.0, 0.0, 0.0], SparseVector::default()),
                    passage("far", "u1", "d1", vec![0.0, 1.0, 0.0], SparseVector::default()),
                ],
            )
            .await
            .unwrap();
        let hits = index
            .hybrid_search(
                "docs",
                &query(vec![0.9, 0.1, 0.0], SparseVector::default()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(hits[0].id, "near");
    }

    #[tokio::test]
    async fn passage_matching_both_signals_ranks_first() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("docs", &CollectionConfig::new(2))
            .await
            .unwrap();
        index
            .upsert(
                "docs",
                &[
                    passage("both", "u1", "d1", vec![1.0, 0.0], sparse(&[1, 2])),
                    passage("dense", "u1", "d1", vec![0.9, 0.1], SparseVector::default()),
                    passage("lexical", "u1", "d1", vec![], sparse(&[2, 3])),
                ],
            )
            .await
            .unwrap();
        let hits = index
            .hybrid_search("docs", &query(vec![1.0, 0.0], sparse(&[1, 2])), None)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "both");
    }

    #[tokio::test]
    async fn filter_scopes_results_to_owner() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("docs", &CollectionConfig::new(2))
            .await
            .unwrap();
        index
            .upsert(
                "docs",
                &[
                    passage("mine", "alice", "d1", vec![1.0, 0.0], sparse(&[1])),
                    passage("theirs", "bob", "d2", vec![1.0, 0.0], sparse(&[1])),
                ],
            )
            .await
            .unwrap();
        let filter = PassageFilter::for_user("alice");
        let hits = index
            .hybrid_search("docs", &query(vec![1.0, 0.0], sparse(&[1])), Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "mine");
    }

    #[tokio::test]
    async fn delete_by_document_removes_only_that_document() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("docs", &CollectionConfig::new(2))
            .await
            .unwrap();
        index
            .upsert(
                "docs",
                &[
                    passage("p1", "alice", "d1", vec![1.0, 0.0], sparse(&[1])),
                    passage("p2", "alice", "d1", vec![0.0, 1.0], sparse(&[2])),
                    passage("p3", "alice", "d2", vec![1.0, 1.0], sparse(&[3])),
                    passage("p4", "bob", "d1", vec![1.0, 0.0], sparse(&[1])),
                ],
            )
            .await
            .unwrap();
        index.delete_by_document("docs", "d1", "alice").await.unwrap();
        assert_eq!(index.count("docs"), 2);
        assert!(index.metadata_of("docs", "p3").is_some());
        assert!(index.metadata_of("docs", "p4").is_some());
    }

    #[tokio::test]
    async fn update_metadata_merges_fields() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("docs", &CollectionConfig::new(2))
            .await
            .unwrap();
        index
            .upsert(
                "docs",
                &[passage("p1", "alice", "d1", vec![1.0, 0.0], sparse(&[1]))],
            )
            .await
            .unwrap();

        let mut fields = serde_json::Map::new();
        fields.insert("title".into(), "Renamed".into());
        let filter = PassageFilter::for_document("d1", "alice");
        assert!(index.update_metadata("docs", &filter, &fields).await.unwrap());

        let metadata = index.metadata_of("docs", "p1").unwrap();
        assert_eq!(metadata["title"], "Renamed");
        // Untouched fields survive the merge.
        assert_eq!(metadata["user_id"], "alice");

        let miss = PassageFilter::for_document("unknown", "alice");
        assert!(!index.update_metadata("docs", &miss, &fields).await.unwrap());
    }

    #[tokio::test]
    async fn limit_and_threshold_are_enforced() {
        let index = InMemoryIndex::new();
        index
            .ensure_collection("docs", &CollectionConfig::new(2))
            .await
            .unwrap();
        let passages: Vec<Passage> = (0..20)
            .map(|i| {
                passage(
                    &format!("p{i}"),
                    "u1",
                    "d1",
                    vec![1.0, i as f32 / 20.0],
                    sparse(&[i]),
                )
            })
            .collect();
        index.upsert("docs", &passages).await.unwrap();
        let q = HybridQuery {
            dense: vec![1.0, 0.0],
            sparse: sparse(&[0, 1, 2]),
            limit: 4,
            score_threshold: 0.3,
        };
        let hits = index.hybrid_search("docs", &q, None).await.unwrap();
        assert!(hits.len() <= 4);
        for hit in &hits {
            assert!(hit.score >= 0.3);
        }
    }
}
