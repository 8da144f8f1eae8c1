//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the collection lifecycle and hybrid
//! query operations the ingestion pipeline and chat session depend on,
//! keeping them decoupled from any one store. The application crate
//! provides the Qdrant implementation; [`memory::InMemoryIndex`] backs the
//! test suites.
//!
//! Failure policy per operation (mirrored by every implementation):
//!
//! | Operation | On service failure |
//! |-----------|--------------------|
//! | `ensure_collection` / `delete_collection` | error propagates |
//! | `upsert` | error propagates (hard failure, never swallowed) |
//! | `hybrid_search` | logged, degrades to an empty result list |
//! | `update_metadata` | error propagates; `Ok(false)` when nothing matches |
//! | `delete_by_document` | error propagates loudly |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Passage, ScoredPassage, SparseVector};

/// Distance function for the dense vector space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceStrategy {
    Cosine,
    Dot,
    Euclid,
}

impl DistanceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceStrategy::Cosine => "Cosine",
            DistanceStrategy::Dot => "Dot",
            DistanceStrategy::Euclid => "Euclid",
        }
    }
}

impl std::str::FromStr for DistanceStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceStrategy::Cosine),
            "dot" => Ok(DistanceStrategy::Dot),
            "euclid" => Ok(DistanceStrategy::Euclid),
            other => anyhow::bail!("unknown distance strategy: {other}"),
        }
    }
}

/// HNSW graph parameters, fixed at collection creation.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    pub m: u32,
    pub ef_construct: u32,
    pub full_scan_threshold: u32,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construct: 100,
            full_scan_threshold: 10_000,
        }
    }
}

/// Collection definition: one dense space, one sparse space.
///
/// Fixed at creation time; schema changes require delete + recreate.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub dense_size: usize,
    pub distance: DistanceStrategy,
    pub hnsw: HnswConfig,
}

impl CollectionConfig {
    pub fn new(dense_size: usize) -> Self {
        Self {
            dense_size,
            distance: DistanceStrategy::Cosine,
            hnsw: HnswConfig::default(),
        }
    }
}

/// Metadata predicate for scoping queries, patches, and deletes.
#[derive(Debug, Clone, Default)]
pub struct PassageFilter {
    pub document_id: Option<String>,
    pub user_id: Option<String>,
    pub document_type: Option<String>,
}

impl PassageFilter {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    pub fn for_document(document_id: &str, user_id: &str) -> Self {
        Self {
            document_id: Some(document_id.to_string()),
            user_id: Some(user_id.to_string()),
            document_type: None,
        }
    }

    /// Whether a passage's metadata satisfies every set field.
    pub fn matches(&self, metadata: &serde_json::Map<String, serde_json::Value>) -> bool {
        let field_matches = |key: &str, expected: &Option<String>| match expected {
            None => true,
            Some(want) => metadata
                .get(key)
                .and_then(|v| v.as_str())
                .map(|got| got == want)
                .unwrap_or(false),
        };
        field_matches("document_id", &self.document_id)
            && field_matches("user_id", &self.user_id)
            && field_matches("document_type", &self.document_type)
    }
}

/// Both halves of a hybrid query. An empty `dense` or `sparse` side simply
/// contributes no candidates from that space.
#[derive(Debug, Clone)]
pub struct HybridQuery {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    /// Candidate cap per sub-query and for the fused result.
    pub limit: usize,
    /// Fused results under this score are dropped.
    pub score_threshold: f32,
}

/// Abstract dual-space vector index.
///
/// All operations are async (via `async-trait`); implementations must be
/// `Send + Sync` so one instance can serve concurrent sessions.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist.
    ///
    /// Returns `false` without side effects when the name already exists,
    /// `true` on creation. Safe to race: duplicate attempts are no-ops.
    async fn ensure_collection(&self, name: &str, config: &CollectionConfig) -> Result<bool>;

    /// Delete a collection. Returns `false` when it did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Write or overwrite passages by id. No atomicity guarantee across a
    /// batch; callers must not treat partial failure as success.
    async fn upsert(&self, collection: &str, passages: &[Passage]) -> Result<()>;

    /// Fused sparse + dense search, at most `query.limit` results, each
    /// scoring at least `query.score_threshold`.
    async fn hybrid_search(
        &self,
        collection: &str,
        query: &HybridQuery,
        filter: Option<&PassageFilter>,
    ) -> Result<Vec<ScoredPassage>>;

    /// Merge `new_fields` into the metadata of every passage matching
    /// `filter`. Last-writer-wins; returns `false` when nothing matched.
    async fn update_metadata(
        &self,
        collection: &str,
        filter: &PassageFilter,
        new_fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool>;

    /// Remove every passage of a document owned by `user_id`.
    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: &str,
        user_id: &str,
    ) -> Result<()>;
}
