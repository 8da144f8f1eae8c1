//! Core data models used throughout doc-chat.
//!
//! These types represent the passages, vectors, and search results that flow
//! through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A sparse term-weight vector (parallel index/value arrays).
///
/// Indices address a fixed-size vocabulary space; an empty vector means
/// "no sparse signal" and is a valid, degraded state rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Sparse dot product. Indices need not be sorted.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }
        let (small, large) = if self.indices.len() <= other.indices.len() {
            (self, other)
        } else {
            (other, self)
        };
        let map: std::collections::HashMap<u32, f32> = large
            .indices
            .iter()
            .copied()
            .zip(large.values.iter().copied())
            .collect();
        small
            .indices
            .iter()
            .zip(small.values.iter())
            .filter_map(|(i, v)| map.get(i).map(|w| v * w))
            .sum()
    }
}

/// One indexed, retrievable chunk of a source document.
///
/// Immutable once indexed except for metadata patches; the vector fields are
/// never mutated after creation. An empty `dense_vector` or `sparse_vector`
/// means that signal was unavailable at vectorization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Opaque unique id (uuid v4 string).
    pub id: String,
    /// Origin file name.
    pub source: String,
    pub title: String,
    /// The chunk text.
    pub excerpt: String,
    /// 1-based page of origin.
    pub excerpt_page_number: u32,
    pub dense_vector: Vec<f32>,
    pub sparse_vector: SparseVector,
    /// Free-form key/value map: document_id, user_id, document_type,
    /// file_name, uploaded_at.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Passage {
    /// The non-vector projection stored as index payload.
    pub fn payload(&self) -> PassagePayload {
        PassagePayload {
            source: self.source.clone(),
            title: self.title.clone(),
            excerpt: self.excerpt.clone(),
            excerpt_page_number: self.excerpt_page_number,
            metadata: self.metadata.clone(),
        }
    }
}

/// Payload of an indexed passage as returned from search (no vectors).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassagePayload {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub excerpt_page_number: u32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A scored search hit.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub id: String,
    pub score: f32,
    pub payload: PassagePayload,
}
