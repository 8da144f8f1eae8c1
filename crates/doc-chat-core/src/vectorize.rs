//! Vectorizer seam.
//!
//! The application crate supplies the service-backed implementation (remote
//! dense embeddings plus the in-process [`SparseEncoder`]); tests supply
//! deterministic fakes.
//!
//! [`SparseEncoder`]: crate::sparse::SparseEncoder

use async_trait::async_trait;

use crate::models::SparseVector;

/// Produces the dense and sparse representations of a text unit.
///
/// Both sub-capabilities are treated as potentially failing: `embed`
/// returns an empty vector and `sparse` returns `None` when the signal is
/// unavailable. Neither failure is an error; callers decide whether
/// absence degrades retrieval to the other signal.
#[async_trait]
pub trait Vectorizer: Send + Sync {
    /// Dense embedding dimensionality.
    fn dims(&self) -> usize;

    /// Dense embedding of `text`; empty on service failure (logged by the
    /// implementation, never raised).
    async fn embed(&self, text: &str) -> Vec<f32>;

    /// Sparse term-weight vector over `corpus`; `None` when no signal.
    fn sparse(&self, corpus: &[String]) -> Option<SparseVector>;
}
