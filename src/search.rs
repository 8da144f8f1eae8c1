//! Hybrid search over a user's indexed passages.
//!
//! `retrieve` is the shared retrieval path: it vectorizes the query both
//! ways and runs the fused hybrid search. The chat session calls it with a
//! rewritten query; `search` is the direct boundary operation. "No results"
//! is always a valid outcome: degraded vector signals and index failures
//! end up there, never in an error the caller has to handle.

use anyhow::Result;

use doc_chat_core::index::{HybridQuery, PassageFilter, VectorIndex};
use doc_chat_core::models::ScoredPassage;
use doc_chat_core::vectorize::Vectorizer;

use crate::config::Config;

/// One row of a search response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub title: String,
    pub source: String,
    pub excerpt: String,
    pub page: u32,
    pub score: f32,
}

/// Search the owner's passages. Rejects a blank query before any external
/// call; otherwise never fails, since degraded signals yield an empty list.
pub async fn search(
    index: &dyn VectorIndex,
    vectorizer: &dyn Vectorizer,
    config: &Config,
    owner_id: &str,
    query: &str,
    k: Option<usize>,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        anyhow::bail!("query must not be empty");
    }

    let k = k.unwrap_or(config.retrieval.k);
    let filter = PassageFilter::for_user(owner_id);
    let passages = retrieve(index, vectorizer, config, query, k, Some(&filter)).await;

    Ok(passages
        .into_iter()
        .map(|p| SearchHit {
            title: p.payload.title,
            source: p.payload.source,
            excerpt: p.payload.excerpt,
            page: p.payload.excerpt_page_number,
            score: p.score,
        })
        .collect())
}

/// Vectorize `query` and run the fused hybrid search.
///
/// Both vector signals absent, or any index-level failure, degrades to an
/// empty list with a warning.
pub async fn retrieve(
    index: &dyn VectorIndex,
    vectorizer: &dyn Vectorizer,
    config: &Config,
    query: &str,
    k: usize,
    filter: Option<&PassageFilter>,
) -> Vec<ScoredPassage> {
    let dense = vectorizer.embed(query).await;
    let sparse = vectorizer
        .sparse(std::slice::from_ref(&query.to_string()))
        .unwrap_or_default();

    if dense.is_empty() && sparse.is_empty() {
        tracing::warn!("no vector signal for query; returning no results");
        return Vec::new();
    }

    let hybrid_query = HybridQuery {
        dense,
        sparse,
        limit: k,
        score_threshold: config.retrieval.score_threshold,
    };

    match index
        .hybrid_search(&config.qdrant.collection, &hybrid_query, filter)
        .await
    {
        Ok(passages) => passages,
        Err(e) => {
            tracing::warn!("hybrid search degraded to empty: {e}");
            Vec::new()
        }
    }
}
