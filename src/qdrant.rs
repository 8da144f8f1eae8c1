//! Qdrant-backed [`VectorIndex`].
//!
//! A thin adapter over the Qdrant REST API that keeps the rest of the
//! application decoupled from the store: one named collection with a dense
//! space (`dense_vector`) and a sparse space (`sparse_vector`), hybrid
//! queries issued as two concurrent sub-queries fused client-side with the
//! same distribution-based rule the in-memory index uses.
//!
//! Search failures degrade to empty results (logged); write and delete
//! failures propagate.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use doc_chat_core::fusion;
use doc_chat_core::index::{CollectionConfig, HybridQuery, PassageFilter, VectorIndex};
use doc_chat_core::models::{Passage, PassagePayload, ScoredPassage};

use crate::config::QdrantConfig;

pub struct QdrantIndex {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantIndex {
    /// Build a client from configuration. `QDRANT_API_KEY` is read from the
    /// environment when present.
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: std::env::var("QDRANT_API_KEY").ok(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .request(reqwest::Method::GET, &format!("/collections/{name}"))
            .send()
            .await
            .context("qdrant collection probe failed")?;
        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => {
                let body = response.text().await.unwrap_or_default();
                bail!("qdrant collection probe error {s}: {body}")
            }
        }
    }

    /// Run one sub-query against a named vector space.
    async fn query_space(
        &self,
        collection: &str,
        space: &str,
        query: serde_json::Value,
        limit: usize,
        filter: Option<&PassageFilter>,
    ) -> Result<Vec<ScoredPassage>> {
        let mut body = serde_json::json!({
            "query": query,
            "using": space,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(f) = filter.and_then(filter_json) {
            body["filter"] = f;
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/query"),
            )
            .json(&body)
            .send()
            .await
            .with_context(|| format!("qdrant {space} query failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("qdrant {space} query error {status}: {body_text}");
        }

        let json: serde_json::Value = response.json().await?;
        Ok(parse_scored_points(
            json.pointer("/result/points").unwrap_or(&serde_json::Value::Null),
        ))
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self, name: &str, config: &CollectionConfig) -> Result<bool> {
        if self.collection_exists(name).await? {
            tracing::debug!("collection '{name}' already exists");
            return Ok(false);
        }

        let body = serde_json::json!({
            "vectors": {
                "dense_vector": {
                    "size": config.dense_size,
                    "distance": config.distance.as_str(),
                }
            },
            "sparse_vectors": {
                "sparse_vector": { "index": { "on_disk": false } }
            },
            "hnsw_config": {
                "m": config.hnsw.m,
                "ef_construct": config.hnsw.ef_construct,
                "full_scan_threshold": config.hnsw.full_scan_threshold,
                "max_indexing_threads": 0,
                "on_disk": false,
            },
        });

        let response = self
            .request(reqwest::Method::PUT, &format!("/collections/{name}"))
            .json(&body)
            .send()
            .await
            .context("qdrant create collection failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("qdrant create collection error {status}: {body_text}");
        }

        tracing::info!("collection '{name}' created");
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/collections/{name}"))
            .send()
            .await
            .context("qdrant delete collection failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("qdrant delete collection error {status}: {body_text}");
        }

        let json: serde_json::Value = response.json().await?;
        Ok(json.get("result").and_then(|r| r.as_bool()).unwrap_or(false))
    }

    async fn upsert(&self, collection: &str, passages: &[Passage]) -> Result<()> {
        if passages.is_empty() {
            return Ok(());
        }

        let points: Vec<serde_json::Value> = passages.iter().map(point_json).collect();
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{collection}/points?wait=true"),
            )
            .json(&serde_json::json!({ "points": points }))
            .send()
            .await
            .context("qdrant upsert failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("qdrant upsert error {status}: {body_text}");
        }

        tracing::info!(
            "upserted {} passages into collection '{collection}'",
            passages.len()
        );
        Ok(())
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        query: &HybridQuery,
        filter: Option<&PassageFilter>,
    ) -> Result<Vec<ScoredPassage>> {
        let sparse_query = async {
            if query.sparse.is_empty() {
                return Vec::new();
            }
            let q = serde_json::json!({
                "indices": query.sparse.indices,
                "values": query.sparse.values,
            });
            match self
                .query_space(collection, "sparse_vector", q, query.limit, filter)
                .await
            {
                Ok(points) => points,
                Err(e) => {
                    tracing::warn!("sparse search degraded to empty: {e}");
                    Vec::new()
                }
            }
        };

        let dense_query = async {
            if query.dense.is_empty() {
                return Vec::new();
            }
            let q = serde_json::json!(query.dense);
            match self
                .query_space(collection, "dense_vector", q, query.limit, filter)
                .await
            {
                Ok(points) => points,
                Err(e) => {
                    tracing::warn!("dense search degraded to empty: {e}");
                    Vec::new()
                }
            }
        };

        let (sparse_candidates, dense_candidates) = tokio::join!(sparse_query, dense_query);

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
        // Read one matching point to merge against; matching passages of a
        // document share their metadata.
        let mut scroll_body = serde_json::json!({ "limit": 1, "with_payload": true });
        if let Some(f) = filter_json(filter) {
            scroll_body["filter"] = f;
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/scroll"),
            )
            .json(&scroll_body)
            .send()
            .await
            .context("qdrant scroll failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("qdrant scroll error {status}: {body_text}");
        }

        let json: serde_json::Value = response.json().await?;
        let existing = match json
            .pointer("/result/points/0/payload/metadata")
            .and_then(|m| m.as_object())
        {
            Some(metadata) => metadata.clone(),
            None => return Ok(false),
        };

        let mut merged = existing;
        for (key, value) in new_fields {
            merged.insert(key.clone(), value.clone());
        }

        let mut payload_body = serde_json::json!({
            "payload": { "metadata": serde_json::Value::Object(merged) },
        });
        if let Some(f) = filter_json(filter) {
            payload_body["filter"] = f;
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/payload"),
            )
            .json(&payload_body)
            .send()
            .await
            .context("qdrant set payload failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("qdrant set payload error {status}: {body_text}");
        }

        Ok(true)
    }

    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let filter = PassageFilter::for_document(document_id, user_id);
        let mut body = serde_json::json!({});
        if let Some(f) = filter_json(&filter) {
            body["filter"] = f;
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/delete?wait=true"),
            )
            .json(&body)
            .send()
            .await
            .context("qdrant delete points failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("qdrant delete points error {status}: {body_text}");
        }

        tracing::info!("deleted passages of document '{document_id}' for user '{user_id}'");
        Ok(())
    }
}

/// Render a [`PassageFilter`] as a Qdrant `must` filter over payload
/// metadata keys. `None` when the filter is empty.
fn filter_json(filter: &PassageFilter) -> Option<serde_json::Value> {
    let mut must = Vec::new();
    let mut push = |key: &str, value: &Option<String>| {
        if let Some(v) = value {
            must.push(serde_json::json!({
                "key": format!("metadata.{key}"),
                "match": { "value": v },
            }));
        }
    };
    push("document_id", &filter.document_id);
    push("user_id", &filter.user_id);
    push("document_type", &filter.document_type);

    if must.is_empty() {
        None
    } else {
        Some(serde_json::json!({ "must": must }))
    }
}

/// Render a passage as a Qdrant point. Absent vector signals are omitted
/// from the point body rather than sent empty.
fn point_json(passage: &Passage) -> serde_json::Value {
    let mut vector = serde_json::Map::new();
    if !passage.dense_vector.is_empty() {
        vector.insert("dense_vector".into(), serde_json::json!(passage.dense_vector));
    }
    if !passage.sparse_vector.is_empty() {
        vector.insert(
            "sparse_vector".into(),
            serde_json::json!({
                "indices": passage.sparse_vector.indices,
                "values": passage.sparse_vector.values,
            }),
        );
    }

    serde_json::json!({
        "id": passage.id,
        "vector": vector,
        "payload": {
            "source": passage.source,
            "title": passage.title,
            "excerpt": passage.excerpt,
            "excerpt_page_number": passage.excerpt_page_number,
            "metadata": passage.metadata,
        },
    })
}

fn parse_scored_points(points: &serde_json::Value) -> Vec<ScoredPassage> {
    let Some(points) = points.as_array() else {
        return Vec::new();
    };
    points
        .iter()
        .filter_map(|point| {
            let id = match point.get("id") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => return None,
            };
            let score = point.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
            let payload = point
                .get("payload")
                .cloned()
                .map(|p| serde_json::from_value::<PassagePayload>(p).unwrap_or_default())
                .unwrap_or_default();
            Some(ScoredPassage { id, score, payload })
        })
        .collect()
}
