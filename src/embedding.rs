//! Dense embedding client.
//!
//! Calls an OpenAI-compatible `POST /embeddings` endpoint. A failed call is
//! a degraded signal, not an error: it is logged and an empty vector is
//! returned, which downstream code treats as "no dense signal". No retry is
//! performed anywhere in the pipeline.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Client for the embeddings endpoint. Requires `OPENAI_API_KEY` in the
/// environment at construction time.
pub struct EmbeddingClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    dims: usize,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
            dims: config.dims,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed one text. Empty vector on any failure.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        match self.request(text).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!("embedding request failed, continuing without dense signal: {e}");
                Vec::new()
            }
        }
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .http
            .post(format!("{}/embeddings", self.url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("embeddings API error {status}: {body_text}");
        }

        let json: serde_json::Value = response.json().await?;
        parse_embedding_response(&json)
    }
}

/// Extract `data[0].embedding` from an embeddings API response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("invalid embeddings response: missing data[0].embedding"))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}
