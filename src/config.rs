use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/docchat.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    /// Collection the ingestion pipeline and chat retrieval write to and
    /// read from.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_openai_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            url: default_openai_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_openai_url")]
    pub url: String,
    /// Deadline for the chat turn's completion call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            url: default_openai_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_completion_model() -> String {
    "gpt-4o".to_string()
}
fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_separators() -> Vec<String> {
    vec!["\n".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidate cap per sub-query and for the fused result.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Fused results under this score are dropped.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_sparse_vocab_size")]
    pub sparse_vocab_size: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            score_threshold: default_score_threshold(),
            sparse_vocab_size: default_sparse_vocab_size(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_score_threshold() -> f32 {
    0.7
}
fn default_sparse_vocab_size() -> u32 {
    10_000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.separators.is_empty() {
        anyhow::bail!("chunking.separators must not be empty");
    }
    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.score_threshold < 0.0 {
        anyhow::bail!("retrieval.score_threshold must be >= 0");
    }
    if config.retrieval.sparse_vocab_size == 0 {
        anyhow::bail!("retrieval.sparse_vocab_size must be > 0");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.completion.timeout_secs == 0 {
        anyhow::bail!("completion.timeout_secs must be > 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_settings() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.chunking.separators, vec!["\n".to_string()]);
        assert_eq!(config.retrieval.k, 5);
        assert!((config.retrieval.score_threshold - 0.7).abs() < 1e-6);
        assert_eq!(config.embedding.dims, 1536);
        assert_eq!(config.completion.timeout_secs, 30);
        assert_eq!(config.qdrant.collection, "documents");
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [qdrant]
            url = "http://qdrant.internal:6333"
            collection = "insurance"

            [retrieval]
            k = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.qdrant.collection, "insurance");
        assert_eq!(config.retrieval.k, 8);
        assert!((config.retrieval.score_threshold - 0.7).abs() < 1e-6);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let config = Config {
            chunking: ChunkingConfig {
                chunk_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_k() {
        let config = Config {
            retrieval: RetrievalConfig {
                k: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }
}
