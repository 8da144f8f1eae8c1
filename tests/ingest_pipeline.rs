//! Integration tests for the ingestion pipeline and the search boundary
//! operation, against the in-memory index and a deterministic vectorizer.

use anyhow::Result;
use async_trait::async_trait;

use doc_chat::config::Config;
use doc_chat::ingest::{self, DocumentType, IngestError};
use doc_chat::search;

use doc_chat_core::index::memory::InMemoryIndex;
use doc_chat_core::index::{
    CollectionConfig, HybridQuery, PassageFilter, VectorIndex,
};
use doc_chat_core::models::{Passage, ScoredPassage, SparseVector};
use doc_chat_core::sparse::SparseEncoder;
use doc_chat_core::vectorize::Vectorizer;

/// Deterministic vectorizer: byte-histogram dense embeddings and the real
/// sparse encoder. Either signal can be switched off to simulate service
/// degradation.
struct FakeVectorizer {
    encoder: SparseEncoder,
    dims: usize,
    fail_dense: bool,
    fail_sparse: bool,
}

impl FakeVectorizer {
    fn new() -> Self {
        Self {
            encoder: SparseEncoder::default(),
            dims: 8,
            fail_dense: false,
            fail_sparse: false,
        }
    }

    fn without_dense(mut self) -> Self {
        self.fail_dense = true;
        self
    }

    fn without_sparse(mut self) -> Self {
        self.fail_sparse = true;
        self
    }
}

#[async_trait]
impl Vectorizer for FakeVectorizer {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        if self.fail_dense {
            return Vec::new();
        }
        let mut v = vec![0.0f32; self.dims];
        for b in text.bytes() {
            v[(b as usize) % self.dims] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }

    fn sparse(&self, corpus: &[String]) -> Option<SparseVector> {
        if self.fail_sparse {
            return None;
        }
        self.encoder.encode(corpus)
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding.dims = 8;
    config.chunking.chunk_size = 100;
    config.chunking.chunk_overlap = 0;
    config.retrieval.score_threshold = 0.0;
    config
}

#[tokio::test]
async fn two_pages_yield_one_passage_each() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    let pages = vec!["Alpha Beta Gamma".to_string(), "Delta Epsilon".to_string()];
    let report = ingest::ingest_pages(
        &index,
        &vectorizer,
        &config,
        "u1",
        "plans.pdf",
        &pages,
        DocumentType::Project,
    )
    .await
    .unwrap();

    assert_eq!(report.passages_indexed, 2);
    assert_eq!(report.pages, 2);
    assert_eq!(report.chunks_skipped, 0);
    assert_eq!(report.document_id, "plans.pdf");

    let mut passages = index.passages(&config.qdrant.collection);
    passages.sort_by_key(|p| p.excerpt_page_number);
    assert_eq!(passages.len(), 2);
    assert_eq!(passages[0].excerpt_page_number, 1);
    assert_eq!(passages[0].excerpt, "Alpha Beta Gamma");
    assert_eq!(passages[1].excerpt_page_number, 2);
    assert_eq!(passages[1].excerpt, "Delta Epsilon");
    for p in &passages {
        assert!(!p.dense_vector.is_empty());
        assert!(!p.sparse_vector.is_empty());
        assert_eq!(p.source, "plans.pdf");
        assert_eq!(p.metadata["document_id"], "plans.pdf");
        assert_eq!(p.metadata["user_id"], "u1");
        assert_eq!(p.metadata["document_type"], "Project Document");
    }
}

#[tokio::test]
async fn empty_pages_produce_no_passages_and_no_upsert() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    let pages = vec!["".to_string(), "   \n ".to_string()];
    let report = ingest::ingest_pages(
        &index,
        &vectorizer,
        &config,
        "u1",
        "empty.pdf",
        &pages,
        DocumentType::Project,
    )
    .await
    .unwrap();

    assert_eq!(report.passages_indexed, 0);
    assert_eq!(index.upsert_calls(), 0);
    assert_eq!(index.count(&config.qdrant.collection), 0);
}

#[tokio::test]
async fn chunk_with_no_signal_is_skipped_not_fatal() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new().without_dense().without_sparse();
    let config = test_config();

    let pages = vec!["Coverage details".to_string()];
    let report = ingest::ingest_pages(
        &index,
        &vectorizer,
        &config,
        "u1",
        "plans.pdf",
        &pages,
        DocumentType::Project,
    )
    .await
    .unwrap();

    assert_eq!(report.passages_indexed, 0);
    assert_eq!(report.chunks_skipped, 1);
    assert_eq!(index.upsert_calls(), 0);
}

#[tokio::test]
async fn single_signal_chunk_is_kept_degraded() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new().without_dense();
    let config = test_config();

    let pages = vec!["Coverage details for dialysis".to_string()];
    let report = ingest::ingest_pages(
        &index,
        &vectorizer,
        &config,
        "u1",
        "plans.pdf",
        &pages,
        DocumentType::Project,
    )
    .await
    .unwrap();

    assert_eq!(report.passages_indexed, 1);
    assert_eq!(report.chunks_skipped, 0);
    let passages = index.passages(&config.qdrant.collection);
    assert!(passages[0].dense_vector.is_empty());
    assert!(!passages[0].sparse_vector.is_empty());
}

#[tokio::test]
async fn non_pdf_upload_rejected_before_any_index_call() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    let err = ingest::ingest_document(
        &index,
        &vectorizer,
        &config,
        "u1",
        "notes.txt",
        b"plain text",
        DocumentType::Project,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, IngestError::NotPdf(_)));
    assert_eq!(index.upsert_calls(), 0);
    assert_eq!(index.count(&config.qdrant.collection), 0);
}

#[tokio::test]
async fn garbage_pdf_bytes_fail_extraction() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    let err = ingest::ingest_document(
        &index,
        &vectorizer,
        &config,
        "u1",
        "broken.pdf",
        b"not a pdf at all",
        DocumentType::Project,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, IngestError::Extract(_)));
    assert_eq!(index.upsert_calls(), 0);
}

/// Index whose writes always fail, to exercise the hard-failure path.
struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn ensure_collection(&self, _: &str, _: &CollectionConfig) -> Result<bool> {
        Ok(false)
    }

    async fn delete_collection(&self, _: &str) -> Result<bool> {
        Ok(false)
    }

    async fn upsert(&self, _: &str, _: &[Passage]) -> Result<()> {
        anyhow::bail!("write refused")
    }

    async fn hybrid_search(
        &self,
        _: &str,
        _: &HybridQuery,
        _: Option<&PassageFilter>,
    ) -> Result<Vec<ScoredPassage>> {
        Ok(Vec::new())
    }

    async fn update_metadata(
        &self,
        _: &str,
        _: &PassageFilter,
        _: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool> {
        Ok(false)
    }

    async fn delete_by_document(&self, _: &str, _: &str, _: &str) -> Result<()> {
        anyhow::bail!("delete refused")
    }
}

#[tokio::test]
async fn upsert_failure_fails_the_whole_ingestion() {
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    let err = ingest::ingest_pages(
        &FailingIndex,
        &vectorizer,
        &config,
        "u1",
        "plans.pdf",
        &["Some coverage text".to_string()],
        DocumentType::Project,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, IngestError::IndexWrite(_)));
}

#[tokio::test]
async fn delete_document_propagates_index_failure() {
    let config = test_config();
    let err = ingest::delete_document(&FailingIndex, &config, "u1", "plans.pdf").await;
    assert!(err.is_err());
}

#[tokio::test]
async fn delete_document_removes_only_that_document() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    for (file, user) in [("a.pdf", "u1"), ("b.pdf", "u1"), ("a.pdf", "u2")] {
        ingest::ingest_pages(
            &index,
            &vectorizer,
            &config,
            user,
            file,
            &["Shared plan text".to_string()],
            DocumentType::Project,
        )
        .await
        .unwrap();
    }
    assert_eq!(index.count(&config.qdrant.collection), 3);

    ingest::delete_document(&index, &config, "u1", "a.pdf")
        .await
        .unwrap();

    let remaining = index.passages(&config.qdrant.collection);
    assert_eq!(remaining.len(), 2);
    assert!(remaining
        .iter()
        .all(|p| !(p.metadata["document_id"] == "a.pdf" && p.metadata["user_id"] == "u1")));
}

#[tokio::test]
async fn update_metadata_patches_matching_passages() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    ingest::ingest_pages(
        &index,
        &vectorizer,
        &config,
        "u1",
        "handbook.pdf",
        &["Plan handbook".to_string()],
        DocumentType::Repository,
    )
    .await
    .unwrap();

    let mut fields = serde_json::Map::new();
    fields.insert("title".into(), "Employee Handbook".into());
    let updated = ingest::update_document_metadata(
        &index,
        &config,
        "u1",
        "handbook.pdf",
        DocumentType::Repository,
        fields,
    )
    .await
    .unwrap();
    assert!(updated);

    let passages = index.passages(&config.qdrant.collection);
    assert_eq!(passages[0].metadata["title"], "Employee Handbook");
    assert!(passages[0].metadata.contains_key("updated_at"));

    // Wrong document type matches nothing.
    let missed = ingest::update_document_metadata(
        &index,
        &config,
        "u1",
        "handbook.pdf",
        DocumentType::Project,
        serde_json::Map::new(),
    )
    .await
    .unwrap();
    assert!(!missed);
}

#[tokio::test]
async fn search_finds_ingested_passage() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    ingest::ingest_pages(
        &index,
        &vectorizer,
        &config,
        "u1",
        "plans.pdf",
        &["Dialysis is a disqualifying condition for Gold plans".to_string()],
        DocumentType::Project,
    )
    .await
    .unwrap();

    let hits = search::search(&index, &vectorizer, &config, "u1", "dialysis gold plans", None)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].source, "plans.pdf");
    assert_eq!(hits[0].page, 1);
    assert!(hits[0].excerpt.contains("Dialysis"));

    // Another owner sees nothing.
    let other = search::search(&index, &vectorizer, &config, "u2", "dialysis gold plans", None)
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn search_on_fresh_empty_collection_returns_empty() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    index
        .ensure_collection(
            &config.qdrant.collection,
            &CollectionConfig::new(config.embedding.dims),
        )
        .await
        .unwrap();

    let hits = search::search(
        &index,
        &vectorizer,
        &config,
        "u1",
        "unrelated nonsense query",
        None,
    )
    .await
    .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    assert!(
        search::search(&index, &vectorizer, &config, "u1", "   ", None)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn search_never_returns_more_than_k() {
    let index = InMemoryIndex::new();
    let vectorizer = FakeVectorizer::new();
    let config = test_config();

    let pages: Vec<String> = (0..10)
        .map(|i| format!("Dialysis coverage clause number {i}"))
        .collect();
    ingest::ingest_pages(
        &index,
        &vectorizer,
        &config,
        "u1",
        "plans.pdf",
        &pages,
        DocumentType::Project,
    )
    .await
    .unwrap();

    let hits = search::search(&index, &vectorizer, &config, "u1", "dialysis coverage", Some(3))
        .await
        .unwrap();
    assert!(hits.len() <= 3);
}
