//! Document ingestion and lifecycle.
//!
//! The pipeline: extract per-page text from the PDF bytes → chunk each page
//! → vectorize each chunk (dense + sparse) → assemble passage records →
//! ensure the collection exists → upsert the batch.
//!
//! Partial-failure policy: a chunk that yields neither a dense nor a sparse
//! signal is skipped with a warning and never aborts the document; a failed
//! batch upsert fails the whole ingestion and is reported to the caller.

use uuid::Uuid;

use doc_chat_core::chunk::{self, SplitConfig};
use doc_chat_core::index::{CollectionConfig, PassageFilter, VectorIndex};
use doc_chat_core::models::Passage;
use doc_chat_core::vectorize::Vectorizer;

use crate::config::Config;

/// Document taxonomy carried in passage metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Repository,
    Project,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Repository => "Repository Document",
            DocumentType::Project => "Project Document",
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "repository" => Ok(DocumentType::Repository),
            "project" => Ok(DocumentType::Project),
            other => anyhow::bail!("unknown document type: {other} (use repository or project)"),
        }
    }
}

/// Ingestion failure (no panic; validation errors precede any external call).
#[derive(Debug)]
pub enum IngestError {
    /// Upload rejected before any external call: only PDFs are supported.
    NotPdf(String),
    /// The PDF bytes could not be parsed into pages.
    Extract(String),
    /// Collection creation or batch upsert failed; the whole ingestion
    /// failed and nothing should be reported as success.
    IndexWrite(anyhow::Error),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::NotPdf(name) => {
                write!(f, "only PDF files are supported: {name}")
            }
            IngestError::Extract(e) => write!(f, "PDF extraction failed: {e}"),
            IngestError::IndexWrite(e) => write!(f, "index write failed: {e}"),
        }
    }
}

impl std::error::Error for IngestError {}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// The document id under which passages were indexed (the filename).
    pub document_id: String,
    pub pages: usize,
    pub passages_indexed: usize,
    /// Chunks dropped because vectorization yielded no signal at all.
    pub chunks_skipped: usize,
}

/// Ingest a PDF document for `owner_id`.
pub async fn ingest_document(
    index: &dyn VectorIndex,
    vectorizer: &dyn Vectorizer,
    config: &Config,
    owner_id: &str,
    filename: &str,
    bytes: &[u8],
    document_type: DocumentType,
) -> Result<IngestReport, IngestError> {
    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(IngestError::NotPdf(filename.to_string()));
    }

    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| IngestError::Extract(e.to_string()))?;

    ingest_pages(
        index,
        vectorizer,
        config,
        owner_id,
        filename,
        &pages,
        document_type,
    )
    .await
}

/// Ingest already-extracted page texts. Page numbers are 1-based positions
/// in `pages`; a page whose text is empty contributes no passages.
pub async fn ingest_pages(
    index: &dyn VectorIndex,
    vectorizer: &dyn Vectorizer,
    config: &Config,
    owner_id: &str,
    filename: &str,
    pages: &[String],
    document_type: DocumentType,
) -> Result<IngestReport, IngestError> {
    let split_config = SplitConfig {
        chunk_size: config.chunking.chunk_size,
        chunk_overlap: config.chunking.chunk_overlap,
        separators: config.chunking.separators.clone(),
    };

    let mut metadata = serde_json::Map::new();
    metadata.insert("document_id".into(), filename.into());
    metadata.insert("user_id".into(), owner_id.into());
    metadata.insert("document_type".into(), document_type.as_str().into());
    metadata.insert("file_name".into(), filename.into());
    metadata.insert(
        "uploaded_at".into(),
        chrono::Utc::now().to_rfc3339().into(),
    );

    let mut passages = Vec::new();
    let mut chunks_skipped = 0usize;

    for (page_index, page_text) in pages.iter().enumerate() {
        let page_number = (page_index + 1) as u32;
        for excerpt in chunk::split(page_text, &split_config) {
            let dense_vector = vectorizer.embed(&excerpt).await;
            let sparse_vector = vectorizer.sparse(std::slice::from_ref(&excerpt));

            if dense_vector.is_empty() && sparse_vector.is_none() {
                tracing::warn!(
                    "skipping chunk on page {page_number} of '{filename}': no vector signal"
                );
                chunks_skipped += 1;
                continue;
            }

            passages.push(Passage {
                id: Uuid::new_v4().to_string(),
                source: filename.to_string(),
                title: filename.to_string(),
                excerpt,
                excerpt_page_number: page_number,
                dense_vector,
                sparse_vector: sparse_vector.unwrap_or_default(),
                metadata: metadata.clone(),
            });
        }
    }

    index
        .ensure_collection(
            &config.qdrant.collection,
            &CollectionConfig::new(config.embedding.dims),
        )
        .await
        .map_err(IngestError::IndexWrite)?;

    if !passages.is_empty() {
        index
            .upsert(&config.qdrant.collection, &passages)
            .await
            .map_err(IngestError::IndexWrite)?;
    }

    tracing::info!(
        "ingested '{filename}' for user '{owner_id}': {} passages across {} pages ({} skipped)",
        passages.len(),
        pages.len(),
        chunks_skipped
    );

    Ok(IngestReport {
        document_id: filename.to_string(),
        pages: pages.len(),
        passages_indexed: passages.len(),
        chunks_skipped,
    })
}

/// Remove every passage of a document owned by `owner_id`. Transport errors
/// propagate; deleting a document that was never indexed is a no-op.
pub async fn delete_document(
    index: &dyn VectorIndex,
    config: &Config,
    owner_id: &str,
    document_id: &str,
) -> anyhow::Result<()> {
    index
        .delete_by_document(&config.qdrant.collection, document_id, owner_id)
        .await
}

/// Merge `new_fields` into the metadata of a document's passages, stamping
/// `updated_at`. Returns `false` when no passage matched.
pub async fn update_document_metadata(
    index: &dyn VectorIndex,
    config: &Config,
    owner_id: &str,
    document_id: &str,
    document_type: DocumentType,
    new_fields: serde_json::Map<String, serde_json::Value>,
) -> anyhow::Result<bool> {
    let mut fields = new_fields;
    fields.insert(
        "updated_at".into(),
        chrono::Utc::now().to_rfc3339().into(),
    );

    let filter = PassageFilter {
        document_id: Some(document_id.to_string()),
        user_id: Some(owner_id.to_string()),
        document_type: Some(document_type.as_str().to_string()),
    };

    index
        .update_metadata(&config.qdrant.collection, &filter, &fields)
        .await
}
