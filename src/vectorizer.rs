//! Service-backed [`Vectorizer`]: remote dense embeddings plus the
//! in-process sparse TF-IDF encoder.

use async_trait::async_trait;

use doc_chat_core::models::SparseVector;
use doc_chat_core::sparse::SparseEncoder;
use doc_chat_core::vectorize::Vectorizer;

use crate::embedding::EmbeddingClient;

pub struct ServiceVectorizer {
    embedding: EmbeddingClient,
    encoder: SparseEncoder,
}

impl ServiceVectorizer {
    pub fn new(embedding: EmbeddingClient, sparse_vocab_size: u32) -> Self {
        Self {
            embedding,
            encoder: SparseEncoder::new(sparse_vocab_size),
        }
    }
}

#[async_trait]
impl Vectorizer for ServiceVectorizer {
    fn dims(&self) -> usize {
        self.embedding.dims()
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        self.embedding.embed(text).await
    }

    fn sparse(&self, corpus: &[String]) -> Option<SparseVector> {
        self.encoder.encode(corpus)
    }
}
