//! Sparse TF-IDF encoder.
//!
//! Produces the lexical half of the dual-vector representation: lowercased
//! tokens with English stop-words removed, weighted by smoothed TF-IDF over
//! the supplied corpus and L2-normalized.
//!
//! Term indices come from a fixed FNV-1a hash of the token modulo the
//! vocabulary cap, so the term-index space is identical for every call:
//! vectors produced at ingestion time and at query time always line up,
//! regardless of which corpus each call saw. For a single-text corpus the
//! IDF term is constant and the weights degenerate to normalized term
//! frequencies.

use std::collections::{HashMap, HashSet};

use crate::models::SparseVector;

/// Default vocabulary cap (term-index space size).
pub const DEFAULT_VOCAB_SIZE: u32 = 10_000;

/// Term-frequency–inverse-document-frequency encoder with a bounded,
/// call-stable vocabulary.
#[derive(Debug, Clone)]
pub struct SparseEncoder {
    vocab_size: u32,
}

impl Default for SparseEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_VOCAB_SIZE)
    }
}

impl SparseEncoder {
    pub fn new(vocab_size: u32) -> Self {
        assert!(vocab_size > 0, "vocab_size must be positive");
        Self { vocab_size }
    }

    /// Stable index of a term in the vocabulary space.
    pub fn term_index(&self, term: &str) -> u32 {
        (fnv1a(term) % u64::from(self.vocab_size)) as u32
    }

    /// Encode a corpus into one sparse vector.
    ///
    /// Document frequencies are computed over the corpus texts; term
    /// frequencies are summed across them. Returns `None` when no token
    /// survives filtering; that is the absent-signal case, never an error.
    pub fn encode(&self, corpus: &[String]) -> Option<SparseVector> {
        let docs: Vec<Vec<u32>> = corpus
            .iter()
            .map(|text| {
                tokenize(text)
                    .into_iter()
                    .map(|t| self.term_index(&t))
                    .collect()
            })
            .collect();

        let mut tf: HashMap<u32, f32> = HashMap::new();
        let mut df: HashMap<u32, usize> = HashMap::new();
        for doc in &docs {
            for &idx in doc {
                *tf.entry(idx).or_insert(0.0) += 1.0;
            }
            let unique: HashSet<u32> = doc.iter().copied().collect();
            for idx in unique {
                *df.entry(idx).or_insert(0) += 1;
            }
        }

        if tf.is_empty() {
            return None;
        }

        let n = corpus.len() as f32;
        let mut weighted: Vec<(u32, f32)> = tf
            .into_iter()
            .map(|(idx, freq)| {
                let doc_freq = df[&idx] as f32;
                let idf = ((1.0 + n) / (1.0 + doc_freq)).ln() + 1.0;
                (idx, freq * idf)
            })
            .collect();

        let norm: f32 = weighted.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for (_, w) in weighted.iter_mut() {
                *w /= norm;
            }
        }

        weighted.sort_by_key(|(idx, _)| *idx);
        let (indices, values) = weighted.into_iter().unzip();
        Some(SparseVector { indices, values })
    }
}

/// FNV-1a, 64-bit. Constants are fixed so term indices stay stable across
/// processes and builds.
fn fnv1a(term: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in term.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Lowercase, split on non-alphanumerics, keep tokens of two or more
/// characters that are not English stop-words.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() >= 2 && !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during",
    "each", "few", "for", "from", "further", "had", "has", "have", "having", "he", "her",
    "here", "hers", "herself", "him", "himself", "his", "how", "if", "in", "into", "is",
    "it", "its", "itself", "just", "me", "more", "most", "my", "myself", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours",
    "ourselves", "out", "over", "own", "same", "she", "should", "so", "some", "such",
    "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who",
    "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];
