//! Recursive-character text chunker.
//!
//! Splits extracted document text into bounded-size chunks by trying a
//! ladder of separators, coarsest first. For each separator the pieces are
//! greedily packed into chunks of at most `chunk_size` characters (counting
//! one joining character per piece); the first separator whose chunks all
//! fit wins. If no separator produces fitting chunks the whole text is
//! returned as a single oversized chunk, an accepted violation of the size
//! bound, not an error.
//!
//! Overlap policy: once a chunk set is accepted, every chunk after the
//! first is prefixed with the trailing `chunk_overlap` characters of its
//! predecessor, snapped to a char boundary and advanced to a word boundary.
//! This can push a chunk past `chunk_size` by up to the overlap length.
//!
//! All lengths are in characters, not bytes, so multi-byte input never
//! splits inside a code point.

/// Chunking parameters.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters of the previous chunk to prefix onto the next.
    pub chunk_overlap: usize,
    /// Separators in priority order, coarsest first. An empty string is the
    /// give-up rung: it leaves the text unsplit.
    pub separators: Vec<String>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                " ".to_string(),
                String::new(),
            ],
        }
    }
}

/// Split `text` into chunks. Pure function of its inputs.
///
/// Empty or whitespace-only input yields an empty list. Input at or under
/// `chunk_size` characters yields exactly one trimmed chunk.
pub fn split(text: &str, config: &SplitConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if char_len(text) <= config.chunk_size {
        return vec![text.trim().to_string()];
    }

    for sep in &config.separators {
        let pieces: Vec<&str> = if sep.is_empty() {
            vec![text]
        } else {
            text.split(sep.as_str()).collect()
        };

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for piece in pieces {
            let piece_len = char_len(piece);
            if current_len + piece_len + 1 > config.chunk_size {
                push_trimmed(&mut chunks, &current);
                current = piece.to_string();
                current_len = piece_len;
            } else {
                if !current.is_empty() {
                    current.push_str(sep);
                    current_len += char_len(sep);
                }
                current.push_str(piece);
                current_len += piece_len;
            }
        }
        push_trimmed(&mut chunks, &current);

        if chunks.iter().all(|c| char_len(c) <= config.chunk_size) {
            return apply_overlap(chunks, config.chunk_overlap);
        }
    }

    // No separator yielded fitting chunks; return the text whole.
    vec![text.trim().to_string()]
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn apply_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut result = Vec::with_capacity(chunks.len());
    result.push(chunks[0].clone());

    for i in 1..chunks.len() {
        let prev = &chunks[i - 1];
        let tail = overlap_tail(prev, overlap);
        if tail.is_empty() {
            result.push(chunks[i].clone());
        } else {
            result.push(format!("{} {}", tail, chunks[i]));
        }
    }

    result
}

/// The trailing `overlap` characters of `chunk`, advanced to a word
/// boundary when the cut lands mid-word.
fn overlap_tail(chunk: &str, overlap: usize) -> &str {
    let total = char_len(chunk);
    let skip = total.saturating_sub(overlap);
    let cut = if skip == 0 {
        0
    } else {
        chunk
            .char_indices()
            .nth(skip)
            .map(|(b, _)| b)
            .unwrap_or(chunk.len())
    };
    let mut tail = &chunk[cut..];
    if cut > 0 {
        // Mid-text cut: start the overlap at the next word.
        if let Some(pos) = tail.find(char::is_whitespace) {
            tail = &tail[pos..];
        } else {
            return "";
        }
    }
    tail.trim()
}

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}
