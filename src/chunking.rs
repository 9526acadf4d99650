//! Document chunking.
//!
//! Provides the [`Chunker`] trait and [`FixedSizeChunker`], a character-window
//! splitter with configurable overlap.

use crate::document::{Chunk, Document};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata; embeddings are
/// attached later by the ingestion pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// Every chunk except possibly the last has exactly `chunk_size` characters,
/// and each chunk after the first begins exactly `chunk_overlap` characters
/// before the previous chunk ends. For a document of `L` characters this
/// yields `ceil((L - O) / (C - O))` chunks.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk
/// inherits the parent document's metadata plus a `chunk_index` field.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk
    /// * `chunk_overlap` — characters shared between consecutive chunks;
    ///   must be less than `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size.saturating_sub(self.chunk_overlap);
        if step == 0 {
            // Invalid overlap; emit the whole document as one chunk rather
            // than looping forever. The config builder rejects this upstream.
            return vec![make_chunk(document, 0, &document.text)];
        }

        // Byte offsets of character boundaries, so windows measured in
        // characters never split a multi-byte sequence.
        let bounds: Vec<usize> =
            document.text.char_indices().map(|(i, _)| i).chain([document.text.len()]).collect();
        let char_count = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut chunk_index = 0;

        loop {
            let end = (start + self.chunk_size).min(char_count);
            chunks.push(make_chunk(document, chunk_index, &document.text[bounds[start]..bounds[end]]));
            if end == char_count {
                break;
            }
            chunk_index += 1;
            start += step;
        }

        chunks
    }
}

fn make_chunk(document: &Document, chunk_index: usize, text: &str) -> Chunk {
    let mut metadata = document.metadata.clone();
    metadata.insert("chunk_index".to_string(), chunk_index.to_string());
    if let Some(uri) = &document.source_uri {
        metadata.entry("source".to_string()).or_insert_with(|| uri.clone());
    }
    Chunk { id: format!("{}_{chunk_index}", document.id), text: text.to_string(), metadata }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            id: "doc".to_string(),
            text: text.to_string(),
            metadata: HashMap::new(),
            source_uri: None,
        }
    }

    fn expected_count(len: usize, size: usize, overlap: usize) -> usize {
        (len - overlap).div_ceil(size - overlap)
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let chunker = FixedSizeChunker::new(100, 10);
        assert!(chunker.chunk(&doc("")).is_empty());
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let chunker = FixedSizeChunker::new(100, 10);
        let chunks = chunker.chunk(&doc("hello"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!(chunks[0].id, "doc_0");
    }

    #[test]
    fn chunk_count_matches_window_formula() {
        let text = "a".repeat(1000);
        let chunker = FixedSizeChunker::new(128, 32);
        let chunks = chunker.chunk(&doc(&text));
        assert_eq!(chunks.len(), expected_count(1000, 128, 32));
    }

    #[test]
    fn consecutive_chunks_overlap_exactly() {
        let text: String = ('a'..='z').cycle().take(300).collect();
        let size = 100;
        let overlap = 25;
        let chunks = FixedSizeChunker::new(size, overlap).chunk(&doc(&text));
        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0].text.chars().skip(size - overlap).collect();
            let next_head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(prev_tail, next_head);
        }
    }

    #[test]
    fn final_chunk_is_never_contained_in_the_previous_one() {
        // 10 chars, size 4, overlap 1: starts 0, 3, 6 cover everything.
        let chunks = FixedSizeChunker::new(4, 1).chunk(&doc("0123456789"));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text, "6789");
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllö wörld ünïcödé tëxt".repeat(10);
        let chunks = FixedSizeChunker::new(16, 4).chunk(&doc(&text));
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 16);
        }
        let expected = expected_count(text.chars().count(), 16, 4);
        assert_eq!(chunks.len(), expected);
    }

    #[test]
    fn chunks_carry_index_metadata() {
        let chunks = FixedSizeChunker::new(4, 1).chunk(&doc("0123456789"));
        assert_eq!(chunks[1].metadata.get("chunk_index").map(String::as_str), Some("1"));
    }
}
