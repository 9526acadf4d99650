//! Data types for documents, chunks, embeddings, and retrieval results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A raw source document before chunking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

/// A bounded-length segment of a [`Document`], the unit of embedding and
/// indexing. Immutable once produced by the processor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk (`{document_id}_{chunk_index}`).
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Key-value metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: HashMap<String, String>,
}

/// A sparse lexical vector as (index, weight) pairs.
///
/// Invariant: `indices` are sorted and unique, and `indices.len() == values.len()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    /// Vocabulary indices of the non-zero terms, sorted ascending.
    pub indices: Vec<u32>,
    /// Term weights, parallel to `indices`.
    pub values: Vec<f32>,
}

impl SparseVector {
    /// True when the vector has no non-zero terms.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product with another sparse vector (both sorted by index).
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let mut sum = 0.0;
        let mut i = 0;
        let mut j = 0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// The dense and sparse embeddings computed for a single [`Chunk`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingPair {
    /// The ID of the embedded chunk.
    pub chunk_id: String,
    /// Dense semantic embedding, length equal to the configured dimension.
    pub dense: Vec<f32>,
    /// Sparse lexical embedding, absent when no sparse encoder is fitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseVector>,
}

/// The unit of upsert into a vector collection.
///
/// Records are replaced whole by `id`; re-indexing the same id overwrites
/// the previous record, it never partially mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    /// Unique record identifier (the chunk id).
    pub id: String,
    /// Dense embedding vector.
    pub dense: Vec<f32>,
    /// Sparse embedding vector, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseVector>,
    /// The original chunk text, stored alongside the vectors.
    pub text: String,
    /// Key-value metadata carried into the collection payload.
    pub metadata: HashMap<String, String>,
}

/// A document retrieved for a query, ephemeral and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// The id of the underlying index record.
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// Relevance score (higher is more relevant).
    pub score: f32,
    /// Metadata stored with the record.
    pub metadata: HashMap<String, String>,
    /// 1-based position in the final ranking.
    pub rank: usize,
}
