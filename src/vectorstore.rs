//! Vector store capability trait with hybrid similarity search.

use async_trait::async_trait;

use crate::document::{IndexRecord, RetrievedDocument, SparseVector};
use crate::error::Result;

/// An exact-match filter on a single metadata field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// Metadata field name.
    pub field: String,
    /// Value the field must equal.
    pub value: String,
}

/// A hybrid search request.
///
/// When `sparse` is present, dense and sparse similarities are blended as
/// `alpha * dense + (1 - alpha) * sparse`; when it is absent the search is
/// dense-only and implementations log the fallback.
#[derive(Debug, Clone)]
pub struct HybridQuery {
    /// Dense query embedding.
    pub dense: Vec<f32>,
    /// Sparse query vector, absent when no sparse encoder is available.
    pub sparse: Option<SparseVector>,
    /// Maximum number of results.
    pub top_k: usize,
    /// Dense/sparse blend weight in `[0, 1]`.
    pub alpha: f32,
    /// Optional exact-match metadata filter.
    pub filter: Option<FieldFilter>,
}

/// A storage backend for embedded chunks with hybrid similarity search.
///
/// Implementations are selected at construction time; the in-memory
/// implementation stands in for the remote store in tests and development.
/// The backend client must be safe for concurrent use by simultaneous
/// retrieval and ingestion calls.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection with the given dense dimension if it does not
    /// exist. Idempotent; a no-op when the collection is already present.
    async fn initialize_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Delete the collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Remove every record from the collection, keeping the collection itself.
    async fn delete_all(&self, name: &str) -> Result<()>;

    /// Upsert one batch of records, replacing any existing record with the
    /// same id.
    async fn upsert(&self, name: &str, records: &[IndexRecord]) -> Result<()>;

    /// Execute a hybrid similarity search.
    ///
    /// Returns results ordered by descending blended score with 1-based ranks.
    async fn hybrid_search(&self, name: &str, query: &HybridQuery)
    -> Result<Vec<RetrievedDocument>>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<()>;

    /// Release the underlying connection. Safe to call even when
    /// [`initialize_collection`](VectorStore::initialize_collection) never ran.
    async fn close(&self) -> Result<()>;
}
