//! In-memory vector store with hybrid cosine/BM25 scoring.
//!
//! A zero-infrastructure [`VectorStore`] backed by a `HashMap` behind a
//! `tokio::sync::RwLock`, suitable for development and tests. Scoring follows
//! the same blend contract as the remote backend: cosine similarity for the
//! dense part, sparse dot product for the lexical part.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::document::{IndexRecord, RetrievedDocument};
use crate::error::{RagError, Result};
use crate::vectorstore::{HybridQuery, VectorStore};

/// An in-memory [`VectorStore`] keyed by collection name, then record id.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, HashMap<String, IndexRecord>>>,
}

impl InMemoryVectorStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection (test helper).
    pub async fn len(&self, name: &str) -> usize {
        self.collections.read().await.get(name).map_or(0, HashMap::len)
    }

    /// True when the collection holds no records.
    pub async fn is_empty(&self, name: &str) -> bool {
        self.len(name).await == 0
    }
}

/// Cosine similarity; 0.0 when either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn missing_collection(name: &str) -> RagError {
    RagError::Connection {
        backend: "in-memory".to_string(),
        message: format!("collection '{name}' does not exist"),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn initialize_collection(&self, name: &str, _dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn delete_all(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.get_mut(name).ok_or_else(|| missing_collection(name))?.clear();
        Ok(())
    }

    async fn upsert(&self, name: &str, records: &[IndexRecord]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(name).ok_or_else(|| missing_collection(name))?;
        for record in records {
            store.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn hybrid_search(
        &self,
        name: &str,
        query: &HybridQuery,
    ) -> Result<Vec<RetrievedDocument>> {
        let collections = self.collections.read().await;
        let store = collections.get(name).ok_or_else(|| missing_collection(name))?;

        let sparse_query = match &query.sparse {
            Some(sparse) if !sparse.is_empty() => Some(sparse),
            Some(_) => None,
            None => {
                warn!(collection = name, "sparse query unavailable, falling back to dense-only search");
                None
            }
        };

        let mut scored: Vec<RetrievedDocument> = store
            .values()
            .filter(|record| {
                query.filter.as_ref().is_none_or(|f| {
                    record.metadata.get(&f.field).is_some_and(|v| *v == f.value)
                })
            })
            .map(|record| {
                let dense = cosine_similarity(&record.dense, &query.dense);
                let sparse = match (sparse_query, &record.sparse) {
                    (Some(q), Some(r)) => q.dot(r),
                    _ => 0.0,
                };
                let score = match sparse_query {
                    Some(_) => query.alpha * dense + (1.0 - query.alpha) * sparse,
                    None => dense,
                };
                RetrievedDocument {
                    id: record.id.clone(),
                    text: record.text.clone(),
                    score,
                    metadata: record.metadata.clone(),
                    rank: 0,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(query.top_k);
        for (i, doc) in scored.iter_mut().enumerate() {
            doc.rank = i + 1;
        }
        Ok(scored)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
