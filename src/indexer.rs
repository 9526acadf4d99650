//! Collection lifecycle and batched upserts.
//!
//! The [`Indexer`] owns the vector collection: it creates and deletes it and
//! splits ingestion into bounded-concurrency upsert batches. Ingestion is
//! best-effort per batch, not atomic across a call: a failed batch is logged
//! and the remaining batches continue, and the returned [`IndexReport`] tells
//! the caller how many batches made it.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::IndexerConfig;
use crate::document::{IndexRecord, RetrievedDocument};
use crate::error::{RagError, Result};
use crate::vectorstore::{HybridQuery, VectorStore};

/// Upsert batches in flight at once.
const MAX_CONCURRENT_BATCHES: usize = 4;

/// Outcome of a batched ingestion call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexReport {
    /// Total number of batches issued.
    pub batches_total: usize,
    /// Batches that failed and were skipped.
    pub batches_failed: usize,
    /// Records successfully upserted.
    pub records_indexed: usize,
}

/// Owns the vector collection and the upsert batching policy.
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    config: IndexerConfig,
    dimension: usize,
}

impl Indexer {
    /// Create an indexer over the given store.
    ///
    /// `dimension` is the dense embedding dimensionality used when the
    /// collection has to be created.
    pub fn new(config: IndexerConfig, store: Arc<dyn VectorStore>, dimension: usize) -> Self {
        Self { store, config, dimension }
    }

    /// The configured collection name.
    pub fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    /// Create the collection if absent. Idempotent.
    pub async fn initialize_collection(&self) -> Result<()> {
        self.store.initialize_collection(&self.config.collection_name, self.dimension).await
    }

    /// Delete the collection entirely.
    pub async fn delete_collection(&self) -> Result<()> {
        self.store.delete_collection(&self.config.collection_name).await
    }

    /// Wipe all records, keeping the collection. Used before a full reload.
    pub async fn delete_all(&self) -> Result<()> {
        self.store.delete_all(&self.config.collection_name).await
    }

    /// Upsert records in batches with bounded concurrency.
    ///
    /// Batch order is not significant; every record carries its own id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Connection`] only when every batch failed;
    /// partial failures are reported through the [`IndexReport`].
    pub async fn index_documents(&self, records: Vec<IndexRecord>) -> Result<IndexReport> {
        let batch_size = self.config.batch_size.max(1);
        let batches: Vec<Vec<IndexRecord>> =
            records.chunks(batch_size).map(<[IndexRecord]>::to_vec).collect();
        let batches_total = batches.len();

        let outcomes: Vec<usize> = stream::iter(batches.into_iter().enumerate())
            .map(|(batch_index, batch)| {
                let store = Arc::clone(&self.store);
                let collection = self.config.collection_name.clone();
                async move {
                    let count = batch.len();
                    match store.upsert(&collection, &batch).await {
                        Ok(()) => Some(count),
                        Err(e) => {
                            error!(batch_index, count, error = %e, "upsert batch failed, continuing");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_BATCHES)
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await;

        let batches_failed = batches_total - outcomes.len();
        let records_indexed = outcomes.iter().sum();

        if batches_total > 0 && batches_failed == batches_total {
            return Err(RagError::Connection {
                backend: "indexer".to_string(),
                message: format!("all {batches_total} upsert batches failed"),
            });
        }

        info!(
            collection = %self.config.collection_name,
            batches_total,
            batches_failed,
            records_indexed,
            "indexed documents"
        );
        Ok(IndexReport { batches_total, batches_failed, records_indexed })
    }

    /// Execute a hybrid search against the collection.
    pub async fn hybrid_search(&self, query: &HybridQuery) -> Result<Vec<RetrievedDocument>> {
        self.store.hybrid_search(&self.config.collection_name, query).await
    }

    /// Check that the store is reachable.
    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }

    /// Release the underlying connection. Safe without prior initialization.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::inmemory::InMemoryVectorStore;

    fn record(id: &str) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            dense: vec![1.0, 0.0],
            sparse: None,
            text: format!("text for {id}"),
            metadata: HashMap::new(),
        }
    }

    fn indexer(store: Arc<InMemoryVectorStore>) -> Indexer {
        let config = IndexerConfig { batch_size: 2, ..IndexerConfig::default() };
        Indexer::new(config, store, 2)
    }

    #[tokio::test]
    async fn report_counts_batches_and_records() {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = indexer(Arc::clone(&store));
        indexer.initialize_collection().await.unwrap();

        let records: Vec<IndexRecord> =
            (0..5).map(|i| record(&format!("chunk_{i}"))).collect();
        let report = indexer.index_documents(records).await.unwrap();

        assert_eq!(report, IndexReport { batches_total: 3, batches_failed: 0, records_indexed: 5 });
        assert_eq!(store.len(indexer.collection_name()).await, 5);
    }

    #[tokio::test]
    async fn reindexing_the_same_id_keeps_one_record_with_latest_text() {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = indexer(Arc::clone(&store));
        indexer.initialize_collection().await.unwrap();

        let mut first = record("chunk_0");
        first.text = "old text".to_string();
        indexer.index_documents(vec![first]).await.unwrap();

        let mut second = record("chunk_0");
        second.text = "new text".to_string();
        indexer.index_documents(vec![second]).await.unwrap();

        assert_eq!(store.len(indexer.collection_name()).await, 1);
        let hits = indexer
            .hybrid_search(&HybridQuery {
                dense: vec![1.0, 0.0],
                sparse: None,
                top_k: 10,
                alpha: 1.0,
                filter: None,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "new text");
    }

    #[tokio::test]
    async fn ingestion_into_a_missing_collection_fails_hard() {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = indexer(store);
        // No initialize_collection: every batch fails, so the call errors.
        let err = indexer.index_documents(vec![record("chunk_0")]).await.unwrap_err();
        assert!(matches!(err, RagError::Connection { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_an_empty_report() {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = indexer(store);
        let report = indexer.index_documents(Vec::new()).await.unwrap();
        assert_eq!(report.batches_total, 0);
        assert_eq!(report.records_indexed, 0);
    }
}
