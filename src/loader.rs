//! Document ingestion facade.
//!
//! [`DocumentsLoader`] wires the processor, embedders, and indexer into the
//! ingestion workflow: load → chunk → embed (dense + sparse) → batched
//! upsert. Unlike the query path, ingestion errors propagate: ingestion is
//! supervised and retried by the caller, never silently dropped.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::bm25::Bm25Encoder;
use crate::config::PipelineConfig;
use crate::document::{Chunk, EmbeddingPair, IndexRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::indexer::{IndexReport, Indexer};
use crate::openai::OpenAiEmbedder;
use crate::processor::Processor;
use crate::qdrant::QdrantVectorStore;
use crate::vectorstore::VectorStore;

/// Loads, processes, and indexes documents from files, directories, and
/// uploads.
pub struct DocumentsLoader {
    config: PipelineConfig,
    processor: Processor,
    embedder: Arc<dyn EmbeddingProvider>,
    indexer: Indexer,
}

impl DocumentsLoader {
    /// Wire up the production ingestion pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the configuration is invalid or a
    /// required credential is missing.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let config = config.resolve_api_keys()?;
        let store = Arc::new(QdrantVectorStore::new(&config.indexer)?);
        Self::with_store(config, store)
    }

    /// Wire up the ingestion pipeline over an explicit store implementation.
    ///
    /// Lets tests and development setups substitute the in-memory store.
    pub fn with_store(config: PipelineConfig, store: Arc<dyn VectorStore>) -> Result<Self> {
        let processor = Processor::new(&config.processor);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedder::new(&config.embedder)?);
        let indexer = Indexer::new(config.indexer.clone(), store, config.embedder.dimension);
        info!("documents loader initialized");
        Ok(Self { config, processor, embedder, indexer })
    }

    /// Replace the embedding provider (test seam).
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Load and process every document under the configured vault directory.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentProcessing`] when the vault root cannot be
    /// read. Individual unreadable files are logged and skipped.
    pub async fn load_vault(&self) -> Result<Vec<Chunk>> {
        let vault_path = self.config.vault_path.clone();
        let chunks = self.load_path(&vault_path).await?;
        info!(count = chunks.len(), "processed vault documents");
        Ok(chunks)
    }

    /// Load and process a single file.
    pub async fn load_file(&self, path: &Path) -> Result<Vec<Chunk>> {
        let chunks = self.load_path(path).await?;
        info!(path = %path.display(), count = chunks.len(), "processed file");
        Ok(chunks)
    }

    /// Load and process every text document under a directory.
    pub async fn load_directory(&self, path: &Path) -> Result<Vec<Chunk>> {
        let chunks = self.load_path(path).await?;
        info!(path = %path.display(), count = chunks.len(), "processed directory");
        Ok(chunks)
    }

    /// Process an in-memory upload.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentProcessing`] when the bytes are not valid
    /// UTF-8.
    pub fn load_uploaded_file(&self, bytes: &[u8], filename: &str) -> Result<Vec<Chunk>> {
        let document = self.processor.load_uploaded(bytes, filename)?;
        let documents = vec![document];
        let chunks: Vec<Chunk> = self.processor.process_documents(&documents).collect();
        info!(filename, count = chunks.len(), "processed uploaded file");
        Ok(chunks)
    }

    /// Embed and index processed chunks.
    ///
    /// Fits the sparse encoder over the chunk corpus and persists its
    /// parameters beside the index, generates dense embeddings in batches,
    /// initializes the collection, and upserts in configurable batches. The
    /// store connection is released whether or not indexing succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] for an empty chunk list; embedding and
    /// store failures propagate as their own kinds.
    pub async fn index_documents(&self, chunks: &[Chunk]) -> Result<IndexReport> {
        if chunks.is_empty() {
            return Err(RagError::Config("documents list cannot be empty".to_string()));
        }

        let result = self.embed_and_index(chunks).await;
        if let Err(e) = &result {
            error!(error = %e, "indexing failed");
        }
        // Release the connection regardless of outcome.
        let _ = self.indexer.close().await;
        result
    }

    /// Delete the vector collection ahead of a full reload.
    pub async fn delete_index(&self) -> Result<()> {
        self.indexer.delete_collection().await?;
        info!("deleted index collection");
        Ok(())
    }

    async fn load_path(&self, path: &Path) -> Result<Vec<Chunk>> {
        let documents = self.processor.load_documents(path).await?;
        Ok(self.processor.process_documents(&documents).collect())
    }

    /// Generate dense and sparse embeddings for processed chunks.
    ///
    /// The dense provider splits oversized batches itself; the sparse
    /// encoder must already be fitted.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] when the provider fails or an
    /// embedding does not match the configured dimension.
    pub async fn embed_documents(
        &self,
        chunks: &[Chunk],
        sparse_encoder: &Bm25Encoder,
    ) -> Result<Vec<EmbeddingPair>> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let dense = self.embedder.embed_batch(&texts).await?;

        let dimension = self.embedder.dimensions();
        let mut pairs = Vec::with_capacity(chunks.len());
        for (chunk, dense) in chunks.iter().zip(dense) {
            if dense.len() != dimension {
                return Err(RagError::Embedding {
                    provider: "openai".to_string(),
                    message: format!(
                        "embedding for chunk '{}' has dimension {}, expected {dimension}",
                        chunk.id,
                        dense.len()
                    ),
                });
            }
            let sparse = sparse_encoder.encode_document(&chunk.text)?;
            pairs.push(EmbeddingPair {
                chunk_id: chunk.id.clone(),
                dense,
                sparse: if sparse.is_empty() { None } else { Some(sparse) },
            });
        }
        Ok(pairs)
    }

    async fn embed_and_index(&self, chunks: &[Chunk]) -> Result<IndexReport> {
        // Sparse: fit over this corpus and persist for the query process.
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let mut sparse_encoder = Bm25Encoder::new();
        sparse_encoder.fit(&texts);
        sparse_encoder.save(&self.config.sparse_params_path).await?;

        let pairs = self.embed_documents(chunks, &sparse_encoder).await?;
        let records: Vec<IndexRecord> = chunks
            .iter()
            .zip(pairs)
            .map(|(chunk, pair)| IndexRecord {
                id: pair.chunk_id,
                dense: pair.dense,
                sparse: pair.sparse,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            })
            .collect();

        self.indexer.initialize_collection().await?;
        let report = self.indexer.index_documents(records).await?;
        info!(
            records = report.records_indexed,
            batches = report.batches_total,
            failed = report.batches_failed,
            "indexed documents"
        );
        Ok(report)
    }
}
