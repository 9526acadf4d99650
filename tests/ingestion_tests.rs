//! End-to-end ingestion tests: load → chunk → embed → index over the
//! in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use vault_rag::bm25::Bm25Encoder;
use vault_rag::config::{
    EmbedderConfig, IndexerConfig, PipelineConfig, ProcessorConfig, RetrieverConfig,
};
use vault_rag::embedding::EmbeddingProvider;
use vault_rag::error::{RagError, Result};
use vault_rag::inmemory::InMemoryVectorStore;
use vault_rag::loader::DocumentsLoader;
use vault_rag::vectorstore::{HybridQuery, VectorStore};

const DIM: usize = 4;

/// Embedder double producing a deterministic vector per text.
struct HashingEmbedder;

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; DIM];
        for (i, byte) in text.bytes().enumerate() {
            v[i % DIM] += f32::from(byte) / 255.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

fn test_config(dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig::builder()
        .processor(ProcessorConfig { chunk_size: 64, chunk_overlap: 16 })
        .embedder(EmbedderConfig {
            dimension: DIM,
            api_key: "test-key".to_string(),
            ..EmbedderConfig::default()
        })
        .indexer(IndexerConfig { batch_size: 2, ..IndexerConfig::default() })
        .retriever(RetrieverConfig { reranker: None, ..RetrieverConfig::default() })
        .sparse_params_path(dir.join("bm25_params.json"))
        .vault_path(dir.join("vault"))
        .build()
        .unwrap()
}

fn loader_over(
    config: PipelineConfig,
    store: Arc<InMemoryVectorStore>,
) -> DocumentsLoader {
    DocumentsLoader::with_store(config, store)
        .unwrap()
        .with_embedder(Arc::new(HashingEmbedder))
}

#[tokio::test]
async fn directory_ingestion_populates_the_collection() {
    let dir = tempfile::tempdir().unwrap();
    let docs_dir = dir.path().join("docs");
    std::fs::create_dir(&docs_dir).unwrap();
    std::fs::write(
        docs_dir.join("notes.md"),
        "Hybrid search blends dense semantic vectors with sparse lexical weights.",
    )
    .unwrap();
    std::fs::write(
        docs_dir.join("guide.txt"),
        "Reranking cuts a candidate pool down to the most relevant documents.",
    )
    .unwrap();

    let config = test_config(dir.path());
    let collection = config.indexer.collection_name.clone();
    let store = Arc::new(InMemoryVectorStore::new());
    let loader = loader_over(config.clone(), Arc::clone(&store));

    let chunks = loader.load_directory(&docs_dir).await.unwrap();
    assert!(!chunks.is_empty());

    let report = loader.index_documents(&chunks).await.unwrap();
    assert_eq!(report.batches_failed, 0);
    assert_eq!(report.records_indexed, chunks.len());
    assert_eq!(store.len(&collection).await, chunks.len());

    // The sparse parameters were persisted for the query process.
    let encoder = Bm25Encoder::load(&config.sparse_params_path).await.unwrap();
    assert!(encoder.is_fitted());

    // A lexical query finds the chunk that mentions reranking.
    let sparse = encoder.encode_query("reranking candidate pool").unwrap();
    let dense = HashingEmbedder.embed("reranking candidate pool").await.unwrap();
    let results = store
        .hybrid_search(&collection, &HybridQuery {
            dense,
            sparse: Some(sparse),
            top_k: 3,
            alpha: 0.0,
            filter: None,
        })
        .await
        .unwrap();
    assert!(results[0].text.contains("Reranking"));
}

#[tokio::test]
async fn empty_chunk_list_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let loader = loader_over(test_config(dir.path()), store);

    let err = loader.index_documents(&[]).await.unwrap_err();
    assert!(matches!(err, RagError::Config(_)));
}

#[tokio::test]
async fn uploaded_files_are_chunked_with_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let loader = loader_over(test_config(dir.path()), store);

    let text = "x".repeat(200);
    let chunks = loader.load_uploaded_file(text.as_bytes(), "upload.txt").unwrap();
    // chunk_size 64, overlap 16: ceil((200 - 16) / 48) = 4 chunks.
    assert_eq!(chunks.len(), 4);
    assert!(chunks.iter().all(|c| c.text.chars().count() <= 64));
}

#[tokio::test]
async fn load_vault_walks_the_configured_root() {
    let dir = tempfile::tempdir().unwrap();
    let vault = dir.path().join("vault");
    std::fs::create_dir_all(vault.join("sub")).unwrap();
    std::fs::write(vault.join("a.md"), "alpha document").unwrap();
    std::fs::write(vault.join("sub/b.txt"), "beta document").unwrap();

    let store = Arc::new(InMemoryVectorStore::new());
    let loader = loader_over(test_config(dir.path()), store);

    let chunks = loader.load_vault().await.unwrap();
    assert_eq!(chunks.len(), 2);
}

#[tokio::test]
async fn delete_index_removes_the_collection() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let collection = config.indexer.collection_name.clone();
    let store = Arc::new(InMemoryVectorStore::new());
    store.initialize_collection(&collection, DIM).await.unwrap();

    let loader = loader_over(config, Arc::clone(&store));
    loader.delete_index().await.unwrap();

    // The collection is gone: a search now fails.
    assert!(store
        .hybrid_search(&collection, &HybridQuery {
            dense: vec![0.0; DIM],
            sparse: None,
            top_k: 1,
            alpha: 1.0,
            filter: None,
        })
        .await
        .is_err());
}
