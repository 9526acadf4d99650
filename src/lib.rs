//! Context retrieval and augmentation core for the Vault RAG chat platform.
//!
//! This crate implements the retrieval side of a retrieval-augmented-generation
//! system:
//!
//! - **Ingestion**: load documents, split them into overlapping chunks, embed
//!   them densely (semantic) and sparsely (BM25 lexical), and upsert them into
//!   a vector collection in batches ([`DocumentsLoader`]).
//! - **Query**: hybrid dense/sparse search over the collection, optional
//!   LLM-based query decomposition, cross-encoder reranking, and assembly of a
//!   bounded-length context block prepended to the query
//!   ([`ContextRetriever`]).
//!
//! The crate is a library, not a service: chat UIs, HTTP servers, and answer
//! generation are external collaborators that call [`ContextRetriever::get_context`]
//! and [`DocumentsLoader::index_documents`]. Retrieval failures soft-degrade
//! to the unaugmented query; ingestion failures propagate to the supervising
//! caller.

pub mod bm25;
pub mod chunking;
pub mod cohere;
pub mod config;
pub mod context;
pub mod decompose;
pub mod document;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod inmemory;
pub mod loader;
pub mod openai;
pub mod processor;
pub mod qdrant;
pub mod reranker;
pub mod retriever;
pub mod vectorstore;

pub use bm25::{Bm25Encoder, Bm25Params};
pub use chunking::{Chunker, FixedSizeChunker};
pub use cohere::CohereReranker;
pub use config::{
    EmbedderConfig, IndexerConfig, PipelineConfig, PipelineConfigBuilder, ProcessorConfig,
    RerankerConfig, RetrieverConfig,
};
pub use context::{ContextRetriever, HealthReport, HealthStatus, PipelineStats};
pub use decompose::{LlmQueryDecomposer, QueryDecomposer};
pub use document::{
    Chunk, Document, EmbeddingPair, IndexRecord, RetrievedDocument, SparseVector,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use indexer::{IndexReport, Indexer};
pub use inmemory::InMemoryVectorStore;
pub use loader::DocumentsLoader;
pub use openai::OpenAiEmbedder;
pub use reranker::{NoOpReranker, RerankedItem, Reranker};
pub use retriever::{DocumentRetriever, Retriever, RetrieverBuilder};
pub use vectorstore::{FieldFilter, HybridQuery, VectorStore};
