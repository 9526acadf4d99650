//! Configuration for the retrieval and ingestion pipelines.
//!
//! A [`PipelineConfig`] is constructed once at process start and passed by
//! reference into each component constructor. There is no global settings
//! singleton. API keys are resolved from environment variables before any
//! network call; placeholder literals left over from a config template are
//! rejected, never treated as valid keys.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Placeholder values that must never be used as live credentials.
const PLACEHOLDER_VALUES: &[&str] = &["YOUR_API_KEY", "YOUR_URL", "YOUR_COLLECTION_NAME"];

/// Default network timeout for embedding, store, and rerank calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn is_placeholder(value: &str) -> bool {
    value.is_empty() || PLACEHOLDER_VALUES.contains(&value)
}

/// Resolve a credential field: keep a real configured value, otherwise fall
/// back to the named environment variable.
fn resolve_key(configured: &str, env_var: &str) -> Option<String> {
    if !is_placeholder(configured) {
        return Some(configured.to_string());
    }
    std::env::var(env_var).ok().filter(|v| !is_placeholder(v))
}

/// Chunking parameters for the document processor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessorConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { chunk_size: 512, chunk_overlap: 100 }
    }
}

/// Dense embedding backend parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedderConfig {
    /// Embedding model name.
    pub model: String,
    /// Expected embedding dimensionality.
    pub dimension: usize,
    /// Embeddings API endpoint (OpenAI-compatible).
    pub endpoint: String,
    /// API key; resolved from `OPENAI_API_KEY` when left empty.
    pub api_key: String,
    /// Maximum number of inputs per provider request.
    pub batch_size: usize,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: String::new(),
            batch_size: 96,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Vector store connection and batching parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexerConfig {
    /// Vector store URL (Qdrant gRPC endpoint).
    pub url: String,
    /// Optional API key; resolved from `QDRANT_API_KEY` when left empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Name of the vector collection.
    pub collection_name: String,
    /// Request timeout for store operations.
    pub timeout: Duration,
    /// Number of records per upsert batch.
    pub batch_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection_name: "vault_documents".to_string(),
            timeout: DEFAULT_TIMEOUT,
            batch_size: 100,
        }
    }
}

/// Rerank service parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankerConfig {
    /// Rerank model name.
    pub model: String,
    /// Rerank API endpoint.
    pub endpoint: String,
    /// API key; resolved from `COHERE_API_KEY` when left empty.
    pub api_key: String,
    /// Number of documents to keep after reranking.
    pub top_n: usize,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model: "rerank-multilingual-v3.0".to_string(),
            endpoint: "https://api.cohere.com/v1/rerank".to_string(),
            api_key: String::new(),
            top_n: 5,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Retrieval orchestration parameters.
///
/// The `top_k` / `alpha` / reranker `top_n` defaults (25, 0.5, 5) are
/// starting points, not tuned constants; all call sites read them from here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrieverConfig {
    /// Size of the initial candidate pool fetched from hybrid search.
    pub top_k: usize,
    /// Dense/sparse blend weight in `[0, 1]`; 1 is pure dense, 0 pure sparse.
    pub alpha: f32,
    /// Reranker settings; `None` disables the rerank pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker: Option<RerankerConfig>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { top_k: 25, alpha: 0.5, reranker: Some(RerankerConfig::default()) }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Chunking parameters.
    pub processor: ProcessorConfig,
    /// Dense embedding backend.
    pub embedder: EmbedderConfig,
    /// Vector store connection.
    pub indexer: IndexerConfig,
    /// Retrieval orchestration.
    pub retriever: RetrieverConfig,
    /// Path of the persisted sparse-encoder parameters, shared between the
    /// ingestion and query processes.
    pub sparse_params_path: PathBuf,
    /// Root directory scanned by `load_vault`.
    pub vault_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            processor: ProcessorConfig::default(),
            embedder: EmbedderConfig::default(),
            indexer: IndexerConfig::default(),
            retriever: RetrieverConfig::default(),
            sparse_params_path: PathBuf::from("bm25_params.json"),
            vault_path: PathBuf::from("vault"),
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for constructing a validated [`PipelineConfig`].
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Resolve credential fields from the environment.
    ///
    /// Empty or placeholder values are replaced from `OPENAI_API_KEY`,
    /// `QDRANT_API_KEY`, and `COHERE_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when a required key is neither configured
    /// nor present in the environment.
    pub fn resolve_api_keys(mut self) -> Result<Self> {
        self.embedder.api_key = resolve_key(&self.embedder.api_key, "OPENAI_API_KEY")
            .ok_or_else(|| {
                RagError::Config("embedder API key is not set (OPENAI_API_KEY)".to_string())
            })?;

        self.indexer.api_key = match self.indexer.api_key.take() {
            Some(key) => resolve_key(&key, "QDRANT_API_KEY"),
            None => std::env::var("QDRANT_API_KEY").ok().filter(|v| !is_placeholder(v)),
        };

        if let Some(reranker) = &mut self.retriever.reranker {
            reranker.api_key =
                resolve_key(&reranker.api_key, "COHERE_API_KEY").ok_or_else(|| {
                    RagError::Config("reranker API key is not set (COHERE_API_KEY)".to_string())
                })?;
        }

        Ok(self)
    }

    /// Validate the invariants that hold across components.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - `dimension == 0`
    /// - `top_k == 0` or a configured reranker has `top_n == 0`
    /// - `alpha` is outside `[0, 1]`
    /// - the store URL or collection name is a placeholder
    pub fn validate(&self) -> Result<()> {
        if self.processor.chunk_overlap >= self.processor.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.processor.chunk_overlap, self.processor.chunk_size
            )));
        }
        if self.embedder.dimension == 0 {
            return Err(RagError::Config("embedding dimension must be greater than zero".into()));
        }
        if self.retriever.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".into()));
        }
        if !(0.0..=1.0).contains(&self.retriever.alpha) {
            return Err(RagError::Config(format!(
                "alpha ({}) must be within [0, 1]",
                self.retriever.alpha
            )));
        }
        if let Some(reranker) = &self.retriever.reranker {
            if reranker.top_n == 0 {
                return Err(RagError::Config("reranker top_n must be greater than zero".into()));
            }
        }
        if is_placeholder(&self.indexer.url) {
            return Err(RagError::Config("vector store URL is not set".into()));
        }
        if is_placeholder(&self.indexer.collection_name) {
            return Err(RagError::Config("collection name is not set".into()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the chunking parameters.
    pub fn processor(mut self, processor: ProcessorConfig) -> Self {
        self.config.processor = processor;
        self
    }

    /// Set the dense embedding backend parameters.
    pub fn embedder(mut self, embedder: EmbedderConfig) -> Self {
        self.config.embedder = embedder;
        self
    }

    /// Set the vector store parameters.
    pub fn indexer(mut self, indexer: IndexerConfig) -> Self {
        self.config.indexer = indexer;
        self
    }

    /// Set the retrieval orchestration parameters.
    pub fn retriever(mut self, retriever: RetrieverConfig) -> Self {
        self.config.retriever = retriever;
        self
    }

    /// Set the persisted sparse-parameters path.
    pub fn sparse_params_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sparse_params_path = path.into();
        self
    }

    /// Set the vault root directory.
    pub fn vault_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.vault_path = path.into();
        self
    }

    /// Build the [`PipelineConfig`], validating cross-component invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] on any violated invariant; see
    /// [`PipelineConfig::validate`].
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
