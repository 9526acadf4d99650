//! Context retrieval and query augmentation.
//!
//! [`ContextRetriever`] is the query-side facade: it retrieves ranked
//! documents, joins them into a bounded-length context block, and prepends
//! the block to the original query. Retrieval failure is a designed
//! soft-degrade: the caller always gets a usable query string back, so a
//! broken index can never block the chat from answering.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::bm25::Bm25Encoder;
use crate::cohere::CohereReranker;
use crate::config::PipelineConfig;
use crate::document::RetrievedDocument;
use crate::error::{RagError, Result};
use crate::indexer::Indexer;
use crate::openai::OpenAiEmbedder;
use crate::qdrant::QdrantVectorStore;
use crate::retriever::{DocumentRetriever, Retriever};

/// Separator between documents inside the context block.
const DOC_SEPARATOR: &str = "\n\n---\n\n";

/// Minimum remaining budget for a truncated document to be worth including.
const TRUNCATION_FLOOR: usize = 100;

/// Overall health of the retrieval system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All components responding.
    Healthy,
    /// Retrieval works but a component is impaired (e.g. sparse unavailable).
    Degraded,
    /// Retrieval is not functional.
    Unavailable,
}

/// Component-level health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Per-component readiness flags.
    pub components: HashMap<String, bool>,
}

/// Static facts about the configured pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Dense embedding model name.
    pub embedder_model: String,
    /// Dense embedding dimensionality.
    pub embedding_dimension: usize,
    /// Hybrid-search candidate pool size.
    pub top_k: usize,
    /// Dense/sparse blend weight.
    pub alpha: f32,
    /// Whether a reranker is configured.
    pub reranker_enabled: bool,
    /// Documents kept after reranking (0 when disabled).
    pub reranker_top_n: usize,
}

/// Retrieves context and augments queries for the chat flow.
pub struct ContextRetriever {
    retriever: Arc<dyn DocumentRetriever>,
    indexer: Option<Arc<Indexer>>,
    sparse_loaded: bool,
    stats: PipelineStats,
}

impl ContextRetriever {
    /// Wire up the full production pipeline from configuration.
    ///
    /// Builds the embedder, the Qdrant store, the reranker when configured,
    /// and loads the persisted sparse parameters. A missing parameters file
    /// degrades to dense-only retrieval with a logged warning instead of
    /// failing the query process.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the configuration is invalid or a
    /// required credential is missing.
    pub async fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let config = config.resolve_api_keys()?;

        let embedder = Arc::new(OpenAiEmbedder::new(&config.embedder)?);
        let store = Arc::new(QdrantVectorStore::new(&config.indexer)?);
        let indexer =
            Arc::new(Indexer::new(config.indexer.clone(), store, config.embedder.dimension));

        let sparse_encoder = match Bm25Encoder::load(&config.sparse_params_path).await {
            Ok(encoder) => Some(Arc::new(encoder)),
            Err(e) => {
                warn!(
                    path = %config.sparse_params_path.display(),
                    error = %e,
                    "sparse parameters unavailable, retrieval degrades to dense-only"
                );
                None
            }
        };
        let sparse_loaded = sparse_encoder.is_some();

        let mut builder = Retriever::builder()
            .config(config.retriever.clone())
            .embedder(embedder)
            .indexer(Arc::clone(&indexer));
        if let Some(encoder) = sparse_encoder {
            builder = builder.sparse_encoder(encoder);
        }
        if let Some(reranker_config) = &config.retriever.reranker {
            builder = builder.reranker(Arc::new(CohereReranker::new(reranker_config)?));
        }
        let retriever = Arc::new(builder.build()?);

        info!("context retriever initialized");
        Ok(Self {
            retriever,
            indexer: Some(indexer),
            sparse_loaded,
            stats: PipelineStats {
                embedder_model: config.embedder.model.clone(),
                embedding_dimension: config.embedder.dimension,
                top_k: config.retriever.top_k,
                alpha: config.retriever.alpha,
                reranker_enabled: config.retriever.reranker.is_some(),
                reranker_top_n: config.retriever.reranker.as_ref().map_or(0, |r| r.top_n),
            },
        })
    }

    /// Build a context retriever over an existing document retriever.
    ///
    /// Used by tests and by callers that assemble their own pipeline.
    pub fn new(retriever: Arc<dyn DocumentRetriever>, stats: PipelineStats) -> Self {
        Self { retriever, indexer: None, sparse_loaded: false, stats }
    }

    /// Retrieve relevant context and augment the query.
    ///
    /// Returns the query prefixed with a `<context>` block of at most
    /// `max_length` characters of document text, or the original query
    /// unchanged when it is empty, when nothing is retrieved, or when
    /// retrieval fails.
    pub async fn get_context(&self, query: &str, max_length: usize) -> String {
        if query.trim().is_empty() {
            warn!("empty query provided");
            return query.to_string();
        }

        let results = match self.retriever.retrieve(query).await {
            Ok(results) => results,
            Err(e) => {
                error!(query = %prefix(query), error = %e, "context retrieval failed");
                return query.to_string();
            }
        };

        if results.is_empty() {
            warn!(query = %prefix(query), "no context found for query");
            return query.to_string();
        }

        let context = assemble_context(&results, max_length);
        info!(
            documents = results.len(),
            context_chars = context.chars().count(),
            "context retrieved and query augmented"
        );
        format!("<context>\n{context}\n</context>\n\n{query}")
    }

    /// Retrieve ranked documents without formatting them as a context block.
    ///
    /// # Errors
    ///
    /// Unlike [`get_context`](ContextRetriever::get_context), retrieval
    /// failures propagate as [`RagError::Retrieval`]: structured callers get
    /// to make their own degrade decision.
    pub async fn get_context_documents(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let results = self
            .retriever
            .retrieve(query)
            .await
            .map_err(|e| RagError::Retrieval(format!("failed to retrieve documents: {e}")))?;
        Ok(results.into_iter().take(top_k).collect())
    }

    /// Report component readiness and probe a test retrieval.
    pub async fn health_check(&self) -> HealthReport {
        let mut components = HashMap::new();
        components.insert("retriever".to_string(), true);
        components.insert("sparse_encoder".to_string(), self.sparse_loaded);

        let store_ok = match &self.indexer {
            Some(indexer) => indexer.health_check().await.is_ok(),
            None => true,
        };
        components.insert("vector_store".to_string(), store_ok);

        let probe_ok = self.retriever.retrieve("health probe").await.is_ok();
        components.insert("probe_query".to_string(), probe_ok);

        let status = if !store_ok || !probe_ok {
            HealthStatus::Unavailable
        } else if !self.sparse_loaded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport { status, components }
    }

    /// Static configuration facts for diagnostics surfaces.
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}

/// Join document texts in rank order under a character budget.
///
/// Documents are separated by [`DOC_SEPARATOR`]. Once the next document would
/// exceed `max_length`, a truncated slice is appended only while it can still
/// contribute more than [`TRUNCATION_FLOOR`] characters of the remaining
/// budget; the slice keeps that floor in reserve and ends with an ellipsis.
fn assemble_context(results: &[RetrievedDocument], max_length: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;

    for doc in results {
        let doc_len = doc.text.chars().count();
        if total + doc_len > max_length {
            let remaining = max_length - total;
            if remaining > TRUNCATION_FLOOR {
                let keep = remaining - TRUNCATION_FLOOR;
                let slice: String = doc.text.chars().take(keep).collect();
                parts.push(format!("{slice}..."));
            }
            break;
        }
        parts.push(doc.text.clone());
        total += doc_len;
    }

    parts.join(DOC_SEPARATOR)
}

/// First 80 characters of a query, for logging.
fn prefix(query: &str) -> String {
    query.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    fn stats() -> PipelineStats {
        PipelineStats {
            embedder_model: "test-embedder".to_string(),
            embedding_dimension: 4,
            top_k: 25,
            alpha: 0.5,
            reranker_enabled: false,
            reranker_top_n: 0,
        }
    }

    fn doc(text: String, rank: usize) -> RetrievedDocument {
        RetrievedDocument {
            id: format!("doc_{rank}"),
            text,
            score: 1.0 / rank as f32,
            metadata: HashMap::new(),
            rank,
        }
    }

    /// Retriever double that counts calls and returns a canned outcome.
    struct MockRetriever {
        calls: AtomicUsize,
        outcome: std::result::Result<Vec<RetrievedDocument>, String>,
    }

    impl MockRetriever {
        fn returning(docs: Vec<RetrievedDocument>) -> Self {
            Self { calls: AtomicUsize::new(0), outcome: Ok(docs) }
        }

        fn failing(message: &str) -> Self {
            Self { calls: AtomicUsize::new(0), outcome: Err(message.to_string()) }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentRetriever for MockRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Ok(docs) => Ok(docs.clone()),
                Err(message) => Err(RagError::Retrieval(message.clone())),
            }
        }
    }

    #[tokio::test]
    async fn empty_query_is_returned_unchanged_without_retrieval() {
        let mock = Arc::new(MockRetriever::returning(vec![doc("ignored".to_string(), 1)]));
        let retriever = ContextRetriever::new(Arc::clone(&mock) as Arc<dyn DocumentRetriever>, stats());

        assert_eq!(retriever.get_context("", 4000).await, "");
        assert_eq!(retriever.get_context("   \n", 4000).await, "   \n");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn retrieval_failure_soft_degrades_to_the_original_query() {
        let mock = Arc::new(MockRetriever::failing("store unreachable"));
        let retriever = ContextRetriever::new(Arc::clone(&mock) as Arc<dyn DocumentRetriever>, stats());

        assert_eq!(retriever.get_context("what is RAG?", 4000).await, "what is RAG?");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn no_documents_soft_degrades_to_the_original_query() {
        let mock = Arc::new(MockRetriever::returning(Vec::new()));
        let retriever = ContextRetriever::new(mock as Arc<dyn DocumentRetriever>, stats());
        assert_eq!(retriever.get_context("what is RAG?", 4000).await, "what is RAG?");
    }

    #[tokio::test]
    async fn context_is_wrapped_and_prepended() {
        let mock = Arc::new(MockRetriever::returning(vec![
            doc("first".to_string(), 1),
            doc("second".to_string(), 2),
        ]));
        let retriever = ContextRetriever::new(mock as Arc<dyn DocumentRetriever>, stats());

        let augmented = retriever.get_context("the question", 4000).await;
        assert_eq!(augmented, "<context>\nfirst\n\n---\n\nsecond\n</context>\n\nthe question");
    }

    #[test]
    fn truncation_boundary_is_exact() {
        let results = vec![
            doc("a".repeat(2000), 1),
            doc("b".repeat(2000), 2),
            doc("c".repeat(2000), 3),
        ];
        let context = assemble_context(&results, 3000);

        // Document 1 fits whole; document 2 is cut to the 1000 remaining
        // chars minus the 100-char reserve, plus the ellipsis; document 3
        // is omitted entirely.
        let expected = format!("{}{}{}...", "a".repeat(2000), DOC_SEPARATOR, "b".repeat(900));
        assert_eq!(context, expected);
        assert_eq!(context.len(), 2000 + DOC_SEPARATOR.len() + 900 + 3);
        assert!(!context.contains('c'));
    }

    #[test]
    fn sliver_budgets_are_not_padded() {
        // Budget 2050 leaves 50 chars after the first document, under the
        // truncation floor, so the second document is dropped entirely.
        let results = vec![doc("a".repeat(2000), 1), doc("b".repeat(2000), 2)];
        let context = assemble_context(&results, 2050);
        assert_eq!(context, "a".repeat(2000));
    }

    #[test]
    fn exact_fit_is_not_truncated() {
        let results = vec![doc("a".repeat(1000), 1), doc("b".repeat(2000), 2)];
        let context = assemble_context(&results, 3000);
        assert_eq!(context, format!("{}{}{}", "a".repeat(1000), DOC_SEPARATOR, "b".repeat(2000)));
    }

    #[tokio::test]
    async fn structured_documents_propagate_failures() {
        let mock = Arc::new(MockRetriever::failing("boom"));
        let retriever = ContextRetriever::new(mock as Arc<dyn DocumentRetriever>, stats());
        let err = retriever.get_context_documents("query", 5).await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
    }

    #[tokio::test]
    async fn structured_documents_respect_top_k() {
        let docs: Vec<RetrievedDocument> =
            (1..=10).map(|i| doc(format!("text {i}"), i)).collect();
        let mock = Arc::new(MockRetriever::returning(docs));
        let retriever = ContextRetriever::new(mock as Arc<dyn DocumentRetriever>, stats());
        let documents = retriever.get_context_documents("query", 3).await.unwrap();
        assert_eq!(documents.len(), 3);
        assert_eq!(documents[0].rank, 1);
    }
}
