//! Retrieval orchestration: hybrid candidate pool, optional query
//! decomposition, and rerank with identity fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::bm25::Bm25Encoder;
use crate::config::RetrieverConfig;
use crate::decompose::QueryDecomposer;
use crate::document::RetrievedDocument;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::indexer::Indexer;
use crate::reranker::Reranker;
use crate::vectorstore::HybridQuery;

/// Anything that can produce a ranked document list for a query.
///
/// The production implementation is [`Retriever`]; tests substitute mocks to
/// observe call counts and inject failures.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    /// Retrieve ranked documents for `query`. An empty or whitespace query
    /// returns an empty list without touching the network.
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>>;
}

/// Orchestrates hybrid search and reranking into a final ranked list.
pub struct Retriever {
    config: RetrieverConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    sparse_encoder: Option<Arc<Bm25Encoder>>,
    indexer: Arc<Indexer>,
    reranker: Option<Arc<dyn Reranker>>,
    decomposer: Option<Arc<dyn QueryDecomposer>>,
}

impl Retriever {
    /// Create a new [`RetrieverBuilder`].
    pub fn builder() -> RetrieverBuilder {
        RetrieverBuilder::default()
    }

    /// Fetch the hybrid candidate pool for one query string.
    async fn candidates_for(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let dense = self.embedder.embed(query).await.map_err(|e| {
            RagError::Retrieval(format!("query embedding failed: {e}"))
        })?;

        let sparse = match &self.sparse_encoder {
            Some(encoder) => match encoder.encode_query(query) {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(error = %e, "sparse encoding failed, searching dense-only");
                    None
                }
            },
            None => None,
        };

        self.indexer
            .hybrid_search(&HybridQuery {
                dense,
                sparse,
                top_k: self.config.top_k,
                alpha: self.config.alpha,
                filter: None,
            })
            .await
    }

    /// Union candidate pools from the original query and any sub-queries,
    /// de-duplicated by chunk id keeping the best score.
    async fn gather_candidates(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let mut candidates = self.candidates_for(query).await?;

        if let Some(decomposer) = &self.decomposer {
            let sub_queries = match decomposer.decompose(query).await {
                Ok(sub_queries) => sub_queries,
                Err(e) => {
                    warn!(error = %e, "query decomposition failed, using the original query only");
                    Vec::new()
                }
            };

            for sub_query in sub_queries {
                match self.candidates_for(&sub_query).await {
                    Ok(more) => candidates.extend(more),
                    Err(e) => {
                        warn!(sub_query = %prefix(&sub_query), error = %e, "sub-query search failed, skipping");
                    }
                }
            }
        }

        // Dedup by id, keeping the highest-scored occurrence; order stays
        // score-descending and is stable for equal scores.
        let mut seen: std::collections::HashMap<String, f32> = std::collections::HashMap::new();
        for doc in &candidates {
            seen.entry(doc.id.clone())
                .and_modify(|best| *best = best.max(doc.score))
                .or_insert(doc.score);
        }
        let mut deduped: Vec<RetrievedDocument> = Vec::with_capacity(seen.len());
        for mut doc in candidates {
            if let Some(best) = seen.remove(&doc.id) {
                doc.score = best;
                deduped.push(doc);
            }
        }
        deduped.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(deduped)
    }

    /// Cut candidates down to the final list with the reranker.
    ///
    /// Reranker failure or empty output falls back to the incoming hybrid
    /// order; when candidates exist the result is never empty.
    async fn rerank_candidates(
        &self,
        query: &str,
        candidates: Vec<RetrievedDocument>,
    ) -> Vec<RetrievedDocument> {
        let Some(reranker) = &self.reranker else {
            return candidates;
        };
        let top_n = self
            .config
            .reranker
            .as_ref()
            .map_or(candidates.len(), |r| r.top_n)
            .min(candidates.len());

        let texts: Vec<&str> = candidates.iter().map(|d| d.text.as_str()).collect();
        let mut items = match reranker.rerank(query, &texts, top_n).await {
            Ok(items) if !items.is_empty() => items,
            Ok(_) => {
                warn!("reranker returned no results, keeping hybrid search order");
                return candidates.into_iter().take(top_n).collect();
            }
            Err(e) => {
                warn!(error = %e, "reranking failed, keeping hybrid search order");
                return candidates.into_iter().take(top_n).collect();
            }
        };

        // Equal scores keep the hybrid-search order: the candidate index is
        // the pre-rerank rank, so it is the tie-break.
        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        items.truncate(top_n);

        items
            .into_iter()
            .filter_map(|item| {
                candidates.get(item.index).map(|doc| {
                    let mut doc = doc.clone();
                    doc.score = item.score;
                    doc
                })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentRetriever for Retriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.gather_candidates(query).await?;
        if candidates.is_empty() {
            debug!(query = %prefix(query), "hybrid search returned no candidates");
            return Ok(Vec::new());
        }

        let mut ranked = self.rerank_candidates(query, candidates).await;
        for (i, doc) in ranked.iter_mut().enumerate() {
            doc.rank = i + 1;
        }

        info!(query = %prefix(query), count = ranked.len(), "retrieved documents");
        Ok(ranked)
    }
}

/// First 80 characters of a query, for logging.
fn prefix(query: &str) -> String {
    query.chars().take(80).collect()
}

/// Builder for constructing a [`Retriever`].
///
/// `config`, `embedder`, and `indexer` are required; the sparse encoder,
/// reranker, and decomposer are optional enrichments.
#[derive(Default)]
pub struct RetrieverBuilder {
    config: Option<RetrieverConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    sparse_encoder: Option<Arc<Bm25Encoder>>,
    indexer: Option<Arc<Indexer>>,
    reranker: Option<Arc<dyn Reranker>>,
    decomposer: Option<Arc<dyn QueryDecomposer>>,
}

impl RetrieverBuilder {
    /// Set the retrieval configuration.
    pub fn config(mut self, config: RetrieverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the dense embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the fitted sparse encoder.
    pub fn sparse_encoder(mut self, encoder: Arc<Bm25Encoder>) -> Self {
        self.sparse_encoder = Some(encoder);
        self
    }

    /// Set the indexer.
    pub fn indexer(mut self, indexer: Arc<Indexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Set the reranker.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the query decomposer.
    pub fn decomposer(mut self, decomposer: Arc<dyn QueryDecomposer>) -> Self {
        self.decomposer = Some(decomposer);
        self
    }

    /// Build the [`Retriever`], validating that required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing.
    pub fn build(self) -> Result<Retriever> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::Config("embedder is required".to_string()))?;
        let indexer =
            self.indexer.ok_or_else(|| RagError::Config("indexer is required".to_string()))?;

        Ok(Retriever {
            config,
            embedder,
            sparse_encoder: self.sparse_encoder,
            indexer,
            reranker: self.reranker,
            decomposer: self.decomposer,
        })
    }
}
