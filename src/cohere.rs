//! Cross-encoder reranking via the Cohere rerank API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::RerankerConfig;
use crate::error::{RagError, Result};
use crate::reranker::{RerankedItem, Reranker};

/// A [`Reranker`] backed by the Cohere `/v1/rerank` endpoint.
///
/// Failures surface as typed [`RagError::Reranker`] values; the retriever is
/// the one caller and maps them to its identity fallback deliberately.
pub struct CohereReranker {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl CohereReranker {
    /// Create a reranker from the pipeline reranker configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the API key is empty or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(RagError::Config("reranker API key must not be empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankedItem>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let body = RerankRequest {
            model: &self.model,
            query,
            documents: candidates.to_vec(),
            top_n: top_n.min(candidates.len()),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(service = "cohere", error = %e, "rerank request failed");
                RagError::Reranker {
                    service: "cohere".to_string(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(service = "cohere", %status, "rerank API error");
            return Err(RagError::Reranker {
                service: "cohere".to_string(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let parsed: RerankResponse = response.json().await.map_err(|e| {
            error!(service = "cohere", error = %e, "failed to parse rerank response");
            RagError::Reranker {
                service: "cohere".to_string(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        // Out-of-range indices from the service are dropped rather than
        // allowed to panic downstream.
        let mut items: Vec<RerankedItem> = parsed
            .results
            .into_iter()
            .filter(|r| r.index < candidates.len())
            .map(|r| RerankedItem { index: r.index, score: r.relevance_score })
            .collect();
        items.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
        });
        items.truncate(top_n);

        debug!(service = "cohere", kept = items.len(), "reranked candidates");
        Ok(items)
    }
}
