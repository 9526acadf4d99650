//! LLM-based query decomposition.
//!
//! A complex question is split into simpler sub-queries, each searched
//! independently; the retriever unions the results. Decomposition is an
//! optional enrichment: any failure here degrades to searching the original
//! query alone.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};

const DECOMPOSE_PROMPT: &str = "Split the user question into at most three short, \
self-contained search queries, one per line. Reply with the queries only. \
If the question is already simple, reply with it unchanged.";

/// Splits a complex query into independent sub-queries.
#[async_trait]
pub trait QueryDecomposer: Send + Sync {
    /// Return sub-queries for `query`, excluding the original.
    async fn decompose(&self, query: &str) -> Result<Vec<String>>;
}

/// A [`QueryDecomposer`] backed by an OpenAI-compatible chat completions API.
pub struct LlmQueryDecomposer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmQueryDecomposer {
    /// Create a decomposer for the given chat endpoint and model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when the API key is empty or the HTTP
    /// client cannot be constructed.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Config("decomposer API key must not be empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, endpoint: endpoint.into(), api_key, model: model.into() })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl QueryDecomposer for LlmQueryDecomposer {
    async fn decompose(&self, query: &str) -> Result<Vec<String>> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: DECOMPOSE_PROMPT },
                ChatMessage { role: "user", content: query },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "decomposition request failed");
                RagError::Retrieval(format!("query decomposition failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(RagError::Retrieval(format!("decomposition API returned {status}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            RagError::Retrieval(format!("failed to parse decomposition response: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let sub_queries: Vec<String> = content
            .lines()
            .map(clean_sub_query)
            .filter(|line| !line.is_empty() && *line != query)
            .take(3)
            .map(str::to_string)
            .collect();

        debug!(count = sub_queries.len(), "decomposed query");
        Ok(sub_queries)
    }
}

/// Strip list numbering and bullets the model tends to prepend.
fn clean_sub_query(line: &str) -> &str {
    line.trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == '-')
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_and_bullets_are_stripped() {
        assert_eq!(clean_sub_query("1. what is a vector"), "what is a vector");
        assert_eq!(clean_sub_query("- hybrid search"), "hybrid search");
        assert_eq!(clean_sub_query("2) reranking models"), "reranking models");
        assert_eq!(clean_sub_query("   plain query   "), "plain query");
    }
}
