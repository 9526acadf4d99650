//! Reranker trait for second-pass relevance scoring.

use async_trait::async_trait;

use crate::error::Result;

/// A candidate kept by the reranker, referring back into the input slice.
///
/// Carrying the index rather than the text keeps results index-safe: the
/// caller resolves `index` against its own candidate list, so a scoring
/// service that reorders or rewrites documents cannot corrupt the content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankedItem {
    /// Position of the candidate in the input slice.
    pub index: usize,
    /// Relevance score assigned by the rerank model (higher is better).
    pub score: f32,
}

/// A second-pass relevance model over a small candidate set.
///
/// Implementations use cross-encoder models or other strategies more precise
/// than the first-pass vector similarity.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rank `candidates` against `query` and keep the best `top_n`.
    ///
    /// Returns items ordered by descending relevance. When fewer than `top_n`
    /// candidates exist, all of them are returned, ranked.
    async fn rerank(
        &self,
        query: &str,
        candidates: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankedItem>>;
}

/// A reranker that keeps the incoming order unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankedItem>> {
        Ok((0..candidates.len().min(top_n)).map(|index| RerankedItem { index, score: 0.0 }).collect())
    }
}
