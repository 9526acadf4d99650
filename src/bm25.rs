//! Sparse lexical encoder with BM25 term weighting.
//!
//! The encoder must be fitted over the ingestion corpus before it can encode
//! anything; fitted parameters are persisted as JSON (`bm25_params.json`)
//! beside the index and reloaded by the query process. Document vectors carry
//! length-normalized term frequencies and query vectors carry IDF weights, so
//! the dot product of the two is the BM25 score of the document for the query.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::SparseVector;
use crate::error::{RagError, Result};

const DEFAULT_K1: f32 = 1.2;
const DEFAULT_B: f32 = 0.75;

/// Fitted BM25 parameters, serialized between the ingestion and query processes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation parameter.
    pub k1: f32,
    /// Length-normalization parameter.
    pub b: f32,
    /// Average document length (in tokens) over the fitted corpus.
    pub avgdl: f32,
    /// Number of documents in the fitted corpus.
    pub n_docs: u32,
    /// Token → vocabulary index, assigned in first-seen order.
    pub vocab: HashMap<String, u32>,
    /// Token → number of corpus documents containing it.
    pub doc_freq: HashMap<String, u32>,
}

/// Sparse encoder producing BM25-weighted term vectors.
///
/// Created unfitted; [`fit`](Bm25Encoder::fit) or [`load`](Bm25Encoder::load)
/// must run before any encode call. Encoding while unfitted is a fatal
/// [`RagError::Embedding`], never a silent zero vector.
#[derive(Debug, Clone, Default)]
pub struct Bm25Encoder {
    params: Option<Bm25Params>,
}

impl Bm25Encoder {
    /// Create a new, unfitted encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the encoder has been fitted or loaded.
    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    /// Fit vocabulary and document frequencies over the corpus.
    ///
    /// Replaces any previously fitted parameters.
    pub fn fit<S: AsRef<str>>(&mut self, corpus: &[S]) {
        let mut vocab: HashMap<String, u32> = HashMap::new();
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len: u64 = 0;

        for text in corpus {
            let tokens = tokenize(text.as_ref());
            total_len += tokens.len() as u64;
            let mut seen: Vec<&String> = Vec::new();
            for token in &tokens {
                if !vocab.contains_key(token) {
                    vocab.insert(token.clone(), vocab.len() as u32);
                }
                if !seen.contains(&token) {
                    seen.push(token);
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        let n_docs = corpus.len() as u32;
        let avgdl = if n_docs == 0 { 0.0 } else { total_len as f32 / n_docs as f32 };
        info!(n_docs, vocab_size = vocab.len(), avgdl, "fitted sparse encoder");

        self.params =
            Some(Bm25Params { k1: DEFAULT_K1, b: DEFAULT_B, avgdl, n_docs, vocab, doc_freq });
    }

    /// Encode a document with length-normalized term-frequency weights.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] when the encoder is not fitted.
    pub fn encode_document(&self, text: &str) -> Result<SparseVector> {
        let params = self.require_fitted("encode_document")?;
        let tokens = tokenize(text);
        let dl = tokens.len() as f32;

        let mut tf: HashMap<u32, f32> = HashMap::new();
        for token in &tokens {
            if let Some(&index) = params.vocab.get(token) {
                *tf.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let norm = params.k1 * (1.0 - params.b + params.b * dl / params.avgdl.max(1.0));
        let weighted: BTreeMap<u32, f32> = tf
            .into_iter()
            .map(|(index, freq)| (index, freq * (params.k1 + 1.0) / (freq + norm)))
            .collect();

        Ok(to_sparse(weighted))
    }

    /// Encode a query with IDF weights.
    ///
    /// Tokens outside the fitted vocabulary are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] when the encoder is not fitted.
    pub fn encode_query(&self, text: &str) -> Result<SparseVector> {
        let params = self.require_fitted("encode_query")?;
        let n = params.n_docs as f32;

        let mut weighted: BTreeMap<u32, f32> = BTreeMap::new();
        for token in tokenize(text) {
            if let (Some(&index), Some(&df)) =
                (params.vocab.get(&token), params.doc_freq.get(&token))
            {
                let df = df as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                weighted.insert(index, idf);
            }
        }

        Ok(to_sparse(weighted))
    }

    /// Persist the fitted parameters as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] when unfitted or when the file cannot
    /// be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let params = self.require_fitted("save")?;
        let json = serde_json::to_vec_pretty(params).map_err(|e| RagError::Embedding {
            provider: "bm25".to_string(),
            message: format!("failed to serialize parameters: {e}"),
        })?;
        tokio::fs::write(path, json).await.map_err(|e| RagError::Embedding {
            provider: "bm25".to_string(),
            message: format!("failed to write {}: {e}", path.display()),
        })?;
        debug!(path = %path.display(), "saved sparse encoder parameters");
        Ok(())
    }

    /// Load previously persisted parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] when the file is missing or invalid.
    /// Callers on the query path treat this as "sparse unavailable" and
    /// degrade to dense-only retrieval.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| RagError::Embedding {
            provider: "bm25".to_string(),
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        let params: Bm25Params =
            serde_json::from_slice(&bytes).map_err(|e| RagError::Embedding {
                provider: "bm25".to_string(),
                message: format!("invalid parameters in {}: {e}", path.display()),
            })?;
        debug!(path = %path.display(), vocab_size = params.vocab.len(), "loaded sparse encoder parameters");
        Ok(Self { params: Some(params) })
    }

    fn require_fitted(&self, operation: &str) -> Result<&Bm25Params> {
        self.params.as_ref().ok_or_else(|| RagError::Embedding {
            provider: "bm25".to_string(),
            message: format!("{operation} called before fit or load"),
        })
    }
}

/// Lowercased alphanumeric tokens of at least two characters.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

fn to_sparse(weighted: BTreeMap<u32, f32>) -> SparseVector {
    let mut indices = Vec::with_capacity(weighted.len());
    let mut values = Vec::with_capacity(weighted.len());
    for (index, value) in weighted {
        indices.push(index);
        values.push(value);
    }
    SparseVector { indices, values }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &[&str] = &[
        "the quick brown fox jumps over the lazy dog",
        "a fast auburn fox leaps over sleeping hounds",
        "retrieval augmented generation blends search with language models",
    ];

    #[test]
    fn encoding_before_fit_is_a_fatal_error() {
        let encoder = Bm25Encoder::new();
        let err = encoder.encode_query("anything").unwrap_err();
        assert!(matches!(err, RagError::Embedding { .. }));
        let err = encoder.encode_document("anything").unwrap_err();
        assert!(matches!(err, RagError::Embedding { .. }));
    }

    #[test]
    fn document_vectors_are_sorted_and_parallel() {
        let mut encoder = Bm25Encoder::new();
        encoder.fit(CORPUS);
        let vector = encoder.encode_document(CORPUS[0]).unwrap();
        assert_eq!(vector.indices.len(), vector.values.len());
        assert!(vector.indices.windows(2).all(|w| w[0] < w[1]));
        assert!(!vector.is_empty());
    }

    #[test]
    fn rare_terms_outweigh_common_terms_in_queries() {
        let mut encoder = Bm25Encoder::new();
        encoder.fit(CORPUS);
        // "fox" appears in two documents, "retrieval" in one.
        let fox = encoder.encode_query("fox").unwrap();
        let retrieval = encoder.encode_query("retrieval").unwrap();
        assert!(retrieval.values[0] > fox.values[0]);
    }

    #[test]
    fn query_tokens_outside_vocabulary_are_dropped() {
        let mut encoder = Bm25Encoder::new();
        encoder.fit(CORPUS);
        let vector = encoder.encode_query("zzzunknownzzz").unwrap();
        assert!(vector.is_empty());
    }

    #[test]
    fn matching_document_scores_higher_via_dot_product() {
        let mut encoder = Bm25Encoder::new();
        encoder.fit(CORPUS);
        let query = encoder.encode_query("retrieval augmented search").unwrap();
        let on_topic = encoder.encode_document(CORPUS[2]).unwrap();
        let off_topic = encoder.encode_document(CORPUS[0]).unwrap();
        assert!(query.dot(&on_topic) > query.dot(&off_topic));
    }

    #[tokio::test]
    async fn parameters_round_trip_through_disk() {
        let mut encoder = Bm25Encoder::new();
        encoder.fit(CORPUS);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bm25_params.json");
        encoder.save(&path).await.unwrap();

        let reloaded = Bm25Encoder::load(&path).await.unwrap();
        let before = encoder.encode_query("quick fox").unwrap();
        let after = reloaded.encode_query("quick fox").unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn loading_missing_parameters_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Bm25Encoder::load(&dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding { .. }));
    }
}
