//! Error types for the `vault-rag` crate.

use thiserror::Error;

/// Errors that can occur in the retrieval and ingestion pipelines.
///
/// Ingestion-path errors propagate to the caller; query-path errors are
/// converted to a soft-degrade at the [`ContextRetriever`](crate::ContextRetriever)
/// boundary so the chat flow never sees "no context available" as a failure.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid or missing configuration, fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An embedding model call failed, or an encoder precondition was violated.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store is unreachable or rejected an operation.
    #[error("Vector store connection error ({backend}): {message}")]
    Connection {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector collection could not be created or configured.
    #[error("Vector store initialization error ({backend}): {message}")]
    Initialization {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A composite failure in the retrieve orchestration.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// A rerank service call failed.
    #[error("Reranker error ({service}): {message}")]
    Reranker {
        /// The rerank service that produced the error.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// Loading or chunking a document failed. Fatal for that document only.
    #[error("Document processing error ({source_name}): {message}")]
    DocumentProcessing {
        /// The document or path that failed to process.
        source_name: String,
        /// A description of the failure.
        message: String,
    },
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
