//! Error types for the `adk-retrieval` crate.

use thiserror::Error;

/// Errors that can occur while chunking, indexing, retrieving, or postprocessing.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error. Raised at construction, never retried.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A node or document has content that cannot be indexed.
    #[error("Content error: {0}")]
    ContentError(String),

    /// A node, document, or index entry could not be found.
    #[error("Not found ({kind}): {id}")]
    NotFound {
        /// What kind of record was looked up (`node`, `ref_doc`, `vector_id`, ...).
        kind: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// A keyword extractor failed.
    #[error("Keyword extraction error ({extractor}): {message}")]
    KeywordExtractionError {
        /// The extractor that produced the error.
        extractor: String,
        /// A description of the failure.
        message: String,
    },

    /// The operation is not supported at this granularity or by this backend.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// An error in retrieval pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Serializing or deserializing persisted state failed.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing persisted state failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "node", id: id.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
