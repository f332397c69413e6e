//! Retrievers: turn a [`QueryBundle`] into scored nodes.
//!
//! | Retriever | Source | Score |
//! |---|---|---|
//! | [`ListIndexRetriever`] | every node of a [`ListIndex`](crate::ListIndex) | none |
//! | [`ListIndexEmbeddingRetriever`] | top-k nodes of a list index | cosine similarity |
//! | [`KeywordTableRetriever`] | keyword hits in a [`KeywordTableIndex`](crate::KeywordTableIndex) | hit count |
//! | [`VectorIndexRetriever`] | the vector backend of a [`VectorStoreIndex`](crate::VectorStoreIndex) | backend similarity |
//! | [`Bm25Retriever`] | an in-memory corpus | Okapi BM25 |
//! | [`HybridRetriever`] | a dense and a sparse retriever | taken from the contributing side |
//!
//! Index-backed retrievers borrow their index, so an index cannot be mutated
//! while one of its retrievers is alive.

mod bm25;
mod hybrid;
mod keyword_table;
mod list;
mod vector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::node::ScoredNode;
use crate::query::QueryBundle;

pub use bm25::{BM25_B, BM25_K1, Bm25Retriever};
pub use hybrid::{HybridRetriever, fuse};
pub use keyword_table::KeywordTableRetriever;
pub use list::{ListIndexEmbeddingRetriever, ListIndexRetriever};
pub use vector::VectorIndexRetriever;

/// Retrieves scored nodes for a query, best first.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Run the query.
    async fn retrieve(&self, query: &QueryBundle) -> Result<Vec<ScoredNode>>;
}

/// The query's own embedding, or the mean embedding of its embedding strings.
pub(crate) async fn query_embedding(
    query: &QueryBundle,
    provider: &dyn EmbeddingProvider,
) -> Result<Vec<f32>> {
    match &query.embedding {
        Some(embedding) => Ok(embedding.clone()),
        None => provider.embed_aggregate(&query.embedding_strs()).await,
    }
}

/// Retrieval strategy for list indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListRetrieverMode {
    /// Every node, in list order.
    #[default]
    Default,
    /// The top-k nodes by embedding similarity.
    Embedding,
}

/// How keyword-table retrievers extract query keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordTableRetrieverMode {
    /// The extractor configured on the service context.
    #[default]
    Default,
    /// Frequency-ranked content words.
    Simple,
    /// RAKE keyphrases.
    Rake,
}

/// How [`HybridRetriever`] combines dense and sparse results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Nodes returned by both retrievers.
    And,
    /// Nodes returned by either retriever.
    #[default]
    Or,
}
