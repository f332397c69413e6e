//! Vector backend trait and query types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::Node;
use crate::query::MetadataFilters;

/// How a backend should score a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreQueryMode {
    /// Dense similarity only.
    #[default]
    Default,
    /// Sparse (lexical) scoring only.
    Sparse,
    /// Combined dense and sparse scoring weighted by `alpha`.
    Hybrid,
}

/// A similarity query sent to a [`VectorStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorStoreQuery {
    /// The dense query vector.
    pub query_embedding: Option<Vec<f32>>,
    /// Number of results to return.
    pub similarity_top_k: usize,
    /// Restrict results to these node ids.
    pub node_ids: Option<Vec<String>>,
    /// Restrict results to nodes of these reference documents.
    pub doc_ids: Option<Vec<String>>,
    /// The raw query text, for backends that score lexically.
    pub query_str: Option<String>,
    /// Scoring mode.
    pub mode: VectorStoreQueryMode,
    /// Dense weight in hybrid mode (`1.0` = dense only, `0.0` = sparse only).
    pub alpha: Option<f32>,
    /// Exact-match metadata filters.
    pub filters: Option<MetadataFilters>,
    /// Number of sparse candidates to consider in hybrid mode.
    pub sparse_top_k: Option<usize>,
}

/// The raw answer of a [`VectorStore`] query.
///
/// Backends that store text fill `nodes`; id-only backends fill `ids` and the
/// caller rehydrates nodes from its node store. `similarities` is parallel to
/// whichever of the two is present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorStoreQueryResult {
    /// Full nodes, when the backend stores text.
    pub nodes: Option<Vec<Node>>,
    /// Similarity per result, best first.
    pub similarities: Option<Vec<f32>>,
    /// Backend ids per result.
    pub ids: Option<Vec<String>>,
}

/// A pluggable similarity-search backend.
///
/// Deletion is by reference document: every vector tagged with the document
/// id is removed in one call. The [`stores_text`](VectorStore::stores_text)
/// capability flag tells the index whether it must keep its own copy of each
/// node and a backend-id map.
///
/// # Example
///
/// ```rust,ignore
/// use adk_retrieval::{InMemoryVectorStore, VectorStore, VectorStoreQuery};
///
/// let store = InMemoryVectorStore::new();
/// let ids = store.upsert(&embedded_nodes).await?;
/// let result = store.query(&VectorStoreQuery {
///     query_embedding: Some(query_embedding),
///     similarity_top_k: 5,
///     ..Default::default()
/// }).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Whether query results carry full node text.
    fn stores_text(&self) -> bool;

    /// Whether queries need a dense embedding.
    fn is_embedding_query(&self) -> bool {
        true
    }

    /// Insert or replace embedded nodes, returning the backend id of each in order.
    ///
    /// Every node must carry an embedding.
    async fn upsert(&self, nodes: &[Node]) -> Result<Vec<String>>;

    /// Delete every vector belonging to a reference document.
    async fn delete(&self, ref_doc_id: &str) -> Result<()>;

    /// Run a similarity query. Results are ordered best first.
    async fn query(&self, query: &VectorStoreQuery) -> Result<VectorStoreQueryResult>;
}
