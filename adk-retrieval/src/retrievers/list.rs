//! Retrievers over a [`ListIndex`](crate::ListIndex).

use async_trait::async_trait;
use tracing::debug;

use crate::embedding::{embed_nodes, top_k_by_similarity};
use crate::error::Result;
use crate::indices::{Index, ListIndex};
use crate::node::ScoredNode;
use crate::query::QueryBundle;
use crate::retrievers::{Retriever, query_embedding};

/// Returns every node of a [`ListIndex`] in list order, unscored.
#[derive(Debug, Clone, Copy)]
pub struct ListIndexRetriever<'a> {
    index: &'a ListIndex,
}

impl<'a> ListIndexRetriever<'a> {
    /// Retrieve from `index`.
    pub fn new(index: &'a ListIndex) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Retriever for ListIndexRetriever<'_> {
    async fn retrieve(&self, _query: &QueryBundle) -> Result<Vec<ScoredNode>> {
        let nodes = self
            .index
            .storage_context()
            .docstore
            .get_nodes(&self.index.index_list().nodes, true)
            .await?;
        Ok(nodes.into_iter().map(|node| ScoredNode::new(node, None)).collect())
    }
}

/// Ranks the nodes of a [`ListIndex`] by cosine similarity to the query.
///
/// Nodes stored without an embedding are embedded on each query.
#[derive(Debug, Clone, Copy)]
pub struct ListIndexEmbeddingRetriever<'a> {
    index: &'a ListIndex,
    similarity_top_k: usize,
}

impl<'a> ListIndexEmbeddingRetriever<'a> {
    /// Retrieve the `similarity_top_k` best nodes from `index`.
    pub fn new(index: &'a ListIndex, similarity_top_k: usize) -> Self {
        Self { index, similarity_top_k }
    }
}

#[async_trait]
impl Retriever for ListIndexEmbeddingRetriever<'_> {
    async fn retrieve(&self, query: &QueryBundle) -> Result<Vec<ScoredNode>> {
        let provider = self.index.service_context().embed_model()?;
        let mut nodes = self
            .index
            .storage_context()
            .docstore
            .get_nodes(&self.index.index_list().nodes, true)
            .await?;
        let batch_size = nodes.len();
        embed_nodes(provider.as_ref(), &mut nodes, batch_size, false).await?;
        let query_embedding = query_embedding(query, provider.as_ref()).await?;

        let ranked = top_k_by_similarity(
            &query_embedding,
            nodes.iter().map(|n| n.embedding.as_deref().unwrap_or_default()),
            self.similarity_top_k,
        );
        debug!(candidates = nodes.len(), result_count = ranked.len(), "ranked list index");
        Ok(ranked
            .into_iter()
            .map(|(i, score)| ScoredNode::new(nodes[i].clone(), Some(score)))
            .collect())
    }
}
