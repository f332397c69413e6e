//! Dense retrieval against a vector index's backend.

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::RetrieverConfig;
use crate::error::{RagError, Result};
use crate::indices::{Index, VectorStoreIndex};
use crate::node::{Node, ScoredNode};
use crate::query::{MetadataFilters, QueryBundle};
use crate::retrievers::{Retriever, query_embedding};
use crate::vectorstore::{VectorStoreQuery, VectorStoreQueryMode, VectorStoreQueryResult};

/// Dense retrieval against the vector backend of a [`VectorStoreIndex`].
///
/// Metadata filters on the query take precedence over the retriever's own.
/// When the backend returns only ids, nodes are rehydrated from the node
/// store; an id that no longer resolves is treated as index corruption and
/// raises [`RagError::NotFound`].
#[derive(Debug, Clone)]
pub struct VectorIndexRetriever<'a> {
    index: &'a VectorStoreIndex,
    similarity_top_k: usize,
    mode: VectorStoreQueryMode,
    alpha: Option<f32>,
    sparse_top_k: Option<usize>,
    filters: Option<MetadataFilters>,
    node_ids: Option<Vec<String>>,
    doc_ids: Option<Vec<String>>,
}

impl<'a> VectorIndexRetriever<'a> {
    /// Retrieve from `index` with the scoring parameters in `config`.
    pub fn new(index: &'a VectorStoreIndex, config: &RetrieverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index,
            similarity_top_k: config.similarity_top_k,
            mode: config.vector_store_query_mode,
            alpha: config.alpha,
            sparse_top_k: config.sparse_top_k,
            filters: None,
            node_ids: None,
            doc_ids: None,
        })
    }

    /// Default metadata filters, used when a query carries none.
    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Restrict results to these node ids.
    pub fn with_node_ids(mut self, node_ids: Vec<String>) -> Self {
        self.node_ids = Some(node_ids);
        self
    }

    /// Restrict results to nodes of these reference documents.
    pub fn with_doc_ids(mut self, doc_ids: Vec<String>) -> Self {
        self.doc_ids = Some(doc_ids);
        self
    }

    async fn build_query(&self, query: &QueryBundle) -> Result<VectorStoreQuery> {
        let query_embedding = if self.index.vector_store().is_embedding_query() {
            let provider = self.index.service_context().embed_model()?;
            Some(query_embedding(query, provider.as_ref()).await?)
        } else {
            None
        };
        Ok(VectorStoreQuery {
            query_embedding,
            similarity_top_k: self.similarity_top_k,
            node_ids: self.node_ids.clone(),
            doc_ids: self.doc_ids.clone(),
            query_str: Some(query.query_str.clone()),
            mode: self.mode,
            alpha: self.alpha,
            filters: query.filters.clone().or_else(|| self.filters.clone()),
            sparse_top_k: self.sparse_top_k,
        })
    }

    async fn rehydrate(&self, result: VectorStoreQueryResult) -> Result<Vec<ScoredNode>> {
        let nodes: Vec<Node> = match result.nodes {
            Some(nodes) => nodes,
            None => {
                let ids = result.ids.unwrap_or_default();
                let dict = self.index.index_dict();
                let node_ids = ids
                    .iter()
                    .map(|vid| {
                        dict.node_id(vid).map(str::to_string).ok_or_else(|| RagError::NotFound {
                            kind: "vector_id",
                            id: vid.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.index.storage_context().docstore.get_nodes(&node_ids, true).await?
            }
        };
        let similarities = result.similarities.unwrap_or_default();
        Ok(nodes
            .into_iter()
            .enumerate()
            .map(|(i, node)| ScoredNode::new(node, similarities.get(i).copied()))
            .collect())
    }
}

#[async_trait]
impl Retriever for VectorIndexRetriever<'_> {
    async fn retrieve(&self, query: &QueryBundle) -> Result<Vec<ScoredNode>> {
        let store_query = self.build_query(query).await?;
        let result = self.index.vector_store().query(&store_query).await.map_err(|e| {
            error!(error = %e, "vector store query failed");
            e
        })?;
        let results = self.rehydrate(result).await?;
        debug!(result_count = results.len(), top_k = self.similarity_top_k, "dense retrieval");
        Ok(results)
    }
}
