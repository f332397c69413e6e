//! The list index: an ordered sequence of node ids.

use async_trait::async_trait;
use tracing::info;

use crate::config::RetrieverConfig;
use crate::data_struct::{IndexList, IndexStruct};
use crate::error::Result;
use crate::indices::{
    Index, ensure_nodes_have_content, nodes_from_documents, record_document_hashes,
};
use crate::node::{Document, Node};
use crate::retrievers::{ListIndexEmbeddingRetriever, ListIndexRetriever, ListRetrieverMode, Retriever};
use crate::service::ServiceContext;
use crate::storage::StorageContext;

/// An index that keeps node ids in insertion order.
///
/// Retrieval returns every node, or the top-k by embedding similarity.
#[derive(Debug)]
pub struct ListIndex {
    index_struct: IndexList,
    storage: StorageContext,
    service: ServiceContext,
}

impl ListIndex {
    /// Build an index over `nodes`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ContentError`](crate::RagError::ContentError) if
    /// any node has empty content.
    pub async fn from_nodes(
        nodes: Vec<Node>,
        storage: StorageContext,
        service: ServiceContext,
    ) -> Result<Self> {
        ensure_nodes_have_content(&nodes)?;
        let mut index = Self { index_struct: IndexList::default(), storage, service };
        index.storage.docstore.put(&nodes, true).await?;
        index.insert_into_struct(&nodes).await?;
        index.persist_struct().await?;
        info!(index.id = %index.index_struct.index_id, node_count = nodes.len(), "built list index");
        Ok(index)
    }

    /// Chunk `documents` and build an index over the nodes.
    pub async fn from_documents(
        documents: &[Document],
        storage: StorageContext,
        service: ServiceContext,
    ) -> Result<Self> {
        let nodes = nodes_from_documents(documents, &service)?;
        let index = Self::from_nodes(nodes, storage, service).await?;
        record_document_hashes(documents, &index.storage).await?;
        Ok(index)
    }

    pub(crate) fn from_parts(
        index_struct: IndexList,
        storage: StorageContext,
        service: ServiceContext,
    ) -> Self {
        Self { index_struct, storage, service }
    }

    /// The node ids in retrieval order.
    pub fn index_list(&self) -> &IndexList {
        &self.index_struct
    }

    /// Build the retriever selected by `config.list_mode`.
    pub fn as_retriever(&self, config: &RetrieverConfig) -> Result<Box<dyn Retriever + '_>> {
        Ok(match config.list_mode {
            ListRetrieverMode::Default => Box::new(ListIndexRetriever::new(self)),
            ListRetrieverMode::Embedding => {
                Box::new(ListIndexEmbeddingRetriever::new(self, config.similarity_top_k))
            }
        })
    }
}

#[async_trait]
impl Index for ListIndex {
    fn index_id(&self) -> &str {
        &self.index_struct.index_id
    }

    fn index_struct(&self) -> IndexStruct {
        self.index_struct.clone().into()
    }

    fn storage_context(&self) -> &StorageContext {
        &self.storage
    }

    fn service_context(&self) -> &ServiceContext {
        &self.service
    }

    async fn insert_into_struct(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.index_struct.add_node(node.id.clone());
        }
        Ok(())
    }

    async fn delete_from_struct(&mut self, node_id: &str) -> Result<()> {
        self.index_struct.delete(node_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBundle;

    fn service() -> ServiceContext {
        ServiceContext::builder().build().unwrap()
    }

    #[tokio::test]
    async fn retrieves_every_node_in_order() {
        let nodes = vec![Node::with_id("a", "first"), Node::with_id("b", "second")];
        let index = ListIndex::from_nodes(nodes, StorageContext::new(), service()).await.unwrap();

        let retriever = index.as_retriever(&RetrieverConfig::default()).unwrap();
        let results = retriever.retrieve(&QueryBundle::new("anything")).await.unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(results.iter().all(|r| r.score.is_none()));
    }

    #[tokio::test]
    async fn delete_removes_from_struct_and_store() {
        let nodes = vec![Node::with_id("a", "first"), Node::with_id("b", "second")];
        let storage = StorageContext::new();
        let mut index = ListIndex::from_nodes(nodes, storage.clone(), service()).await.unwrap();

        index.delete_nodes(&["a".to_string()], true).await.unwrap();

        assert_eq!(index.index_list().nodes, vec!["b".to_string()]);
        assert!(!storage.docstore.document_exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn empty_node_aborts_build() {
        let nodes = vec![Node::with_id("a", "text"), Node::with_id("b", "  ")];
        let storage = StorageContext::new();
        let result = ListIndex::from_nodes(nodes, storage.clone(), service()).await;

        assert!(matches!(result, Err(crate::error::RagError::ContentError(_))));
        assert!(storage.docstore.docs().await.unwrap().is_empty());
    }
}
