//! The keyword table index.
//!
//! Each node contributes up to `max_keywords_per_chunk` extracted keywords;
//! the table maps every keyword to the ids of the nodes that produced it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{IndexConfig, RetrieverConfig};
use crate::data_struct::{IndexStruct, KeywordTable};
use crate::error::Result;
use crate::indices::{
    Index, ensure_nodes_have_content, nodes_from_documents, record_document_hashes,
};
use crate::keyword::{KeywordExtractor, RakeKeywordExtractor, SimpleKeywordExtractor};
use crate::node::{Document, MetadataMode, Node};
use crate::retrievers::{KeywordTableRetriever, KeywordTableRetrieverMode, Retriever};
use crate::service::ServiceContext;
use crate::storage::StorageContext;

/// An index mapping extracted keywords to the nodes that contain them.
///
/// Keywords come from the service context's [`KeywordExtractor`], run over
/// each node's LLM-facing content.
#[derive(Debug)]
pub struct KeywordTableIndex {
    index_struct: KeywordTable,
    storage: StorageContext,
    service: ServiceContext,
    max_keywords_per_chunk: usize,
}

impl KeywordTableIndex {
    /// Build an index over `nodes`, extracting up to
    /// `config.max_keywords_per_chunk` keywords from each.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ContentError`](crate::RagError::ContentError) if
    /// any node has empty content, or the extractor's error.
    pub async fn from_nodes(
        nodes: Vec<Node>,
        storage: StorageContext,
        service: ServiceContext,
        config: &IndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        ensure_nodes_have_content(&nodes)?;
        let mut index = Self {
            index_struct: KeywordTable::default(),
            storage,
            service,
            max_keywords_per_chunk: config.max_keywords_per_chunk,
        };
        // Extract first so a failing extractor leaves the node store untouched.
        index.insert_into_struct(&nodes).await?;
        index.storage.docstore.put(&nodes, true).await?;
        index.persist_struct().await?;
        info!(
            index.id = %index.index_struct.index_id,
            node_count = nodes.len(),
            keyword_count = index.index_struct.table.len(),
            "built keyword table index"
        );
        Ok(index)
    }

    /// Chunk `documents` and build an index over the nodes.
    pub async fn from_documents(
        documents: &[Document],
        storage: StorageContext,
        service: ServiceContext,
        config: &IndexConfig,
    ) -> Result<Self> {
        let nodes = nodes_from_documents(documents, &service)?;
        let index = Self::from_nodes(nodes, storage, service, config).await?;
        record_document_hashes(documents, &index.storage).await?;
        Ok(index)
    }

    pub(crate) fn from_parts(
        index_struct: KeywordTable,
        storage: StorageContext,
        service: ServiceContext,
        config: IndexConfig,
    ) -> Self {
        Self { index_struct, storage, service, max_keywords_per_chunk: config.max_keywords_per_chunk }
    }

    /// The keyword table.
    pub fn table(&self) -> &KeywordTable {
        &self.index_struct
    }

    /// Build a retriever whose query keywords come from `config.keyword_mode`.
    pub fn as_retriever(&self, config: &RetrieverConfig) -> Result<Box<dyn Retriever + '_>> {
        let analyzer = self.service.analyzer().clone();
        let extractor: Arc<dyn KeywordExtractor> = match config.keyword_mode {
            KeywordTableRetrieverMode::Default => self.service.keyword_extractor().clone(),
            KeywordTableRetrieverMode::Simple => Arc::new(SimpleKeywordExtractor::new(analyzer)),
            KeywordTableRetrieverMode::Rake => Arc::new(RakeKeywordExtractor::new(analyzer)),
        };
        Ok(Box::new(KeywordTableRetriever::new(
            self,
            extractor,
            config.max_keywords_per_query,
            config.num_chunks_per_query,
        )))
    }
}

#[async_trait]
impl Index for KeywordTableIndex {
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
        let extractor = self.service.keyword_extractor().clone();
        for node in nodes {
            let keywords = extractor
                .extract(&node.get_content(MetadataMode::Llm), self.max_keywords_per_chunk)
                .await?;
            debug!(node.id = %node.id, keyword_count = keywords.len(), "extracted node keywords");
            self.index_struct.add_node(keywords, &node.id);
        }
        Ok(())
    }

    async fn delete_from_struct(&mut self, node_id: &str) -> Result<()> {
        self.index_struct.delete_node(node_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBundle;

    #[tokio::test]
    async fn keywords_point_at_their_nodes() {
        let service = ServiceContext::builder().build().unwrap();
        let nodes = vec![
            Node::with_id("a", "Tokio drives async tasks."),
            Node::with_id("b", "Serde serializes structs."),
        ];
        let index =
            KeywordTableIndex::from_nodes(nodes, StorageContext::new(), service, &IndexConfig::default())
                .await
                .unwrap();

        assert!(index.table().table["tokio"].contains("a"));
        assert!(index.table().table["serde"].contains("b"));

        let retriever = index.as_retriever(&RetrieverConfig::default()).unwrap();
        let results = retriever.retrieve(&QueryBundle::new("how does tokio work")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "a");
    }

    #[tokio::test]
    async fn deleting_a_node_drops_its_only_keywords() {
        let service = ServiceContext::builder().build().unwrap();
        let nodes = vec![Node::with_id("a", "tokio runtime"), Node::with_id("b", "tokio serde")];
        let mut index =
            KeywordTableIndex::from_nodes(nodes, StorageContext::new(), service, &IndexConfig::default())
                .await
                .unwrap();

        index.delete_nodes(&["a".to_string()], true).await.unwrap();

        assert!(!index.table().table.contains_key("runtime"));
        assert_eq!(index.table().table["tokio"].len(), 1);
    }
}
