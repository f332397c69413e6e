//! The vector store index: embeddings live in a [`VectorStore`] backend,
//! node bodies in the node store unless the backend keeps the text itself.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::{IndexConfig, RetrieverConfig};
use crate::data_struct::{IndexDict, IndexStruct};
use crate::embedding::embed_nodes;
use crate::error::{RagError, Result};
use crate::indices::{
    Index, ensure_nodes_have_content, nodes_from_documents, record_document_hashes,
};
use crate::node::{Document, Node};
use crate::retrievers::{Retriever, VectorIndexRetriever};
use crate::service::ServiceContext;
use crate::storage::StorageContext;
use crate::vectorstore::VectorStore;

/// An index over a vector backend.
///
/// Nodes are embedded in batches and upserted into the backend. When the
/// backend does not store text (or `store_nodes_override` is set), the index
/// also keeps each node, without its embedding, in the node store and maps
/// backend ids to node ids.
///
/// Deletion is by reference document only; the backend has no per-node
/// delete.
pub struct VectorStoreIndex {
    index_struct: IndexDict,
    storage: StorageContext,
    service: ServiceContext,
    vector_store: Arc<dyn VectorStore>,
    config: IndexConfig,
}

impl std::fmt::Debug for VectorStoreIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreIndex")
            .field("index_id", &self.index_struct.index_id)
            .field("stores_text", &self.vector_store.stores_text())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VectorStoreIndex {
    /// Embed `nodes` and build an index over them.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `storage` has no vector backend or
    /// `service` no embedding provider, and
    /// [`RagError::ContentError`] if any node has empty content.
    pub async fn from_nodes(
        nodes: Vec<Node>,
        storage: StorageContext,
        service: ServiceContext,
        config: IndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        ensure_nodes_have_content(&nodes)?;
        let mut index = Self::from_parts(IndexDict::default(), storage, service, config)?;
        index.add_nodes_to_index(nodes.clone()).await?;
        index.persist_struct().await?;
        info!(
            index.id = %index.index_struct.index_id,
            node_count = nodes.len(),
            stores_text = index.vector_store.stores_text(),
            "built vector store index"
        );
        Ok(index)
    }

    /// Chunk `documents` and build an index over the nodes.
    pub async fn from_documents(
        documents: &[Document],
        storage: StorageContext,
        service: ServiceContext,
        config: IndexConfig,
    ) -> Result<Self> {
        let nodes = nodes_from_documents(documents, &service)?;
        let index = Self::from_nodes(nodes, storage, service, config).await?;
        record_document_hashes(documents, &index.storage).await?;
        Ok(index)
    }

    /// Wrap a backend that already holds embedded nodes.
    ///
    /// The backend must store text, since there is no local copy of the nodes.
    pub async fn from_vector_store(
        vector_store: Arc<dyn VectorStore>,
        service: ServiceContext,
        config: IndexConfig,
    ) -> Result<Self> {
        if !vector_store.stores_text() {
            return Err(RagError::ConfigError(
                "cannot wrap a vector store that does not store text".to_string(),
            ));
        }
        let storage = StorageContext::new().with_vector_store(vector_store);
        let index = Self::from_parts(IndexDict::default(), storage, service, config)?;
        index.persist_struct().await?;
        Ok(index)
    }

    pub(crate) fn from_parts(
        index_struct: IndexDict,
        storage: StorageContext,
        service: ServiceContext,
        config: IndexConfig,
    ) -> Result<Self> {
        let vector_store = storage.vector_store.clone().ok_or_else(|| {
            RagError::ConfigError("a vector index requires a vector store".to_string())
        })?;
        Ok(Self { index_struct, storage, service, vector_store, config })
    }

    /// The backend id to node id map.
    pub fn index_dict(&self) -> &IndexDict {
        &self.index_struct
    }

    /// The vector backend.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Build a dense retriever.
    pub fn as_retriever(&self, config: &RetrieverConfig) -> Result<Box<dyn Retriever + '_>> {
        Ok(Box::new(VectorIndexRetriever::new(self, config)?))
    }

    async fn add_nodes_to_index(&mut self, nodes: Vec<Node>) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        let provider = self.service.embed_model()?.clone();
        let batch_size = self.config.insert_batch_size;
        for (batch_index, batch) in nodes.chunks(batch_size.max(1)).enumerate() {
            let mut batch = batch.to_vec();
            embed_nodes(provider.as_ref(), &mut batch, batch_size, self.config.embed_concurrently)
                .await?;
            let ids = self.vector_store.upsert(&batch).await.map_err(|e| {
                error!(error = %e, batch = batch_index, "vector store upsert failed");
                e
            })?;
            if ids.len() != batch.len() {
                return Err(RagError::VectorStoreError {
                    backend: "upsert".to_string(),
                    message: format!("expected {} ids, backend returned {}", batch.len(), ids.len()),
                });
            }

            if self.stores_nodes_locally() {
                let stored: Vec<Node> = batch.iter().map(Node::without_embedding).collect();
                for (node, id) in stored.iter().zip(&ids) {
                    self.index_struct.add_node(&node.id, Some(id));
                }
                self.storage.docstore.put(&stored, true).await?;
            }
            debug!(batch = batch_index, batch_len = batch.len(), "indexed vector batch");
        }
        Ok(())
    }
}

#[async_trait]
impl Index for VectorStoreIndex {
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

    /// False when a text-storing backend holds the nodes and
    /// `store_nodes_override` is off.
    fn stores_nodes_locally(&self) -> bool {
        !self.vector_store.stores_text() || self.config.store_nodes_override
    }

    async fn insert_into_struct(&mut self, nodes: &[Node]) -> Result<()> {
        self.add_nodes_to_index(nodes.to_vec()).await
    }

    async fn delete_from_struct(&mut self, node_id: &str) -> Result<()> {
        self.index_struct.delete(node_id);
        Ok(())
    }

    async fn insert_nodes(&mut self, nodes: Vec<Node>) -> Result<()> {
        let count = nodes.len();
        self.add_nodes_to_index(nodes).await?;
        self.persist_struct().await?;
        debug!(index.id = %self.index_struct.index_id, node_count = count, "inserted nodes");
        Ok(())
    }

    async fn delete_nodes(&mut self, _node_ids: &[String], _delete_from_docstore: bool) -> Result<()> {
        Err(RagError::Unsupported(
            "vector indices delete by reference document; use delete_ref_doc".to_string(),
        ))
    }

    async fn delete_ref_doc(&mut self, ref_doc_id: &str, delete_from_docstore: bool) -> Result<()> {
        self.vector_store.delete(ref_doc_id).await?;
        let docstore = self.storage.docstore.clone();
        if self.stores_nodes_locally() {
            if let Some(info) = docstore.get_ref_doc_info(ref_doc_id).await? {
                for node_id in &info.node_ids {
                    self.index_struct.delete(node_id);
                }
            }
        }
        if delete_from_docstore {
            docstore.delete_ref_doc(ref_doc_id, false).await?;
        }
        self.persist_struct().await?;
        debug!(ref_doc.id = ref_doc_id, "deleted ref doc from vector index");
        Ok(())
    }
}
