//! Indices: the lifecycle that keeps the node store, an index structure and
//! (for vector indices) the vector backend consistent.
//!
//! Every index implements [`Index`]. Implementors provide the
//! structure-specific steps ([`insert_into_struct`](Index::insert_into_struct),
//! [`delete_from_struct`](Index::delete_from_struct)); the trait supplies the
//! document-level lifecycle on top:
//!
//! | Operation | Effect |
//! |---|---|
//! | [`insert_document`](Index::insert_document) | chunk, insert nodes, record the document hash |
//! | [`delete_nodes`](Index::delete_nodes) | remove ids from the structure, optionally from the node store |
//! | [`delete_ref_doc`](Index::delete_ref_doc) | delete every node of a document |
//! | [`update_ref_doc`](Index::update_ref_doc) | delete (purging the hash), then insert again |
//! | [`refresh_ref_docs`](Index::refresh_ref_docs) | insert new, update changed, skip unchanged documents |
//!
//! `update_ref_doc` runs in two phases without a transaction log. If the
//! insert phase fails, the document's old nodes are already gone and the
//! caller must retry the insert.
//!
//! Mutation takes `&mut self` while retrievers borrow an index immutably, so
//! reads and writes on one index cannot overlap.

mod keyword_table;
mod list;
mod vector;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{IndexConfig, RetrieverConfig};
use crate::data_struct::{IndexStruct, IndexStructKind};
use crate::docstore::RefDocInfo;
use crate::error::{RagError, Result};
use crate::node::{Document, MetadataMode, Node};
use crate::retrievers::{KeywordTableRetrieverMode, ListRetrieverMode, Retriever};
use crate::vectorstore::VectorStoreQueryMode;
use crate::service::ServiceContext;
use crate::storage::StorageContext;

pub use keyword_table::KeywordTableIndex;
pub use list::ListIndex;
pub use vector::VectorStoreIndex;

/// The lifecycle shared by all index kinds.
#[async_trait]
pub trait Index: Send + Sync {
    /// The id under which the structure is stored in the index store.
    fn index_id(&self) -> &str;

    /// A snapshot of the index structure.
    fn index_struct(&self) -> IndexStruct;

    /// The stores this index writes to.
    fn storage_context(&self) -> &StorageContext;

    /// The collaborators this index uses.
    fn service_context(&self) -> &ServiceContext;

    /// Whether the node store holds a copy of every indexed node.
    fn stores_nodes_locally(&self) -> bool {
        true
    }

    /// Add already-stored nodes to the index structure.
    async fn insert_into_struct(&mut self, nodes: &[Node]) -> Result<()>;

    /// Remove a node id from the index structure.
    async fn delete_from_struct(&mut self, node_id: &str) -> Result<()>;

    /// Store nodes, extend the structure incrementally and record the new
    /// structure in the index store.
    async fn insert_nodes(&mut self, nodes: Vec<Node>) -> Result<()> {
        let docstore = self.storage_context().docstore.clone();
        docstore.put(&nodes, true).await?;
        self.insert_into_struct(&nodes).await?;
        self.persist_struct().await?;
        debug!(index.id = %self.index_id(), node_count = nodes.len(), "inserted nodes");
        Ok(())
    }

    /// Chunk a document, insert its nodes and record its content hash.
    async fn insert_document(&mut self, document: &Document) -> Result<()> {
        let nodes = self.service_context().chunker().chunk(document)?;
        self.insert_nodes(nodes).await?;
        let docstore = self.storage_context().docstore.clone();
        docstore.set_document_hash(&document.id, &document.hash()).await
    }

    /// Remove nodes from the structure, and from the node store when
    /// `delete_from_docstore` is set.
    async fn delete_nodes(&mut self, node_ids: &[String], delete_from_docstore: bool) -> Result<()> {
        let docstore = self.storage_context().docstore.clone();
        for node_id in node_ids {
            self.delete_from_struct(node_id).await?;
            if delete_from_docstore {
                docstore.delete(node_id, false).await?;
            }
        }
        self.persist_struct().await
    }

    /// Delete every node of a reference document.
    ///
    /// An unknown `ref_doc_id` is logged and ignored.
    async fn delete_ref_doc(&mut self, ref_doc_id: &str, delete_from_docstore: bool) -> Result<()> {
        let docstore = self.storage_context().docstore.clone();
        let Some(info) = docstore.get_ref_doc_info(ref_doc_id).await? else {
            warn!(ref_doc.id = ref_doc_id, "ref_doc_id not found, nothing deleted");
            return Ok(());
        };
        self.delete_nodes(&info.node_ids, false).await?;
        if delete_from_docstore {
            docstore.delete_ref_doc(ref_doc_id, false).await?;
        }
        debug!(ref_doc.id = ref_doc_id, node_count = info.node_ids.len(), "deleted ref doc");
        Ok(())
    }

    /// Replace a document's nodes: delete with purge, then insert.
    async fn update_ref_doc(&mut self, document: &Document) -> Result<()> {
        self.delete_ref_doc(&document.id, true).await?;
        self.insert_document(document).await
    }

    /// Insert unseen documents and update changed ones.
    ///
    /// Returns, per input document, whether the index was mutated.
    async fn refresh_ref_docs(&mut self, documents: &[Document]) -> Result<Vec<bool>> {
        let docstore = self.storage_context().docstore.clone();
        let mut refreshed = Vec::with_capacity(documents.len());
        for document in documents {
            let changed = match docstore.get_document_hash(&document.id).await? {
                None => {
                    self.insert_document(document).await?;
                    true
                }
                Some(hash) if hash != document.hash() => {
                    self.update_ref_doc(document).await?;
                    true
                }
                Some(_) => false,
            };
            refreshed.push(changed);
        }
        info!(
            index.id = %self.index_id(),
            document_count = documents.len(),
            refreshed_count = refreshed.iter().filter(|r| **r).count(),
            "refreshed documents"
        );
        Ok(refreshed)
    }

    /// Bookkeeping for every reference document in the node store.
    async fn ref_doc_info(&self) -> Result<BTreeMap<String, RefDocInfo>> {
        self.storage_context().docstore.all_ref_doc_info().await
    }

    /// Record the current structure in the index store.
    async fn persist_struct(&self) -> Result<()> {
        self.storage_context().index_store.add_index_struct(self.index_struct()).await
    }
}

/// Reject nodes whose embeddable content is empty.
///
/// A partially built index is worse than a failed build, so one empty node
/// aborts the whole build.
pub(crate) fn ensure_nodes_have_content(nodes: &[Node]) -> Result<()> {
    if let Some(empty) = nodes.iter().find(|n| n.get_content(MetadataMode::Embed).trim().is_empty()) {
        return Err(RagError::ContentError(format!(
            "cannot build index from node '{}' with no content; ensure all nodes have content",
            empty.id
        )));
    }
    Ok(())
}

/// Chunk documents ahead of a build.
pub(crate) fn nodes_from_documents(
    documents: &[Document],
    service: &ServiceContext,
) -> Result<Vec<Node>> {
    service.chunker().chunk_documents(documents)
}

/// Record document hashes once a build over their nodes has succeeded.
///
/// A failed build leaves no hash behind, so a later refresh still treats the
/// documents as unseen.
pub(crate) async fn record_document_hashes(
    documents: &[Document],
    storage: &StorageContext,
) -> Result<()> {
    for document in documents {
        storage.docstore.set_document_hash(&document.id, &document.hash()).await?;
    }
    Ok(())
}

/// An index of any kind.
///
/// This is the closed set of index variants; [`as_retriever`](AnyIndex::as_retriever)
/// picks the retriever for the variant.
#[derive(Debug)]
pub enum AnyIndex {
    /// A [`ListIndex`].
    List(ListIndex),
    /// A [`KeywordTableIndex`].
    KeywordTable(KeywordTableIndex),
    /// A [`VectorStoreIndex`].
    Vector(VectorStoreIndex),
}

impl AnyIndex {
    /// The index structure kind.
    pub fn kind(&self) -> IndexStructKind {
        match self {
            Self::List(_) => IndexStructKind::List,
            Self::KeywordTable(_) => IndexStructKind::KeywordTable,
            Self::Vector(_) => IndexStructKind::VectorStore,
        }
    }

    /// The lifecycle interface, read-only.
    pub fn as_index(&self) -> &dyn Index {
        match self {
            Self::List(index) => index,
            Self::KeywordTable(index) => index,
            Self::Vector(index) => index,
        }
    }

    /// The lifecycle interface, for mutation.
    pub fn as_index_mut(&mut self) -> &mut dyn Index {
        match self {
            Self::List(index) => index,
            Self::KeywordTable(index) => index,
            Self::Vector(index) => index,
        }
    }

    /// Build the retriever for this index kind.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the configuration is invalid or
    /// sets a list, keyword or vector mode that does not belong to this
    /// index kind.
    pub fn as_retriever(&self, config: &RetrieverConfig) -> Result<Box<dyn Retriever + '_>> {
        config.validate()?;
        let kind = self.kind();
        let list_mode_set = config.list_mode != ListRetrieverMode::Default;
        let keyword_mode_set = config.keyword_mode != KeywordTableRetrieverMode::Default;
        let vector_mode_set = config.vector_store_query_mode != VectorStoreQueryMode::Default;
        let mismatch = match kind {
            IndexStructKind::List => keyword_mode_set || vector_mode_set,
            IndexStructKind::KeywordTable => list_mode_set || vector_mode_set,
            IndexStructKind::VectorStore => list_mode_set || keyword_mode_set,
        };
        if mismatch {
            return Err(RagError::ConfigError(format!(
                "retriever configuration sets a mode that a {kind} index does not support"
            )));
        }
        match self {
            Self::List(index) => index.as_retriever(config),
            Self::KeywordTable(index) => index.as_retriever(config),
            Self::Vector(index) => index.as_retriever(config),
        }
    }
}

impl From<ListIndex> for AnyIndex {
    fn from(index: ListIndex) -> Self {
        Self::List(index)
    }
}

impl From<KeywordTableIndex> for AnyIndex {
    fn from(index: KeywordTableIndex) -> Self {
        Self::KeywordTable(index)
    }
}

impl From<VectorStoreIndex> for AnyIndex {
    fn from(index: VectorStoreIndex) -> Self {
        Self::Vector(index)
    }
}

/// Rebuild an index from a structure in `storage`'s index store.
///
/// With `index_id` of `None` the store must hold exactly one structure.
///
/// # Errors
///
/// Returns [`RagError::NotFound`] if no structure matches, or
/// [`RagError::ConfigError`] if a vector index is loaded without a vector
/// backend attached to `storage`.
pub async fn load_index_from_storage(
    storage: StorageContext,
    service: ServiceContext,
    config: IndexConfig,
    index_id: Option<&str>,
) -> Result<AnyIndex> {
    let index_struct = storage.index_store.get_index_struct(index_id).await?.ok_or_else(|| {
        RagError::NotFound { kind: "index", id: index_id.unwrap_or("<default>").to_string() }
    })?;
    info!(index.id = %index_struct.index_id(), kind = %index_struct.kind(), "loading index");
    let index: AnyIndex = match index_struct {
        IndexStruct::List(list) => ListIndex::from_parts(list, storage, service).into(),
        IndexStruct::KeywordTable(table) => {
            KeywordTableIndex::from_parts(table, storage, service, config).into()
        }
        IndexStruct::VectorStore(dict) => {
            VectorStoreIndex::from_parts(dict, storage, service, config)?.into()
        }
    };
    Ok(index)
}
