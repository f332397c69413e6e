//! Node store: the authoritative home of node content.
//!
//! Index structures only hold node ids; the text, metadata and relationships
//! live here. The store also keeps reference-document bookkeeping (which
//! nodes were split from which document) and content hashes used to detect
//! changed documents on refresh.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::node::{Metadata, Node};

/// The file name used by [`StorageContext`](crate::StorageContext) for the node store.
pub const DEFAULT_DOCSTORE_FILE: &str = "docstore.json";

/// The nodes derived from one reference document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RefDocInfo {
    /// Ids of the nodes split from the document, in insertion order.
    pub node_ids: Vec<String>,
    /// The document's metadata at the time its nodes were stored.
    #[serde(default)]
    pub metadata: Metadata,
}

/// An addressable store of nodes with reference-document bookkeeping.
///
/// Lookups take an explicit `raise_error` flag: when `true` a missing id is
/// [`RagError::NotFound`]; when `false` it is reported as absent (`None`, a
/// skipped entry, or a logged no-op for deletes).
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Store nodes.
    ///
    /// With `allow_update` an existing id is overwritten (last write wins);
    /// without it, an existing id is an error and nothing is written.
    async fn put(&self, nodes: &[Node], allow_update: bool) -> Result<()>;

    /// Fetch one node.
    async fn get_node(&self, id: &str, raise_error: bool) -> Result<Option<Node>>;

    /// Fetch several nodes in the order of `ids`.
    ///
    /// Missing ids are skipped unless `raise_error` is set.
    async fn get_nodes(&self, ids: &[String], raise_error: bool) -> Result<Vec<Node>> {
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = self.get_node(id, raise_error).await? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Whether a node with this id is stored.
    async fn document_exists(&self, id: &str) -> Result<bool>;

    /// Delete a node and its hash record.
    ///
    /// Removing the last node of a reference document also removes that
    /// document's bookkeeping and hash record.
    async fn delete(&self, id: &str, raise_error: bool) -> Result<()>;

    /// Delete every node of a reference document and its hash record.
    ///
    /// A document with a hash record but no stored nodes only loses the hash.
    async fn delete_ref_doc(&self, ref_doc_id: &str, raise_error: bool) -> Result<()>;

    /// The node ids and metadata recorded for a reference document.
    async fn get_ref_doc_info(&self, ref_doc_id: &str) -> Result<Option<RefDocInfo>>;

    /// Bookkeeping for every reference document.
    async fn all_ref_doc_info(&self) -> Result<BTreeMap<String, RefDocInfo>>;

    /// Record the content hash of a document or node.
    async fn set_document_hash(&self, id: &str, hash: &str) -> Result<()>;

    /// The recorded content hash, if any.
    async fn get_document_hash(&self, id: &str) -> Result<Option<String>>;

    /// A snapshot of every stored node keyed by id.
    async fn docs(&self) -> Result<BTreeMap<String, Node>>;

    /// Write the store to durable storage at `path`.
    async fn persist(&self, path: &Path) -> Result<()> {
        Err(RagError::Unsupported(format!(
            "this node store cannot persist to {}",
            path.display()
        )))
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
struct NodeStoreData {
    #[serde(default)]
    docs: BTreeMap<String, Node>,
    #[serde(default)]
    ref_doc_info: BTreeMap<String, RefDocInfo>,
    #[serde(default)]
    hashes: BTreeMap<String, String>,
}

impl NodeStoreData {
    fn remove_node(&mut self, id: &str) -> Option<Node> {
        let node = self.docs.remove(id)?;
        self.hashes.remove(id);
        if let Some(ref_doc_id) = node.ref_doc_id() {
            self.detach_from_ref_doc(id, ref_doc_id);
        }
        Some(node)
    }

    /// Drop `id` from a reference document's node list. An emptied document
    /// loses its bookkeeping and hash record.
    fn detach_from_ref_doc(&mut self, id: &str, ref_doc_id: &str) {
        let emptied = match self.ref_doc_info.get_mut(ref_doc_id) {
            Some(info) => {
                info.node_ids.retain(|node_id| node_id != id);
                info.node_ids.is_empty()
            }
            None => false,
        };
        if emptied {
            self.ref_doc_info.remove(ref_doc_id);
            self.hashes.remove(ref_doc_id);
        }
    }
}

/// An in-memory [`NodeStore`] with JSON persistence.
///
/// # Example
///
/// ```rust,ignore
/// use adk_retrieval::{NodeStore, SimpleNodeStore};
///
/// let store = SimpleNodeStore::new();
/// store.put(&nodes, true).await?;
/// store.persist(Path::new("./storage/docstore.json")).await?;
/// ```
#[derive(Debug, Default)]
pub struct SimpleNodeStore {
    data: RwLock<NodeStoreData>,
}

impl SimpleNodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store previously written by [`persist`](NodeStore::persist).
    pub async fn from_persist_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        let data: NodeStoreData = serde_json::from_str(&json)?;
        Ok(Self { data: RwLock::new(data) })
    }

    /// Number of stored nodes.
    pub async fn len(&self) -> usize {
        self.data.read().await.docs.len()
    }

    /// Whether no nodes are stored.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.docs.is_empty()
    }
}

#[async_trait]
impl NodeStore for SimpleNodeStore {
    async fn persist(&self, path: &Path) -> Result<()> {
        let json = {
            let data = self.data.read().await;
            serde_json::to_string_pretty(&*data)?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), "persisted node store");
        Ok(())
    }

    async fn put(&self, nodes: &[Node], allow_update: bool) -> Result<()> {
        let mut data = self.data.write().await;
        if !allow_update {
            if let Some(existing) = nodes.iter().find(|node| data.docs.contains_key(&node.id)) {
                return Err(RagError::ContentError(format!(
                    "node '{}' already exists and updates are not allowed",
                    existing.id
                )));
            }
        }
        for node in nodes {
            let previous_ref_doc = data
                .docs
                .get(&node.id)
                .and_then(|existing| existing.ref_doc_id().map(str::to_string));
            if let Some(previous) = previous_ref_doc {
                if node.ref_doc_id() != Some(previous.as_str()) {
                    debug!(node.id = %node.id, ref_doc.id = %previous, "node moved off its ref doc");
                    data.detach_from_ref_doc(&node.id, &previous);
                }
            }
            if let Some(source) = node.source_node() {
                let info = data.ref_doc_info.entry(source.node_id.clone()).or_default();
                if !info.node_ids.contains(&node.id) {
                    info.node_ids.push(node.id.clone());
                }
                info.metadata = source.metadata.clone();
            }
            data.hashes.insert(node.id.clone(), node.hash());
            data.docs.insert(node.id.clone(), node.clone());
        }
        Ok(())
    }

    async fn get_node(&self, id: &str, raise_error: bool) -> Result<Option<Node>> {
        let data = self.data.read().await;
        match data.docs.get(id) {
            Some(node) => Ok(Some(node.clone())),
            None if raise_error => Err(RagError::node_not_found(id)),
            None => Ok(None),
        }
    }

    async fn document_exists(&self, id: &str) -> Result<bool> {
        Ok(self.data.read().await.docs.contains_key(id))
    }

    async fn delete(&self, id: &str, raise_error: bool) -> Result<()> {
        let mut data = self.data.write().await;
        if data.remove_node(id).is_none() {
            if raise_error {
                return Err(RagError::node_not_found(id));
            }
            warn!(node.id = id, "node not found, nothing deleted");
        }
        Ok(())
    }

    async fn delete_ref_doc(&self, ref_doc_id: &str, raise_error: bool) -> Result<()> {
        let mut data = self.data.write().await;
        let had_hash = data.hashes.remove(ref_doc_id).is_some();
        let Some(info) = data.ref_doc_info.remove(ref_doc_id) else {
            if had_hash {
                return Ok(());
            }
            if raise_error {
                return Err(RagError::NotFound { kind: "ref_doc", id: ref_doc_id.to_string() });
            }
            warn!(ref_doc.id = ref_doc_id, "ref_doc_id not found, nothing deleted");
            return Ok(());
        };
        for node_id in &info.node_ids {
            data.docs.remove(node_id);
            data.hashes.remove(node_id);
        }
        debug!(ref_doc.id = ref_doc_id, node_count = info.node_ids.len(), "deleted ref doc");
        Ok(())
    }

    async fn get_ref_doc_info(&self, ref_doc_id: &str) -> Result<Option<RefDocInfo>> {
        Ok(self.data.read().await.ref_doc_info.get(ref_doc_id).cloned())
    }

    async fn all_ref_doc_info(&self) -> Result<BTreeMap<String, RefDocInfo>> {
        Ok(self.data.read().await.ref_doc_info.clone())
    }

    async fn set_document_hash(&self, id: &str, hash: &str) -> Result<()> {
        self.data.write().await.hashes.insert(id.to_string(), hash.to_string());
        Ok(())
    }

    async fn get_document_hash(&self, id: &str) -> Result<Option<String>> {
        Ok(self.data.read().await.hashes.get(id).cloned())
    }

    async fn docs(&self) -> Result<BTreeMap<String, Node>> {
        Ok(self.data.read().await.docs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Document, NodeRelationship};

    fn chunk(id: &str, doc: &Document) -> Node {
        Node::with_id(id, format!("text of {id}"))
            .relationship(NodeRelationship::Source, doc.as_related_node_info())
    }

    #[tokio::test]
    async fn put_tracks_ref_docs() {
        let store = SimpleNodeStore::new();
        let doc = Document::new("doc", "full text").metadata("lang", "en");
        store.put(&[chunk("a", &doc), chunk("b", &doc)], true).await.unwrap();

        let info = store.get_ref_doc_info("doc").await.unwrap().unwrap();
        assert_eq!(info.node_ids, vec!["a", "b"]);
        assert_eq!(info.metadata.get("lang"), Some(&"en".into()));
    }

    #[tokio::test]
    async fn overwriting_a_node_moves_it_between_ref_docs() {
        let store = SimpleNodeStore::new();
        let first = Document::new("first", "one");
        let second = Document::new("second", "two");
        store.put(&[chunk("a", &first), chunk("b", &first)], true).await.unwrap();
        store.set_document_hash("first", "h1").await.unwrap();

        store.put(&[chunk("a", &second)], true).await.unwrap();
        assert_eq!(store.get_ref_doc_info("first").await.unwrap().unwrap().node_ids, vec!["b"]);
        assert_eq!(store.get_ref_doc_info("second").await.unwrap().unwrap().node_ids, vec!["a"]);

        store.put(&[chunk("b", &second)], true).await.unwrap();
        assert!(store.get_ref_doc_info("first").await.unwrap().is_none());
        assert!(store.get_document_hash("first").await.unwrap().is_none());
        assert_eq!(
            store.get_ref_doc_info("second").await.unwrap().unwrap().node_ids,
            vec!["a", "b"]
        );

        store.put(&[Node::with_id("a", "orphan")], true).await.unwrap();
        let all = store.all_ref_doc_info().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["second"].node_ids, vec!["b"]);
    }

    #[tokio::test]
    async fn put_without_update_rejects_existing_ids() {
        let store = SimpleNodeStore::new();
        store.put(&[Node::with_id("a", "one")], false).await.unwrap();
        let result = store.put(&[Node::with_id("a", "two")], false).await;
        assert!(matches!(result, Err(RagError::ContentError(_))));

        store.put(&[Node::with_id("a", "two")], true).await.unwrap();
        let node = store.get_node("a", true).await.unwrap().unwrap();
        assert_eq!(node.text, "two");
    }

    #[tokio::test]
    async fn missing_lookups_follow_raise_flag() {
        let store = SimpleNodeStore::new();
        assert!(store.get_node("nope", false).await.unwrap().is_none());
        assert!(matches!(store.get_node("nope", true).await, Err(RagError::NotFound { .. })));
        assert!(store.delete("nope", false).await.is_ok());
        assert!(store.delete("nope", true).await.is_err());
        assert!(store.delete_ref_doc("nope", false).await.is_ok());
        assert!(store.delete_ref_doc("nope", true).await.is_err());
    }

    #[tokio::test]
    async fn deleting_last_node_drops_ref_doc_hash() {
        let store = SimpleNodeStore::new();
        let doc = Document::new("doc", "full text");
        store.put(&[chunk("a", &doc), chunk("b", &doc)], true).await.unwrap();
        store.set_document_hash("doc", &doc.hash()).await.unwrap();

        store.delete("a", true).await.unwrap();
        assert!(store.get_document_hash("doc").await.unwrap().is_some());

        store.delete("b", true).await.unwrap();
        assert!(store.get_document_hash("doc").await.unwrap().is_none());
        assert!(store.get_ref_doc_info("doc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_DOCSTORE_FILE);
        let store = SimpleNodeStore::new();
        let doc = Document::new("doc", "full text");
        store.put(&[chunk("a", &doc)], true).await.unwrap();
        store.set_document_hash("doc", "h").await.unwrap();
        store.persist(&path).await.unwrap();

        let loaded = SimpleNodeStore::from_persist_path(&path).await.unwrap();
        assert_eq!(loaded.docs().await.unwrap(), store.docs().await.unwrap());
        assert_eq!(loaded.get_document_hash("doc").await.unwrap().as_deref(), Some("h"));
    }
}
