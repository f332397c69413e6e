//! Index structures and the index store.
//!
//! An index structure records how node ids are organized for one retrieval
//! strategy. It never holds node text or embeddings; those live in the
//! [`NodeStore`](crate::NodeStore) and the vector backend.
//!
//! Structures persist as a tagged record:
//!
//! ```json
//! { "type": "keyword_table", "data": { "index_id": "...", "table": { "rust": ["n1"] } } }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RagError, Result};

/// The file name used by [`StorageContext`](crate::StorageContext) for the index store.
pub const DEFAULT_INDEX_STORE_FILE: &str = "index_store.json";

fn new_index_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Node ids in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexList {
    /// Identifier of the index this structure belongs to.
    pub index_id: String,
    /// Optional human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Node ids; insertion order is retrieval order.
    #[serde(default)]
    pub nodes: Vec<String>,
}

impl Default for IndexList {
    fn default() -> Self {
        Self { index_id: new_index_id(), summary: None, nodes: Vec::new() }
    }
}

impl IndexList {
    /// Append a node id.
    pub fn add_node(&mut self, node_id: impl Into<String>) {
        self.nodes.push(node_id.into());
    }

    /// Remove every occurrence of a node id.
    pub fn delete(&mut self, node_id: &str) {
        self.nodes.retain(|id| id != node_id);
    }
}

/// Keyword to node-id mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordTable {
    /// Identifier of the index this structure belongs to.
    pub index_id: String,
    /// Optional human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Lowercased keyword (or phrase) to the ids of nodes containing it.
    #[serde(default)]
    pub table: BTreeMap<String, BTreeSet<String>>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self { index_id: new_index_id(), summary: None, table: BTreeMap::new() }
    }
}

impl KeywordTable {
    /// Register `node_id` under each keyword.
    pub fn add_node<I, S>(&mut self, keywords: I, node_id: &str)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for keyword in keywords {
            self.table.entry(keyword.into()).or_default().insert(node_id.to_string());
        }
    }

    /// Remove a node id from every keyword, dropping keywords left empty.
    pub fn delete_node(&mut self, node_id: &str) {
        self.table.retain(|_, ids| {
            ids.remove(node_id);
            !ids.is_empty()
        });
    }

    /// Every node id referenced by the table.
    pub fn node_ids(&self) -> BTreeSet<String> {
        self.table.values().flatten().cloned().collect()
    }

    /// Every keyword in the table.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}

/// Vector-backend id to node id mapping.
///
/// Needed when the backend stores only vectors and assigns its own ids; the
/// nodes themselves live in the node store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDict {
    /// Identifier of the index this structure belongs to.
    pub index_id: String,
    /// Optional human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Backend id to node id.
    #[serde(default)]
    pub nodes_dict: BTreeMap<String, String>,
}

impl Default for IndexDict {
    fn default() -> Self {
        Self { index_id: new_index_id(), summary: None, nodes_dict: BTreeMap::new() }
    }
}

impl IndexDict {
    /// Map a backend id to a node id. Without a backend id the node id is used.
    pub fn add_node(&mut self, node_id: &str, vector_id: Option<&str>) -> String {
        let vector_id = vector_id.unwrap_or(node_id).to_string();
        self.nodes_dict.insert(vector_id.clone(), node_id.to_string());
        vector_id
    }

    /// Remove every mapping that points at `node_id`.
    pub fn delete(&mut self, node_id: &str) {
        self.nodes_dict.retain(|_, id| id != node_id);
    }

    /// The node id behind a backend id.
    pub fn node_id(&self, vector_id: &str) -> Option<&str> {
        self.nodes_dict.get(vector_id).map(String::as_str)
    }

    /// Every node id referenced by the map.
    pub fn node_ids(&self) -> BTreeSet<String> {
        self.nodes_dict.values().cloned().collect()
    }
}

/// The kind of an index structure, used as the persisted type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStructKind {
    /// [`IndexList`].
    List,
    /// [`KeywordTable`].
    KeywordTable,
    /// [`IndexDict`].
    VectorStore,
}

impl fmt::Display for IndexStructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::List => "list",
            Self::KeywordTable => "keyword_table",
            Self::VectorStore => "vector_store",
        })
    }
}

/// A persisted index structure of any kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum IndexStruct {
    /// A flat ordered list.
    List(IndexList),
    /// A keyword table.
    KeywordTable(KeywordTable),
    /// A vector-backend id map.
    VectorStore(IndexDict),
}

impl IndexStruct {
    /// The structure kind.
    pub fn kind(&self) -> IndexStructKind {
        match self {
            Self::List(_) => IndexStructKind::List,
            Self::KeywordTable(_) => IndexStructKind::KeywordTable,
            Self::VectorStore(_) => IndexStructKind::VectorStore,
        }
    }

    /// The owning index id.
    pub fn index_id(&self) -> &str {
        match self {
            Self::List(s) => &s.index_id,
            Self::KeywordTable(s) => &s.index_id,
            Self::VectorStore(s) => &s.index_id,
        }
    }

    /// Every node id the structure references.
    pub fn node_ids(&self) -> BTreeSet<String> {
        match self {
            Self::List(s) => s.nodes.iter().cloned().collect(),
            Self::KeywordTable(s) => s.node_ids(),
            Self::VectorStore(s) => s.node_ids(),
        }
    }
}

impl From<IndexList> for IndexStruct {
    fn from(value: IndexList) -> Self {
        Self::List(value)
    }
}

impl From<KeywordTable> for IndexStruct {
    fn from(value: KeywordTable) -> Self {
        Self::KeywordTable(value)
    }
}

impl From<IndexDict> for IndexStruct {
    fn from(value: IndexDict) -> Self {
        Self::VectorStore(value)
    }
}

/// A store of index structures keyed by index id.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert or replace a structure under its index id.
    async fn add_index_struct(&self, index_struct: IndexStruct) -> Result<()>;

    /// Remove a structure. Missing ids are ignored.
    async fn delete_index_struct(&self, index_id: &str) -> Result<()>;

    /// Fetch a structure by id, or the only stored structure when `index_id`
    /// is `None`.
    async fn get_index_struct(&self, index_id: Option<&str>) -> Result<Option<IndexStruct>>;

    /// Every stored structure.
    async fn index_structs(&self) -> Result<Vec<IndexStruct>>;

    /// Write the store to durable storage at `path`.
    async fn persist(&self, path: &Path) -> Result<()> {
        Err(RagError::Unsupported(format!(
            "this index store cannot persist to {}",
            path.display()
        )))
    }
}

/// An in-memory [`IndexStore`] with JSON persistence.
#[derive(Debug, Default)]
pub struct SimpleIndexStore {
    structs: RwLock<BTreeMap<String, IndexStruct>>,
}

impl SimpleIndexStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store previously written by [`persist`](IndexStore::persist).
    pub async fn from_persist_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        let structs: BTreeMap<String, IndexStruct> = serde_json::from_str(&json)?;
        Ok(Self { structs: RwLock::new(structs) })
    }
}

#[async_trait]
impl IndexStore for SimpleIndexStore {
    async fn persist(&self, path: &Path) -> Result<()> {
        let json = {
            let structs = self.structs.read().await;
            serde_json::to_string_pretty(&*structs)?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), "persisted index store");
        Ok(())
    }

    async fn add_index_struct(&self, index_struct: IndexStruct) -> Result<()> {
        let index_id = index_struct.index_id().to_string();
        self.structs.write().await.insert(index_id, index_struct);
        Ok(())
    }

    async fn delete_index_struct(&self, index_id: &str) -> Result<()> {
        self.structs.write().await.remove(index_id);
        Ok(())
    }

    async fn get_index_struct(&self, index_id: Option<&str>) -> Result<Option<IndexStruct>> {
        let structs = self.structs.read().await;
        match index_id {
            Some(id) => Ok(structs.get(id).cloned()),
            None => match structs.len() {
                0 => Ok(None),
                1 => Ok(structs.values().next().cloned()),
                n => Err(RagError::ConfigError(format!(
                    "index store holds {n} index structures; specify an index_id"
                ))),
            },
        }
    }

    async fn index_structs(&self) -> Result<Vec<IndexStruct>> {
        Ok(self.structs.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_table_drops_empty_keywords() {
        let mut table = KeywordTable::default();
        table.add_node(["rust", "tokio"], "n1");
        table.add_node(["rust"], "n2");
        table.delete_node("n1");

        assert_eq!(table.keywords().collect::<Vec<_>>(), vec!["rust"]);
        assert_eq!(table.node_ids(), BTreeSet::from(["n2".to_string()]));
    }

    #[test]
    fn persisted_record_is_tagged() {
        let mut list = IndexList { index_id: "idx".to_string(), ..IndexList::default() };
        list.add_node("a");
        list.add_node("b");
        let json = serde_json::to_value(IndexStruct::from(list.clone())).unwrap();

        assert_eq!(json["type"], "list");
        assert_eq!(json["data"]["nodes"], serde_json::json!(["a", "b"]));

        let back: IndexStruct = serde_json::from_value(json).unwrap();
        assert_eq!(back, IndexStruct::List(list));
    }

    #[test]
    fn index_dict_maps_backend_ids() {
        let mut dict = IndexDict::default();
        assert_eq!(dict.add_node("node-a", Some("7")), "7");
        assert_eq!(dict.add_node("node-b", None), "node-b");
        assert_eq!(dict.node_id("7"), Some("node-a"));

        dict.delete("node-a");
        assert_eq!(dict.node_id("7"), None);
        assert_eq!(dict.node_ids().len(), 1);
    }

    #[tokio::test]
    async fn get_without_id_requires_a_single_struct() {
        let store = SimpleIndexStore::new();
        assert!(store.get_index_struct(None).await.unwrap().is_none());

        store.add_index_struct(IndexList::default().into()).await.unwrap();
        assert!(store.get_index_struct(None).await.unwrap().is_some());

        store.add_index_struct(KeywordTable::default().into()).await.unwrap();
        assert!(store.get_index_struct(None).await.is_err());
    }
}
