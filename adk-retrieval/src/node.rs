//! Data types for documents, nodes, and scored retrieval results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A scalar metadata value attached to a node or document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A boolean flag.
    Bool(bool),
    /// An integer value.
    Int(i64),
    /// A floating point value.
    Float(f64),
    /// A string value.
    String(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered metadata mapping. Ordering keeps content hashes stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Which consumer a node's content is being rendered for.
///
/// Each mode hides a different set of metadata keys: `Embed` hides
/// [`Node::excluded_embed_metadata_keys`], `Llm` hides
/// [`Node::excluded_llm_metadata_keys`], `All` shows everything and `None`
/// renders the bare text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMode {
    /// Render every metadata key.
    #[default]
    All,
    /// Render the keys visible to the embedding model.
    Embed,
    /// Render the keys visible to the generation model.
    Llm,
    /// Render text only.
    None,
}

/// The kind of link between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRelationship {
    /// The document this node was derived from.
    Source,
    /// The preceding node of the same document.
    Previous,
    /// The following node of the same document.
    Next,
    /// A parent node in a hierarchy.
    Parent,
    /// A child node in a hierarchy.
    Child,
}

/// A reference to a related node by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedNodeInfo {
    /// Identifier of the related node.
    pub node_id: String,
    /// Content hash of the related node at the time the link was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Metadata of the related node at the time the link was made.
    #[serde(default)]
    pub metadata: Metadata,
}

impl RelatedNodeInfo {
    /// Reference a node by id only.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self { node_id: node_id.into(), hash: None, metadata: Metadata::new() }
    }
}

/// A unit of retrievable content, typically a chunk of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Identifier, unique within a node store.
    pub id: String,
    /// The text payload.
    pub text: String,
    /// Scalar metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// The embedding vector, if one has been computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Typed links to other nodes. Back-links are never maintained automatically.
    #[serde(default)]
    pub relationships: BTreeMap<NodeRelationship, RelatedNodeInfo>,
    /// Metadata keys hidden from the embedding model.
    #[serde(default)]
    pub excluded_embed_metadata_keys: Vec<String>,
    /// Metadata keys hidden from the generation model.
    #[serde(default)]
    pub excluded_llm_metadata_keys: Vec<String>,
}

impl Node {
    /// Create a node with a random id.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), text)
    }

    /// Create a node with an explicit id.
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            embedding: None,
            relationships: BTreeMap::new(),
            excluded_embed_metadata_keys: Vec::new(),
            excluded_llm_metadata_keys: Vec::new(),
        }
    }

    /// Add a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set a relationship.
    pub fn relationship(mut self, kind: NodeRelationship, info: RelatedNodeInfo) -> Self {
        self.relationships.insert(kind, info);
        self
    }

    /// Attach an embedding.
    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// The SOURCE relationship, if any.
    pub fn source_node(&self) -> Option<&RelatedNodeInfo> {
        self.relationships.get(&NodeRelationship::Source)
    }

    /// Id of the reference document this node was derived from.
    pub fn ref_doc_id(&self) -> Option<&str> {
        self.source_node().map(|info| info.node_id.as_str())
    }

    /// Render the metadata visible in `mode` as `key: value` lines.
    pub fn metadata_str(&self, mode: MetadataMode) -> String {
        render_metadata(
            &self.metadata,
            &self.excluded_embed_metadata_keys,
            &self.excluded_llm_metadata_keys,
            mode,
        )
    }

    /// Render the node content for a consumer.
    pub fn get_content(&self, mode: MetadataMode) -> String {
        join_content(&self.metadata_str(mode), &self.text)
    }

    /// SHA-256 of text and metadata.
    pub fn hash(&self) -> String {
        content_hash(&self.text, &self.metadata)
    }

    /// A reference to this node suitable for another node's relationship map.
    pub fn as_related_node_info(&self) -> RelatedNodeInfo {
        RelatedNodeInfo {
            node_id: self.id.clone(),
            hash: Some(self.hash()),
            metadata: self.metadata.clone(),
        }
    }

    /// A copy of this node with the embedding dropped.
    pub fn without_embedding(&self) -> Self {
        Self { embedding: None, ..self.clone() }
    }
}

/// A whole ingested source.
///
/// The content [`hash`](Document::hash) drives idempotent re-ingestion: a
/// document is only re-chunked when its hash differs from the stored one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier of the document.
    pub id: String,
    /// The full text.
    pub text: String,
    /// Metadata, inherited by every node split from this document.
    #[serde(default)]
    pub metadata: Metadata,
    /// Metadata keys hidden from the embedding model.
    #[serde(default)]
    pub excluded_embed_metadata_keys: Vec<String>,
    /// Metadata keys hidden from the generation model.
    #[serde(default)]
    pub excluded_llm_metadata_keys: Vec<String>,
    /// Optional URI pointing to the original source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with the given id and text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            excluded_embed_metadata_keys: Vec::new(),
            excluded_llm_metadata_keys: Vec::new(),
            source_uri: None,
        }
    }

    /// Add a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Render the metadata visible in `mode` as `key: value` lines.
    pub fn metadata_str(&self, mode: MetadataMode) -> String {
        render_metadata(
            &self.metadata,
            &self.excluded_embed_metadata_keys,
            &self.excluded_llm_metadata_keys,
            mode,
        )
    }

    /// SHA-256 of text and metadata.
    pub fn hash(&self) -> String {
        content_hash(&self.text, &self.metadata)
    }

    /// A reference to this document for a node's SOURCE relationship.
    pub fn as_related_node_info(&self) -> RelatedNodeInfo {
        RelatedNodeInfo {
            node_id: self.id.clone(),
            hash: Some(self.hash()),
            metadata: self.metadata.clone(),
        }
    }
}

/// A retrieved [`Node`] paired with a relevance score.
///
/// The score scale is retriever-specific (cosine similarity for dense
/// retrieval, unnormalized BM25 for sparse retrieval, hit counts for keyword
/// tables) and is `None` when a retriever does not score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredNode {
    /// The retrieved node.
    pub node: Node,
    /// The relevance score (higher is more relevant).
    pub score: Option<f32>,
}

impl ScoredNode {
    /// Pair a node with a score.
    pub fn new(node: Node, score: Option<f32>) -> Self {
        Self { node, score }
    }

    /// The node id.
    pub fn id(&self) -> &str {
        &self.node.id
    }
}

fn render_metadata(
    metadata: &Metadata,
    excluded_embed: &[String],
    excluded_llm: &[String],
    mode: MetadataMode,
) -> String {
    let excluded: &[String] = match mode {
        MetadataMode::All => &[],
        MetadataMode::Embed => excluded_embed,
        MetadataMode::Llm => excluded_llm,
        MetadataMode::None => return String::new(),
    };
    metadata
        .iter()
        .filter(|(key, _)| !excluded.contains(key))
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_content(metadata_str: &str, text: &str) -> String {
    if metadata_str.is_empty() { text.to_string() } else { format!("{metadata_str}\n\n{text}") }
}

fn content_hash(text: &str, metadata: &Metadata) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in metadata {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_respects_metadata_mode() {
        let mut node = Node::with_id("n1", "body").metadata("author", "ann").metadata("page", 3i64);
        node.excluded_embed_metadata_keys = vec!["page".to_string()];

        assert_eq!(node.get_content(MetadataMode::None), "body");
        assert_eq!(node.get_content(MetadataMode::Embed), "author: ann\n\nbody");
        assert_eq!(node.get_content(MetadataMode::All), "author: ann\npage: 3\n\nbody");
        assert_eq!(node.get_content(MetadataMode::Llm), "author: ann\npage: 3\n\nbody");
    }

    #[test]
    fn hash_changes_with_text_or_metadata() {
        let doc = Document::new("d", "hello");
        assert_eq!(doc.hash(), Document::new("d", "hello").hash());
        assert_ne!(doc.hash(), Document::new("d", "hello!").hash());
        assert_ne!(doc.hash(), doc.clone().metadata("k", "v").hash());
    }

    #[test]
    fn ref_doc_id_comes_from_source_relationship() {
        let doc = Document::new("doc-1", "text");
        let node = Node::new("chunk")
            .relationship(NodeRelationship::Source, doc.as_related_node_info());
        assert_eq!(node.ref_doc_id(), Some("doc-1"));
        assert_eq!(Node::new("orphan").ref_doc_id(), None);
    }

    #[test]
    fn metadata_values_round_trip_untagged() {
        let node = Node::with_id("n", "t").metadata("flag", true).metadata("score", 0.5f64);
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
