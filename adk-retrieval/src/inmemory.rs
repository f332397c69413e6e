//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a zero-dependency vector store
//! backed by a `Vec` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small-scale use cases.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::top_k_by_similarity;
use crate::error::{RagError, Result};
use crate::node::{Metadata, Node};
use crate::vectorstore::{
    VectorStore, VectorStoreQuery, VectorStoreQueryMode, VectorStoreQueryResult,
};

const BACKEND: &str = "InMemory";

#[derive(Debug, Clone)]
struct Entry {
    vector_id: String,
    node_id: String,
    ref_doc_id: Option<String>,
    embedding: Vec<f32>,
    metadata: Metadata,
    node: Option<Node>,
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<Entry>,
    next_id: u64,
}

/// An in-memory vector store using cosine similarity for search.
///
/// In the default mode the store keeps full nodes and is keyed by node id.
/// [`ids_only`](InMemoryVectorStore::ids_only) keeps just vectors and
/// metadata under sequential backend ids, the way external ANN libraries do,
/// so the owning index must rehydrate nodes from its node store.
///
/// All operations are async-safe via `tokio::sync::RwLock`. Ties in
/// similarity keep insertion order.
///
/// # Example
///
/// ```rust,ignore
/// use adk_retrieval::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert(&nodes).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    stores_text: bool,
    state: RwLock<State>,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVectorStore {
    /// Create a store that keeps full node text.
    pub fn new() -> Self {
        Self { stores_text: true, state: RwLock::new(State::default()) }
    }

    /// Create a store that keeps only vectors and assigns its own ids.
    pub fn ids_only() -> Self {
        Self { stores_text: false, state: RwLock::new(State::default()) }
    }

    /// Number of stored vectors.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn stores_text(&self) -> bool {
        self.stores_text
    }

    async fn upsert(&self, nodes: &[Node]) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let embedding = node.embedding.clone().ok_or_else(|| RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: format!("node '{}' has no embedding", node.id),
            })?;
            let existing = state.entries.iter().position(|e| e.node_id == node.id);
            let vector_id = match existing {
                Some(i) => state.entries[i].vector_id.clone(),
                None if self.stores_text => node.id.clone(),
                None => {
                    let id = state.next_id.to_string();
                    state.next_id += 1;
                    id
                }
            };
            let entry = Entry {
                vector_id: vector_id.clone(),
                node_id: node.id.clone(),
                ref_doc_id: node.ref_doc_id().map(str::to_string),
                embedding,
                metadata: node.metadata.clone(),
                node: self.stores_text.then(|| node.clone()),
            };
            match existing {
                Some(i) => state.entries[i] = entry,
                None => state.entries.push(entry),
            }
            ids.push(vector_id);
        }
        Ok(ids)
    }

    async fn delete(&self, ref_doc_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.entries.retain(|e| e.ref_doc_id.as_deref() != Some(ref_doc_id));
        Ok(())
    }

    async fn query(&self, query: &VectorStoreQuery) -> Result<VectorStoreQueryResult> {
        if query.mode != VectorStoreQueryMode::Default {
            return Err(RagError::Unsupported(format!(
                "{BACKEND} vector store only supports the default query mode, got {:?}",
                query.mode
            )));
        }
        let embedding = query.query_embedding.as_deref().ok_or_else(|| {
            RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: "query embedding is required".to_string(),
            }
        })?;

        let node_ids: Option<HashSet<&str>> =
            query.node_ids.as_ref().map(|ids| ids.iter().map(String::as_str).collect());
        let doc_ids: Option<HashSet<&str>> =
            query.doc_ids.as_ref().map(|ids| ids.iter().map(String::as_str).collect());

        let state = self.state.read().await;
        let candidates: Vec<&Entry> = state
            .entries
            .iter()
            .filter(|e| node_ids.as_ref().is_none_or(|ids| ids.contains(e.node_id.as_str())))
            .filter(|e| {
                doc_ids.as_ref().is_none_or(|ids| {
                    e.ref_doc_id.as_deref().is_some_and(|doc| ids.contains(doc))
                })
            })
            .filter(|e| query.filters.as_ref().is_none_or(|f| f.matches(&e.metadata)))
            .collect();

        let ranked = top_k_by_similarity(
            embedding,
            candidates.iter().map(|e| e.embedding.as_slice()),
            query.similarity_top_k,
        );

        let ids = ranked.iter().map(|(i, _)| candidates[*i].vector_id.clone()).collect();
        let similarities = ranked.iter().map(|(_, score)| *score).collect();
        let nodes = if self.stores_text {
            Some(ranked.iter().filter_map(|(i, _)| candidates[*i].node.clone()).collect())
        } else {
            None
        };

        Ok(VectorStoreQueryResult { nodes, similarities: Some(similarities), ids: Some(ids) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Document, NodeRelationship};
    use crate::query::MetadataFilters;

    fn node(id: &str, doc: &str, embedding: Vec<f32>) -> Node {
        Node::with_id(id, id)
            .relationship(NodeRelationship::Source, Document::new(doc, "").as_related_node_info())
            .embedding(embedding)
    }

    fn query(embedding: Vec<f32>, top_k: usize) -> VectorStoreQuery {
        VectorStoreQuery {
            query_embedding: Some(embedding),
            similarity_top_k: top_k,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ids_only_assigns_sequential_ids() {
        let store = InMemoryVectorStore::ids_only();
        let ids = store
            .upsert(&[node("a", "d", vec![1.0, 0.0]), node("b", "d", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(ids, vec!["0", "1"]);

        let result = store.query(&query(vec![0.0, 1.0], 1)).await.unwrap();
        assert_eq!(result.ids, Some(vec!["1".to_string()]));
        assert!(result.nodes.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_by_node_id() {
        let store = InMemoryVectorStore::new();
        store.upsert(&[node("a", "d", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[node("a", "d", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn delete_removes_whole_ref_doc() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[
                node("a1", "A", vec![1.0, 0.0]),
                node("a2", "A", vec![1.0, 0.1]),
                node("b1", "B", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        store.delete("A").await.unwrap();

        let result = store.query(&query(vec![1.0, 0.0], 10)).await.unwrap();
        assert_eq!(result.ids, Some(vec!["b1".to_string()]));
    }

    #[tokio::test]
    async fn filters_and_doc_ids_restrict_results() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[
                node("a", "A", vec![1.0, 0.0]).metadata("lang", "en"),
                node("b", "B", vec![1.0, 0.0]).metadata("lang", "de"),
            ])
            .await
            .unwrap();

        let mut q = query(vec![1.0, 0.0], 10);
        q.filters = Some(MetadataFilters::new().eq("lang", "de"));
        assert_eq!(store.query(&q).await.unwrap().ids, Some(vec!["b".to_string()]));

        let mut q = query(vec![1.0, 0.0], 10);
        q.doc_ids = Some(vec!["A".to_string()]);
        assert_eq!(store.query(&q).await.unwrap().ids, Some(vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn sparse_mode_is_unsupported() {
        let store = InMemoryVectorStore::new();
        let mut q = query(vec![1.0], 1);
        q.mode = VectorStoreQueryMode::Sparse;
        assert!(matches!(store.query(&q).await, Err(RagError::Unsupported(_))));
    }
}
