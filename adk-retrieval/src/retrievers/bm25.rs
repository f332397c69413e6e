//! Okapi BM25 sparse retrieval.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::analysis::TextAnalyzer;
use crate::docstore::NodeStore;
use crate::error::{RagError, Result};
use crate::indices::Index;
use crate::node::{MetadataMode, Node, ScoredNode};
use crate::query::QueryBundle;
use crate::retrievers::Retriever;

/// Term-frequency saturation.
pub const BM25_K1: f32 = 1.5;
/// Document-length normalization.
pub const BM25_B: f32 = 0.75;

/// Okapi BM25 over an in-memory corpus.
///
/// The corpus is tokenized once at construction with the shared
/// [`TextAnalyzer`] (stopwords removed, words stemmed). Every node is scored
/// for every query and the `similarity_top_k` best are returned; equal scores
/// keep corpus order. Query embeddings are ignored.
pub struct Bm25Retriever {
    nodes: Vec<Node>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freqs: HashMap<String, usize>,
    avg_doc_len: f32,
    analyzer: Arc<TextAnalyzer>,
    similarity_top_k: usize,
}

impl std::fmt::Debug for Bm25Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bm25Retriever")
            .field("corpus_len", &self.nodes.len())
            .field("vocabulary_len", &self.doc_freqs.len())
            .field("similarity_top_k", &self.similarity_top_k)
            .finish()
    }
}

impl Bm25Retriever {
    /// Index `nodes` in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `similarity_top_k` is zero.
    pub fn from_nodes(
        nodes: Vec<Node>,
        analyzer: Arc<TextAnalyzer>,
        similarity_top_k: usize,
    ) -> Result<Self> {
        if similarity_top_k == 0 {
            return Err(RagError::ConfigError(
                "similarity_top_k must be greater than zero".to_string(),
            ));
        }
        let mut term_freqs = Vec::with_capacity(nodes.len());
        let mut doc_lens = Vec::with_capacity(nodes.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        for node in &nodes {
            let terms = analyzer.terms(&node.get_content(MetadataMode::Embed));
            doc_lens.push(terms.len());
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for term in terms {
                *freqs.entry(term).or_default() += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_default() += 1;
            }
            term_freqs.push(freqs);
        }
        let avg_doc_len = if nodes.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f32 / nodes.len() as f32
        };
        debug!(corpus_len = nodes.len(), vocabulary_len = doc_freqs.len(), "built bm25 corpus");
        Ok(Self { nodes, term_freqs, doc_lens, doc_freqs, avg_doc_len, analyzer, similarity_top_k })
    }

    /// Index every node in a node store, in id order.
    pub async fn from_docstore(
        docstore: &dyn NodeStore,
        analyzer: Arc<TextAnalyzer>,
        similarity_top_k: usize,
    ) -> Result<Self> {
        let nodes = docstore.docs().await?.into_values().collect();
        Self::from_nodes(nodes, analyzer, similarity_top_k)
    }

    /// Index the nodes referenced by an index, in id order, using the
    /// index's analyzer.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Unsupported`] if the index keeps its nodes only in
    /// a text-storing vector backend; build from the nodes instead.
    pub async fn from_index(index: &dyn Index, similarity_top_k: usize) -> Result<Self> {
        if !index.stores_nodes_locally() {
            warn!(index.id = %index.index_id(), "index holds no local node copies for bm25");
            return Err(RagError::Unsupported(format!(
                "index '{}' keeps its nodes in the vector store; use Bm25Retriever::from_nodes",
                index.index_id()
            )));
        }
        let ids: Vec<String> = index.index_struct().node_ids().into_iter().collect();
        let nodes = index.storage_context().docstore.get_nodes(&ids, true).await?;
        Self::from_nodes(nodes, index.service_context().analyzer().clone(), similarity_top_k)
    }

    /// Number of indexed nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The BM25 score of every corpus node for `query`, in corpus order.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let query_terms = self.analyzer.terms(query);
        let corpus_len = self.nodes.len() as f32;
        let mut scores = vec![0.0f32; self.nodes.len()];
        for term in &query_terms {
            let Some(&df) = self.doc_freqs.get(term) else {
                continue;
            };
            let df = df as f32;
            let idf = (1.0 + (corpus_len - df + 0.5) / (df + 0.5)).ln();
            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let Some(&tf) = freqs.get(term) else {
                    continue;
                };
                let tf = tf as f32;
                let len_ratio = if self.avg_doc_len > 0.0 {
                    self.doc_lens[i] as f32 / self.avg_doc_len
                } else {
                    0.0
                };
                let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * len_ratio);
                scores[i] += idf * tf * (BM25_K1 + 1.0) / (tf + norm);
            }
        }
        scores
    }

    /// Synchronous retrieval.
    pub fn retrieve_sync(&self, query: &QueryBundle) -> Vec<ScoredNode> {
        if query.embedding.is_some() {
            warn!("BM25 retrieval ignores query embeddings");
        }
        let mut ranked: Vec<(usize, f32)> =
            self.scores(&query.query_str).into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked.truncate(self.similarity_top_k);
        ranked
            .into_iter()
            .map(|(i, score)| ScoredNode::new(self.nodes[i].clone(), Some(score)))
            .collect()
    }
}

#[async_trait]
impl Retriever for Bm25Retriever {
    async fn retrieve(&self, query: &QueryBundle) -> Result<Vec<ScoredNode>> {
        Ok(self.retrieve_sync(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retriever(texts: &[&str], top_k: usize) -> Bm25Retriever {
        let nodes =
            texts.iter().enumerate().map(|(i, t)| Node::with_id(format!("n{i}"), *t)).collect();
        Bm25Retriever::from_nodes(nodes, Arc::new(TextAnalyzer::english()), top_k).unwrap()
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let bm25 = retriever(&["rust tokio", "rust serde", "rust axum"], 3);
        let scores = bm25.scores("rust tokio");
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[1], scores[2]);
        assert!(scores[1] > 0.0);
    }

    #[test]
    fn stemming_matches_inflections() {
        let bm25 = retriever(&["running fast", "walking slowly"], 1);
        let results = bm25.retrieve_sync(&QueryBundle::new("runs"));
        assert_eq!(results[0].id(), "n0");
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let result = Bm25Retriever::from_nodes(Vec::new(), Arc::new(TextAnalyzer::english()), 0);
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn empty_corpus_returns_nothing() {
        let bm25 = retriever(&[], 3);
        assert!(bm25.retrieve_sync(&QueryBundle::new("anything")).is_empty());
    }
}
