//! Dense plus sparse retrieval with AND/OR fusion.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::config::RetrieverConfig;
use crate::error::{RagError, Result};
use crate::node::ScoredNode;
use crate::query::QueryBundle;
use crate::retrievers::{FusionMode, Retriever};

/// Combine dense and sparse results without rescoring.
///
/// Dense results come first in dense order. [`FusionMode::And`] keeps the
/// dense results whose id also appears in `sparse`; [`FusionMode::Or`]
/// appends the sparse-only results in sparse order. A node present in both
/// keeps its dense score. The fused list is truncated to `top_k`.
///
/// Scores from the two sides are on different scales and are not comparable.
pub fn fuse(
    dense: Vec<ScoredNode>,
    sparse: Vec<ScoredNode>,
    mode: FusionMode,
    top_k: usize,
) -> Vec<ScoredNode> {
    let sparse_ids: HashSet<String> = sparse.iter().map(|n| n.id().to_string()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut fused = Vec::with_capacity(dense.len() + sparse.len());

    for node in dense {
        if mode == FusionMode::And && !sparse_ids.contains(node.id()) {
            continue;
        }
        if seen.insert(node.id().to_string()) {
            fused.push(node);
        }
    }
    if mode == FusionMode::Or {
        for node in sparse {
            if seen.insert(node.id().to_string()) {
                fused.push(node);
            }
        }
    }
    fused.truncate(top_k);
    fused
}

/// Runs a dense and a sparse retriever concurrently and [`fuse`]s the results.
pub struct HybridRetriever<'a> {
    dense: Box<dyn Retriever + 'a>,
    sparse: Box<dyn Retriever + 'a>,
    mode: FusionMode,
    top_k: usize,
}

impl std::fmt::Debug for HybridRetriever<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("mode", &self.mode)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl<'a> HybridRetriever<'a> {
    /// Fuse `dense` and `sparse` under `mode`, keeping at most `top_k` nodes.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `top_k` is zero.
    pub fn new(
        dense: Box<dyn Retriever + 'a>,
        sparse: Box<dyn Retriever + 'a>,
        mode: FusionMode,
        top_k: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        Ok(Self { dense, sparse, mode, top_k })
    }

    /// Fuse with `config.fusion_mode`, keeping `config.similarity_top_k` nodes.
    pub fn from_config(
        dense: Box<dyn Retriever + 'a>,
        sparse: Box<dyn Retriever + 'a>,
        config: &RetrieverConfig,
    ) -> Result<Self> {
        config.validate()?;
        Self::new(dense, sparse, config.fusion_mode, config.similarity_top_k)
    }
}

#[async_trait]
impl Retriever for HybridRetriever<'_> {
    async fn retrieve(&self, query: &QueryBundle) -> Result<Vec<ScoredNode>> {
        let (dense, sparse) =
            futures::try_join!(self.dense.retrieve(query), self.sparse.retrieve(query))?;
        let (dense_count, sparse_count) = (dense.len(), sparse.len());
        let fused = fuse(dense, sparse, self.mode, self.top_k);
        debug!(
            mode = ?self.mode,
            dense_count,
            sparse_count,
            result_count = fused.len(),
            "fused hybrid results"
        );
        Ok(fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn scored(id: &str, score: f32) -> ScoredNode {
        ScoredNode::new(Node::with_id(id, id), Some(score))
    }

    fn ids(nodes: &[ScoredNode]) -> Vec<&str> {
        nodes.iter().map(ScoredNode::id).collect()
    }

    #[test]
    fn and_keeps_dense_order_and_scores() {
        let dense = vec![scored("a", 0.9), scored("b", 0.8), scored("c", 0.7)];
        let sparse = vec![scored("c", 12.0), scored("a", 3.0)];
        let fused = fuse(dense, sparse, FusionMode::And, 10);
        assert_eq!(ids(&fused), vec!["a", "c"]);
        assert_eq!(fused[1].score, Some(0.7));
    }

    #[test]
    fn or_appends_sparse_only_results() {
        let dense = vec![scored("a", 0.9), scored("b", 0.8)];
        let sparse = vec![scored("c", 12.0), scored("a", 3.0), scored("d", 1.0)];
        let fused = fuse(dense, sparse, FusionMode::Or, 3);
        assert_eq!(ids(&fused), vec!["a", "b", "c"]);
        assert_eq!(fused[0].score, Some(0.9));
        assert_eq!(fused[2].score, Some(12.0));
    }
}
