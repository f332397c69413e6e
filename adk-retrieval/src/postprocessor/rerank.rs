//! Cross-encoder reranking.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::node::{MetadataMode, MetadataValue, ScoredNode};
use crate::postprocessor::NodePostprocessor;
use crate::query::QueryBundle;

/// Metadata key under which [`CrossEncoderRerank`] keeps the pre-rerank score.
pub const RETRIEVAL_SCORE_KEY: &str = "retrieval_score";

const RERANKER: &str = "cross_encoder";

/// A model that scores (query, passage) pairs jointly.
///
/// Implementations can wrap a local cross-encoder, a hosted rerank API or an
/// LLM-based judge.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// One relevance logit per passage, in passage order.
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// Rescores nodes with a [`CrossEncoder`], sorts them best first and keeps
/// the `top_n`.
///
/// Equal scores keep their retrieval order.
pub struct CrossEncoderRerank {
    model: Arc<dyn CrossEncoder>,
    top_n: usize,
    keep_retrieval_score: bool,
}

impl std::fmt::Debug for CrossEncoderRerank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossEncoderRerank")
            .field("top_n", &self.top_n)
            .field("keep_retrieval_score", &self.keep_retrieval_score)
            .finish_non_exhaustive()
    }
}

impl CrossEncoderRerank {
    /// Rerank with `model`, keeping `top_n` nodes.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `top_n` is zero.
    pub fn new(model: Arc<dyn CrossEncoder>, top_n: usize) -> Result<Self> {
        if top_n == 0 {
            return Err(RagError::ConfigError("top_n must be greater than zero".to_string()));
        }
        Ok(Self { model, top_n, keep_retrieval_score: false })
    }

    /// Record each node's pre-rerank score under [`RETRIEVAL_SCORE_KEY`].
    pub fn keep_retrieval_score(mut self, keep: bool) -> Self {
        self.keep_retrieval_score = keep;
        self
    }
}

#[async_trait]
impl NodePostprocessor for CrossEncoderRerank {
    async fn postprocess(
        &self,
        nodes: Vec<ScoredNode>,
        query: Option<&QueryBundle>,
    ) -> Result<Vec<ScoredNode>> {
        let query = query.ok_or_else(|| RagError::RerankerError {
            reranker: RERANKER.to_string(),
            message: "reranking requires the query".to_string(),
        })?;
        if nodes.is_empty() {
            return Ok(nodes);
        }

        let passages: Vec<String> =
            nodes.iter().map(|n| n.node.get_content(MetadataMode::Embed)).collect();
        let refs: Vec<&str> = passages.iter().map(String::as_str).collect();
        let scores = self.model.score(&query.query_str, &refs).await.map_err(|e| {
            error!(error = %e, node_count = nodes.len(), "cross-encoder scoring failed");
            RagError::RerankerError { reranker: RERANKER.to_string(), message: e.to_string() }
        })?;
        if scores.len() != nodes.len() {
            return Err(RagError::RerankerError {
                reranker: RERANKER.to_string(),
                message: format!("expected {} scores, model returned {}", nodes.len(), scores.len()),
            });
        }

        let mut reranked: Vec<ScoredNode> = nodes
            .into_iter()
            .zip(scores)
            .map(|(mut scored, score)| {
                if self.keep_retrieval_score {
                    if let Some(previous) = scored.score {
                        scored.node.metadata.insert(
                            RETRIEVAL_SCORE_KEY.to_string(),
                            MetadataValue::Float(previous.into()),
                        );
                    }
                }
                scored.score = Some(score);
                scored
            })
            .collect();
        reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        reranked.truncate(self.top_n);
        debug!(top_n = self.top_n, result_count = reranked.len(), "reranked nodes");
        Ok(reranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    struct LengthEncoder;

    #[async_trait]
    impl CrossEncoder for LengthEncoder {
        async fn score(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>> {
            Ok(passages.iter().map(|p| p.len() as f32).collect())
        }
    }

    struct ShortEncoder;

    #[async_trait]
    impl CrossEncoder for ShortEncoder {
        async fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    fn nodes() -> Vec<ScoredNode> {
        vec![
            ScoredNode::new(Node::with_id("short", "ab"), Some(0.9)),
            ScoredNode::new(Node::with_id("long", "abcdef"), Some(0.1)),
            ScoredNode::new(Node::with_id("mid", "abcd"), Some(0.5)),
        ]
    }

    #[tokio::test]
    async fn rescored_sorted_and_truncated() {
        let rerank =
            CrossEncoderRerank::new(Arc::new(LengthEncoder), 2).unwrap().keep_retrieval_score(true);
        let out = rerank.postprocess(nodes(), Some(&QueryBundle::new("q"))).await.unwrap();

        let ids: Vec<_> = out.iter().map(ScoredNode::id).collect();
        assert_eq!(ids, vec!["long", "mid"]);
        assert_eq!(out[0].score, Some(6.0));
        assert_eq!(
            out[0].node.metadata.get(RETRIEVAL_SCORE_KEY),
            Some(&MetadataValue::Float(f64::from(0.1f32)))
        );
    }

    #[tokio::test]
    async fn score_count_mismatch_is_an_error() {
        let rerank = CrossEncoderRerank::new(Arc::new(ShortEncoder), 2).unwrap();
        let result = rerank.postprocess(nodes(), Some(&QueryBundle::new("q"))).await;
        assert!(matches!(result, Err(RagError::RerankerError { .. })));
    }

    #[tokio::test]
    async fn query_is_required() {
        let rerank = CrossEncoderRerank::new(Arc::new(LengthEncoder), 2).unwrap();
        assert!(rerank.postprocess(nodes(), None).await.is_err());
    }
}
