//! Score-threshold filters.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::node::ScoredNode;
use crate::postprocessor::NodePostprocessor;
use crate::query::QueryBundle;

fn validate_delta(delta: f32) -> Result<()> {
    if !delta.is_finite() || delta < 0.0 {
        return Err(RagError::ConfigError(format!(
            "delta similarity cutoff ({delta}) must be a non-negative number"
        )));
    }
    Ok(())
}

/// Drops nodes scoring below an absolute cutoff. Unscored nodes are dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityPostprocessor {
    cutoff: f32,
}

impl SimilarityPostprocessor {
    /// Keep nodes with `score >= cutoff`.
    pub fn new(cutoff: f32) -> Self {
        Self { cutoff }
    }

    /// Synchronous filtering.
    pub fn filter(&self, nodes: Vec<ScoredNode>) -> Vec<ScoredNode> {
        nodes.into_iter().filter(|n| n.score.is_some_and(|s| s >= self.cutoff)).collect()
    }
}

#[async_trait]
impl NodePostprocessor for SimilarityPostprocessor {
    async fn postprocess(
        &self,
        nodes: Vec<ScoredNode>,
        _query: Option<&QueryBundle>,
    ) -> Result<Vec<ScoredNode>> {
        let before = nodes.len();
        let kept = self.filter(nodes);
        debug!(cutoff = self.cutoff, before, after = kept.len(), "applied similarity cutoff");
        Ok(kept)
    }
}

/// Drops nodes scoring more than `delta` below the best score in the batch.
///
/// Unscored nodes are dropped. Raising `delta` never shrinks the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaSimilarityPostprocessor {
    delta: f32,
}

impl DeltaSimilarityPostprocessor {
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `delta` is negative or not finite.
    pub fn new(delta: f32) -> Result<Self> {
        validate_delta(delta)?;
        Ok(Self { delta })
    }

    /// Synchronous filtering.
    pub fn filter(&self, nodes: Vec<ScoredNode>) -> Vec<ScoredNode> {
        let Some(best) = nodes.iter().filter_map(|n| n.score).reduce(f32::max) else {
            return Vec::new();
        };
        nodes.into_iter().filter(|n| n.score.is_some_and(|s| best - s <= self.delta)).collect()
    }
}

#[async_trait]
impl NodePostprocessor for DeltaSimilarityPostprocessor {
    async fn postprocess(
        &self,
        nodes: Vec<ScoredNode>,
        _query: Option<&QueryBundle>,
    ) -> Result<Vec<ScoredNode>> {
        let before = nodes.len();
        let kept = self.filter(nodes);
        debug!(delta = self.delta, before, after = kept.len(), "applied delta cutoff");
        Ok(kept)
    }
}

/// Drops nodes whose score deviates from the batch mean by more than `delta`.
///
/// Unscored nodes are dropped and do not count toward the mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanDeltaSimilarityPostprocessor {
    delta: f32,
}

impl MeanDeltaSimilarityPostprocessor {
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `delta` is negative or not finite.
    pub fn new(delta: f32) -> Result<Self> {
        validate_delta(delta)?;
        Ok(Self { delta })
    }

    /// Synchronous filtering.
    pub fn filter(&self, nodes: Vec<ScoredNode>) -> Vec<ScoredNode> {
        let scores: Vec<f32> = nodes.iter().filter_map(|n| n.score).collect();
        if scores.is_empty() {
            return Vec::new();
        }
        let mean = scores.iter().sum::<f32>() / scores.len() as f32;
        nodes
            .into_iter()
            .filter(|n| n.score.is_some_and(|s| (s - mean).abs() <= self.delta))
            .collect()
    }
}

#[async_trait]
impl NodePostprocessor for MeanDeltaSimilarityPostprocessor {
    async fn postprocess(
        &self,
        nodes: Vec<ScoredNode>,
        _query: Option<&QueryBundle>,
    ) -> Result<Vec<ScoredNode>> {
        let before = nodes.len();
        let kept = self.filter(nodes);
        debug!(delta = self.delta, before, after = kept.len(), "applied mean delta cutoff");
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn nodes(scores: &[Option<f32>]) -> Vec<ScoredNode> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| ScoredNode::new(Node::with_id(i.to_string(), "t"), *s))
            .collect()
    }

    fn ids(nodes: &[ScoredNode]) -> Vec<&str> {
        nodes.iter().map(ScoredNode::id).collect()
    }

    #[test]
    fn absolute_cutoff_drops_low_and_unscored() {
        let kept = SimilarityPostprocessor::new(0.5).filter(nodes(&[Some(0.7), None, Some(0.5), Some(0.2)]));
        assert_eq!(ids(&kept), vec!["0", "2"]);
    }

    #[test]
    fn delta_is_relative_to_best() {
        let filter = DeltaSimilarityPostprocessor::new(0.25).unwrap();
        let kept = filter.filter(nodes(&[Some(0.5), Some(1.0), None, Some(0.8)]));
        assert_eq!(ids(&kept), vec!["1", "3"]);
    }

    #[test]
    fn delta_rejects_negative() {
        assert!(DeltaSimilarityPostprocessor::new(-1.0).is_err());
        assert!(MeanDeltaSimilarityPostprocessor::new(f32::NAN).is_err());
    }

    #[test]
    fn mean_delta_drops_outliers() {
        let filter = MeanDeltaSimilarityPostprocessor::new(0.2).unwrap();
        let kept = filter.filter(nodes(&[Some(0.5), Some(0.6), Some(0.55), Some(1.0)]));
        // mean is 0.6625
        assert_eq!(ids(&kept), vec!["0", "1", "2"]);
    }
}
