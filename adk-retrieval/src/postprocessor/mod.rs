//! Postprocessors: filter, reorder or rescore retrieved nodes.
//!
//! Postprocessors compose into a [`PostprocessorPipeline`]; each stage's
//! output is the next stage's input.

mod keyword;
mod rerank;
mod similarity;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{DEFAULT_SIMILARITY_TOP_K, PostprocessorConfig};
use crate::error::Result;
use crate::node::ScoredNode;
use crate::query::QueryBundle;

pub use keyword::KeywordNodePostprocessor;
pub use rerank::{CrossEncoder, CrossEncoderRerank, RETRIEVAL_SCORE_KEY};
pub use similarity::{
    DeltaSimilarityPostprocessor, MeanDeltaSimilarityPostprocessor, SimilarityPostprocessor,
};

/// Transforms a list of scored nodes.
///
/// The output may be reordered or shorter than the input.
#[async_trait]
pub trait NodePostprocessor: Send + Sync {
    /// Process `nodes`, optionally using the query that produced them.
    async fn postprocess(
        &self,
        nodes: Vec<ScoredNode>,
        query: Option<&QueryBundle>,
    ) -> Result<Vec<ScoredNode>>;
}

/// A postprocessor that returns nodes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPostprocessor;

#[async_trait]
impl NodePostprocessor for NoOpPostprocessor {
    async fn postprocess(
        &self,
        nodes: Vec<ScoredNode>,
        _query: Option<&QueryBundle>,
    ) -> Result<Vec<ScoredNode>> {
        Ok(nodes)
    }
}

/// An ordered chain of postprocessors.
///
/// An empty list short-circuits: no further stage is invoked.
#[derive(Clone, Default)]
pub struct PostprocessorPipeline {
    stages: Vec<Arc<dyn NodePostprocessor>>,
}

impl std::fmt::Debug for PostprocessorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostprocessorPipeline").field("stages", &self.stages.len()).finish()
    }
}

impl PostprocessorPipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn with_stage(mut self, stage: Arc<dyn NodePostprocessor>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Build the stateless stages described by `config`, in the order
    /// keyword filter, similarity cutoff, delta cutoff.
    ///
    /// Reranking needs a model; see
    /// [`from_config_with_reranker`](PostprocessorPipeline::from_config_with_reranker).
    pub fn from_config(config: &PostprocessorConfig) -> Result<Self> {
        config.validate()?;
        let mut pipeline = Self::new();
        if !config.required_keywords.is_empty() || !config.exclude_keywords.is_empty() {
            pipeline = pipeline.with_stage(Arc::new(KeywordNodePostprocessor::new(
                config.required_keywords.clone(),
                config.exclude_keywords.clone(),
            )));
        }
        if let Some(cutoff) = config.similarity_cutoff {
            pipeline = pipeline.with_stage(Arc::new(SimilarityPostprocessor::new(cutoff)));
        }
        if let Some(delta) = config.delta_similarity_cutoff {
            pipeline = pipeline.with_stage(Arc::new(DeltaSimilarityPostprocessor::new(delta)?));
        }
        Ok(pipeline)
    }

    /// The stages of [`from_config`](PostprocessorPipeline::from_config)
    /// followed by a [`CrossEncoderRerank`] over `model`.
    ///
    /// The reranker keeps `config.top_n` nodes, defaulting to
    /// [`DEFAULT_SIMILARITY_TOP_K`].
    pub fn from_config_with_reranker(
        config: &PostprocessorConfig,
        model: Arc<dyn CrossEncoder>,
    ) -> Result<Self> {
        let rerank = CrossEncoderRerank::new(model, config.top_n.unwrap_or(DEFAULT_SIMILARITY_TOP_K))?
            .keep_retrieval_score(config.keep_retrieval_score);
        Ok(Self::from_config(config)?.with_stage(Arc::new(rerank)))
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[async_trait]
impl NodePostprocessor for PostprocessorPipeline {
    async fn postprocess(
        &self,
        mut nodes: Vec<ScoredNode>,
        query: Option<&QueryBundle>,
    ) -> Result<Vec<ScoredNode>> {
        for (stage, postprocessor) in self.stages.iter().enumerate() {
            if nodes.is_empty() {
                debug!(stage, "no nodes left, skipping remaining postprocessors");
                break;
            }
            nodes = postprocessor.postprocess(nodes, query).await?;
        }
        Ok(nodes)
    }
}
