//! Retrieval query engine.
//!
//! The [`RetrieverQueryEngine`] runs one retriever and then a
//! [`PostprocessorPipeline`] over its results. Answer synthesis is left to the
//! caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use adk_retrieval::{RetrieverQueryEngine, PostprocessorPipeline, RetrieverConfig};
//!
//! let index = VectorStoreIndex::from_documents(&docs, storage, service, Default::default()).await?;
//! let engine = RetrieverQueryEngine::builder()
//!     .retriever(index.as_retriever(&RetrieverConfig::default())?)
//!     .postprocessors(PostprocessorPipeline::from_config(&config.postprocessor)?)
//!     .build()?;
//!
//! let results = engine.retrieve("search query").await?;
//! ```

use std::sync::Arc;

use tracing::{error, info};

use crate::error::{RagError, Result};
use crate::node::ScoredNode;
use crate::postprocessor::{NodePostprocessor, PostprocessorPipeline};
use crate::query::QueryBundle;
use crate::retrievers::Retriever;

/// Retrieve, then postprocess.
///
/// Construct one via [`RetrieverQueryEngine::builder()`].
pub struct RetrieverQueryEngine<'a> {
    retriever: Box<dyn Retriever + 'a>,
    postprocessors: PostprocessorPipeline,
}

impl std::fmt::Debug for RetrieverQueryEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieverQueryEngine")
            .field("postprocessors", &self.postprocessors)
            .finish_non_exhaustive()
    }
}

impl<'a> RetrieverQueryEngine<'a> {
    /// Create a new [`RetrieverQueryEngineBuilder`].
    pub fn builder() -> RetrieverQueryEngineBuilder<'a> {
        RetrieverQueryEngineBuilder::default()
    }

    /// Return a reference to the postprocessor chain.
    pub fn postprocessors(&self) -> &PostprocessorPipeline {
        &self.postprocessors
    }

    /// Query: retrieve → postprocess.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if retrieval or a postprocessor
    /// fails.
    pub async fn retrieve(&self, query: impl Into<QueryBundle>) -> Result<Vec<ScoredNode>> {
        let query = query.into();

        // 1. Retrieve candidates
        let nodes = self.retriever.retrieve(&query).await.map_err(|e| {
            error!(error = %e, "retrieval failed");
            RagError::PipelineError(format!("retrieval failed: {e}"))
        })?;
        let retrieved = nodes.len();

        // 2. Filter and rerank
        let nodes = self.postprocessors.postprocess(nodes, Some(&query)).await.map_err(|e| {
            error!(error = %e, "postprocessing failed");
            RagError::PipelineError(format!("postprocessing failed: {e}"))
        })?;

        info!(retrieved, result_count = nodes.len(), "query completed");
        Ok(nodes)
    }
}

/// Builder for constructing a [`RetrieverQueryEngine`].
///
/// The retriever is required; postprocessing defaults to none.
pub struct RetrieverQueryEngineBuilder<'a> {
    retriever: Option<Box<dyn Retriever + 'a>>,
    postprocessors: PostprocessorPipeline,
}

impl Default for RetrieverQueryEngineBuilder<'_> {
    fn default() -> Self {
        Self { retriever: None, postprocessors: PostprocessorPipeline::new() }
    }
}

impl<'a> RetrieverQueryEngineBuilder<'a> {
    /// Set the retriever.
    pub fn retriever(mut self, retriever: Box<dyn Retriever + 'a>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Replace the postprocessor chain.
    pub fn postprocessors(mut self, pipeline: PostprocessorPipeline) -> Self {
        self.postprocessors = pipeline;
        self
    }

    /// Append one postprocessor to the chain.
    pub fn postprocessor(mut self, postprocessor: Arc<dyn NodePostprocessor>) -> Self {
        self.postprocessors = self.postprocessors.with_stage(postprocessor);
        self
    }

    /// Build the [`RetrieverQueryEngine`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if no retriever was set.
    pub fn build(self) -> Result<RetrieverQueryEngine<'a>> {
        let retriever = self
            .retriever
            .ok_or_else(|| RagError::ConfigError("retriever is required".to_string()))?;
        Ok(RetrieverQueryEngine { retriever, postprocessors: self.postprocessors })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::node::Node;
    use crate::postprocessor::SimilarityPostprocessor;

    struct Fixed;

    #[async_trait]
    impl Retriever for Fixed {
        async fn retrieve(&self, _query: &QueryBundle) -> Result<Vec<ScoredNode>> {
            Ok(vec![
                ScoredNode::new(Node::with_id("a", "a"), Some(0.9)),
                ScoredNode::new(Node::with_id("b", "b"), Some(0.1)),
            ])
        }
    }

    struct Failing;

    #[async_trait]
    impl Retriever for Failing {
        async fn retrieve(&self, _query: &QueryBundle) -> Result<Vec<ScoredNode>> {
            Err(RagError::VectorStoreError { backend: "test".into(), message: "down".into() })
        }
    }

    #[tokio::test]
    async fn postprocessors_run_after_retrieval() {
        let engine = RetrieverQueryEngine::builder()
            .retriever(Box::new(Fixed))
            .postprocessor(Arc::new(SimilarityPostprocessor::new(0.5)))
            .build()
            .unwrap();
        let results = engine.retrieve("q").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "a");
    }

    #[tokio::test]
    async fn retrieval_errors_are_wrapped() {
        let engine = RetrieverQueryEngine::builder().retriever(Box::new(Failing)).build().unwrap();
        let err = engine.retrieve("q").await.unwrap_err();
        assert!(matches!(err, RagError::PipelineError(msg) if msg.contains("down")));
    }

    #[test]
    fn retriever_is_required() {
        assert!(RetrieverQueryEngine::builder().build().is_err());
    }
}
