//! Shared, dependency-injected services used by indices and retrievers.

use std::fmt;
use std::sync::Arc;

use crate::analysis::TextAnalyzer;
use crate::chunking::{Chunker, NodeParser};
use crate::config::SplitterConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::keyword::{KeywordExtractor, SimpleKeywordExtractor};

/// The collaborators an index needs: a chunker, an optional embedding
/// provider, a text analyzer, and a keyword extractor.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct ServiceContext {
    chunker: Arc<dyn Chunker>,
    embed_model: Option<Arc<dyn EmbeddingProvider>>,
    analyzer: Arc<TextAnalyzer>,
    keyword_extractor: Arc<dyn KeywordExtractor>,
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("has_embed_model", &self.embed_model.is_some())
            .field("analyzer", &self.analyzer)
            .finish_non_exhaustive()
    }
}

impl ServiceContext {
    /// Create a new [`ServiceContextBuilder`].
    pub fn builder() -> ServiceContextBuilder {
        ServiceContextBuilder::default()
    }

    /// The document chunker.
    pub fn chunker(&self) -> &Arc<dyn Chunker> {
        &self.chunker
    }

    /// The embedding provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if none was configured.
    pub fn embed_model(&self) -> Result<&Arc<dyn EmbeddingProvider>> {
        self.embed_model.as_ref().ok_or_else(|| {
            RagError::ConfigError("an embedding provider is required for this operation".to_string())
        })
    }

    /// The shared text analyzer.
    pub fn analyzer(&self) -> &Arc<TextAnalyzer> {
        &self.analyzer
    }

    /// The keyword extractor used by keyword-table indices.
    pub fn keyword_extractor(&self) -> &Arc<dyn KeywordExtractor> {
        &self.keyword_extractor
    }
}

/// Builder for a [`ServiceContext`].
///
/// Unset fields default to a sentence splitter with default settings, no
/// embedding provider, the English analyzer, and a frequency-based keyword
/// extractor over that analyzer.
#[derive(Default)]
pub struct ServiceContextBuilder {
    chunker: Option<Arc<dyn Chunker>>,
    splitter_config: Option<SplitterConfig>,
    embed_model: Option<Arc<dyn EmbeddingProvider>>,
    analyzer: Option<Arc<TextAnalyzer>>,
    keyword_extractor: Option<Arc<dyn KeywordExtractor>>,
}

impl ServiceContextBuilder {
    /// Use this chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the chunker from a splitter configuration.
    pub fn splitter_config(mut self, config: SplitterConfig) -> Self {
        self.splitter_config = Some(config);
        self
    }

    /// Use this embedding provider.
    pub fn embed_model(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embed_model = Some(provider);
        self
    }

    /// Use this analyzer.
    pub fn analyzer(mut self, analyzer: Arc<TextAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Use this keyword extractor.
    pub fn keyword_extractor(mut self, extractor: Arc<dyn KeywordExtractor>) -> Self {
        self.keyword_extractor = Some(extractor);
        self
    }

    /// Build the [`ServiceContext`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if both a chunker and a splitter
    /// configuration were given, or the splitter configuration is invalid.
    pub fn build(self) -> Result<ServiceContext> {
        let chunker: Arc<dyn Chunker> = match (self.chunker, self.splitter_config) {
            (Some(_), Some(_)) => {
                return Err(RagError::ConfigError(
                    "set either a chunker or a splitter configuration, not both".to_string(),
                ));
            }
            (Some(chunker), None) => chunker,
            (None, config) => Arc::new(NodeParser::from_config(&config.unwrap_or_default())?),
        };
        let analyzer = self.analyzer.unwrap_or_default();
        let keyword_extractor = self
            .keyword_extractor
            .unwrap_or_else(|| Arc::new(SimpleKeywordExtractor::new(analyzer.clone())));
        Ok(ServiceContext { chunker, embed_model: self.embed_model, analyzer, keyword_extractor })
    }
}
