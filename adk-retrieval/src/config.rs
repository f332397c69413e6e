//! Configuration for chunking, indexing, retrieval and postprocessing.
//!
//! Every record deserializes with serde (missing fields take their defaults)
//! and has a consuming builder whose `build()` validates the record.

use serde::{Deserialize, Serialize};

use crate::chunking::{DEFAULT_CHUNK_SIZE, SENTENCE_CHUNK_OVERLAP, TOKEN_CHUNK_OVERLAP};
use crate::error::{RagError, Result};
use crate::retrievers::{FusionMode, KeywordTableRetrieverMode, ListRetrieverMode};
use crate::vectorstore::VectorStoreQueryMode;

/// Default number of nodes embedded per batch.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 2048;
/// Default number of dense results.
pub const DEFAULT_SIMILARITY_TOP_K: usize = 2;
/// Default keyword budget per chunk at index time.
pub const DEFAULT_MAX_KEYWORDS_PER_CHUNK: usize = 10;

/// Which text splitter to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitterMode {
    /// [`SentenceSplitter`](crate::SentenceSplitter).
    #[default]
    Sentence,
    /// [`TokenTextSplitter`](crate::TokenTextSplitter).
    Token,
}

/// Chunking parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplitterConfig {
    /// Which splitter to build.
    pub mode: SplitterMode,
    /// Maximum tokens per chunk.
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks. `None` takes the mode's
    /// default: 200 for sentence splitting, 20 for token splitting.
    pub chunk_overlap: Option<usize>,
    /// Word separator.
    pub separator: String,
    /// Paragraph separator (sentence mode).
    pub paragraph_separator: Option<String>,
    /// Clause-level splitting regex (sentence mode only).
    pub secondary_chunking_regex: Option<String>,
    /// Fallback separators (token mode only).
    pub backup_separators: Option<Vec<String>>,
    /// Whether nodes inherit document metadata and budget for it.
    pub include_metadata: bool,
    /// Whether adjacent nodes get PREVIOUS/NEXT relationships.
    pub include_prev_next_rel: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            mode: SplitterMode::Sentence,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: None,
            separator: " ".to_string(),
            paragraph_separator: None,
            secondary_chunking_regex: None,
            backup_separators: None,
            include_metadata: true,
            include_prev_next_rel: true,
        }
    }
}

impl SplitterConfig {
    /// Create a new builder.
    pub fn builder() -> SplitterConfigBuilder {
        SplitterConfigBuilder::default()
    }

    /// The configured overlap, or the default for [`mode`](SplitterConfig::mode).
    pub fn effective_chunk_overlap(&self) -> usize {
        self.chunk_overlap.unwrap_or(match self.mode {
            SplitterMode::Sentence => SENTENCE_CHUNK_OVERLAP,
            SplitterMode::Token => TOKEN_CHUNK_OVERLAP,
        })
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - both `secondary_chunking_regex` and `backup_separators` are set
    /// - a strategy option is set that does not belong to `mode`
    /// - the secondary regex does not compile
    pub fn validate(&self) -> Result<()> {
        crate::chunking::validate_chunk_params(self.chunk_size, self.effective_chunk_overlap())?;
        if self.secondary_chunking_regex.is_some() && self.backup_separators.is_some() {
            return Err(RagError::ConfigError(
                "secondary_chunking_regex and backup_separators are mutually exclusive".to_string(),
            ));
        }
        match self.mode {
            SplitterMode::Sentence if self.backup_separators.is_some() => {
                return Err(RagError::ConfigError(
                    "backup_separators only applies to the token splitter".to_string(),
                ));
            }
            SplitterMode::Token
                if self.secondary_chunking_regex.is_some() || self.paragraph_separator.is_some() =>
            {
                return Err(RagError::ConfigError(
                    "secondary_chunking_regex and paragraph_separator only apply to the sentence splitter"
                        .to_string(),
                ));
            }
            _ => {}
        }
        if let Some(pattern) = &self.secondary_chunking_regex {
            regex::Regex::new(pattern).map_err(|e| {
                RagError::ConfigError(format!("invalid secondary_chunking_regex '{pattern}': {e}"))
            })?;
        }
        Ok(())
    }
}

/// Builder for a validated [`SplitterConfig`].
#[derive(Debug, Clone, Default)]
pub struct SplitterConfigBuilder {
    config: SplitterConfig,
}

impl SplitterConfigBuilder {
    /// Set the splitter mode.
    pub fn mode(mut self, mode: SplitterMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the maximum chunk size in tokens.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in tokens.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = Some(overlap);
        self
    }

    /// Set the word separator.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.config.separator = separator.into();
        self
    }

    /// Set the paragraph separator.
    pub fn paragraph_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.paragraph_separator = Some(separator.into());
        self
    }

    /// Set the clause-level splitting regex.
    pub fn secondary_chunking_regex(mut self, regex: impl Into<String>) -> Self {
        self.config.secondary_chunking_regex = Some(regex.into());
        self
    }

    /// Set the fallback separators.
    pub fn backup_separators(mut self, separators: Vec<String>) -> Self {
        self.config.backup_separators = Some(separators);
        self
    }

    /// Whether nodes inherit document metadata.
    pub fn include_metadata(mut self, include: bool) -> Self {
        self.config.include_metadata = include;
        self
    }

    /// Whether adjacent nodes are linked.
    pub fn include_prev_next_rel(mut self, include: bool) -> Self {
        self.config.include_prev_next_rel = include;
        self
    }

    /// Build the [`SplitterConfig`], validating that parameters are consistent.
    pub fn build(self) -> Result<SplitterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Index construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Nodes embedded and upserted per batch.
    pub insert_batch_size: usize,
    /// Embed the nodes of a batch with concurrent single calls.
    pub embed_concurrently: bool,
    /// Keep nodes in the node store even when the vector backend stores text.
    pub store_nodes_override: bool,
    /// Keyword budget per node for keyword-table indices.
    pub max_keywords_per_chunk: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            embed_concurrently: false,
            store_nodes_override: false,
            max_keywords_per_chunk: DEFAULT_MAX_KEYWORDS_PER_CHUNK,
        }
    }
}

impl IndexConfig {
    /// Create a new builder.
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    pub fn validate(&self) -> Result<()> {
        if self.insert_batch_size == 0 {
            return Err(RagError::ConfigError(
                "insert_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_keywords_per_chunk == 0 {
            return Err(RagError::ConfigError(
                "max_keywords_per_chunk must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for a validated [`IndexConfig`].
#[derive(Debug, Clone, Default)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    /// Set the embedding batch size.
    pub fn insert_batch_size(mut self, size: usize) -> Self {
        self.config.insert_batch_size = size;
        self
    }

    /// Embed batches with concurrent single calls.
    pub fn embed_concurrently(mut self, concurrent: bool) -> Self {
        self.config.embed_concurrently = concurrent;
        self
    }

    /// Keep nodes locally even when the backend stores text.
    pub fn store_nodes_override(mut self, store: bool) -> Self {
        self.config.store_nodes_override = store;
        self
    }

    /// Set the keyword budget per node.
    pub fn max_keywords_per_chunk(mut self, max: usize) -> Self {
        self.config.max_keywords_per_chunk = max;
        self
    }

    /// Build the [`IndexConfig`].
    pub fn build(self) -> Result<IndexConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Retrieval parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Number of results from dense, list-embedding, BM25 and hybrid retrieval.
    pub similarity_top_k: usize,
    /// Strategy for list indices.
    pub list_mode: ListRetrieverMode,
    /// Keyword extraction strategy for keyword-table queries.
    pub keyword_mode: KeywordTableRetrieverMode,
    /// Keyword budget per query.
    pub max_keywords_per_query: usize,
    /// Maximum nodes returned by keyword-table retrieval.
    pub num_chunks_per_query: usize,
    /// Scoring mode passed to the vector backend.
    pub vector_store_query_mode: VectorStoreQueryMode,
    /// Dense weight for hybrid backend scoring, in `[0, 1]`.
    pub alpha: Option<f32>,
    /// Sparse candidates for hybrid backend scoring.
    pub sparse_top_k: Option<usize>,
    /// How a hybrid fusion retriever combines its two result sets.
    pub fusion_mode: FusionMode,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: DEFAULT_SIMILARITY_TOP_K,
            list_mode: ListRetrieverMode::Default,
            keyword_mode: KeywordTableRetrieverMode::Default,
            max_keywords_per_query: 10,
            num_chunks_per_query: 10,
            vector_store_query_mode: VectorStoreQueryMode::Default,
            alpha: None,
            sparse_top_k: None,
            fusion_mode: FusionMode::Or,
        }
    }
}

impl RetrieverConfig {
    /// Create a new builder.
    pub fn builder() -> RetrieverConfigBuilder {
        RetrieverConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    pub fn validate(&self) -> Result<()> {
        if self.similarity_top_k == 0 {
            return Err(RagError::ConfigError(
                "similarity_top_k must be greater than zero".to_string(),
            ));
        }
        if self.max_keywords_per_query == 0 || self.num_chunks_per_query == 0 {
            return Err(RagError::ConfigError(
                "max_keywords_per_query and num_chunks_per_query must be greater than zero"
                    .to_string(),
            ));
        }
        if let Some(alpha) = self.alpha {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(RagError::ConfigError(format!("alpha ({alpha}) must be in [0, 1]")));
            }
        }
        if self.sparse_top_k == Some(0) {
            return Err(RagError::ConfigError("sparse_top_k must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for a validated [`RetrieverConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrieverConfigBuilder {
    config: RetrieverConfig,
}

impl RetrieverConfigBuilder {
    /// Set the number of results.
    pub fn similarity_top_k(mut self, k: usize) -> Self {
        self.config.similarity_top_k = k;
        self
    }

    /// Set the list retrieval strategy.
    pub fn list_mode(mut self, mode: ListRetrieverMode) -> Self {
        self.config.list_mode = mode;
        self
    }

    /// Set the keyword-table query strategy.
    pub fn keyword_mode(mut self, mode: KeywordTableRetrieverMode) -> Self {
        self.config.keyword_mode = mode;
        self
    }

    /// Set the keyword budget per query.
    pub fn max_keywords_per_query(mut self, max: usize) -> Self {
        self.config.max_keywords_per_query = max;
        self
    }

    /// Set the keyword-table result limit.
    pub fn num_chunks_per_query(mut self, max: usize) -> Self {
        self.config.num_chunks_per_query = max;
        self
    }

    /// Set the backend scoring mode.
    pub fn vector_store_query_mode(mut self, mode: VectorStoreQueryMode) -> Self {
        self.config.vector_store_query_mode = mode;
        self
    }

    /// Set the hybrid dense weight.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.config.alpha = Some(alpha);
        self
    }

    /// Set the sparse candidate count.
    pub fn sparse_top_k(mut self, k: usize) -> Self {
        self.config.sparse_top_k = Some(k);
        self
    }

    /// Set the fusion mode.
    pub fn fusion_mode(mut self, mode: FusionMode) -> Self {
        self.config.fusion_mode = mode;
        self
    }

    /// Build the [`RetrieverConfig`].
    pub fn build(self) -> Result<RetrieverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Postprocessing parameters. Unset options disable their stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PostprocessorConfig {
    /// Drop nodes scoring below this value.
    pub similarity_cutoff: Option<f32>,
    /// Drop nodes scoring more than this below the best score.
    pub delta_similarity_cutoff: Option<f32>,
    /// Keep at most this many nodes after reranking.
    pub top_n: Option<usize>,
    /// Record the pre-rerank score in node metadata.
    pub keep_retrieval_score: bool,
    /// Nodes must contain every one of these phrases.
    pub required_keywords: Vec<String>,
    /// Nodes must contain none of these phrases.
    pub exclude_keywords: Vec<String>,
}

impl PostprocessorConfig {
    /// Create a new builder.
    pub fn builder() -> PostprocessorConfigBuilder {
        PostprocessorConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    pub fn validate(&self) -> Result<()> {
        if let Some(cutoff) = self.similarity_cutoff {
            if !cutoff.is_finite() {
                return Err(RagError::ConfigError("similarity_cutoff must be finite".to_string()));
            }
        }
        if let Some(delta) = self.delta_similarity_cutoff {
            if !delta.is_finite() || delta < 0.0 {
                return Err(RagError::ConfigError(format!(
                    "delta_similarity_cutoff ({delta}) must be a non-negative number"
                )));
            }
        }
        if self.top_n == Some(0) {
            return Err(RagError::ConfigError("top_n must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for a validated [`PostprocessorConfig`].
#[derive(Debug, Clone, Default)]
pub struct PostprocessorConfigBuilder {
    config: PostprocessorConfig,
}

impl PostprocessorConfigBuilder {
    /// Set the absolute score cutoff.
    pub fn similarity_cutoff(mut self, cutoff: f32) -> Self {
        self.config.similarity_cutoff = Some(cutoff);
        self
    }

    /// Set the delta-from-best cutoff.
    pub fn delta_similarity_cutoff(mut self, delta: f32) -> Self {
        self.config.delta_similarity_cutoff = Some(delta);
        self
    }

    /// Set the rerank result limit.
    pub fn top_n(mut self, n: usize) -> Self {
        self.config.top_n = Some(n);
        self
    }

    /// Record pre-rerank scores in metadata.
    pub fn keep_retrieval_score(mut self, keep: bool) -> Self {
        self.config.keep_retrieval_score = keep;
        self
    }

    /// Require these phrases.
    pub fn required_keywords(mut self, keywords: Vec<String>) -> Self {
        self.config.required_keywords = keywords;
        self
    }

    /// Exclude these phrases.
    pub fn exclude_keywords(mut self, keywords: Vec<String>) -> Self {
        self.config.exclude_keywords = keywords;
        self
    }

    /// Build the [`PostprocessorConfig`].
    pub fn build(self) -> Result<PostprocessorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Aggregate configuration for an indexing-and-retrieval setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Chunking parameters.
    pub splitter: SplitterConfig,
    /// Index construction parameters.
    pub index: IndexConfig,
    /// Retrieval parameters.
    pub retriever: RetrieverConfig,
    /// Postprocessing parameters.
    pub postprocessor: PostprocessorConfig,
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.splitter.validate()?;
        self.index.validate()?;
        self.retriever.validate()?;
        self.postprocessor.validate()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the chunking section.
    pub fn splitter(mut self, splitter: SplitterConfig) -> Self {
        self.config.splitter = splitter;
        self
    }

    /// Set the index section.
    pub fn index(mut self, index: IndexConfig) -> Self {
        self.config.index = index;
        self
    }

    /// Set the retrieval section.
    pub fn retriever(mut self, retriever: RetrieverConfig) -> Self {
        self.config.retriever = retriever;
        self
    }

    /// Set the postprocessing section.
    pub fn postprocessor(mut self, postprocessor: PostprocessorConfig) -> Self {
        self.config.postprocessor = postprocessor;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for the first invalid section.
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RagConfig::builder().build().is_ok());
    }

    #[test]
    fn overlap_not_below_size_is_rejected() {
        let result = SplitterConfig::builder().chunk_size(100).chunk_overlap(100).build();
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn splitting_strategies_are_mutually_exclusive() {
        let both = SplitterConfig::builder()
            .secondary_chunking_regex("[^.]+")
            .backup_separators(vec!["\n".to_string()])
            .build();
        assert!(matches!(both, Err(RagError::ConfigError(_))));

        let wrong_mode = SplitterConfig::builder()
            .mode(SplitterMode::Token)
            .chunk_overlap(20)
            .secondary_chunking_regex("[^.]+")
            .build();
        assert!(wrong_mode.is_err());

        let token = SplitterConfig::builder()
            .mode(SplitterMode::Token)
            .chunk_overlap(20)
            .backup_separators(vec!["\n".to_string()])
            .build();
        assert!(token.is_ok());
    }

    #[test]
    fn overlap_defaults_follow_the_mode() {
        let sentence = SplitterConfig::default();
        assert_eq!(sentence.effective_chunk_overlap(), SENTENCE_CHUNK_OVERLAP);

        let token = SplitterConfig::builder().mode(SplitterMode::Token).build().unwrap();
        assert_eq!(token.effective_chunk_overlap(), TOKEN_CHUNK_OVERLAP);

        let small = SplitterConfig::builder()
            .mode(SplitterMode::Token)
            .chunk_size(64)
            .build()
            .unwrap();
        assert_eq!(small.effective_chunk_overlap(), 20);
        assert!(SplitterConfig::builder().chunk_size(64).build().is_err());

        let explicit = SplitterConfig::builder().chunk_overlap(5).build().unwrap();
        assert_eq!(explicit.effective_chunk_overlap(), 5);
    }

    #[test]
    fn retriever_alpha_must_be_a_weight() {
        assert!(RetrieverConfig::builder().alpha(1.5).build().is_err());
        assert!(RetrieverConfig::builder().alpha(0.5).build().is_ok());
        assert!(RetrieverConfig::builder().similarity_top_k(0).build().is_err());
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"retriever": {"similarity_top_k": 5}}"#).unwrap();
        assert_eq!(config.retriever.similarity_top_k, 5);
        assert_eq!(config.index.insert_batch_size, DEFAULT_INSERT_BATCH_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_delta_is_rejected() {
        assert!(PostprocessorConfig::builder().delta_similarity_cutoff(-0.1).build().is_err());
        assert!(PostprocessorConfig::builder().top_n(0).build().is_err());
    }
}
