//! Keyword extraction for keyword-table indexing and retrieval.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::analysis::{TextAnalyzer, parse_keywords_response};
use crate::error::{RagError, Result};
use crate::llm::CompletionModel;

/// Prefix a model is asked to put before its comma-separated keywords.
pub const KEYWORDS_START_TOKEN: &str = "KEYWORDS:";

const DEFAULT_EXTRACT_TEMPLATE: &str = "Some text is provided below. Given the text, extract up \
to {max_keywords} keywords from the text. Avoid stopwords.\n---------------------\n{text}\n\
---------------------\nProvide keywords in the following comma-separated format: \
'KEYWORDS: <keywords>'\n";

const DEFAULT_QUERY_TEMPLATE: &str = "A question is provided below. Given the question, extract \
up to {max_keywords} keywords from the text. Focus on extracting the keywords that we can use to \
best lookup answers to the question. Avoid stopwords.\n---------------------\n{question}\n\
---------------------\nProvide keywords in the following comma-separated format: \
'KEYWORDS: <keywords>'\n";

/// Extracts lowercased keywords from text.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Keywords describing a node's content, at most roughly `max_keywords`.
    async fn extract(&self, text: &str, max_keywords: usize) -> Result<BTreeSet<String>>;

    /// Keywords to look up for a query. Defaults to [`extract`](KeywordExtractor::extract).
    async fn extract_query(&self, query: &str, max_keywords: usize) -> Result<BTreeSet<String>> {
        self.extract(query, max_keywords).await
    }
}

/// Frequency-ranked content words.
#[derive(Debug, Clone, Default)]
pub struct SimpleKeywordExtractor {
    analyzer: Arc<TextAnalyzer>,
}

impl SimpleKeywordExtractor {
    /// Create an extractor over a shared analyzer.
    pub fn new(analyzer: Arc<TextAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Synchronous extraction.
    pub fn extract_sync(&self, text: &str, max_keywords: usize) -> BTreeSet<String> {
        self.analyzer.simple_keywords(text, Some(max_keywords)).into_iter().collect()
    }
}

#[async_trait]
impl KeywordExtractor for SimpleKeywordExtractor {
    async fn extract(&self, text: &str, max_keywords: usize) -> Result<BTreeSet<String>> {
        Ok(self.extract_sync(text, max_keywords))
    }
}

/// RAKE keyphrases, expanded with their sub-words.
#[derive(Debug, Clone, Default)]
pub struct RakeKeywordExtractor {
    analyzer: Arc<TextAnalyzer>,
}

impl RakeKeywordExtractor {
    /// Create an extractor over a shared analyzer.
    pub fn new(analyzer: Arc<TextAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Synchronous extraction.
    pub fn extract_sync(&self, text: &str, max_keywords: usize) -> BTreeSet<String> {
        let phrases = self.analyzer.rake_keywords(text, Some(max_keywords));
        self.analyzer.expand_with_subtokens(phrases)
    }
}

#[async_trait]
impl KeywordExtractor for RakeKeywordExtractor {
    async fn extract(&self, text: &str, max_keywords: usize) -> Result<BTreeSet<String>> {
        Ok(self.extract_sync(text, max_keywords))
    }
}

/// Asks a [`CompletionModel`] for keywords and parses `KEYWORDS: a, b, c`.
///
/// Multi-word keywords are expanded with their non-stopword sub-words.
pub struct LlmKeywordExtractor {
    model: Arc<dyn CompletionModel>,
    analyzer: Arc<TextAnalyzer>,
    extract_template: String,
    query_template: String,
}

impl std::fmt::Debug for LlmKeywordExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmKeywordExtractor").finish_non_exhaustive()
    }
}

impl LlmKeywordExtractor {
    /// Create an extractor with the default prompts.
    pub fn new(model: Arc<dyn CompletionModel>, analyzer: Arc<TextAnalyzer>) -> Self {
        Self {
            model,
            analyzer,
            extract_template: DEFAULT_EXTRACT_TEMPLATE.to_string(),
            query_template: DEFAULT_QUERY_TEMPLATE.to_string(),
        }
    }

    /// Replace the node prompt. `{max_keywords}` and `{text}` are substituted.
    pub fn with_extract_template(mut self, template: impl Into<String>) -> Self {
        self.extract_template = template.into();
        self
    }

    /// Replace the query prompt. `{max_keywords}` and `{question}` are substituted.
    pub fn with_query_template(mut self, template: impl Into<String>) -> Self {
        self.query_template = template.into();
        self
    }

    async fn ask(&self, prompt: String) -> Result<BTreeSet<String>> {
        let response = self.model.complete(&prompt).await.map_err(|e| {
            error!(error = %e, "keyword extraction model call failed");
            RagError::KeywordExtractionError { extractor: "llm".to_string(), message: e.to_string() }
        })?;
        let keywords = parse_keywords_response(&response, KEYWORDS_START_TOKEN);
        debug!(keyword_count = keywords.len(), "parsed model keywords");
        Ok(self.analyzer.expand_with_subtokens(keywords))
    }
}

#[async_trait]
impl KeywordExtractor for LlmKeywordExtractor {
    async fn extract(&self, text: &str, max_keywords: usize) -> Result<BTreeSet<String>> {
        let prompt = self
            .extract_template
            .replace("{max_keywords}", &max_keywords.to_string())
            .replace("{text}", text);
        self.ask(prompt).await
    }

    async fn extract_query(&self, query: &str, max_keywords: usize) -> Result<BTreeSet<String>> {
        let prompt = self
            .query_template
            .replace("{max_keywords}", &max_keywords.to_string())
            .replace("{question}", query);
        self.ask(prompt).await
    }
}
