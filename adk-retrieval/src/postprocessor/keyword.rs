//! Required and excluded keyword filtering.

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::node::{MetadataMode, ScoredNode};
use crate::postprocessor::NodePostprocessor;
use crate::query::QueryBundle;

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `phrase` occurs as a contiguous word sequence in `haystack`.
fn contains_phrase(haystack: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && haystack.windows(phrase.len()).any(|window| window == phrase)
}

/// Keeps nodes containing every required phrase and none of the excluded ones.
///
/// Matching is case-insensitive and on whole words, so `"tokio runtime"`
/// matches `"The Tokio runtime"` but not `"tokio-runtimes"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordNodePostprocessor {
    required: Vec<Vec<String>>,
    excluded: Vec<Vec<String>>,
}

impl KeywordNodePostprocessor {
    /// Filter on `required_keywords` and `exclude_keywords`.
    pub fn new(required_keywords: Vec<String>, exclude_keywords: Vec<String>) -> Self {
        let phrases = |keywords: Vec<String>| -> Vec<Vec<String>> {
            keywords.iter().map(|k| words(k)).filter(|p| !p.is_empty()).collect()
        };
        Self { required: phrases(required_keywords), excluded: phrases(exclude_keywords) }
    }

    /// Whether a node's text passes the filter.
    pub fn accepts(&self, text: &str) -> bool {
        let haystack = words(text);
        self.required.iter().all(|p| contains_phrase(&haystack, p))
            && !self.excluded.iter().any(|p| contains_phrase(&haystack, p))
    }

    /// Synchronous filtering.
    pub fn filter(&self, nodes: Vec<ScoredNode>) -> Vec<ScoredNode> {
        nodes.into_iter().filter(|n| self.accepts(&n.node.get_content(MetadataMode::None))).collect()
    }
}

#[async_trait]
impl NodePostprocessor for KeywordNodePostprocessor {
    async fn postprocess(
        &self,
        nodes: Vec<ScoredNode>,
        _query: Option<&QueryBundle>,
    ) -> Result<Vec<ScoredNode>> {
        let before = nodes.len();
        let kept = self.filter(nodes);
        debug!(before, after = kept.len(), "applied keyword filter");
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_match_whole_words_case_insensitively() {
        let filter = KeywordNodePostprocessor::new(vec!["Tokio runtime".to_string()], Vec::new());
        assert!(filter.accepts("The tokio RUNTIME schedules tasks."));
        assert!(!filter.accepts("runtime of tokio"));
        assert!(!filter.accepts("tokio runtimes"));
    }

    #[test]
    fn excluded_phrases_reject() {
        let filter = KeywordNodePostprocessor::new(Vec::new(), vec!["deprecated".to_string()]);
        assert!(filter.accepts("stable api"));
        assert!(!filter.accepts("This API is Deprecated."));
    }
}
