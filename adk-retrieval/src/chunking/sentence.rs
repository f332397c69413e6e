//! Sentence-aware splitting.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use super::{
    SimpleTokenizer, TextSplitter, Tokenizer, effective_chunk_size, postprocess_chunks,
    split_by_regex, split_chars, split_keeping_separator, validate_chunk_params,
};
use crate::config::SplitterConfig;
use crate::error::{RagError, Result};

/// Paragraphs are separated by two blank lines.
pub const DEFAULT_PARAGRAPH_SEPARATOR: &str = "\n\n\n";

/// Clauses ending in a comma, period, semicolon or CJK punctuation.
pub const DEFAULT_SECONDARY_CHUNKING_REGEX: &str = "[^,.;。？！]+[,.;。？！]?";

/// Sentence ends: terminal punctuation (plus closing quotes/brackets) followed
/// by whitespace, or CJK terminal punctuation.
const SENTENCE_BOUNDARY_REGEX: &str = r#"[.!?]+["')\]]*\s+|[。！？]+"#;

/// A unit produced by the recursive split phase.
#[derive(Debug)]
struct Split {
    text: String,
    is_sentence: bool,
    token_size: usize,
}

/// Splits text into chunks that prefer whole sentences.
///
/// Text is split recursively, coarsest unit first: paragraphs, then
/// sentences, then the secondary clause regex, then the word separator, then
/// single characters. The resulting units are greedily packed into chunks of
/// at most `chunk_size` tokens. When a chunk closes, as many units from its
/// tail as fit in `chunk_overlap` tokens are carried into the next chunk.
///
/// A unit that cannot be split further and still exceeds the budget is
/// emitted as its own chunk.
///
/// # Example
///
/// ```rust,ignore
/// use adk_retrieval::{SentenceSplitter, TextSplitter};
///
/// let splitter = SentenceSplitter::new(128, 16)?;
/// let chunks = splitter.split_text(&text);
/// ```
#[derive(Clone)]
pub struct SentenceSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
    paragraph_separator: String,
    secondary_chunking_regex: Regex,
    sentence_boundary: Regex,
    tokenizer: Arc<dyn Tokenizer>,
}

impl fmt::Debug for SentenceSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentenceSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("separator", &self.separator)
            .field("paragraph_separator", &self.paragraph_separator)
            .field("secondary_chunking_regex", &self.secondary_chunking_regex.as_str())
            .finish_non_exhaustive()
    }
}

impl SentenceSplitter {
    /// Create a splitter with the default separators and tokenizer.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_overlap >= chunk_size` or
    /// `chunk_size == 0`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunk_params(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separator: " ".to_string(),
            paragraph_separator: DEFAULT_PARAGRAPH_SEPARATOR.to_string(),
            secondary_chunking_regex: compile(DEFAULT_SECONDARY_CHUNKING_REGEX)?,
            sentence_boundary: compile(SENTENCE_BOUNDARY_REGEX)?,
            tokenizer: Arc::new(SimpleTokenizer),
        })
    }

    /// Create a splitter from a validated [`SplitterConfig`].
    pub fn from_config(config: &SplitterConfig) -> Result<Self> {
        let mut splitter = Self::new(config.chunk_size, config.effective_chunk_overlap())?;
        splitter.separator = config.separator.clone();
        if let Some(paragraph_separator) = &config.paragraph_separator {
            splitter.paragraph_separator = paragraph_separator.clone();
        }
        if let Some(regex) = &config.secondary_chunking_regex {
            splitter.secondary_chunking_regex = compile(regex)?;
        }
        Ok(splitter)
    }

    /// Use a different token counter.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Use a different word separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Use a different paragraph separator.
    pub fn with_paragraph_separator(mut self, separator: impl Into<String>) -> Self {
        self.paragraph_separator = separator.into();
        self
    }

    /// Use a different secondary (clause-level) splitting regex.
    pub fn with_secondary_chunking_regex(mut self, regex: &str) -> Result<Self> {
        self.secondary_chunking_regex = compile(regex)?;
        Ok(self)
    }

    fn split_with_budget(&self, text: &str, chunk_size: usize) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let splits = self.split(text, chunk_size);
        postprocess_chunks(self.merge(splits, chunk_size))
    }

    fn split(&self, text: &str, chunk_size: usize) -> Vec<Split> {
        let token_size = self.tokenizer.count(text);
        if token_size <= chunk_size {
            return vec![Split { text: text.to_string(), is_sentence: true, token_size }];
        }

        let (parts, is_sentence) = self.split_by_fns(text);
        if parts.len() <= 1 {
            return vec![Split { text: text.to_string(), is_sentence, token_size }];
        }

        let mut splits = Vec::new();
        for part in parts {
            let token_size = self.tokenizer.count(&part);
            if token_size <= chunk_size {
                splits.push(Split { text: part, is_sentence, token_size });
            } else {
                splits.extend(self.split(&part, chunk_size));
            }
        }
        splits
    }

    /// Apply the first splitting function that actually divides `text`.
    ///
    /// The boolean reports whether the parts are whole sentences (or
    /// paragraphs) rather than sub-sentence fragments.
    fn split_by_fns(&self, text: &str) -> (Vec<String>, bool) {
        let paragraphs = split_keeping_separator(text, &self.paragraph_separator);
        if paragraphs.len() > 1 {
            return (paragraphs, true);
        }
        let sentences = self.split_sentences(text);
        if sentences.len() > 1 {
            return (sentences, true);
        }

        let clauses = split_by_regex(text, &self.secondary_chunking_regex);
        if clauses.len() > 1 {
            return (clauses, false);
        }
        let words = split_keeping_separator(text, &self.separator);
        if words.len() > 1 {
            return (words, false);
        }
        (split_chars(text), false)
    }

    fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;
        for boundary in self.sentence_boundary.find_iter(text) {
            sentences.push(text[start..boundary.end()].to_string());
            start = boundary.end();
        }
        if start < text.len() {
            sentences.push(text[start..].to_string());
        }
        sentences
    }

    fn merge(&self, splits: Vec<Split>, chunk_size: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<(String, usize)> = Vec::new();
        let mut current_len = 0;
        let mut new_chunk = true;

        let mut splits = splits.into_iter().peekable();
        while let Some(split) = splits.peek() {
            if current_len + split.token_size > chunk_size && !new_chunk {
                self.close_chunk(&mut chunks, &mut current, &mut current_len);
                new_chunk = true;
                continue;
            }
            if new_chunk {
                // Shed carried overlap until the next unit fits.
                while !current.is_empty() && current_len + split.token_size > chunk_size {
                    let (_, len) = current.remove(0);
                    current_len -= len;
                }
            }
            if let Some(split) = splits.next() {
                current_len += split.token_size;
                current.push((split.text, split.token_size));
            }
            new_chunk = false;
        }

        if !new_chunk {
            chunks.push(current.into_iter().map(|(text, _)| text).collect());
        }
        chunks
    }

    /// Emit the current chunk and seed the next one with its overlap tail.
    fn close_chunk(
        &self,
        chunks: &mut Vec<String>,
        current: &mut Vec<(String, usize)>,
        current_len: &mut usize,
    ) {
        let last = std::mem::take(current);
        chunks.push(last.iter().map(|(text, _)| text.as_str()).collect());
        *current_len = 0;

        for (text, len) in last.into_iter().rev() {
            if *current_len + len > self.chunk_overlap {
                break;
            }
            *current_len += len;
            current.insert(0, (text, len));
        }
    }
}

impl TextSplitter for SentenceSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with_budget(text, self.chunk_size)
    }

    fn split_text_metadata_aware(&self, text: &str, metadata_str: &str) -> Result<Vec<String>> {
        let chunk_size = effective_chunk_size(self.tokenizer.as_ref(), self.chunk_size, metadata_str)?;
        Ok(self.split_with_budget(text, chunk_size))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| RagError::ConfigError(format!("invalid chunking regex '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitespace_words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    #[test]
    fn empty_input_yields_nothing() {
        let splitter = SentenceSplitter::new(10, 2).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n ").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let splitter = SentenceSplitter::new(50, 5).unwrap();
        assert_eq!(splitter.split_text("One sentence. Another one."), vec![
            "One sentence. Another one."
        ]);
    }

    #[test]
    fn packs_whole_sentences() {
        let splitter = SentenceSplitter::new(6, 0)
            .unwrap()
            .with_tokenizer(Arc::new(whitespace_words));
        let chunks = splitter.split_text("a b c. d e f. g h i. j k l.");
        assert_eq!(chunks, vec!["a b c. d e f.", "g h i. j k l."]);
    }

    #[test]
    fn overlap_carries_tail_sentences() {
        let splitter = SentenceSplitter::new(6, 3)
            .unwrap()
            .with_tokenizer(Arc::new(whitespace_words));
        let chunks = splitter.split_text("a b c. d e f. g h i.");
        assert_eq!(chunks, vec!["a b c. d e f.", "d e f. g h i."]);
    }

    #[test]
    fn long_sentence_falls_back_to_words() {
        let splitter = SentenceSplitter::new(3, 0)
            .unwrap()
            .with_tokenizer(Arc::new(whitespace_words));
        let chunks = splitter.split_text("one two three four five six seven");
        assert_eq!(chunks, vec!["one two three", "four five six", "seven"]);
        assert!(chunks.iter().all(|c| whitespace_words(c) <= 3));
    }

    #[test]
    fn oversized_atomic_unit_is_emitted_whole() {
        let double = |text: &str| text.chars().filter(|c| !c.is_whitespace()).count() * 2;
        let splitter = SentenceSplitter::new(1, 0).unwrap().with_tokenizer(Arc::new(double));
        assert_eq!(splitter.split_text("ab"), vec!["a", "b"]);
    }

    #[test]
    fn rejects_bad_regex() {
        let result = SentenceSplitter::new(10, 0).unwrap().with_secondary_chunking_regex("(");
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }
}
