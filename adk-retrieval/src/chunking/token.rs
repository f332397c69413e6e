//! Word-level splitting with backup separators.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::{
    SimpleTokenizer, TextSplitter, Tokenizer, effective_chunk_size, split_chars,
    split_keeping_separator, validate_chunk_params,
};
use crate::config::SplitterConfig;
use crate::error::Result;

/// Splits text on a word separator, then on each backup separator, then on
/// characters, and greedily merges the pieces into token-bounded chunks.
///
/// Consecutive chunks share up to `chunk_overlap` tokens taken from the tail
/// of the previous chunk.
#[derive(Clone)]
pub struct TokenTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
    backup_separators: Vec<String>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl fmt::Debug for TokenTextSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenTextSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("separator", &self.separator)
            .field("backup_separators", &self.backup_separators)
            .finish_non_exhaustive()
    }
}

impl TokenTextSplitter {
    /// Create a splitter that splits on spaces, then newlines.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`](crate::RagError::ConfigError) if
    /// `chunk_overlap >= chunk_size` or `chunk_size == 0`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_chunk_params(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separator: " ".to_string(),
            backup_separators: vec!["\n".to_string()],
            tokenizer: Arc::new(SimpleTokenizer),
        })
    }

    /// Create a splitter from a validated [`SplitterConfig`].
    pub fn from_config(config: &SplitterConfig) -> Result<Self> {
        let mut splitter = Self::new(config.chunk_size, config.effective_chunk_overlap())?;
        splitter.separator = config.separator.clone();
        if let Some(backup_separators) = &config.backup_separators {
            splitter.backup_separators = backup_separators.clone();
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

    /// Separators tried, in order, when the word separator does not divide a piece.
    pub fn with_backup_separators(mut self, separators: Vec<String>) -> Self {
        self.backup_separators = separators;
        self
    }

    fn split_with_budget(&self, text: &str, chunk_size: usize) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let splits = self.split(text, chunk_size);
        self.merge(splits, chunk_size)
    }

    fn split(&self, text: &str, chunk_size: usize) -> Vec<String> {
        if self.tokenizer.count(text) <= chunk_size {
            return vec![text.to_string()];
        }

        let mut parts = Vec::new();
        for separator in std::iter::once(&self.separator).chain(&self.backup_separators) {
            parts = split_keeping_separator(text, separator);
            if parts.len() > 1 {
                break;
            }
        }
        if parts.len() <= 1 {
            parts = split_chars(text);
        }
        if parts.len() <= 1 {
            return parts;
        }

        let mut splits = Vec::new();
        for part in parts {
            if self.tokenizer.count(&part) <= chunk_size {
                splits.push(part);
            } else {
                splits.extend(self.split(&part, chunk_size));
            }
        }
        splits
    }

    fn merge(&self, splits: Vec<String>, chunk_size: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<(String, usize)> = Vec::new();
        let mut current_len = 0;

        for split in splits {
            let split_len = self.tokenizer.count(&split);
            if split_len > chunk_size {
                warn!(split_len, chunk_size, "piece exceeds chunk size and cannot be split further");
            }
            if current_len + split_len > chunk_size {
                push_trimmed(&mut chunks, &current);
                while !current.is_empty()
                    && (current_len > self.chunk_overlap || current_len + split_len > chunk_size)
                {
                    let (_, len) = current.remove(0);
                    current_len -= len;
                }
            }
            current_len += split_len;
            current.push((split, split_len));
        }
        push_trimmed(&mut chunks, &current);
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, pieces: &[(String, usize)]) {
    let chunk: String = pieces.iter().map(|(text, _)| text.as_str()).collect();
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        chunks.push(chunk.to_string());
    }
}

impl TextSplitter for TokenTextSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with_budget(text, self.chunk_size)
    }

    fn split_text_metadata_aware(&self, text: &str, metadata_str: &str) -> Result<Vec<String>> {
        let chunk_size = effective_chunk_size(self.tokenizer.as_ref(), self.chunk_size, metadata_str)?;
        Ok(self.split_with_budget(text, chunk_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_words_with_overlap() {
        let splitter = TokenTextSplitter::new(4, 2).unwrap();
        let chunks = splitter.split_text("a b c d e f g h");
        assert_eq!(chunks, vec!["a b c d", "c d e f", "e f g h"]);
    }

    #[test]
    fn falls_back_to_backup_separator() {
        let splitter = TokenTextSplitter::new(2, 0)
            .unwrap()
            .with_separator("|")
            .with_backup_separators(vec!["\n".to_string()]);
        let chunks = splitter.split_text("one two\nthree four\nfive");
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let splitter = TokenTextSplitter::new(4, 1).unwrap();
        assert!(splitter.split_text("").is_empty());
    }

    #[test]
    fn oversized_single_character_is_kept() {
        let heavy = |text: &str| text.chars().count() * 10;
        let splitter = TokenTextSplitter::new(5, 0).unwrap().with_tokenizer(Arc::new(heavy));
        assert_eq!(splitter.split_text("xy"), vec!["x", "y"]);
    }
}
