//! Document chunking.
//!
//! Text-level splitting is done by a [`TextSplitter`]:
//!
//! - [`SentenceSplitter`] packs whole sentences into token-bounded chunks,
//!   falling back to sub-sentence units only when a sentence is too long
//! - [`TokenTextSplitter`] splits on a word separator and backup separators
//!
//! [`NodeParser`] wraps a splitter and implements [`Chunker`], turning a
//! [`Document`] into [`Node`]s that point back at their source document.

mod sentence;
mod token;
mod tokenizer;

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{SplitterConfig, SplitterMode};
use crate::error::{RagError, Result};
use crate::node::{Document, MetadataMode, Node, NodeRelationship};

pub use sentence::{DEFAULT_PARAGRAPH_SEPARATOR, DEFAULT_SECONDARY_CHUNKING_REGEX, SentenceSplitter};
pub use token::TokenTextSplitter;
pub use tokenizer::{SimpleTokenizer, Tokenizer};

/// Default chunk budget in tokens.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
/// Default overlap for sentence splitting, in tokens.
pub const SENTENCE_CHUNK_OVERLAP: usize = 200;
/// Default overlap for token splitting, in tokens.
pub const TOKEN_CHUNK_OVERLAP: usize = 20;

/// Tokens reserved for the blank line between rendered metadata and text.
const METADATA_FORMAT_LEN: usize = 2;

/// Splits raw text into ordered, overlapping, token-bounded segments.
pub trait TextSplitter: Send + Sync {
    /// Split `text` using the full chunk budget.
    ///
    /// Empty or whitespace-only input yields no segments.
    fn split_text(&self, text: &str) -> Vec<String>;

    /// Split `text` leaving room for `metadata_str` in every chunk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the metadata alone fills the budget.
    fn split_text_metadata_aware(&self, text: &str, metadata_str: &str) -> Result<Vec<String>>;
}

/// Turns documents into nodes.
pub trait Chunker: Send + Sync {
    /// Chunk one document.
    fn chunk(&self, document: &Document) -> Result<Vec<Node>>;

    /// Chunk documents in order, concatenating their nodes.
    fn chunk_documents(&self, documents: &[Document]) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        for document in documents {
            nodes.extend(self.chunk(document)?);
        }
        Ok(nodes)
    }
}

/// Generates the id of the `i`-th node split from a document.
pub type IdFn = Arc<dyn Fn(usize, &Document) -> String + Send + Sync>;

/// The default id function: a random v4 UUID per node.
pub fn default_id_fn() -> IdFn {
    Arc::new(|_, _| uuid::Uuid::new_v4().to_string())
}

/// A [`Chunker`] that splits document text and builds linked nodes.
///
/// Every node gets a SOURCE relationship to its document. With
/// `include_prev_next_rel`, adjacent nodes of the same document are linked
/// with PREVIOUS/NEXT. With `include_metadata`, nodes inherit the document
/// metadata and the chunk budget shrinks to make room for it.
///
/// # Example
///
/// ```rust,ignore
/// use adk_retrieval::{NodeParser, SentenceSplitter, Chunker};
///
/// let parser = NodeParser::new(Arc::new(SentenceSplitter::new(256, 20)?));
/// let nodes = parser.chunk(&document)?;
/// ```
#[derive(Clone)]
pub struct NodeParser {
    splitter: Arc<dyn TextSplitter>,
    include_metadata: bool,
    include_prev_next_rel: bool,
    id_fn: IdFn,
}

impl fmt::Debug for NodeParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeParser")
            .field("include_metadata", &self.include_metadata)
            .field("include_prev_next_rel", &self.include_prev_next_rel)
            .finish_non_exhaustive()
    }
}

impl NodeParser {
    /// Wrap a splitter with metadata inclusion and prev/next links enabled.
    pub fn new(splitter: Arc<dyn TextSplitter>) -> Self {
        Self { splitter, include_metadata: true, include_prev_next_rel: true, id_fn: default_id_fn() }
    }

    /// Build the splitter described by `config`.
    pub fn from_config(config: &SplitterConfig) -> Result<Self> {
        config.validate()?;
        let splitter: Arc<dyn TextSplitter> = match config.mode {
            SplitterMode::Sentence => Arc::new(SentenceSplitter::from_config(config)?),
            SplitterMode::Token => Arc::new(TokenTextSplitter::from_config(config)?),
        };
        Ok(Self::new(splitter)
            .include_metadata(config.include_metadata)
            .include_prev_next_rel(config.include_prev_next_rel))
    }

    /// Whether nodes inherit document metadata (and budget for it).
    pub fn include_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    /// Whether adjacent nodes are linked with PREVIOUS/NEXT.
    pub fn include_prev_next_rel(mut self, include: bool) -> Self {
        self.include_prev_next_rel = include;
        self
    }

    /// Replace the node id function, e.g. for reproducible ids in tests.
    pub fn id_fn(mut self, id_fn: IdFn) -> Self {
        self.id_fn = id_fn;
        self
    }
}

impl Chunker for NodeParser {
    fn chunk(&self, document: &Document) -> Result<Vec<Node>> {
        let splits = if self.include_metadata {
            let embed = document.metadata_str(MetadataMode::Embed);
            let llm = document.metadata_str(MetadataMode::Llm);
            let longest = if embed.len() >= llm.len() { embed } else { llm };
            self.splitter.split_text_metadata_aware(&document.text, &longest)?
        } else {
            self.splitter.split_text(&document.text)
        };
        debug!(document.id = %document.id, split_count = splits.len(), "split document");

        let mut nodes = build_nodes_from_splits(splits, document, &self.id_fn);
        if self.include_metadata {
            for node in &mut nodes {
                node.metadata = document.metadata.clone();
            }
        }
        if self.include_prev_next_rel {
            link_prev_next(&mut nodes);
        }
        Ok(nodes)
    }
}

/// Build one node per split, each with a SOURCE link to `document`.
///
/// Nodes inherit the document's metadata exclusion lists but not its metadata.
pub fn build_nodes_from_splits(splits: Vec<String>, document: &Document, id_fn: &IdFn) -> Vec<Node> {
    let source = document.as_related_node_info();
    splits
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut node = Node::with_id(id_fn(i, document), text)
                .relationship(NodeRelationship::Source, source.clone());
            node.excluded_embed_metadata_keys = document.excluded_embed_metadata_keys.clone();
            node.excluded_llm_metadata_keys = document.excluded_llm_metadata_keys.clone();
            node
        })
        .collect()
}

fn link_prev_next(nodes: &mut [Node]) {
    for i in 0..nodes.len() {
        if i > 0 {
            let previous = nodes[i - 1].as_related_node_info();
            nodes[i].relationships.insert(NodeRelationship::Previous, previous);
        }
        if i + 1 < nodes.len() {
            let next = nodes[i + 1].as_related_node_info();
            nodes[i].relationships.insert(NodeRelationship::Next, next);
        }
    }
}

pub(crate) fn validate_chunk_params(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

/// The chunk budget left once `metadata_str` is rendered into every chunk.
pub(crate) fn effective_chunk_size(
    tokenizer: &dyn Tokenizer,
    chunk_size: usize,
    metadata_str: &str,
) -> Result<usize> {
    let metadata_len = tokenizer.count(metadata_str) + METADATA_FORMAT_LEN;
    if metadata_len >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "metadata length ({metadata_len}) is longer than chunk size ({chunk_size}); \
             increase the chunk size or trim the metadata"
        )));
    }
    let effective = chunk_size - metadata_len;
    if effective < 50 {
        warn!(metadata_len, effective, "metadata leaves a small chunk budget");
    }
    Ok(effective)
}

/// Split at every occurrence of `separator`, keeping it attached to the
/// preceding segment so that concatenating the segments restores `text`.
pub(crate) fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return split_chars(text);
    }
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(text[start..end].to_string());
        start = end;
    }

    if start < text.len() {
        result.push(text[start..].to_string());
    }

    result
}

/// Split into regex matches. Unmatched gaps stay attached to the preceding
/// piece (or the first one) so no text is lost.
pub(crate) fn split_by_regex(text: &str, regex: &Regex) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();
    let mut leading = String::new();
    let mut last_end = 0;
    for m in regex.find_iter(text) {
        if m.start() > last_end {
            let gap = &text[last_end..m.start()];
            match pieces.last_mut() {
                Some(previous) => previous.push_str(gap),
                None => leading.push_str(gap),
            }
        }
        if m.end() > m.start() {
            pieces.push(m.as_str().to_string());
        }
        last_end = m.end();
    }
    let tail = &text[last_end..];
    match pieces.last_mut() {
        Some(previous) => previous.push_str(tail),
        None => leading.push_str(tail),
    }
    if let Some(first) = pieces.first_mut() {
        first.insert_str(0, &leading);
    } else if !leading.is_empty() {
        pieces.push(leading);
    }
    pieces
}

pub(crate) fn split_chars(text: &str) -> Vec<String> {
    text.chars().map(String::from).collect()
}

/// Trim chunks and drop the ones that are empty after trimming.
pub(crate) fn postprocess_chunks(chunks: Vec<String>) -> Vec<String> {
    chunks
        .into_iter()
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_split_preserves_text() {
        let parts = split_keeping_separator("a b  c", " ");
        assert_eq!(parts, vec!["a ", "b ", " ", "c"]);
        assert_eq!(parts.concat(), "a b  c");
    }

    #[test]
    fn regex_split_keeps_gaps() {
        let regex = Regex::new(DEFAULT_SECONDARY_CHUNKING_REGEX).unwrap();
        let parts = split_by_regex("one, two.. three", &regex);
        assert_eq!(parts.concat(), "one, two.. three");
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(matches!(validate_chunk_params(10, 10), Err(RagError::ConfigError(_))));
        assert!(matches!(validate_chunk_params(0, 0), Err(RagError::ConfigError(_))));
        assert!(validate_chunk_params(10, 9).is_ok());
    }

    #[test]
    fn metadata_that_fills_the_budget_is_rejected() {
        let result = effective_chunk_size(&SimpleTokenizer, 4, "author: ann");
        assert!(matches!(result, Err(RagError::ConfigError(_))));
        assert_eq!(effective_chunk_size(&SimpleTokenizer, 100, "author: ann").unwrap(), 95);
    }
}
