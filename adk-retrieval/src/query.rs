//! Query request values.

use serde::{Deserialize, Serialize};

use crate::node::{Metadata, MetadataValue};

/// An exact-match constraint on one metadata key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExactMatchFilter {
    /// Metadata key to compare.
    pub key: String,
    /// Value the key must equal.
    pub value: MetadataValue,
}

/// A conjunction of exact-match metadata filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataFilters {
    /// All filters must match.
    pub filters: Vec<ExactMatchFilter>,
}

impl MetadataFilters {
    /// Create an empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exact-match filter.
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.filters.push(ExactMatchFilter { key: key.into(), value: value.into() });
        self
    }

    /// Whether `metadata` satisfies every filter.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.filters.iter().all(|f| metadata.get(&f.key) == Some(&f.value))
    }
}

/// An immutable retrieval request.
///
/// When no precomputed [`embedding`](QueryBundle::embedding) is supplied,
/// dense retrievers embed [`embedding_strs`](QueryBundle::embedding_strs) and
/// aggregate the results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryBundle {
    /// The raw query text.
    pub query_str: String,
    /// A precomputed query embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Alternative strings to embed and aggregate instead of `query_str`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_embedding_strs: Option<Vec<String>>,
    /// Metadata filters applied by backends that support them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<MetadataFilters>,
}

impl QueryBundle {
    /// Create a bundle from a query string.
    pub fn new(query_str: impl Into<String>) -> Self {
        Self { query_str: query_str.into(), ..Self::default() }
    }

    /// Attach a precomputed embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Embed these strings (aggregated) instead of the query string.
    pub fn with_embedding_strs(mut self, strs: Vec<String>) -> Self {
        self.custom_embedding_strs = Some(strs);
        self
    }

    /// Attach metadata filters.
    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// The strings a dense retriever should embed.
    pub fn embedding_strs(&self) -> Vec<&str> {
        match &self.custom_embedding_strs {
            Some(strs) => strs.iter().map(String::as_str).collect(),
            None => vec![self.query_str.as_str()],
        }
    }
}

impl From<&str> for QueryBundle {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

impl From<String> for QueryBundle {
    fn from(query: String) -> Self {
        Self::new(query)
    }
}
