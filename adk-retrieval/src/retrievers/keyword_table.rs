//! Keyword-hit retrieval over a keyword table index.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::data_struct::KeywordTable;
use crate::error::Result;
use crate::indices::{Index, KeywordTableIndex};
use crate::keyword::KeywordExtractor;
use crate::node::ScoredNode;
use crate::query::QueryBundle;
use crate::retrievers::Retriever;

/// Looks query keywords up in a [`KeywordTableIndex`].
///
/// Nodes are ranked by how many query keywords point at them; ties break on
/// node id. The hit count is reported as the score. A query with no keyword
/// in the table yields no results.
pub struct KeywordTableRetriever<'a> {
    index: &'a KeywordTableIndex,
    extractor: Arc<dyn KeywordExtractor>,
    max_keywords_per_query: usize,
    num_chunks_per_query: usize,
}

impl std::fmt::Debug for KeywordTableRetriever<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordTableRetriever")
            .field("max_keywords_per_query", &self.max_keywords_per_query)
            .field("num_chunks_per_query", &self.num_chunks_per_query)
            .finish_non_exhaustive()
    }
}

impl<'a> KeywordTableRetriever<'a> {
    /// Retrieve from `index`, extracting query keywords with `extractor`.
    pub fn new(
        index: &'a KeywordTableIndex,
        extractor: Arc<dyn KeywordExtractor>,
        max_keywords_per_query: usize,
        num_chunks_per_query: usize,
    ) -> Self {
        Self { index, extractor, max_keywords_per_query, num_chunks_per_query }
    }
}

/// Rank node ids by the number of `keywords` that map to them.
///
/// Returns at most `limit` `(node id, hit count)` pairs, most hits first,
/// ties on node id ascending.
pub(crate) fn rank_by_keyword_hits(
    table: &KeywordTable,
    keywords: &BTreeSet<String>,
    limit: usize,
) -> Vec<(String, usize)> {
    let mut hits: BTreeMap<&str, usize> = BTreeMap::new();
    for keyword in keywords {
        if let Some(ids) = table.table.get(keyword) {
            for id in ids {
                *hits.entry(id.as_str()).or_default() += 1;
            }
        }
    }
    let mut ranked: Vec<(String, usize)> =
        hits.into_iter().map(|(id, count)| (id.to_string(), count)).collect();
    // Stable sort over id-ordered input keeps ids ascending within a count.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked
}

#[async_trait]
impl Retriever for KeywordTableRetriever<'_> {
    async fn retrieve(&self, query: &QueryBundle) -> Result<Vec<ScoredNode>> {
        let keywords =
            self.extractor.extract_query(&query.query_str, self.max_keywords_per_query).await?;
        let table = self.index.table();
        let known: BTreeSet<String> =
            keywords.into_iter().filter(|k| table.table.contains_key(k)).collect();
        debug!(keywords = ?known, "query keywords found in table");

        let ranked = rank_by_keyword_hits(table, &known, self.num_chunks_per_query);
        if ranked.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let nodes = self.index.storage_context().docstore.get_nodes(&ids, true).await?;
        Ok(nodes
            .into_iter()
            .zip(ranked)
            .map(|(node, (_, count))| ScoredNode::new(node, Some(count as f32)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_by_hits_then_id() {
        let mut table = KeywordTable::default();
        table.add_node(["rust", "async"], "b");
        table.add_node(["rust"], "a");
        table.add_node(["rust", "async"], "c");

        let keywords = BTreeSet::from(["rust".to_string(), "async".to_string()]);
        let ranked = rank_by_keyword_hits(&table, &keywords, 10);
        assert_eq!(
            ranked,
            vec![("b".to_string(), 2), ("c".to_string(), 2), ("a".to_string(), 1)]
        );

        assert_eq!(rank_by_keyword_hits(&table, &keywords, 1).len(), 1);
        assert!(rank_by_keyword_hits(&table, &BTreeSet::new(), 10).is_empty());
    }
}
