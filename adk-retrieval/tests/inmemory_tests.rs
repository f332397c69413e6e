//! Property tests for in-memory vector store query ordering and filtering.

use std::collections::BTreeMap;

use adk_retrieval::{
    Document, InMemoryVectorStore, MetadataFilters, Node, NodeRelationship, VectorStore,
    VectorStoreQuery,
};
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate an embedded node belonging to one of three documents.
fn arb_node(dim: usize) -> impl Strategy<Value = Node> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", 0usize..3, arb_normalized_embedding(dim)).prop_map(
        |(id, text, doc, embedding)| {
            let source = Document::new(format!("doc_{doc}"), "").as_related_node_info();
            Node::with_id(id, text)
                .relationship(NodeRelationship::Source, source)
                .metadata("shard", (doc % 2) as i64)
                .embedding(embedding)
        },
    )
}

fn dedup_by_id(nodes: Vec<Node>) -> Vec<Node> {
    let mut unique: BTreeMap<String, Node> = BTreeMap::new();
    for node in nodes {
        unique.entry(node.id.clone()).or_insert(node);
    }
    unique.into_values().collect()
}

/// Results come back best first and never exceed `top_k`.
mod prop_inmemory_query_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            nodes in proptest::collection::vec(arb_node(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let nodes = dedup_by_id(nodes);
            let unique_count = nodes.len();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.upsert(&nodes).await.unwrap();
                store
                    .query(&VectorStoreQuery {
                        query_embedding: Some(query),
                        similarity_top_k: top_k,
                        ..Default::default()
                    })
                    .await
                    .unwrap()
            });

            let similarities = result.similarities.unwrap();
            prop_assert!(similarities.len() <= top_k);
            prop_assert!(similarities.len() <= unique_count);
            prop_assert_eq!(result.nodes.unwrap().len(), similarities.len());

            for window in similarities.windows(2) {
                prop_assert!(
                    window[0] >= window[1],
                    "results not in descending order: {} < {}",
                    window[0],
                    window[1],
                );
            }
        }

        #[test]
        fn filters_and_ref_doc_delete_are_respected(
            nodes in proptest::collection::vec(arb_node(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
        ) {
            let nodes = dedup_by_id(nodes);
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (filtered, after_delete) = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.upsert(&nodes).await.unwrap();
                let filtered = store
                    .query(&VectorStoreQuery {
                        query_embedding: Some(query.clone()),
                        similarity_top_k: 100,
                        filters: Some(MetadataFilters::new().eq("shard", 0i64)),
                        ..Default::default()
                    })
                    .await
                    .unwrap();
                store.delete("doc_0").await.unwrap();
                let after_delete = store
                    .query(&VectorStoreQuery {
                        query_embedding: Some(query),
                        similarity_top_k: 100,
                        ..Default::default()
                    })
                    .await
                    .unwrap();
                (filtered, after_delete)
            });

            for node in filtered.nodes.unwrap() {
                prop_assert_ne!(node.ref_doc_id(), Some("doc_1"));
            }
            let remaining = after_delete.nodes.unwrap();
            prop_assert!(remaining.iter().all(|n| n.ref_doc_id() != Some("doc_0")));
            let expected = nodes.iter().filter(|n| n.ref_doc_id() != Some("doc_0")).count();
            prop_assert_eq!(remaining.len(), expected);
        }
    }
}
