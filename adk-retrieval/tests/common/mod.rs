//! Deterministic collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use adk_retrieval::{
    CompletionModel, CrossEncoder, Document, EmbeddingProvider, IdFn, NodeParser, RagError,
    Result, SentenceSplitter, ServiceContext,
};
use async_trait::async_trait;

pub const DIM: usize = 64;

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % DIM as u64) as usize
}

/// Embeds text as hashed word counts. Identical words land in identical
/// buckets, so texts sharing words have positive cosine similarity.
#[derive(Debug, Default)]
pub struct BagOfWordsEmbedder {
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; DIM];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            vector[bucket(&word.to_lowercase())] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// An embedding provider that always fails.
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError { provider: "test".into(), message: "quota exceeded".into() })
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Scores a passage by how many query words it contains.
#[derive(Debug, Default)]
pub struct OverlapCrossEncoder;

#[async_trait]
impl CrossEncoder for OverlapCrossEncoder {
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let query_words: Vec<String> =
            query.split_whitespace().map(str::to_lowercase).collect();
        Ok(passages
            .iter()
            .map(|p| {
                let lower = p.to_lowercase();
                query_words.iter().filter(|w| lower.contains(w.as_str())).count() as f32
            })
            .collect())
    }
}

/// A cross encoder that always fails.
#[derive(Debug, Default)]
pub struct FailingCrossEncoder;

#[async_trait]
impl CrossEncoder for FailingCrossEncoder {
    async fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
        Err(RagError::RerankerError { reranker: "test".into(), message: "model offline".into() })
    }
}

/// Replies with a fixed completion.
#[derive(Debug)]
pub struct ScriptedModel {
    pub reply: String,
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}

/// Node ids of the form `<document id>-<split index>`.
pub fn doc_index_ids() -> IdFn {
    Arc::new(|i, doc: &Document| format!("{}-{i}", doc.id))
}

/// A service context with a small sentence splitter, deterministic ids and
/// the bag-of-words embedder.
pub fn service(chunk_size: usize) -> ServiceContext {
    service_with_embedder(chunk_size, Arc::new(BagOfWordsEmbedder::default()))
}

/// Like [`service`], with the given embedding provider.
pub fn service_with_embedder(
    chunk_size: usize,
    embedder: Arc<dyn EmbeddingProvider>,
) -> ServiceContext {
    let splitter = SentenceSplitter::new(chunk_size, 0).unwrap();
    let parser = NodeParser::new(Arc::new(splitter)).id_fn(doc_index_ids());
    ServiceContext::builder().chunker(Arc::new(parser)).embed_model(embedder).build().unwrap()
}
