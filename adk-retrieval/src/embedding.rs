//! Embedding provider trait and helpers for embedding nodes and queries.

use std::cmp::Ordering;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::node::{MetadataMode, Node};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, local models,
/// etc.) behind a unified async interface. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// Providers must be deterministic for identical input, otherwise hash-based
/// refresh would re-embed unchanged documents to different vectors.
///
/// # Example
///
/// ```rust,ignore
/// use adk_retrieval::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Embed several query strings and average them into one vector.
    ///
    /// Used for multi-representation queries.
    async fn embed_aggregate(&self, texts: &[&str]) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Err(RagError::EmbeddingError {
                provider: "aggregate".to_string(),
                message: "no query strings to embed".to_string(),
            });
        }
        let embeddings = self.embed_batch(texts).await?;
        mean_embedding(&embeddings)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Element-wise mean of equally sized vectors.
pub fn mean_embedding(embeddings: &[Vec<f32>]) -> Result<Vec<f32>> {
    let Some(first) = embeddings.first() else {
        return Ok(Vec::new());
    };
    let dims = first.len();
    let mut sum = vec![0.0f32; dims];
    for embedding in embeddings {
        if embedding.len() != dims {
            return Err(RagError::EmbeddingError {
                provider: "aggregate".to_string(),
                message: format!("dimension mismatch: expected {dims}, got {}", embedding.len()),
            });
        }
        for (acc, value) in sum.iter_mut().zip(embedding) {
            *acc += value;
        }
    }
    let count = embeddings.len() as f32;
    Ok(sum.into_iter().map(|v| v / count).collect())
}

/// Rank candidates by cosine similarity to `query`, best first.
///
/// Ties keep candidate order. Returns `(candidate index, similarity)` pairs.
pub fn top_k_by_similarity<'a, I>(query: &[f32], candidates: I, top_k: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut scored: Vec<(usize, f32)> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, embedding)| (i, cosine_similarity(query, embedding)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored
}

/// Compute embeddings for nodes that lack one.
///
/// Nodes are embedded in batches of `batch_size` in input order. Within a
/// batch, `concurrent` issues one [`embed`](EmbeddingProvider::embed) per node
/// and joins them; otherwise a single
/// [`embed_batch`](EmbeddingProvider::embed_batch) call is made. Both paths
/// assign identical embeddings in identical order.
pub async fn embed_nodes(
    provider: &dyn EmbeddingProvider,
    nodes: &mut [Node],
    batch_size: usize,
    concurrent: bool,
) -> Result<()> {
    let pending: Vec<usize> =
        nodes.iter().enumerate().filter(|(_, n)| n.embedding.is_none()).map(|(i, _)| i).collect();
    if pending.is_empty() {
        return Ok(());
    }

    for (batch_index, batch) in pending.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> =
            batch.iter().map(|&i| nodes[i].get_content(MetadataMode::Embed)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let embeddings = if concurrent {
            try_join_all(refs.iter().map(|text| provider.embed(text))).await?
        } else {
            provider.embed_batch(&refs).await?
        };
        if embeddings.len() != batch.len() {
            return Err(RagError::EmbeddingError {
                provider: "batch".to_string(),
                message: format!(
                    "expected {} embeddings, provider returned {}",
                    batch.len(),
                    embeddings.len()
                ),
            });
        }
        for (&i, embedding) in batch.iter().zip(embeddings) {
            nodes[i].embedding = Some(embedding);
        }
        debug!(batch = batch_index, batch_len = batch.len(), concurrent, "embedded node batch");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[test]
    fn cosine_of_orthogonal_and_parallel() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn mean_rejects_mismatched_dimensions() {
        assert_eq!(mean_embedding(&[vec![1.0, 3.0], vec![3.0, 5.0]]).unwrap(), vec![2.0, 4.0]);
        assert!(mean_embedding(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn top_k_keeps_ties_in_order() {
        let candidates = [vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]];
        let ranked = top_k_by_similarity(&[1.0, 0.0], candidates.iter().map(Vec::as_slice), 2);
        assert_eq!(ranked.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[tokio::test]
    async fn sequential_and_concurrent_embedding_agree() {
        let make = || vec![Node::with_id("a", "x"), Node::with_id("b", "xyz"), Node::with_id("c", "xy")];
        let mut sequential = make();
        let mut concurrent = make();
        embed_nodes(&LengthEmbedder, &mut sequential, 2, false).await.unwrap();
        embed_nodes(&LengthEmbedder, &mut concurrent, 2, true).await.unwrap();

        assert_eq!(sequential, concurrent);
        assert_eq!(sequential[1].embedding, Some(vec![3.0, 1.0]));
    }

    #[tokio::test]
    async fn existing_embeddings_are_kept() {
        let mut nodes = vec![Node::with_id("a", "x").embedding(vec![9.0, 9.0])];
        embed_nodes(&LengthEmbedder, &mut nodes, 8, false).await.unwrap();
        assert_eq!(nodes[0].embedding, Some(vec![9.0, 9.0]));
    }
}
