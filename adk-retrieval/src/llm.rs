//! Generation-provider boundary.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::Result;

/// A text-completion model.
///
/// This crate only uses it for model-driven keyword extraction; response
/// synthesis is left to the caller.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Complete `prompt` and return the full response text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Complete `prompt` as a stream of text deltas.
    ///
    /// The default implementation yields the whole [`complete`](CompletionModel::complete)
    /// response as a single delta.
    async fn stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let text = self.complete(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl CompletionModel for Echo {
        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn default_stream_yields_completion() {
        let deltas: Vec<String> = Echo
            .stream("hi")
            .await
            .unwrap()
            .map(|delta| delta.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["HI"]);
    }
}
