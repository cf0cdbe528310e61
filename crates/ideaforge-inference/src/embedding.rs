//! Batched embedding client.
//!
//! Partitions input into bounded batches, restores the server-reported
//! order within each batch, and concatenates while preserving 1-to-1 index
//! correspondence with the input.

use std::sync::Arc;

use tracing::{debug, error};

use ideaforge_core::{defaults, EmbeddingBackend, Error, Result};

/// Batched vectorisation over any [`EmbeddingBackend`].
pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
}

impl EmbeddingClient {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
        }
    }

    /// Wrap a backend with the default batch size.
    pub fn with_defaults(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self::new(backend, defaults::EMBED_BATCH_SIZE)
    }

    /// Expected output dimension.
    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Embed all texts; `result[k]` is the embedding of `texts[k]` regardless
    /// of internal batching. Empty input yields empty output. Any batch
    /// failure fails the whole call with batch context attached.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let total_batches = texts.len().div_ceil(self.batch_size);
        let dimension = self.backend.dimension();
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_idx, chunk) in texts.chunks(self.batch_size).enumerate() {
            let batch_number = batch_idx + 1;
            debug!(
                batch_number,
                total_batches,
                input_count = chunk.len(),
                model = self.backend.model_name(),
                "Embedding batch"
            );

            let embed_error = |message: String| Error::Embedding {
                batch_number,
                total_batches,
                texts_in_batch: chunk.len(),
                message,
            };

            let mut items = self
                .backend
                .embed_batch(chunk)
                .await
                .map_err(|e| embed_error(e.to_string()))?;

            if items.len() != chunk.len() {
                return Err(embed_error(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    items.len()
                )));
            }

            // The backend may return items out of order; restore input order.
            items.sort_by_key(|item| item.index);

            for (pos, item) in items.into_iter().enumerate() {
                if item.index != pos {
                    return Err(embed_error(format!(
                        "missing or duplicated index {pos} in batch response"
                    )));
                }
                if item.vector.len() != dimension {
                    error!(
                        batch_number,
                        expected = dimension,
                        got = item.vector.len(),
                        "Embedding dimension mismatch"
                    );
                    return Err(embed_error(format!(
                        "dimension mismatch: expected {dimension}, got {}",
                        item.vector.len()
                    )));
                }
                vectors.push(item.vector);
            }
        }

        debug!(input_count = texts.len(), "Generated embeddings");
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEmbeddingBackend;

    fn texts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let client = EmbeddingClient::new(Arc::new(MockEmbeddingBackend::new(4)), 2);
        assert!(client.embed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn order_is_preserved_across_batches() {
        let client = EmbeddingClient::new(Arc::new(MockEmbeddingBackend::new(8)), 2);
        let input = texts(&["a", "b", "c", "d", "e"]);
        let vectors = client.embed(&input).await.unwrap();
        assert_eq!(vectors.len(), 5);

        // The mock assigns axis k to the k-th distinct text, so order
        // preservation is visible in the hot axis.
        for (k, v) in vectors.iter().enumerate() {
            assert_eq!(v[k], 1.0, "vector {k} lost its slot");
        }
    }

    #[tokio::test]
    async fn out_of_order_batch_responses_are_reordered() {
        let backend = MockEmbeddingBackend::new(8).with_shuffled_output();
        let client = EmbeddingClient::new(Arc::new(backend), 3);
        let input = texts(&["a", "b", "c", "d"]);
        let vectors = client.embed(&input).await.unwrap();
        for (k, v) in vectors.iter().enumerate() {
            assert_eq!(v[k], 1.0, "vector {k} lost its slot after reorder");
        }
    }

    #[tokio::test]
    async fn identical_texts_get_identical_vectors() {
        let client = EmbeddingClient::new(Arc::new(MockEmbeddingBackend::new(8)), 10);
        let input = texts(&["same idea", "other", "same idea"]);
        let vectors = client.embed(&input).await.unwrap();
        assert_eq!(vectors[0], vectors[2]);
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn batch_failure_carries_context() {
        let backend = MockEmbeddingBackend::new(8).with_failing_batch(2);
        let client = EmbeddingClient::new(Arc::new(backend), 2);
        let input = texts(&["a", "b", "c", "d", "e"]);

        let err = client.embed(&input).await.unwrap_err();
        match err {
            Error::Embedding {
                batch_number,
                total_batches,
                texts_in_batch,
                ..
            } => {
                assert_eq!(batch_number, 2);
                assert_eq!(total_batches, 3);
                assert_eq!(texts_in_batch, 2);
            }
            other => panic!("expected Embedding error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_size_is_respected() {
        let backend = Arc::new(MockEmbeddingBackend::new(4));
        let counter = backend.clone();
        let client = EmbeddingClient::new(backend, 2);
        client.embed(&texts(&["a", "b", "c"])).await.unwrap();
        assert_eq!(counter.batches_seen(), 2);
    }
}
