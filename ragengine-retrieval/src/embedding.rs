//! ABOUTME: Embedding Gateway (C1)
//! ABOUTME: Batches and offloads CPU-bound embedding work, grounded on the
//! ABOUTME: teacher's SentenceTransformer-backed embedding service

use async_trait::async_trait;
use ragengine_core::error::{RagError, Result};
use ragengine_core::traits::Embedder;
use std::sync::Arc;

/// A synchronous, CPU-bound embedding backend. Implementations wrap whatever
/// actual model-hosting collaborator is configured (out of scope for this
/// crate per §1); `EmbeddingGateway` is responsible for keeping that work off
/// the async request thread and for batch-size selection.
pub trait RawEmbedder: Send + Sync + 'static {
    /// Embed one piece of already-validated, non-blank text.
    ///
    /// # Errors
    /// Returns `RagError::ModelError` on backend failure.
    fn embed_raw(&self, text: &str) -> Result<Vec<f32>>;

    /// The fixed dimensionality of vectors produced by this backend.
    fn dimension(&self) -> usize;

    /// Diagnostic model identifier.
    fn model_name(&self) -> &str;
}

/// Auto-selects a batch size by input count, per §4.1: `<=10` all at once,
/// `<=100` batches of 32, `<=1000` batches of 64, otherwise 128.
#[must_use]
pub fn optimal_batch_size(count: usize) -> usize {
    if count <= 10 {
        count.max(1)
    } else if count <= 100 {
        32
    } else if count <= 1000 {
        64
    } else {
        128
    }
}

fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::invalid_input("text must not be empty or whitespace-only"));
    }
    Ok(())
}

/// The Embedding Gateway (C1): turns text into dense vectors, running the
/// CPU-bound work on a blocking thread pool so the cooperative scheduler is
/// never blocked (§5).
pub struct EmbeddingGateway<R: RawEmbedder> {
    inner: Arc<R>,
}

impl<R: RawEmbedder> EmbeddingGateway<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Diagnostic accessor describing the active model, for health checks
    /// and quality reporting.
    #[must_use]
    pub fn model_info(&self) -> (String, usize) {
        (self.inner.model_name().to_string(), self.inner.dimension())
    }
}

#[async_trait]
impl<R: RawEmbedder> Embedder for EmbeddingGateway<R> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        validate_text(text)?;
        let inner = Arc::clone(&self.inner);
        let owned = text.to_string();
        tokio::task::spawn_blocking(move || inner.embed_raw(&owned))
            .await
            .map_err(|e| RagError::internal(format!("embedding task panicked: {e}")))?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(RagError::invalid_input("embed_batch requires at least one text"));
        }
        for text in texts {
            validate_text(text)?;
        }

        let batch_size = optimal_batch_size(texts.len());
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size) {
            let inner = Arc::clone(&self.inner);
            let owned: Vec<String> = chunk.to_vec();
            let embedded = tokio::task::spawn_blocking(move || {
                owned
                    .iter()
                    .map(|t| inner.embed_raw(t))
                    .collect::<Result<Vec<_>>>()
            })
            .await
            .map_err(|e| RagError::internal(format!("embedding task panicked: {e}")))??;
            results.extend(embedded);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// A deterministic, hash-based embedder for tests and mocked pipelines. Not
/// suitable for real semantic search — it exists so the rest of the crate
/// can be exercised without a real model.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(16)
    }
}

impl RawEmbedder for MockEmbedder {
    fn embed_raw(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_embed(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-hash-embedder"
    }
}

/// Deterministic bag-of-characters embedding: stable across runs, varies
/// with content, and is cheap enough to use directly in async test code
/// without a blocking-pool hop.
#[must_use]
pub fn hash_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut buckets = vec![0.0f32; dimension];
    for (i, byte) in text.bytes().enumerate() {
        let idx = (byte as usize + i) % dimension;
        buckets[idx] += 1.0;
    }
    let norm: f32 = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for b in &mut buckets {
            *b /= norm;
        }
    }
    buckets
}
