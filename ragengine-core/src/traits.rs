//! Trait seams for every externally-consumed collaborator named in §6:
//! `VectorIndex`, `KeywordIndex`, `ImageIndex`, `TableIndex`, `KVStore`,
//! `Llm`, `Embedder`. Each is pluggable and mockable; none are implemented by
//! this crate — concrete adapters live in `ragengine-retrieval` and
//! `ragengine-memory`, and the databases/model backends themselves are out
//! of scope per §1.

use crate::error::Result;
use crate::types::SourceChunk;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Turns text into dense vectors (C1).
///
/// Implementations must guarantee a fixed dimensionality for a given
/// configured model and must batch `embed_batch` equivalently to calling
/// `embed` element-wise.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    ///
    /// # Errors
    /// Returns `RagError::InvalidInput` for empty/whitespace-only text and
    /// `RagError::ModelError` on backend failure.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, equivalent element-wise to repeated `embed`
    /// calls but free to pick an internal batch size (see §4.1).
    ///
    /// # Errors
    /// Returns `RagError::InvalidInput` if `texts` is empty or any entry is
    /// blank, and `RagError::ModelError` on backend failure.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The fixed dimensionality of vectors produced by this embedder.
    fn dimension(&self) -> usize;

    /// Diagnostic model identifier, for health checks and quality reporting.
    fn model_name(&self) -> &str;
}

/// A single chat message as consumed by `Llm::generate`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Generation parameters passed through to the LLM backend.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
        }
    }
}

/// A completion endpoint (LLM hosting is out of scope per §1; this is the
/// narrow interface the pipeline calls through).
#[async_trait]
pub trait Llm: Send + Sync {
    /// Generate a completion for the given message history.
    ///
    /// # Errors
    /// Returns `RagError::ModelError` on backend failure, `RagError::Timeout`
    /// if the call exceeds its deadline.
    async fn generate(&self, messages: &[ChatMessage], params: &GenerateParams) -> Result<String>;
}

/// Optional metadata filters applied to a backend search call.
pub type Filters = HashMap<String, Value>;

/// Dense vector retrieval backend (C2).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Search for the `top_k` nearest neighbors of `vector`.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` if the index cannot be
    /// reached.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<SourceChunk>>;

    /// Insert or update a chunk's vector and payload.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` if the index cannot be
    /// reached.
    async fn upsert(&self, chunk: SourceChunk, vector: Vec<f32>) -> Result<()>;

    /// Delete all chunks matching the given filter.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` if the index cannot be
    /// reached.
    async fn delete_by_filter(&self, filters: &Filters) -> Result<usize>;
}

/// Lexical (BM25) retrieval backend (C2). A missing index returns an empty
/// result set, never an error.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Search for `top_k` lexical matches, returning `(id, score)` pairs.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` only for genuine transport
    /// failures; a missing/unconfigured index returns `Ok(vec![])`.
    async fn search(&self, text: &str, top_k: usize) -> Result<Vec<(String, f32)>>;
}

/// Late-interaction (ColPali-style) image patch search backend (C2). May be
/// absent; supports user-scoped isolation so two callers never observe each
/// other's results.
#[async_trait]
pub trait ImageIndex: Send + Sync {
    /// Search with a per-patch multi-vector query, scoped to `user_id`.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` if the index cannot be
    /// reached.
    async fn search(
        &self,
        query_multi_vec: &[Vec<f32>],
        top_k: usize,
        user_id: &str,
        filters: Option<&Filters>,
    ) -> Result<Vec<SourceChunk>>;
}

/// Serialized-table text search backend (C2). May be absent.
#[async_trait]
pub trait TableIndex: Send + Sync {
    /// Search over serialized tables.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` if the index cannot be
    /// reached.
    async fn search(
        &self,
        text: &str,
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<SourceChunk>>;
}

/// The TTL-bounded key/value store backing STM (C6).
///
/// All operations refresh TTL on write; reads from an expired/missing key
/// return empty values, never an error.
#[async_trait]
pub trait KVStore: Send + Sync {
    /// Append a JSON value to the list stored at `key`, refreshing its TTL.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` on transport failure.
    async fn list_append(&self, key: &str, value: Value, ttl_seconds: u64) -> Result<()>;

    /// Read up to `limit` most recent entries of the list at `key` (`None`
    /// reads the whole list). Returns an empty vector for a missing/expired
    /// key.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` on transport failure.
    async fn list_read(&self, key: &str, limit: Option<usize>) -> Result<Vec<Value>>;

    /// Set a single field in the hash at `key`, refreshing its TTL.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` on transport failure.
    async fn hash_set(&self, key: &str, field: &str, value: Value, ttl_seconds: u64)
        -> Result<()>;

    /// Read a single field from the hash at `key`. Returns `None` for a
    /// missing/expired key or field.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` on transport failure.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Value>>;

    /// Read every field of the hash at `key`. Returns an empty map for a
    /// missing/expired key.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` on transport failure.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Value>>;

    /// Delete `key` entirely. Deleting a missing key is a no-op that
    /// returns `Ok(())`, per §4.6's atomic-clear-session semantics.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` on transport failure.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether `key` currently exists and is unexpired.
    ///
    /// # Errors
    /// Returns `RagError::BackendUnavailable` on transport failure.
    async fn exists(&self, key: &str) -> Result<bool>;
}
