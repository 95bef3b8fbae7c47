//! ABOUTME: In-memory reference backends for VectorIndex/KeywordIndex/ImageIndex/TableIndex (C2)
//! ABOUTME: Mirrors the teacher's in-memory manager construction used for tests and local runs

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use ragengine_core::error::Result;
use ragengine_core::traits::{Filters, ImageIndex, KVStore, KeywordIndex, TableIndex, VectorIndex};
use ragengine_core::types::SourceChunk;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn matches_filters(metadata: &HashMap<String, Value>, filters: Option<&Filters>) -> bool {
    let Some(filters) = filters else {
        return true;
    };
    filters
        .iter()
        .all(|(key, want)| metadata.get(key).is_some_and(|got| got == want))
}

/// An in-memory dense vector index, linear-scanned by cosine similarity.
/// Suitable for tests and small deployments; production backends are
/// plugged in by the host application per §1.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: DashMap<String, (SourceChunk, Vec<f32>)>,
}

impl InMemoryVectorIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<SourceChunk>> {
        let mut scored: Vec<SourceChunk> = self
            .entries
            .iter()
            .filter(|entry| matches_filters(&entry.value().0.metadata, filters))
            .map(|entry| {
                let (chunk, stored_vector) = entry.value();
                let mut chunk = chunk.clone();
                chunk.score = cosine(vector, stored_vector);
                chunk
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn upsert(&self, chunk: SourceChunk, vector: Vec<f32>) -> Result<()> {
        self.entries.insert(chunk.chunk_id.clone(), (chunk, vector));
        Ok(())
    }

    async fn delete_by_filter(&self, filters: &Filters) -> Result<usize> {
        let to_remove: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| matches_filters(&entry.value().0.metadata, Some(filters)))
            .map(|entry| entry.key().clone())
            .collect();
        for key in &to_remove {
            self.entries.remove(key);
        }
        Ok(to_remove.len())
    }
}

/// An in-memory BM25-style lexical index using term-overlap scoring. Good
/// enough to exercise hybrid fusion logic without a real search engine.
#[derive(Default)]
pub struct InMemoryKeywordIndex {
    documents: DashMap<String, String>,
}

impl InMemoryKeywordIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self, id: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(id.into(), text.into());
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl KeywordIndex for InMemoryKeywordIndex {
    async fn search(&self, text: &str, top_k: usize) -> Result<Vec<(String, f32)>> {
        if self.documents.is_empty() {
            return Ok(Vec::new());
        }
        let query_terms = tokenize(text);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(String, f32)> = self
            .documents
            .iter()
            .filter_map(|entry| {
                let doc_terms = tokenize(entry.value());
                if doc_terms.is_empty() {
                    return None;
                }
                let hits = query_terms.iter().filter(|t| doc_terms.contains(t)).count();
                if hits == 0 {
                    return None;
                }
                let score = hits as f32 / query_terms.len() as f32;
                Some((entry.key().clone(), score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// An in-memory late-interaction image index, scoped per `user_id` so two
/// callers never observe each other's uploads.
#[derive(Default)]
pub struct InMemoryImageIndex {
    entries: DashMap<String, Vec<(SourceChunk, Vec<Vec<f32>>)>>,
}

impl InMemoryImageIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self, user_id: impl Into<String>, chunk: SourceChunk, multi_vec: Vec<Vec<f32>>) {
        self.entries
            .entry(user_id.into())
            .or_default()
            .push((chunk, multi_vec));
    }
}

fn max_sim(query_multi_vec: &[Vec<f32>], doc_multi_vec: &[Vec<f32>]) -> f32 {
    if query_multi_vec.is_empty() || doc_multi_vec.is_empty() {
        return 0.0;
    }
    query_multi_vec
        .iter()
        .map(|q| {
            doc_multi_vec
                .iter()
                .map(|d| cosine(q, d))
                .fold(f32::MIN, f32::max)
        })
        .sum::<f32>()
        / query_multi_vec.len() as f32
}

#[async_trait]
impl ImageIndex for InMemoryImageIndex {
    async fn search(
        &self,
        query_multi_vec: &[Vec<f32>],
        top_k: usize,
        user_id: &str,
        filters: Option<&Filters>,
    ) -> Result<Vec<SourceChunk>> {
        let Some(user_entries) = self.entries.get(user_id) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<SourceChunk> = user_entries
            .iter()
            .filter(|(chunk, _)| matches_filters(&chunk.metadata, filters))
            .map(|(chunk, multi_vec)| {
                let mut chunk = chunk.clone();
                chunk.score = max_sim(query_multi_vec, multi_vec);
                chunk
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// An in-memory serialized-table search backend, reusing the keyword index's
/// term-overlap scoring over flattened table text.
#[derive(Default)]
pub struct InMemoryTableIndex {
    tables: DashMap<String, SourceChunk>,
}

impl InMemoryTableIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self, chunk: SourceChunk) {
        self.tables.insert(chunk.chunk_id.clone(), chunk);
    }
}

#[async_trait]
impl TableIndex for InMemoryTableIndex {
    async fn search(
        &self,
        text: &str,
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<SourceChunk>> {
        let query_terms = tokenize(text);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<SourceChunk> = self
            .tables
            .iter()
            .filter(|entry| matches_filters(&entry.value().metadata, filters))
            .filter_map(|entry| {
                let chunk = entry.value();
                let doc_terms = tokenize(&chunk.text);
                let hits = query_terms.iter().filter(|t| doc_terms.contains(t)).count();
                if hits == 0 {
                    return None;
                }
                let mut chunk = chunk.clone();
                chunk.score = hits as f32 / query_terms.len() as f32;
                Some(chunk)
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

struct StoredValue {
    value: Value,
    expires_at: Option<Instant>,
}

struct StoredList {
    values: Vec<Value>,
    expires_at: Option<Instant>,
}

/// An in-memory, TTL-bounded key/value store backing STM (C6) for tests and
/// single-process deployments.
#[derive(Default)]
pub struct InMemoryKVStore {
    lists: DashMap<String, RwLock<StoredList>>,
    hashes: DashMap<String, RwLock<HashMap<String, StoredValue>>>,
}

impl InMemoryKVStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn expires_at(ttl_seconds: u64) -> Option<Instant> {
        if ttl_seconds == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(ttl_seconds))
        }
    }

    fn is_expired(expires_at: Option<Instant>) -> bool {
        expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[async_trait]
impl KVStore for InMemoryKVStore {
    async fn list_append(&self, key: &str, value: Value, ttl_seconds: u64) -> Result<()> {
        let mut entry = self
            .lists
            .entry(key.to_string())
            .or_insert_with(|| {
                RwLock::new(StoredList {
                    values: Vec::new(),
                    expires_at: None,
                })
            });
        let mut list = entry.value_mut().write();
        if Self::is_expired(list.expires_at) {
            list.values.clear();
        }
        list.values.push(value);
        list.expires_at = Self::expires_at(ttl_seconds);
        Ok(())
    }

    async fn list_read(&self, key: &str, limit: Option<usize>) -> Result<Vec<Value>> {
        let Some(entry) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let list = entry.read();
        if Self::is_expired(list.expires_at) {
            return Ok(Vec::new());
        }
        let values = &list.values;
        let start = limit.map_or(0, |n| values.len().saturating_sub(n));
        Ok(values[start..].to_vec())
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: Value,
        ttl_seconds: u64,
    ) -> Result<()> {
        let entry = self.hashes.entry(key.to_string()).or_default();
        let mut hash = entry.value().write();
        hash.insert(
            field.to_string(),
            StoredValue {
                value,
                expires_at: Self::expires_at(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Value>> {
        let Some(entry) = self.hashes.get(key) else {
            return Ok(None);
        };
        let hash = entry.read();
        Ok(hash.get(field).and_then(|stored| {
            if Self::is_expired(stored.expires_at) {
                None
            } else {
                Some(stored.value.clone())
            }
        }))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Value>> {
        let Some(entry) = self.hashes.get(key) else {
            return Ok(HashMap::new());
        };
        let hash = entry.read();
        Ok(hash
            .iter()
            .filter(|(_, stored)| !Self::is_expired(stored.expires_at))
            .map(|(field, stored)| (field.clone(), stored.value.clone()))
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lists.remove(key);
        self.hashes.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if let Some(entry) = self.lists.get(key) {
            if !Self::is_expired(entry.read().expires_at) {
                return Ok(true);
            }
        }
        if let Some(entry) = self.hashes.get(key) {
            let hash = entry.read();
            if hash.values().any(|v| !Self::is_expired(v.expires_at)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Shared handle bundling every in-memory C2 backend, convenient for tests
/// and local-only deployments wiring up `HybridRetriever`.
#[derive(Clone)]
pub struct InMemoryBackends {
    pub vector: Arc<InMemoryVectorIndex>,
    pub keyword: Arc<InMemoryKeywordIndex>,
    pub image: Arc<InMemoryImageIndex>,
    pub table: Arc<InMemoryTableIndex>,
    pub kv: Arc<InMemoryKVStore>,
}

impl Default for InMemoryBackends {
    fn default() -> Self {
        Self {
            vector: Arc::new(InMemoryVectorIndex::new()),
            keyword: Arc::new(InMemoryKeywordIndex::new()),
            image: Arc::new(InMemoryImageIndex::new()),
            table: Arc::new(InMemoryTableIndex::new()),
            kv: Arc::new(InMemoryKVStore::new()),
        }
    }
}

impl InMemoryBackends {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragengine_core::types::Modality;

    fn chunk(id: &str, text: &str) -> SourceChunk {
        SourceChunk::new(id, "doc1", "Doc One", text, 0.0, Modality::Text)
    }

    #[tokio::test]
    async fn vector_index_returns_closest_by_cosine() {
        let index = InMemoryVectorIndex::new();
        index.upsert(chunk("c1", "a"), vec![1.0, 0.0]).await.unwrap();
        index.upsert(chunk("c2", "b"), vec![0.0, 1.0]).await.unwrap();
        let results = index.search(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn vector_index_delete_by_filter_removes_matching() {
        let index = InMemoryVectorIndex::new();
        let c = chunk("c1", "a").with_metadata("doc", Value::String("d1".into()));
        index.upsert(c, vec![1.0]).await.unwrap();
        let mut filters = Filters::new();
        filters.insert("doc".to_string(), Value::String("d1".into()));
        let removed = index.delete_by_filter(&filters).await.unwrap();
        assert_eq!(removed, 1);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn keyword_index_missing_returns_empty_not_error() {
        let index = InMemoryKeywordIndex::new();
        let results = index.search("hello", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn keyword_index_scores_term_overlap() {
        let index = InMemoryKeywordIndex::new();
        index.index("d1", "the quick brown fox");
        index.index("d2", "a slow green turtle");
        let results = index.search("quick fox", 5).await.unwrap();
        assert_eq!(results[0].0, "d1");
    }

    #[tokio::test]
    async fn kv_store_list_round_trips() {
        let store = InMemoryKVStore::new();
        store
            .list_append("k", Value::String("a".into()), 60)
            .await
            .unwrap();
        store
            .list_append("k", Value::String("b".into()), 60)
            .await
            .unwrap();
        let values = store.list_read("k", None).await.unwrap();
        assert_eq!(values.len(), 2);
        assert!(store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn kv_store_delete_is_noop_for_missing_key() {
        let store = InMemoryKVStore::new();
        store.delete("nonexistent").await.unwrap();
        assert!(!store.exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn kv_store_hash_get_missing_field_returns_none() {
        let store = InMemoryKVStore::new();
        store
            .hash_set("h", "a", Value::String("1".into()), 60)
            .await
            .unwrap();
        assert!(store.hash_get("h", "b").await.unwrap().is_none());
        assert_eq!(store.hash_get_all("h").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn image_index_is_scoped_per_user() {
        let index = InMemoryImageIndex::new();
        index.index("user1", chunk("img1", "cat photo"), vec![vec![1.0, 0.0]]);
        let results_user1 = index
            .search(&[vec![1.0, 0.0]], 5, "user1", None)
            .await
            .unwrap();
        let results_user2 = index
            .search(&[vec![1.0, 0.0]], 5, "user2", None)
            .await
            .unwrap();
        assert_eq!(results_user1.len(), 1);
        assert!(results_user2.is_empty());
    }

    #[tokio::test]
    async fn table_index_scores_by_term_overlap() {
        let index = InMemoryTableIndex::new();
        index.index(chunk("t1", "revenue 2023 growth"));
        let results = index.search("revenue growth", 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
