//! ABOUTME: Hybrid Retriever (C3)
//! ABOUTME: RRF fusion of dense/lexical text results, then weighted modality fusion

use crate::reranker::AdaptiveReranker;
use ragengine_config::{ModalityWeights, RRF_K};
use ragengine_core::error::Result;
use ragengine_core::traits::{Embedder, Filters, ImageIndex, KeywordIndex, TableIndex, VectorIndex};
use ragengine_core::types::SourceChunk;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Reciprocal Rank Fusion over any number of ranked id lists: `1/(k+rank)`
/// summed per id across lists, per §4.3. Ids absent from a list simply don't
/// contribute a term for it.
#[must_use]
pub fn reciprocal_rank_fusion(rankings: &[Vec<String>]) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for ranking in rankings {
        for (rank, id) in ranking.iter().enumerate() {
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + (rank + 1) as f64);
        }
    }
    let mut scored: Vec<(String, f64)> = scores.into_iter().collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored
}

fn min_max_normalize(mut chunks: Vec<SourceChunk>) -> Vec<SourceChunk> {
    if chunks.is_empty() {
        return chunks;
    }
    let min = chunks.iter().map(|c| c.score).fold(f32::MAX, f32::min);
    let max = chunks.iter().map(|c| c.score).fold(f32::MIN, f32::max);
    let range = max - min;
    for chunk in &mut chunks {
        chunk.score = if range > f32::EPSILON {
            (chunk.score - min) / range
        } else {
            1.0
        };
    }
    chunks
}

fn accumulate(combined: &mut HashMap<String, SourceChunk>, chunks: Vec<SourceChunk>, weight: f32) {
    for mut chunk in chunks {
        chunk.score *= weight;
        combined
            .entry(chunk.chunk_id.clone())
            .and_modify(|existing| existing.score += chunk.score)
            .or_insert(chunk);
    }
}

/// Combines dense, lexical, image, and table retrieval into a single ranked
/// list (C3). Text fusion uses RRF over the dense and lexical rankings;
/// cross-modality fusion uses renormalized weighted scores (§4.3).
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorIndex>,
    keyword: Arc<dyn KeywordIndex>,
    image: Option<Arc<dyn ImageIndex>>,
    table: Option<Arc<dyn TableIndex>>,
    reranker: Option<Arc<AdaptiveReranker>>,
    weights: ModalityWeights,
}

impl HybridRetriever {
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorIndex>,
        keyword: Arc<dyn KeywordIndex>,
        weights: ModalityWeights,
    ) -> Self {
        Self {
            embedder,
            vector,
            keyword,
            image: None,
            table: None,
            reranker: None,
            weights,
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: Arc<dyn ImageIndex>) -> Self {
        self.image = Some(image);
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: Arc<dyn TableIndex>) -> Self {
        self.table = Some(table);
        self
    }

    /// Wire in the adaptive cross-encoder reranker (C4): when set, the final
    /// candidate set of `retrieve`/`retrieve_text` is rescored by it before
    /// truncation to `top_k` instead of simply being cut off at the fused
    /// RRF/modality-fusion score.
    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<AdaptiveReranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Dense-vector + lexical search for `query_text`, fused via RRF (§4.3),
    /// left untruncated so a caller can rerank the full pool before cutting
    /// it down to `top_k`.
    async fn fuse_text(
        &self,
        query_text: &str,
        pool_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<SourceChunk>> {
        let query_vector = self.embedder.embed(query_text).await?;

        let vector_chunks = self.vector.search(&query_vector, pool_k, filters).await?;
        let keyword_hits = self.keyword.search(query_text, pool_k).await?;

        let mut chunk_by_id: HashMap<String, SourceChunk> = HashMap::new();
        let vector_ranking: Vec<String> = vector_chunks.iter().map(|c| c.chunk_id.clone()).collect();
        for chunk in vector_chunks {
            chunk_by_id.insert(chunk.chunk_id.clone(), chunk);
        }
        let keyword_ranking: Vec<String> = keyword_hits.into_iter().map(|(id, _)| id).collect();

        let fused_scores = reciprocal_rank_fusion(&[vector_ranking, keyword_ranking]);
        Ok(fused_scores
            .into_iter()
            .filter_map(|(id, score)| {
                chunk_by_id.get(&id).cloned().map(|mut chunk| {
                    chunk.score = score as f32;
                    chunk
                })
            })
            .collect())
    }

    /// Final cut from a fused candidate pool down to `top_k`: reranked by
    /// the adaptive cross-encoder (C4) when one is configured, otherwise a
    /// plain truncation of the already-sorted pool.
    fn rerank_or_truncate(
        &self,
        query_text: &str,
        mut candidates: Vec<SourceChunk>,
        top_k: usize,
    ) -> Result<Vec<SourceChunk>> {
        match &self.reranker {
            Some(reranker) => reranker.rerank(query_text, candidates, top_k),
            None => {
                candidates.truncate(top_k);
                Ok(candidates)
            }
        }
    }

    /// Fuse dense-vector and lexical search for `query_text` via RRF (§4.3),
    /// then rerank the pool down to `top_k` (C4).
    ///
    /// # Errors
    /// Propagates embedding, backend, or reranker failures.
    pub async fn retrieve_text(
        &self,
        query_text: &str,
        top_k: usize,
        filters: Option<&Filters>,
    ) -> Result<Vec<SourceChunk>> {
        let pool_k = top_k.saturating_mul(3).max(top_k);
        let fused = self.fuse_text(query_text, pool_k, filters).await?;
        self.rerank_or_truncate(query_text, fused, top_k)
    }

    /// Full hybrid retrieval across every configured modality (§4.3), then
    /// reranked down to `top_k` (C4). `image_query` carries the
    /// late-interaction multi-vector query, when image search is wired up
    /// and applicable to this query.
    ///
    /// # Errors
    /// Propagates embedding, backend, or reranker failures.
    pub async fn retrieve(
        &self,
        query_text: &str,
        top_k: usize,
        filters: Option<&Filters>,
        user_id: &str,
        image_query: Option<&[Vec<f32>]>,
    ) -> Result<Vec<SourceChunk>> {
        let pool_k = top_k.saturating_mul(3).max(top_k);

        let text_chunks = self.fuse_text(query_text, pool_k, filters).await?;

        let image_chunks = match (&self.image, image_query) {
            (Some(index), Some(query)) => index.search(query, pool_k, user_id, filters).await?,
            _ => Vec::new(),
        };

        let table_chunks = match &self.table {
            Some(index) => index.search(query_text, pool_k, filters).await?,
            None => Vec::new(),
        };

        let fused = self.fuse_modalities(text_chunks, image_chunks, table_chunks, pool_k);
        self.rerank_or_truncate(query_text, fused, top_k)
    }

    fn fuse_modalities(
        &self,
        text: Vec<SourceChunk>,
        image: Vec<SourceChunk>,
        table: Vec<SourceChunk>,
        top_k: usize,
    ) -> Vec<SourceChunk> {
        let weights = self
            .weights
            .normalize(!text.is_empty(), !image.is_empty(), !table.is_empty());

        let mut combined: HashMap<String, SourceChunk> = HashMap::new();
        accumulate(&mut combined, min_max_normalize(text), weights.alpha);
        accumulate(&mut combined, min_max_normalize(image), weights.beta);
        accumulate(&mut combined, min_max_normalize(table), weights.gamma);

        let mut result: Vec<SourceChunk> = combined.into_values().collect();
        result.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        result.truncate(top_k);
        result
    }
}
