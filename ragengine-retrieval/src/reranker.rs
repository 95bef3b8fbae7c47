//! ABOUTME: Adaptive Reranker (C4)
//! ABOUTME: Korean/multilingual cross-encoder selection, LRU caching, early stopping

use parking_lot::Mutex;
use ragengine_config::RerankerConfig;
use ragengine_core::error::Result;
use ragengine_core::types::SourceChunk;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A cross-encoder scoring backend (model hosting out of scope per §1).
pub trait CrossEncoder: Send + Sync {
    /// Score how relevant `document` is to `query`, higher is more relevant.
    ///
    /// # Errors
    /// Returns `RagError::ModelError` on backend failure.
    fn score(&self, query: &str, document: &str) -> Result<f32>;

    fn model_name(&self) -> &str;
}

const KOREAN_RATIO_THRESHOLD: f32 = 0.3;

fn is_hangul(ch: char) -> bool {
    matches!(ch as u32, 0xAC00..=0xD7A3 | 0x1100..=0x11FF | 0x3130..=0x318F)
}

/// Fraction of alphabetic characters in `text` that are Hangul, used to pick
/// between the Korean-specialized and multilingual reranker models (§4.4).
#[must_use]
pub fn korean_character_ratio(text: &str) -> f32 {
    let mut korean = 0usize;
    let mut total = 0usize;
    for ch in text.chars().filter(|c| c.is_alphabetic()) {
        total += 1;
        if is_hangul(ch) {
            korean += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        korean as f32 / total as f32
    }
}

struct LruCache {
    capacity: usize,
    order: VecDeque<String>,
    values: HashMap<String, f32>,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            values: HashMap::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<f32> {
        if let Some(&value) = self.values.get(key) {
            self.touch(key);
            Some(value)
        } else {
            None
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn put(&mut self, key: String, value: f32) {
        if self.values.contains_key(&key) {
            self.values.insert(key.clone(), value);
            self.touch(&key);
            return;
        }
        if self.values.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.values.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.values.insert(key, value);
    }
}

/// Reranks retrieval candidates with an adaptively-selected cross-encoder
/// (C4): Korean text routes to a Korean-specialized model, everything else
/// to a multilingual one, with result caching and early stopping so a long
/// candidate list doesn't pay full cross-encoder cost once scores stop
/// moving.
pub struct AdaptiveReranker {
    encoders: HashMap<String, Arc<dyn CrossEncoder>>,
    config: RerankerConfig,
    cache: Mutex<LruCache>,
}

impl AdaptiveReranker {
    #[must_use]
    pub fn new(encoders: HashMap<String, Arc<dyn CrossEncoder>>, config: RerankerConfig) -> Self {
        let cache = Mutex::new(LruCache::new(config.cache_capacity));
        Self {
            encoders,
            config,
            cache,
        }
    }

    /// Select the configured model name for `query`, per the Korean-ratio
    /// heuristic of §4.4.
    #[must_use]
    pub fn select_model(&self, query: &str) -> &str {
        if korean_character_ratio(query) > KOREAN_RATIO_THRESHOLD {
            &self.config.model_korean
        } else {
            &self.config.model_multilingual
        }
    }

    /// Dynamic batch size: full-precision scoring is more expensive, so it
    /// halves the configured ceiling when neither FP16 nor INT8 is enabled.
    #[must_use]
    pub fn dynamic_batch_size(&self) -> usize {
        if self.config.fp16 || self.config.use_int8 {
            self.config.max_batch_size
        } else {
            (self.config.max_batch_size / 2).max(1)
        }
    }

    fn score_cached(&self, model: &str, query: &str, chunk: &SourceChunk) -> Result<f32> {
        let cache_key = format!("{model}:{query}:{}", chunk.chunk_id);
        if let Some(score) = self.cache.lock().get(&cache_key) {
            return Ok(score);
        }
        let score = match self.encoders.get(model) {
            Some(encoder) => encoder.score(query, &chunk.text)?,
            // Identity fallback: no encoder registered for the selected
            // model, so the candidate keeps its upstream retrieval score.
            None => chunk.score,
        };
        self.cache.lock().put(cache_key, score);
        Ok(score)
    }

    /// Rerank `chunks` for `query`, returning the top `top_k` by rescored
    /// relevance. Candidates past the early-stopping point keep their
    /// original (pre-rerank) score rather than being dropped.
    ///
    /// # Errors
    /// Propagates `RagError::ModelError` from the selected cross-encoder.
    pub fn rerank(
        &self,
        query: &str,
        mut chunks: Vec<SourceChunk>,
        top_k: usize,
    ) -> Result<Vec<SourceChunk>> {
        if chunks.is_empty() {
            return Ok(chunks);
        }
        chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let model = self.select_model(query).to_string();
        let batch_size = self.dynamic_batch_size();

        let mut rescored: Vec<SourceChunk> = Vec::with_capacity(chunks.len());
        let mut remaining: VecDeque<SourceChunk> = chunks.into();
        let mut prev_round_min: Option<f32> = None;

        while !remaining.is_empty() {
            let take = batch_size.min(remaining.len());
            let batch: Vec<SourceChunk> = remaining.drain(..take).collect();

            let mut batch_scores = Vec::with_capacity(batch.len());
            for chunk in &batch {
                batch_scores.push(self.score_cached(&model, query, chunk)?);
            }
            let batch_max = batch_scores.iter().copied().fold(f32::MIN, f32::max);
            let batch_min = batch_scores.iter().copied().fold(f32::MAX, f32::min);

            for (mut chunk, score) in batch.into_iter().zip(batch_scores) {
                chunk.score = score;
                rescored.push(chunk);
            }

            if let Some(prev_min) = prev_round_min {
                if prev_min - batch_max < self.config.early_stopping_threshold {
                    break;
                }
            }
            prev_round_min = Some(batch_min);
        }

        rescored.extend(remaining);
        rescored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        rescored.truncate(top_k);
        Ok(rescored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragengine_core::types::Modality;

    struct ConstantEncoder {
        name: &'static str,
        score: f32,
    }

    impl CrossEncoder for ConstantEncoder {
        fn score(&self, _query: &str, _document: &str) -> Result<f32> {
            Ok(self.score)
        }

        fn model_name(&self) -> &str {
            self.name
        }
    }

    fn chunk(id: &str, score: f32) -> SourceChunk {
        SourceChunk::new(id, "doc1", "Doc One", "text", score, Modality::Text)
    }

    #[test]
    fn korean_ratio_detects_hangul_text() {
        assert!(korean_character_ratio("안녕하세요 세계") > 0.9);
        assert!(korean_character_ratio("hello world") < 0.1);
    }

    #[test]
    fn select_model_routes_korean_text_to_korean_model() {
        let config = RerankerConfig::default();
        let reranker = AdaptiveReranker::new(HashMap::new(), config.clone());
        assert_eq!(reranker.select_model("안녕하세요"), config.model_korean);
        assert_eq!(reranker.select_model("hello"), config.model_multilingual);
    }

    #[test]
    fn dynamic_batch_size_halves_without_quantization() {
        let mut config = RerankerConfig::default();
        config.fp16 = false;
        config.use_int8 = false;
        config.max_batch_size = 64;
        let reranker = AdaptiveReranker::new(HashMap::new(), config);
        assert_eq!(reranker.dynamic_batch_size(), 32);
    }

    #[test]
    fn rerank_without_registered_encoder_falls_back_to_identity() {
        let config = RerankerConfig::default();
        let reranker = AdaptiveReranker::new(HashMap::new(), config);
        let chunks = vec![chunk("a", 0.3), chunk("b", 0.9)];
        let reranked = reranker.rerank("query", chunks, 2).unwrap();
        assert_eq!(reranked[0].chunk_id, "b");
    }

    #[test]
    fn rerank_uses_registered_cross_encoder_scores() {
        let mut config = RerankerConfig::default();
        config.model_multilingual = "mock-ce".to_string();
        let mut encoders: HashMap<String, Arc<dyn CrossEncoder>> = HashMap::new();
        encoders.insert(
            "mock-ce".to_string(),
            Arc::new(ConstantEncoder {
                name: "mock-ce",
                score: 0.95,
            }),
        );
        let reranker = AdaptiveReranker::new(encoders, config);
        let chunks = vec![chunk("a", 0.1)];
        let reranked = reranker.rerank("hello", chunks, 1).unwrap();
        assert_eq!(reranked[0].score, 0.95);
    }

    #[test]
    fn rerank_empty_input_returns_empty() {
        let reranker = AdaptiveReranker::new(HashMap::new(), RerankerConfig::default());
        assert!(reranker.rerank("q", Vec::new(), 5).unwrap().is_empty());
    }

    #[test]
    fn cache_reuses_score_for_repeated_chunk_and_query() {
        let mut config = RerankerConfig::default();
        config.model_multilingual = "mock-ce".to_string();
        let mut encoders: HashMap<String, Arc<dyn CrossEncoder>> = HashMap::new();
        encoders.insert(
            "mock-ce".to_string(),
            Arc::new(ConstantEncoder {
                name: "mock-ce",
                score: 0.5,
            }),
        );
        let reranker = AdaptiveReranker::new(encoders, config);
        let first = reranker.score_cached("mock-ce", "q", &chunk("a", 0.0)).unwrap();
        let second = reranker.score_cached("mock-ce", "q", &chunk("a", 0.0)).unwrap();
        assert_eq!(first, second);
    }
}
