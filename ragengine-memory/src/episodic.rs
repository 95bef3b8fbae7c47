//! ABOUTME: Episodic Memory (C8)
//! ABOUTME: FIFO-capped cache of successful ReAct traces, reused by cosine similarity

use crate::ltm::LongTermMemory;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use ragengine_config::EpisodeConfig;
use ragengine_core::error::Result;
use ragengine_core::traits::Embedder;
use ragengine_core::types::{Action, Episode};
use std::collections::VecDeque;
use std::sync::Arc;

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

/// In-process cache of successful ReAct episodes (C8), mirrored into LTM so
/// they survive process restarts, per §4.8.
pub struct EpisodicMemory {
    ltm: Arc<LongTermMemory>,
    embedder: Arc<dyn Embedder>,
    config: EpisodeConfig,
    cache: Mutex<VecDeque<Episode>>,
}

impl EpisodicMemory {
    #[must_use]
    pub fn new(ltm: Arc<LongTermMemory>, embedder: Arc<dyn Embedder>, config: EpisodeConfig) -> Self {
        Self {
            ltm,
            embedder,
            config,
            cache: Mutex::new(VecDeque::new()),
        }
    }

    /// Store a completed agentic run as an episode, if it meets the quality
    /// bar (`success && confidence >= min_confidence`). Returns whether it
    /// was stored.
    ///
    /// # Errors
    /// Propagates embedding or backend failures.
    pub async fn store_episode(
        &self,
        query: &str,
        actions: Vec<Action>,
        success: bool,
        confidence: f32,
        iterations: usize,
        elapsed_ms: u64,
        retrieved_docs_count: usize,
    ) -> Result<bool> {
        if !success || confidence < self.config.min_confidence {
            return Ok(false);
        }

        let query_embedding = self.embedder.embed(query).await?;
        let episode = Episode {
            query: query.to_string(),
            query_embedding,
            actions,
            success,
            confidence,
            iterations,
            elapsed_ms,
            retrieved_docs_count,
            reuse_count: 0,
            timestamp: Utc::now(),
        };

        {
            let mut cache = self.cache.lock();
            cache.push_back(episode.clone());
            while cache.len() > self.config.cache_capacity {
                cache.pop_front();
            }
        }

        let payload = serde_json::to_string(&episode)
            .map_err(|e| ragengine_core::error::RagError::internal(format!("failed to serialize episode: {e}")))?;
        self.ltm
            .store_interaction_scored(query, &payload, "episodic_memory", confidence, retrieved_docs_count, iterations)
            .await?;

        Ok(true)
    }

    /// Find the most similar cached episode above the reuse threshold,
    /// incrementing its reuse count on hit (§4.8).
    ///
    /// # Errors
    /// Propagates embedding failures.
    pub async fn retrieve_similar_episode(&self, query: &str) -> Result<Option<Episode>> {
        let query_embedding = self.embedder.embed(query).await?;

        let mut cache = self.cache.lock();
        let best = cache
            .iter_mut()
            .map(|episode| {
                let similarity = cosine(&query_embedding, &episode.query_embedding);
                (similarity, episode)
            })
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((similarity, episode)) if similarity >= self.config.similarity_threshold => {
                episode.reuse_count += 1;
                Ok(Some(episode.clone()))
            }
            _ => Ok(None),
        }
    }

    /// Drop cached episodes older than the configured retention window.
    pub fn evict_expired(&self) {
        let cutoff = Utc::now() - Duration::days(self.config.retention_days);
        self.cache.lock().retain(|episode| episode.timestamp >= cutoff);
    }

    #[must_use]
    pub fn cached_episode_count(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragengine_config::LtmConfig;
    use ragengine_core::types::{Action, Tool};
    use ragengine_retrieval::{InMemoryVectorIndex, MockEmbedder};
    use std::collections::HashMap;

    fn episodic(config: EpisodeConfig) -> EpisodicMemory {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::default());
        let ltm = Arc::new(LongTermMemory::new(
            Arc::new(InMemoryVectorIndex::new()),
            Arc::clone(&embedder),
            LtmConfig::default(),
        ));
        EpisodicMemory::new(ltm, embedder, config)
    }

    fn dummy_action() -> Action {
        Action {
            tool: Tool::VectorSearch,
            input: HashMap::new(),
            thought: "search docs".to_string(),
        }
    }

    #[tokio::test]
    async fn store_episode_rejects_low_confidence() {
        let memory = episodic(EpisodeConfig::default());
        let stored = memory
            .store_episode("query", vec![dummy_action()], true, 0.1, 2, 100, 3)
            .await
            .unwrap();
        assert!(!stored);
        assert_eq!(memory.cached_episode_count(), 0);
    }

    #[tokio::test]
    async fn store_episode_rejects_unsuccessful_runs() {
        let memory = episodic(EpisodeConfig::default());
        let stored = memory
            .store_episode("query", vec![dummy_action()], false, 0.99, 2, 100, 3)
            .await
            .unwrap();
        assert!(!stored);
    }

    #[tokio::test]
    async fn store_and_retrieve_similar_episode_roundtrips() {
        let memory = episodic(EpisodeConfig::default());
        memory
            .store_episode("rust ownership rules", vec![dummy_action()], true, 0.9, 2, 100, 3)
            .await
            .unwrap();

        let found = memory.retrieve_similar_episode("rust ownership rules").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().reuse_count, 1);
    }

    #[tokio::test]
    async fn retrieve_similar_episode_below_threshold_returns_none() {
        let mut config = EpisodeConfig::default();
        config.similarity_threshold = 0.999;
        let memory = episodic(config);
        memory
            .store_episode("rust ownership rules", vec![dummy_action()], true, 0.9, 2, 100, 3)
            .await
            .unwrap();

        let found = memory.retrieve_similar_episode("completely different text").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn cache_respects_fifo_capacity() {
        let mut config = EpisodeConfig::default();
        config.cache_capacity = 2;
        let memory = episodic(config);
        for i in 0..3 {
            memory
                .store_episode(&format!("query {i}"), vec![dummy_action()], true, 0.9, 1, 10, 1)
                .await
                .unwrap();
        }
        assert_eq!(memory.cached_episode_count(), 2);
    }
}
