//! ABOUTME: Long-Term Memory (C7)
//! ABOUTME: Vector-indexed persistent interactions and learned patterns, with success scoring

use ragengine_config::{LtmConfig, SuccessScoreConfig};
use ragengine_core::error::{RagError, Result};
use ragengine_core::traits::{Embedder, Filters, VectorIndex};
use ragengine_core::types::{Interaction, LearnedPattern, Modality, SourceChunk};
use serde_json::Value;
use std::sync::Arc;

/// Per-interaction signals feeding the §4.7 success-score formula.
#[derive(Debug, Clone, Default)]
pub struct SuccessMetadata {
    pub source_count: usize,
    pub action_count: usize,
    pub has_citations: bool,
    pub user_feedback: Option<UserFeedback>,
}

/// Explicit user feedback, which overrides the computed score outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFeedback {
    Positive,
    Negative,
}

/// Compute the success score for a consolidated interaction, per §4.7.
#[must_use]
pub fn compute_success_score(config: &SuccessScoreConfig, metadata: &SuccessMetadata) -> f32 {
    if let Some(feedback) = metadata.user_feedback {
        return match feedback {
            UserFeedback::Positive => config.positive_feedback_score,
            UserFeedback::Negative => config.negative_feedback_score,
        };
    }

    let mut score = config.base;

    if metadata.source_count > 0 {
        score += (metadata.source_count as f32 * config.source_count_weight).min(config.source_count_cap);
    }

    if metadata.action_count >= config.action_count_low && metadata.action_count <= config.action_count_high {
        score += config.action_count_bonus;
    } else if metadata.action_count > config.action_count_high {
        score += config.action_count_penalty;
    }

    if metadata.has_citations {
        score += config.citation_bonus;
    }

    score.clamp(0.0, 1.0)
}

const INTERACTION_METADATA_KEY: &str = "interaction";
const PATTERN_METADATA_KEY: &str = "pattern";
const PATTERN_TYPE_METADATA_KEY: &str = "pattern_type";

/// Persistent, vector-indexed long-term memory (C7): successful interactions
/// and reusable learned patterns, both retrieved by semantic similarity and
/// filtered by success score.
pub struct LongTermMemory {
    vector: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    config: LtmConfig,
}

impl LongTermMemory {
    #[must_use]
    pub fn new(vector: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>, config: LtmConfig) -> Self {
        Self {
            vector,
            embedder,
            config,
        }
    }

    /// Consolidate a query/response pair into LTM, computing its success
    /// score from `metadata`.
    ///
    /// # Errors
    /// Propagates embedding or backend failures.
    pub async fn store_interaction(
        &self,
        query_text: &str,
        response: &str,
        session_id: &str,
        metadata: &SuccessMetadata,
    ) -> Result<String> {
        let success_score = compute_success_score(&self.config.success_score, metadata);
        self.store_interaction_scored(
            query_text,
            response,
            session_id,
            success_score,
            metadata.source_count,
            metadata.action_count,
        )
        .await
    }

    /// Consolidate a query/response pair with an explicit, already-computed
    /// success score, bypassing the §4.7 formula. Used by callers (episodic
    /// memory mirroring) that derive their own confidence signal.
    ///
    /// # Errors
    /// Propagates embedding or backend failures.
    pub async fn store_interaction_scored(
        &self,
        query_text: &str,
        response: &str,
        session_id: &str,
        success_score: f32,
        source_count: usize,
        action_count: usize,
    ) -> Result<String> {
        let embedding = self.embedder.embed(query_text).await?;
        let interaction = Interaction::new(
            query_text,
            embedding.clone(),
            response,
            session_id,
            success_score,
            source_count,
            action_count,
        );

        let interaction_json = serde_json::to_value(&interaction)
            .map_err(|e| RagError::internal(format!("failed to serialize interaction: {e}")))?;
        let chunk = SourceChunk::new(
            interaction.id.clone(),
            session_id,
            "interaction",
            query_text,
            0.0,
            Modality::Text,
        )
        .with_metadata(INTERACTION_METADATA_KEY, interaction_json);

        self.vector.upsert(chunk, embedding).await?;
        Ok(interaction.id)
    }

    /// Retrieve past interactions similar to `query_text`, filtered to at
    /// least `min_success_score` (§4.7).
    ///
    /// # Errors
    /// Propagates embedding or backend failures.
    pub async fn retrieve_similar_interactions(
        &self,
        query_text: &str,
        top_k: usize,
        min_success_score: f32,
    ) -> Result<Vec<Interaction>> {
        let query_embedding = self.embedder.embed(query_text).await?;
        let pool_k = top_k.saturating_mul(3).max(top_k);
        let chunks = self.vector.search(&query_embedding, pool_k, None).await?;

        let mut interactions: Vec<Interaction> = chunks
            .into_iter()
            .filter_map(|chunk| {
                chunk
                    .metadata
                    .get(INTERACTION_METADATA_KEY)
                    .and_then(|value| serde_json::from_value::<Interaction>(value.clone()).ok())
            })
            .filter(|interaction| interaction.success_score >= min_success_score)
            .collect();
        interactions.truncate(top_k);
        Ok(interactions)
    }

    /// Store a reusable learned pattern.
    ///
    /// # Errors
    /// Propagates embedding or backend failures.
    pub async fn store_pattern(
        &self,
        pattern_type: &str,
        description: &str,
        payload: &str,
        success_score: f32,
    ) -> Result<String> {
        let embedding = self.embedder.embed(description).await?;
        let pattern = LearnedPattern::new(pattern_type, description, embedding.clone(), payload, success_score);

        let pattern_json = serde_json::to_value(&pattern)
            .map_err(|e| RagError::internal(format!("failed to serialize pattern: {e}")))?;
        let chunk = SourceChunk::new(
            pattern.id.clone(),
            LearnedPattern::session_id(pattern_type),
            "pattern",
            description,
            0.0,
            Modality::Text,
        )
        .with_metadata(PATTERN_METADATA_KEY, pattern_json)
        .with_metadata(PATTERN_TYPE_METADATA_KEY, Value::String(pattern_type.to_string()));

        self.vector.upsert(chunk, embedding).await?;
        Ok(pattern.id)
    }

    /// Retrieve learned patterns, optionally restricted to `pattern_type`,
    /// filtered to at least `min_success_score`.
    ///
    /// # Errors
    /// Propagates backend failures.
    pub async fn retrieve_patterns(
        &self,
        pattern_type: Option<&str>,
        min_success_score: f32,
        limit: usize,
    ) -> Result<Vec<LearnedPattern>> {
        let probe_vector = vec![0.0_f32; self.embedder.dimension()];
        let pool_k = limit.saturating_mul(20).max(50);

        let filters: Option<Filters> = pattern_type.map(|pattern_type| {
            let mut filters = Filters::new();
            filters.insert(
                PATTERN_TYPE_METADATA_KEY.to_string(),
                Value::String(pattern_type.to_string()),
            );
            filters
        });

        let chunks = self
            .vector
            .search(&probe_vector, pool_k, filters.as_ref())
            .await?;

        let mut patterns: Vec<LearnedPattern> = chunks
            .into_iter()
            .filter_map(|chunk| {
                chunk
                    .metadata
                    .get(PATTERN_METADATA_KEY)
                    .and_then(|value| serde_json::from_value::<LearnedPattern>(value.clone()).ok())
            })
            .filter(|pattern| pattern.success_score >= min_success_score)
            .collect();
        patterns.sort_by(|a, b| b.success_score.partial_cmp(&a.success_score).unwrap_or(std::cmp::Ordering::Equal));
        patterns.truncate(limit);
        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragengine_retrieval::{InMemoryVectorIndex, MockEmbedder};

    fn ltm() -> LongTermMemory {
        LongTermMemory::new(
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(MockEmbedder::default()),
            LtmConfig::default(),
        )
    }

    #[test]
    fn success_score_applies_base_and_bonuses() {
        let config = SuccessScoreConfig::default();
        let metadata = SuccessMetadata {
            source_count: 3,
            action_count: 3,
            has_citations: true,
            user_feedback: None,
        };
        let score = compute_success_score(&config, &metadata);
        // 0.8 + min(0.1, 0.06) + 0.1 (in-range action count) + 0.05 citation = 1.01 -> clamped
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn success_score_penalizes_too_many_actions() {
        let config = SuccessScoreConfig::default();
        let metadata = SuccessMetadata {
            source_count: 0,
            action_count: 15,
            has_citations: false,
            user_feedback: None,
        };
        let score = compute_success_score(&config, &metadata);
        assert!((score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn explicit_feedback_overrides_computed_score() {
        let config = SuccessScoreConfig::default();
        let positive = SuccessMetadata {
            user_feedback: Some(UserFeedback::Positive),
            action_count: 20,
            ..Default::default()
        };
        assert_eq!(compute_success_score(&config, &positive), 1.0);

        let negative = SuccessMetadata {
            user_feedback: Some(UserFeedback::Negative),
            source_count: 10,
            ..Default::default()
        };
        assert_eq!(compute_success_score(&config, &negative), 0.3);
    }

    #[tokio::test]
    async fn store_and_retrieve_similar_interactions_round_trips() {
        let ltm = ltm();
        let metadata = SuccessMetadata {
            source_count: 2,
            action_count: 2,
            has_citations: false,
            user_feedback: None,
        };
        ltm.store_interaction("what is rust ownership", "an answer", "s1", &metadata)
            .await
            .unwrap();

        let results = ltm
            .retrieve_similar_interactions("what is rust ownership", 5, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].query_text, "what is rust ownership");
    }

    #[tokio::test]
    async fn retrieve_similar_interactions_filters_by_min_success_score() {
        let ltm = ltm();
        let weak_metadata = SuccessMetadata {
            user_feedback: Some(UserFeedback::Negative),
            ..Default::default()
        };
        ltm.store_interaction("weak query", "response", "s1", &weak_metadata)
            .await
            .unwrap();

        let results = ltm.retrieve_similar_interactions("weak query", 5, 0.5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn store_and_retrieve_patterns_filters_by_type() {
        let ltm = ltm();
        ltm.store_pattern("tool_sequence", "search then synthesize", "{}", 0.9)
            .await
            .unwrap();
        ltm.store_pattern("refusal", "decline unsafe request", "{}", 0.9)
            .await
            .unwrap();

        let tool_patterns = ltm.retrieve_patterns(Some("tool_sequence"), 0.0, 10).await.unwrap();
        assert_eq!(tool_patterns.len(), 1);
        assert_eq!(tool_patterns[0].pattern_type, "tool_sequence");

        let all_patterns = ltm.retrieve_patterns(None, 0.0, 10).await.unwrap();
        assert_eq!(all_patterns.len(), 2);
    }
}
