//! ABOUTME: Configuration for STM, LTM, and episodic memory (C6/C7/C8)
//! ABOUTME: TTLs, similarity thresholds, cache sizing, and the success-score formula

use serde::{Deserialize, Serialize};

/// Configuration for session-scoped short-term memory (C6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StmConfig {
    pub ttl_seconds: u64,
}

impl Default for StmConfig {
    fn default() -> Self {
        Self { ttl_seconds: 3600 }
    }
}

/// Constants for the success-score formula computed by the `MemoryManager`
/// on consolidation (§4.7). Exposed as configuration rather than hard-coded,
/// per the Open Question resolution in §9: these were empirically tuned in
/// the source and should not be baked into the implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SuccessScoreConfig {
    pub base: f32,
    /// Per-source bonus weight; total source-count bonus capped at `source_count_cap`.
    pub source_count_weight: f32,
    pub source_count_cap: f32,
    pub action_count_low: usize,
    pub action_count_high: usize,
    pub action_count_bonus: f32,
    pub action_count_penalty: f32,
    pub citation_bonus: f32,
    pub positive_feedback_score: f32,
    pub negative_feedback_score: f32,
}

impl Default for SuccessScoreConfig {
    fn default() -> Self {
        Self {
            base: 0.8,
            source_count_weight: 0.02,
            source_count_cap: 0.1,
            action_count_low: 1,
            action_count_high: 5,
            action_count_bonus: 0.1,
            action_count_penalty: -0.1,
            citation_bonus: 0.05,
            positive_feedback_score: 1.0,
            negative_feedback_score: 0.3,
        }
    }
}

/// Configuration for persistent, vector-indexed long-term memory (C7).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LtmConfig {
    pub similarity_threshold: f32,
    pub success_score: SuccessScoreConfig,
}

impl Default for LtmConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            success_score: SuccessScoreConfig::default(),
        }
    }
}

/// Configuration for the in-process episodic memory cache (C8).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EpisodeConfig {
    pub similarity_threshold: f32,
    pub cache_capacity: usize,
    pub retention_days: i64,
    pub min_confidence: f32,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            cache_capacity: 1000,
            retention_days: 30,
            min_confidence: 0.7,
        }
    }
}

/// Aggregate memory-subsystem configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub stm: StmConfig,
    pub ltm: LtmConfig,
    pub episode: EpisodeConfig,
    /// Maximum recent messages returned by `context_for_query` (manager-level,
    /// not a storage cap).
    pub max_history_length: usize,
    /// Default `max_similar` used by `context_for_query` when the caller
    /// doesn't override it.
    pub max_similar_interactions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            stm: StmConfig::default(),
            ltm: LtmConfig::default(),
            episode: EpisodeConfig::default(),
            max_history_length: 20,
            max_similar_interactions: 3,
        }
    }
}

impl MemoryConfig {
    #[must_use]
    pub fn builder() -> MemoryConfigBuilder {
        MemoryConfigBuilder::new()
    }
}

/// Builder for [`MemoryConfig`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigBuilder {
    config: MemoryConfig,
}

impl MemoryConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MemoryConfig::default(),
        }
    }

    #[must_use]
    pub const fn stm_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.stm.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn ltm(mut self, ltm: LtmConfig) -> Self {
        self.config.ltm = ltm;
        self
    }

    #[must_use]
    pub fn episode(mut self, episode: EpisodeConfig) -> Self {
        self.config.episode = episode;
        self
    }

    #[must_use]
    pub fn build(self) -> MemoryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = MemoryConfig::default();
        assert_eq!(config.stm.ttl_seconds, 3600);
        assert_eq!(config.episode.similarity_threshold, 0.85);
        assert_eq!(config.episode.min_confidence, 0.7);
        assert_eq!(config.ltm.success_score.base, 0.8);
    }

    #[test]
    fn builder_overrides_ttl() {
        let config = MemoryConfig::builder().stm_ttl_seconds(60).build();
        assert_eq!(config.stm.ttl_seconds, 60);
    }
}
