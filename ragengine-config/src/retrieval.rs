//! ABOUTME: Configuration for the hybrid retriever and adaptive reranker (C3/C4)
//! ABOUTME: Modality fusion weights, reranker model selection, and cache sizing

use serde::{Deserialize, Serialize};

/// Fusion weights for text/image/table modality scores in §4.3's
/// `combined = α·norm_text + β·norm_image + γ·norm_table`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModalityWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl Default for ModalityWeights {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.2,
            gamma: 0.2,
        }
    }
}

impl ModalityWeights {
    /// Renormalize the weights for the given set of *present* modalities so
    /// the active weights still sum to 1 (Open Question resolution, §9):
    /// absent modalities' weight is redistributed proportionally across the
    /// remaining present ones.
    #[must_use]
    pub fn normalize(self, text_present: bool, image_present: bool, table_present: bool) -> Self {
        let total: f32 = [
            (text_present, self.alpha),
            (image_present, self.beta),
            (table_present, self.gamma),
        ]
        .into_iter()
        .filter_map(|(present, w)| present.then_some(w))
        .sum();

        if total <= f32::EPSILON {
            return Self {
                alpha: 0.0,
                beta: 0.0,
                gamma: 0.0,
            };
        }

        Self {
            alpha: if text_present { self.alpha / total } else { 0.0 },
            beta: if image_present { self.beta / total } else { 0.0 },
            gamma: if table_present { self.gamma / total } else { 0.0 },
        }
    }
}

/// RRF constant `k` in `rrf = 1/(k+rank)`.
pub const RRF_K: f64 = 60.0;

/// Configuration for the adaptive cross-encoder reranker (C4).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub model_korean: String,
    pub model_multilingual: String,
    pub fp16: bool,
    pub use_int8: bool,
    pub cache_capacity: usize,
    pub early_stopping_threshold: f32,
    pub max_batch_size: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model_korean: "ko-reranker".to_string(),
            model_multilingual: "bge-reranker-v2-m3".to_string(),
            fp16: true,
            use_int8: false,
            cache_capacity: 1000,
            early_stopping_threshold: 0.1,
            max_batch_size: 64,
        }
    }
}

impl RerankerConfig {
    #[must_use]
    pub fn builder() -> RerankerConfigBuilder {
        RerankerConfigBuilder::new()
    }
}

/// Builder for [`RerankerConfig`].
#[derive(Debug, Clone, Default)]
pub struct RerankerConfigBuilder {
    config: RerankerConfig,
}

impl RerankerConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RerankerConfig::default(),
        }
    }

    #[must_use]
    pub fn model_korean(mut self, model: impl Into<String>) -> Self {
        self.config.model_korean = model.into();
        self
    }

    #[must_use]
    pub fn model_multilingual(mut self, model: impl Into<String>) -> Self {
        self.config.model_multilingual = model.into();
        self
    }

    #[must_use]
    pub const fn fp16(mut self, enabled: bool) -> Self {
        self.config.fp16 = enabled;
        self
    }

    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn build(self) -> RerankerConfig {
        self.config
    }
}

/// Configuration for the hybrid retriever (C3) and observation processor (C5).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub modality_weights: ModalityWeights,
    pub reranker: RerankerConfig,
    pub observation_filter_threshold: f32,
    pub observation_max_summary_length: usize,
    pub vector_pool_size: usize,
    pub max_concurrent_backends: usize,
    pub embedding_batch_executor_threads: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            modality_weights: ModalityWeights::default(),
            reranker: RerankerConfig::default(),
            observation_filter_threshold: 0.6,
            observation_max_summary_length: 200,
            vector_pool_size: 10,
            max_concurrent_backends: 4,
            embedding_batch_executor_threads: 4,
        }
    }
}

impl RetrievalConfig {
    #[must_use]
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::new()
    }
}

/// Builder for [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RetrievalConfig::default(),
        }
    }

    #[must_use]
    pub const fn modality_weights(mut self, weights: ModalityWeights) -> Self {
        self.config.modality_weights = weights;
        self
    }

    #[must_use]
    pub fn reranker(mut self, reranker: RerankerConfig) -> Self {
        self.config.reranker = reranker;
        self
    }

    #[must_use]
    pub const fn observation_filter_threshold(mut self, threshold: f32) -> Self {
        self.config.observation_filter_threshold = threshold;
        self
    }

    #[must_use]
    pub fn build(self) -> RetrievalConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let w = ModalityWeights::default();
        assert!((w.alpha + w.beta + w.gamma - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_redistributes_absent_table_weight() {
        let w = ModalityWeights::default().normalize(true, true, false);
        assert!((w.alpha + w.beta - 1.0).abs() < 1e-6);
        assert_eq!(w.gamma, 0.0);
        // alpha:beta ratio preserved (0.6:0.2 == 3:1)
        assert!((w.alpha / w.beta - 3.0).abs() < 1e-4);
    }

    #[test]
    fn normalize_text_only_gives_full_weight_to_alpha() {
        let w = ModalityWeights::default().normalize(true, false, false);
        assert!((w.alpha - 1.0).abs() < 1e-6);
        assert_eq!(w.beta, 0.0);
        assert_eq!(w.gamma, 0.0);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = RetrievalConfig::builder()
            .observation_filter_threshold(0.8)
            .reranker(RerankerConfig::builder().fp16(false).build())
            .build();
        assert_eq!(config.observation_filter_threshold, 0.8);
        assert!(!config.reranker.fp16);
    }
}
