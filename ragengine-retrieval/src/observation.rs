//! ABOUTME: Observation Processor (C5)
//! ABOUTME: Scores, filters, and optionally summarizes action results before they join agent state

use ragengine_config::RetrievalConfig;
use ragengine_core::types::SourceChunk;
use std::collections::HashSet;

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap between the token sets of `a` and `b`, in `[0, 1]`.
#[must_use]
pub fn token_overlap(a: &str, b: &str) -> f32 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f32 / union as f32
}

/// Combined relevance per §4.5: `0.5*semantic + 0.3*keyword_overlap + 0.2*novelty`.
#[must_use]
pub fn relevance_score(semantic: f32, keyword_overlap: f32, novelty: f32) -> f32 {
    (0.5 * semantic.clamp(0.0, 1.0) + 0.3 * keyword_overlap.clamp(0.0, 1.0) + 0.2 * novelty.clamp(0.0, 1.0))
        .clamp(0.0, 1.0)
}

/// Running statistics over processed observations, exposed for the quality
/// monitor (C14).
#[derive(Debug, Clone, Default)]
pub struct ObservationStats {
    pub total_seen: usize,
    pub total_kept: usize,
    pub sum_relevance: f32,
}

impl ObservationStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, score: f32, kept: bool) {
        self.total_seen += 1;
        self.sum_relevance += score;
        if kept {
            self.total_kept += 1;
        }
    }

    #[must_use]
    pub fn mean_relevance(&self) -> f32 {
        if self.total_seen == 0 {
            0.0
        } else {
            self.sum_relevance / self.total_seen as f32
        }
    }

    #[must_use]
    pub fn keep_rate(&self) -> f32 {
        if self.total_seen == 0 {
            0.0
        } else {
            self.total_kept as f32 / self.total_seen as f32
        }
    }
}

/// Processes action-result chunks into observations: scores relevance
/// against the query and already-seen chunks, drops low-relevance results,
/// and truncates long text into a summary (C5).
pub struct ObservationProcessor {
    config: RetrievalConfig,
}

impl ObservationProcessor {
    #[must_use]
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// Score, filter, and summarize `candidates` against `query`, treating
    /// `previously_seen` as the novelty baseline (chunks already retrieved
    /// earlier in this query's action history).
    pub fn process(
        &self,
        query: &str,
        candidates: Vec<SourceChunk>,
        previously_seen: &[SourceChunk],
        stats: &mut ObservationStats,
    ) -> Vec<SourceChunk> {
        candidates
            .into_iter()
            .filter_map(|mut chunk| {
                let semantic = chunk.score.clamp(0.0, 1.0);
                let keyword = token_overlap(query, &chunk.text);
                let max_overlap_with_seen = previously_seen
                    .iter()
                    .map(|seen| token_overlap(&chunk.text, &seen.text))
                    .fold(0.0_f32, f32::max);
                let novelty = 1.0 - max_overlap_with_seen;

                let score = relevance_score(semantic, keyword, novelty);
                let kept = score >= self.config.observation_filter_threshold;
                stats.record(score, kept);

                if !kept {
                    return None;
                }
                chunk.score = score;
                chunk.text = self.summarize(&chunk.text);
                Some(chunk)
            })
            .collect()
    }

    /// Truncate `text` to the configured summary length, per §4.5. Text at or
    /// under the limit is returned unchanged.
    #[must_use]
    pub fn summarize(&self, text: &str) -> String {
        let max = self.config.observation_max_summary_length;
        if text.chars().count() <= max {
            return text.to_string();
        }
        let truncated: String = text.chars().take(max).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragengine_core::types::Modality;

    fn chunk(id: &str, text: &str, score: f32) -> SourceChunk {
        SourceChunk::new(id, "doc1", "Doc One", text, score, Modality::Text)
    }

    #[test]
    fn token_overlap_is_one_for_identical_text() {
        assert_eq!(token_overlap("hello world", "hello world"), 1.0);
    }

    #[test]
    fn token_overlap_is_zero_for_disjoint_text() {
        assert_eq!(token_overlap("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn relevance_score_weights_components_per_formula() {
        let score = relevance_score(1.0, 1.0, 1.0);
        assert!((score - 1.0).abs() < 1e-6);
        let score = relevance_score(0.0, 0.0, 0.0);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn process_filters_low_relevance_candidates() {
        let mut config = RetrievalConfig::default();
        config.observation_filter_threshold = 0.9;
        let processor = ObservationProcessor::new(config);
        let mut stats = ObservationStats::new();
        let candidates = vec![chunk("a", "completely unrelated filler text", 0.1)];
        let kept = processor.process("rust memory safety", candidates, &[], &mut stats);
        assert!(kept.is_empty());
        assert_eq!(stats.total_seen, 1);
        assert_eq!(stats.total_kept, 0);
    }

    #[test]
    fn process_keeps_high_relevance_candidates() {
        let mut config = RetrievalConfig::default();
        config.observation_filter_threshold = 0.1;
        let processor = ObservationProcessor::new(config);
        let mut stats = ObservationStats::new();
        let candidates = vec![chunk("a", "rust memory safety guarantees", 0.9)];
        let kept = processor.process("rust memory safety", candidates, &[], &mut stats);
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.total_kept, 1);
    }

    #[test]
    fn process_penalizes_duplicate_of_previously_seen_chunk() {
        let mut config = RetrievalConfig::default();
        config.observation_filter_threshold = 0.0;
        let processor = ObservationProcessor::new(config);
        let mut stats = ObservationStats::new();
        let seen = vec![chunk("seen", "rust memory safety guarantees", 0.9)];
        let candidates = vec![chunk("dup", "rust memory safety guarantees", 0.9)];
        let kept = processor.process("rust memory safety", candidates, &seen, &mut stats);
        // near-zero novelty drags the combined score down from the semantic-only 0.9
        assert!(kept[0].score < 0.9);
    }

    #[test]
    fn summarize_truncates_long_text_and_preserves_short_text() {
        let config = RetrievalConfig::builder().build();
        let processor = ObservationProcessor::new(config);
        let short = "short text";
        assert_eq!(processor.summarize(short), short);

        let long = "a".repeat(500);
        let summary = processor.summarize(&long);
        assert!(summary.ends_with("..."));
        assert!(summary.len() < long.len());
    }

    #[test]
    fn stats_track_mean_relevance_and_keep_rate() {
        let mut stats = ObservationStats::new();
        stats.record(0.8, true);
        stats.record(0.2, false);
        assert_eq!(stats.mean_relevance(), 0.5);
        assert_eq!(stats.keep_rate(), 0.5);
    }
}
