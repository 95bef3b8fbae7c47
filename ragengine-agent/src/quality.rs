//! ABOUTME: Quality Monitor (C14)
//! ABOUTME: Tracks per-query search quality and reports rolling-window aggregates

use chrono::{DateTime, Duration, Utc};
use ragengine_core::types::SourceChunk;
use std::collections::VecDeque;

const LOW_QUALITY_SCORE_THRESHOLD: f32 = 0.5;
const MIN_RESULTS_THRESHOLD: usize = 3;

/// Quality metrics recorded for one completed search.
#[derive(Debug, Clone)]
pub struct SearchQualityRecord {
    pub query: String,
    pub search_mode: String,
    pub result_count: usize,
    pub avg_score: f32,
    pub min_score: f32,
    pub max_score: f32,
    pub latency_ms: Option<f64>,
    pub is_low_quality: bool,
    pub timestamp: DateTime<Utc>,
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// Aggregate quality report over a time window.
#[derive(Debug, Clone, Default)]
pub struct QualityReport {
    pub total_searches: usize,
    pub low_quality_rate: f32,
    pub avg_result_count: f32,
    pub avg_score: f32,
    pub avg_latency_ms: Option<f64>,
    pub p50_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<f64>,
    pub p99_latency_ms: Option<f64>,
}

/// Tracks search-result quality over a rolling retention window (C14),
/// grounded on the quality-monitoring service's score/result-count
/// statistics and low-quality threshold rule.
pub struct QualityMonitor {
    records: VecDeque<SearchQualityRecord>,
    retention: Duration,
}

impl QualityMonitor {
    #[must_use]
    pub fn new(retention_minutes: i64) -> Self {
        Self {
            records: VecDeque::new(),
            retention: Duration::minutes(retention_minutes.max(1)),
        }
    }

    /// Record one completed search's quality. A search is flagged
    /// low-quality when it returns fewer than 3 results or its mean score
    /// is below 0.5, matching the source monitor's thresholds exactly.
    pub fn track_search(
        &mut self,
        query: &str,
        results: &[SourceChunk],
        search_mode: &str,
        latency_ms: Option<f64>,
    ) -> SearchQualityRecord {
        let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        let result_count = results.len();

        let (avg_score, min_score, max_score) = if scores.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                mean(&scores),
                scores.iter().copied().fold(f32::MAX, f32::min),
                scores.iter().copied().fold(f32::MIN, f32::max),
            )
        };

        let is_low_quality =
            result_count < MIN_RESULTS_THRESHOLD || avg_score < LOW_QUALITY_SCORE_THRESHOLD;

        if is_low_quality {
            tracing::warn!(
                query = %query.chars().take(50).collect::<String>(),
                result_count,
                avg_score,
                "low quality search detected"
            );
        }

        let record = SearchQualityRecord {
            query: query.chars().take(100).collect(),
            search_mode: search_mode.to_string(),
            result_count,
            avg_score,
            min_score,
            max_score,
            latency_ms,
            is_low_quality,
            timestamp: Utc::now(),
        };

        self.records.push_back(record.clone());
        self.evict_expired();
        record
    }

    fn evict_expired(&mut self) {
        let cutoff = Utc::now() - self.retention;
        while let Some(front) = self.records.front() {
            if front.timestamp < cutoff {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    /// Build an aggregate report over every retained record, optionally
    /// restricted to one `search_mode`.
    #[must_use]
    pub fn quality_report(&self, search_mode: Option<&str>) -> QualityReport {
        let filtered: Vec<&SearchQualityRecord> = self
            .records
            .iter()
            .filter(|r| search_mode.map_or(true, |mode| r.search_mode == mode))
            .collect();

        if filtered.is_empty() {
            return QualityReport::default();
        }

        let total_searches = filtered.len();
        let low_quality_count = filtered.iter().filter(|r| r.is_low_quality).count();
        let result_counts: Vec<f32> = filtered.iter().map(|r| r.result_count as f32).collect();
        let avg_scores: Vec<f32> = filtered
            .iter()
            .filter(|r| r.avg_score > 0.0)
            .map(|r| r.avg_score)
            .collect();
        let mut latencies: Vec<f64> = filtered.iter().filter_map(|r| r.latency_ms).collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        QualityReport {
            total_searches,
            low_quality_rate: low_quality_count as f32 / total_searches as f32,
            avg_result_count: mean(&result_counts),
            avg_score: mean(&avg_scores),
            avg_latency_ms: (!latencies.is_empty())
                .then(|| latencies.iter().sum::<f64>() / latencies.len() as f64),
            p50_latency_ms: (!latencies.is_empty()).then(|| percentile(&latencies, 50.0)),
            p95_latency_ms: (!latencies.is_empty()).then(|| percentile(&latencies, 95.0)),
            p99_latency_ms: (!latencies.is_empty()).then(|| percentile(&latencies, 99.0)),
        }
    }

    /// The most recent low-quality queries, newest first.
    #[must_use]
    pub fn low_quality_queries(&self, limit: usize) -> Vec<SearchQualityRecord> {
        let mut low_quality: Vec<SearchQualityRecord> = self
            .records
            .iter()
            .filter(|r| r.is_low_quality)
            .cloned()
            .collect();
        low_quality.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        low_quality.truncate(limit);
        low_quality
    }
}
