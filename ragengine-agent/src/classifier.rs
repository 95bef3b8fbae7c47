//! ABOUTME: Query Classifier & Dispatcher (C11)
//! ABOUTME: Heuristic complexity bucketing driving the speculative/agentic path choice

use ragengine_core::types::Complexity;

const SIMPLE_WORD_LIMIT: usize = 10;
const COMPLEX_WORD_LIMIT: usize = 30;
const COMPLEX_CONJUNCTION_LIMIT: usize = 2;

const COMPLEX_KEYWORDS: &[&str] = &["compare", "contrast", "analyze", "evaluate", "explain why"];
const SIMPLE_EXCLUDED_KEYWORDS: &[&str] = &["compare", "analyze", "explain why", "how does", "what if"];

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// Classify `query`'s complexity using the heuristics of §4.11: word count,
/// trailing `?`, and presence of comparison/analysis keywords or repeated
/// conjunctions. Classifies raw query text only — STM context never feeds
/// into this decision.
#[must_use]
pub fn classify(query: &str) -> Complexity {
    let query_lower = query.to_lowercase();
    let words: Vec<&str> = query.split_whitespace().collect();

    let simple_indicators = [
        words.len() <= SIMPLE_WORD_LIMIT,
        query.trim_end().ends_with('?'),
        !SIMPLE_EXCLUDED_KEYWORDS.iter().any(|kw| query_lower.contains(kw)),
    ];

    let complex_indicators = [
        words.len() > COMPLEX_WORD_LIMIT,
        COMPLEX_KEYWORDS.iter().any(|kw| query_lower.contains(kw)),
        count_occurrences(&query_lower, "and") > COMPLEX_CONJUNCTION_LIMIT,
        count_occurrences(&query_lower, "or") > COMPLEX_CONJUNCTION_LIMIT,
    ];

    let complex_count = complex_indicators.iter().filter(|&&b| b).count();
    let simple_count = simple_indicators.iter().filter(|&&b| b).count();

    if complex_count >= 2 {
        Complexity::Complex
    } else if simple_count >= 2 {
        Complexity::Simple
    } else {
        Complexity::Medium
    }
}

/// Whether a query classified as `complexity` should take the fast
/// speculative path (C9) rather than the full agentic graph (C10). Only
/// `Simple` queries take the fast path; `Medium`/`Complex` always go
/// agentic, with the speculative result (if any) folded in as a hint.
#[must_use]
pub const fn should_take_fast_path(complexity: Complexity) -> bool {
    matches!(complexity, Complexity::Simple)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_question_classifies_as_simple() {
        assert_eq!(classify("What is Rust?"), Complexity::Simple);
    }

    #[test]
    fn comparison_keyword_classifies_as_complex_with_long_query() {
        let query = "Please compare and contrast and analyze and evaluate the differences and similarities and tradeoffs and pitfalls of these two systems in detail";
        assert_eq!(classify(query), Complexity::Complex);
    }

    #[test]
    fn ambiguous_medium_length_query_classifies_as_medium() {
        let query = "Tell me about the history of the Rust programming language and its ecosystem";
        assert_eq!(classify(query), Complexity::Medium);
    }

    #[test]
    fn fast_path_only_for_simple() {
        assert!(should_take_fast_path(Complexity::Simple));
        assert!(!should_take_fast_path(Complexity::Medium));
        assert!(!should_take_fast_path(Complexity::Complex));
    }
}
