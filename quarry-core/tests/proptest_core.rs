//! Property-based tests for core components using proptest.

use proptest::prelude::*;
use std::collections::HashSet;

use quarry_core::collaborators::fallback::heuristic_coverage;
use quarry_core::collaborators::parse::clamp_score;
use quarry_core::pipeline::report::{enforce_word_limit, word_count};
use quarry_core::policy;
use quarry_core::query;
use quarry_core::search::{dedupe_results, normalize_url, rank};
use quarry_core::{Mode, SearchResult, Tier};

fn url_strategy() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["http", "https", "HTTPS"]),
        prop::sample::select(vec!["a.example", "B.example", "c.example"]),
        prop::sample::select(vec!["", "/", "/docs", "/Docs/", "/x/y"]),
        prop::sample::select(vec!["", "?utm=1", "#top"]),
    )
        .prop_map(|(scheme, host, path, suffix)| format!("{scheme}://{host}{path}{suffix}"))
}

fn results_strategy() -> impl Strategy<Value = Vec<SearchResult>> {
    prop::collection::vec((url_strategy(), 0.0f64..1.0), 0..30).prop_map(|items| {
        items
            .into_iter()
            .map(|(url, score)| SearchResult::new("t", url, "s", "e", score))
            .collect()
    })
}

// --- Deduplication properties ---

proptest! {
    #[test]
    fn dedupe_never_repeats_a_normalized_url(results in results_strategy()) {
        let deduped = dedupe_results(results);
        let keys: HashSet<String> = deduped.iter().map(|r| normalize_url(&r.url)).collect();
        prop_assert_eq!(keys.len(), deduped.len());
    }

    #[test]
    fn dedupe_keeps_one_result_per_key(results in results_strategy()) {
        let distinct: HashSet<String> = results.iter().map(|r| r.dedup_key()).collect();
        let deduped = dedupe_results(results);
        prop_assert_eq!(deduped.len(), distinct.len());
    }

    #[test]
    fn rank_orders_by_relevance_descending(mut results in results_strategy()) {
        rank(&mut results);
        for pair in results.windows(2) {
            prop_assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }
}

// --- Word limit properties ---

proptest! {
    #[test]
    fn enforced_report_never_exceeds_limit(
        words in prop::collection::vec("[a-z#*]{1,8}", 0..400),
        limit in 0usize..300,
        premium in any::<bool>(),
    ) {
        let report = words.join(" ");
        let tier = if premium { Tier::Premium } else { Tier::Free };
        let (text, truncated) = enforce_word_limit(&report, limit, tier);
        prop_assert!(word_count(&text) <= limit);
        prop_assert_eq!(truncated, word_count(&report) > limit);
        if !truncated {
            prop_assert_eq!(text, report);
        }
    }
}

// --- Policy properties ---

proptest! {
    #[test]
    fn only_free_deep_is_refused(premium in any::<bool>(), mode_index in 0usize..3) {
        let tier = if premium { Tier::Premium } else { Tier::Free };
        let mode = Mode::ALL[mode_index];
        let resolved = policy::resolve(tier, mode);
        prop_assert_eq!(resolved.is_err(), tier == Tier::Free && mode == Mode::Deep);
        if let Ok(limits) = resolved {
            prop_assert!(limits.effective_rounds() <= limits.max_search_rounds.max(1));
            prop_assert_eq!(limits.multi_round_search, premium);
        }
    }
}

// --- Scoring and query properties ---

proptest! {
    #[test]
    fn heuristic_coverage_is_a_percentage(facts in 0usize..10_000, questions in 0usize..100) {
        prop_assert!(heuristic_coverage(facts, questions) <= 100);
    }

    #[test]
    fn clamp_score_stays_in_range(value in proptest::num::f64::ANY) {
        prop_assert!(clamp_score(value) <= 100);
    }

    #[test]
    fn keywords_are_bounded_and_distinct(query in "[a-zA-Z ]{0,200}") {
        let keywords = query::keywords(&query);
        prop_assert!(keywords.len() <= 10);
        let distinct: HashSet<&String> = keywords.iter().collect();
        prop_assert_eq!(distinct.len(), keywords.len());
        prop_assert!(keywords.iter().all(|k| k.chars().count() > 2));
    }
}
