//! Search capabilities and result aggregation.
//!
//! A [`SearchCapability`] wraps one backend behind a uniform async interface.
//! The [`SearchAggregator`] fans a query out across a tier-specific fallback
//! chain, then deduplicates and ranks what comes back.

pub mod aggregator;

pub use aggregator::SearchAggregator;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::CapabilityError;
use crate::types::SearchResult;

/// A single search backend.
///
/// Implementations return an empty vector when the backend has nothing for
/// the query. Only transport, auth and configuration problems are errors.
#[async_trait]
pub trait SearchCapability: Send + Sync {
    /// Stable engine name, used in fallback chains and as `source_engine`.
    fn name(&self) -> &str;

    /// Paid backends are never placed in a free-tier chain.
    fn premium_only(&self) -> bool {
        false
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CapabilityError>;
}

/// Normalize a URL into its deduplication key.
///
/// Scheme, host and path are lower-cased, a trailing slash is ignored, and
/// the query string and fragment are dropped. Unparseable input falls back to
/// the same treatment applied textually.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() => {
            let scheme = parsed.scheme().to_lowercase();
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
            let path = parsed.path().to_lowercase();
            let path = path.trim_end_matches('/');
            format!("{scheme}://{host}{port}{path}")
        }
        _ => {
            let without_fragment = trimmed.split('#').next().unwrap_or_default();
            let without_query = without_fragment.split('?').next().unwrap_or_default();
            without_query.trim_end_matches('/').to_lowercase()
        }
    }
}

/// Drop results whose normalized URL was already seen. First occurrence wins.
pub fn dedupe_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    dedupe_against(results, &mut seen)
}

/// Like [`dedupe_results`], but also skips keys already present in `seen`
/// and records every kept key there. Used to dedupe across search rounds.
pub fn dedupe_against(
    results: Vec<SearchResult>,
    seen: &mut HashSet<String>,
) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| seen.insert(r.dedup_key()))
        .collect()
}

/// Stable sort by relevance, highest first. Ties keep arrival order.
pub fn rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(url: &str, score: f64) -> SearchResult {
        SearchResult::new("title", url, "snippet", "test", score)
    }

    #[test]
    fn test_normalize_url_case_and_trailing_slash() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Docs/"),
            normalize_url("https://example.com/docs")
        );
    }

    #[test]
    fn test_normalize_url_drops_query_and_fragment() {
        assert_eq!(
            normalize_url("https://example.com/a?utm=1#top"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_normalize_url_keeps_scheme_distinct() {
        assert_ne!(
            normalize_url("http://example.com/a"),
            normalize_url("https://example.com/a")
        );
    }

    #[test]
    fn test_normalize_url_unparseable() {
        assert_eq!(normalize_url("Not A Url/?x=1"), "not a url");
    }

    #[test]
    fn test_dedupe_first_occurrence_wins() {
        let results = vec![
            result("https://a.com/x", 0.5),
            result("https://A.com/x/", 0.9),
            result("https://b.com", 0.7),
        ];
        let deduped = dedupe_results(results);
        assert_eq!(deduped.len(), 2);
        assert!((deduped[0].relevance_score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dedupe_against_tracks_previous_rounds() {
        let mut seen = HashSet::new();
        let first = dedupe_against(vec![result("https://a.com", 0.5)], &mut seen);
        let second = dedupe_against(
            vec![result("https://a.com/", 0.5), result("https://b.com", 0.5)],
            &mut seen,
        );
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].url, "https://b.com");
    }

    #[test]
    fn test_rank_is_stable() {
        let mut results = vec![
            result("https://a.com", 0.7),
            result("https://b.com", 0.9),
            result("https://c.com", 0.7),
        ];
        rank(&mut results);
        let urls: Vec<_> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://b.com", "https://a.com", "https://c.com"]);
    }
}
