//! Built-in fallbacks used when a collaborator degrades.

use crate::types::{FactCandidate, Outline, PageSummary, SearchResult, VerifiedFact};

use super::Expansion;

const DEFAULT_TOPICS: [&str; 5] = [
    "Overview and fundamentals",
    "Technical aspects",
    "Applications and use cases",
    "Current state and developments",
    "Future implications",
];

/// The outline used when expansion fails.
pub fn default_outline() -> Outline {
    [
        (
            "Introduction",
            vec!["Background and context", "Importance and relevance"],
        ),
        (
            "Main Content",
            vec!["Key concepts", "Technical details", "Real-world applications"],
        ),
        (
            "Analysis",
            vec!["Current trends", "Challenges and opportunities"],
        ),
        ("Conclusion", vec!["Summary of findings", "Future outlook"]),
    ]
    .into_iter()
    .map(|(title, points)| (title, points.into_iter().map(String::from).collect::<Vec<_>>()))
    .collect()
}

impl Expansion {
    /// Generic topics, outline and questions for `query`.
    pub fn fallback(query: &str) -> Self {
        Self {
            topics: DEFAULT_TOPICS
                .iter()
                .map(|t| format!("{query} {}", t.to_lowercase()))
                .collect(),
            outline: default_outline(),
            key_questions: vec![
                format!("What is {query}?"),
                format!("How does {query} work?"),
                format!("What are the applications of {query}?"),
                format!("What are the current developments in {query}?"),
                format!("What does the future hold for {query}?"),
            ],
        }
    }

    /// Replace any empty part with the fallback's.
    pub fn fill_missing(mut self, query: &str) -> Self {
        self.topics.retain(|t| !t.trim().is_empty());
        if self.topics.is_empty() || self.outline.is_empty() || self.key_questions.is_empty() {
            let fallback = Self::fallback(query);
            if self.topics.is_empty() {
                self.topics = fallback.topics;
            }
            if self.outline.is_empty() {
                self.outline = fallback.outline;
            }
            if self.key_questions.is_empty() {
                self.key_questions = fallback.key_questions;
            }
        }
        self
    }
}

/// Every key fact and statistic from `summaries`, tagged with its source.
pub fn fact_candidates(summaries: &[PageSummary]) -> Vec<FactCandidate> {
    summaries
        .iter()
        .flat_map(|summary| {
            summary
                .key_facts
                .iter()
                .chain(summary.statistics.iter())
                .filter(|text| !text.trim().is_empty())
                .map(move |text| FactCandidate {
                    text: text.clone(),
                    source_url: summary.url.clone(),
                })
        })
        .collect()
}

/// Heuristic fact extraction used by the basic (non-advanced) path.
///
/// Takes up to `per_summary` key facts from each summary at a fixed
/// confidence, capped at `cap` in total. When no summary carries key facts,
/// the summaries themselves and then the search results stand in, so the
/// result is only empty when every input is.
pub fn heuristic_facts(
    summaries: &[PageSummary],
    results: &[SearchResult],
    per_summary: usize,
    confidence: u8,
    cap: usize,
) -> Vec<VerifiedFact> {
    let mut facts: Vec<VerifiedFact> = summaries
        .iter()
        .flat_map(|s| {
            s.key_facts
                .iter()
                .filter(|f| !f.trim().is_empty())
                .take(per_summary)
                .map(move |f| basic_fact(f, &s.url, confidence))
        })
        .take(cap)
        .collect();

    if facts.is_empty() {
        facts = summaries
            .iter()
            .filter(|s| !s.summary.trim().is_empty())
            .map(|s| basic_fact(&first_sentence(&s.summary), &s.url, confidence))
            .take(cap)
            .collect();
    }

    if facts.is_empty() {
        facts = results
            .iter()
            .map(|r| {
                let text = [&r.snippet, &r.title, &r.url]
                    .into_iter()
                    .find(|t| !t.trim().is_empty())
                    .map_or("", |t| t.as_str());
                (text, r)
            })
            .filter(|(text, _)| !text.is_empty())
            .map(|(text, r)| basic_fact(text, &r.url, confidence))
            .take(cap)
            .collect();
    }

    facts
}

/// Coverage estimate when gap analysis is unavailable:
/// `facts / max(questions, 5)` as a percentage, capped at 100.
pub fn heuristic_coverage(fact_count: usize, question_count: usize) -> u8 {
    let denominator = question_count.max(5) as f64;
    super::parse::clamp_score(fact_count as f64 / denominator * 100.0)
}

fn basic_fact(text: &str, url: &str, confidence: u8) -> VerifiedFact {
    VerifiedFact {
        text: text.to_string(),
        confidence_score: confidence,
        supporting_source_count: 1,
        has_contradiction: false,
        source_url: url.to_string(),
    }
}

fn first_sentence(text: &str) -> String {
    let text = text.trim();
    match text.find(". ") {
        Some(end) => text[..=end].to_string(),
        None => text.to_string(),
    }
}
