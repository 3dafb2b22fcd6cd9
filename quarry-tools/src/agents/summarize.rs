//! Fetches a source page and condenses it into a summary with key facts.

use async_trait::async_trait;
use quarry_core::collaborators::parse::parse_or_default;
use quarry_core::{PageSummary, SearchResult, StageError, Summarizer};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::fetch::PageFetcher;
use crate::http::truncate_chars;
use crate::llm::{ChatRequest, LlmClient};

const STAGE: &str = "summarize";
/// Page text sent to the model.
const MAX_CONTENT_CHARS: usize = 8000;
/// Page text kept as the summary when the reply does not parse.
const FALLBACK_SUMMARY_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You are an expert at extracting key information from web content.
Create a concise, factual summary focusing on:
- Main facts and claims
- Statistical data
- Key findings
- Important dates and names

Respond in JSON format:
{
    \"summary\": \"2-3 paragraph summary\",
    \"key_facts\": [\"fact 1\", \"fact 2\", ...],
    \"statistics\": [\"stat 1\", \"stat 2\", ...],
    \"entities\": [\"entity 1\", \"entity 2\", ...]
}";

#[derive(Debug, Default, Deserialize)]
struct SummaryReply {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_facts: Vec<String>,
    #[serde(default)]
    statistics: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
}

/// Fetches a source page and summarizes it.
pub struct LlmSummarizer {
    llm: Arc<dyn LlmClient>,
    fetcher: PageFetcher,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, fetcher: PageFetcher) -> Self {
        Self { llm, fetcher }
    }

    /// Summarize already-fetched page text.
    pub async fn summarize_content(
        &self,
        source: &SearchResult,
        content: &str,
    ) -> Result<PageSummary, StageError> {
        let content = if content.chars().count() > MAX_CONTENT_CHARS {
            format!("{}...", truncate_chars(content, MAX_CONTENT_CHARS))
        } else {
            content.to_string()
        };

        let user = format!(
            "Title: {}\nURL: {}\n\nContent:\n{}\n\nPlease provide a structured summary of this content.",
            source.title, source.url, content
        );
        let raw = self
            .llm
            .complete(
                ChatRequest::new(SYSTEM_PROMPT, &user)
                    .temperature(0.3)
                    .max_tokens(1500),
            )
            .await
            .map_err(|e| StageError::backend(STAGE, e))?;

        let reply = parse_or_default(STAGE, &raw, || SummaryReply {
            summary: truncate_chars(&content, FALLBACK_SUMMARY_CHARS).to_string(),
            ..SummaryReply::default()
        });

        Ok(PageSummary {
            url: source.url.clone(),
            title: source.title.clone(),
            summary: reply.summary,
            key_facts: reply.key_facts,
            statistics: reply.statistics,
            entities: reply.entities,
        })
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, source: &SearchResult) -> Result<PageSummary, StageError> {
        let content = self
            .fetcher
            .fetch(&source.url)
            .await
            .map_err(|e| StageError::backend(STAGE, e))?;
        if content.trim().is_empty() {
            return Err(StageError::Empty {
                stage: STAGE.to_string(),
            });
        }
        debug!(url = %source.url, chars = content.len(), "Summarizing page");
        self.summarize_content(source, &content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedLlm;
    use pretty_assertions::assert_eq;

    fn source() -> SearchResult {
        SearchResult::new(
            "CRISPR overview",
            "https://example.org/crispr",
            "snippet",
            "brave",
            0.9,
        )
    }

    fn summarizer(llm: Arc<ScriptedLlm>) -> LlmSummarizer {
        LlmSummarizer::new(llm, PageFetcher::new(reqwest::Client::new(), 10_000))
    }

    #[tokio::test]
    async fn test_summary_reply_is_parsed() {
        let llm = ScriptedLlm::replying(
            r#"{"summary": "CRISPR edits genes.", "key_facts": ["Cas9 cuts DNA"], "statistics": ["2012: first paper"], "entities": ["Doudna"]}"#,
        );
        let summary = summarizer(llm)
            .summarize_content(&source(), "page text")
            .await
            .unwrap();
        assert_eq!(summary.summary, "CRISPR edits genes.");
        assert_eq!(summary.key_facts, vec!["Cas9 cuts DNA"]);
        assert_eq!(summary.statistics, vec!["2012: first paper"]);
        assert_eq!(summary.url, "https://example.org/crispr");
        assert_eq!(summary.title, "CRISPR overview");
    }

    #[tokio::test]
    async fn test_unparseable_reply_keeps_page_text() {
        let llm = ScriptedLlm::replying("I cannot produce JSON today.");
        let content = "y".repeat(900);
        let summary = summarizer(llm)
            .summarize_content(&source(), &content)
            .await
            .unwrap();
        assert_eq!(summary.summary.len(), 500);
        assert!(summary.key_facts.is_empty());
    }

    #[tokio::test]
    async fn test_long_content_is_truncated_in_prompt() {
        let llm = ScriptedLlm::replying("{}");
        let content = "z".repeat(20_000);
        summarizer(llm.clone())
            .summarize_content(&source(), &content)
            .await
            .unwrap();
        let prompt = llm.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains(&format!("{}...", "z".repeat(8000))));
        assert!(!prompt.contains(&"z".repeat(8001)));
    }

    #[tokio::test]
    async fn test_call_failure_is_an_error() {
        let err = summarizer(ScriptedLlm::failing())
            .summarize_content(&source(), "text")
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_unfetchable_source_is_an_error() {
        let bad = SearchResult::new("t", "ftp://example.org/file", "", "brave", 0.5);
        let llm = ScriptedLlm::replying("{}");
        let err = summarizer(llm.clone()).summarize(&bad).await.unwrap_err();
        assert!(matches!(err, StageError::Backend { .. }));
        assert_eq!(llm.calls(), 0);
    }
}
