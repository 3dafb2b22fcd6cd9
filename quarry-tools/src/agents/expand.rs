//! Query expansion into search topics, an outline and key questions.

use async_trait::async_trait;
use quarry_core::collaborators::parse::parse_or_default;
use quarry_core::{Expansion, QueryExpander, StageError};
use std::sync::Arc;
use tracing::info;

use crate::llm::{ChatRequest, LlmClient};

const STAGE: &str = "expand";

const SYSTEM_PROMPT: &str = "You are a research planning expert. Your job is to analyze a research topic \
and break it down into comprehensive sub-topics, key questions, and a structured outline.

Provide your response in valid JSON format with the following structure:
{
    \"expanded_topics\": [\"topic1\", \"topic2\", ...],
    \"research_outline\": {
        \"Introduction\": [\"key point 1\", \"key point 2\"],
        \"Section 1 Name\": [\"key point 1\", \"key point 2\"],
        ...
    },
    \"key_questions\": [\"question 1\", \"question 2\", ...]
}";

/// Expands a query into search topics, an outline, and key questions.
pub struct LlmExpander {
    llm: Arc<dyn LlmClient>,
}

impl LlmExpander {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl QueryExpander for LlmExpander {
    async fn expand(&self, query: &str) -> Result<Expansion, StageError> {
        let user = format!(
            "Research Topic: {query}\n\n\
             Please expand this topic into:\n\
             1. 5-8 specific sub-topics to research\n\
             2. A structured research outline with sections and key points\n\
             3. 5-10 key questions that should be answered\n\n\
             Focus on creating a comprehensive research plan that covers all important \
             dimensions of the topic."
        );
        let raw = self
            .llm
            .complete(
                ChatRequest::new(SYSTEM_PROMPT, &user)
                    .temperature(0.7)
                    .max_tokens(2000),
            )
            .await
            .map_err(|e| StageError::backend(STAGE, e))?;

        let expansion = parse_or_default(STAGE, &raw, || Expansion::fallback(query));
        info!(
            topics = expansion.topics.len(),
            sections = expansion.outline.len(),
            questions = expansion.key_questions.len(),
            "Query expansion parsed"
        );
        Ok(expansion)
    }
}
