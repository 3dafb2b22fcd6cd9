//! Final editing pass and readability scoring.

use async_trait::async_trait;
use quarry_core::{ReportEditor, StageError};
use std::sync::Arc;
use tracing::info;

use crate::llm::{ChatRequest, LlmClient};

const STAGE: &str = "edit";

const SYSTEM_PROMPT: &str = "You are an expert editor specializing in academic and research writing.
Your task is to improve the given report by:

1. Fixing grammar and spelling errors
2. Improving sentence structure and flow
3. Ensuring consistent tone and style
4. Adding smooth transitions between sections
5. Enhancing clarity and readability
6. Maintaining professional academic voice

Keep every Markdown heading. Return ONLY the edited report without any meta-commentary.";

/// Rough 0-100 readability score from sentence length and paragraph density.
pub fn readability_score(text: &str) -> f64 {
    let words = text.split_whitespace().count();
    let sentences = text.matches(['.', '!', '?']).count();
    if sentences == 0 {
        return 50.0;
    }

    let average = words as f64 / sentences as f64;
    let mut score = if (15.0..=20.0).contains(&average) {
        90.0
    } else if (10.0..=25.0).contains(&average) {
        75.0
    } else {
        60.0
    };

    let paragraphs = text.matches("\n\n").count();
    if paragraphs as f64 > words as f64 / 200.0 {
        score += 10.0;
    }
    f64::min(score, 100.0)
}

/// Polishes a drafted report in a single pass.
pub struct LlmEditor {
    llm: Arc<dyn LlmClient>,
}

impl LlmEditor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ReportEditor for LlmEditor {
    async fn edit(&self, report: &str) -> Result<String, StageError> {
        let user = format!(
            "Please edit and improve this research report:\n\n{report}\n\nProvide the refined version."
        );
        let edited = self
            .llm
            .complete(ChatRequest::new(SYSTEM_PROMPT, &user).max_tokens(4096))
            .await
            .map_err(|e| StageError::backend(STAGE, e))?;

        let edited = edited.trim();
        if edited.is_empty() {
            return Err(StageError::Empty {
                stage: STAGE.to_string(),
            });
        }

        info!(
            before_chars = report.len(),
            after_chars = edited.len(),
            readability = readability_score(edited),
            "Report edited"
        );
        Ok(edited.to_string())
    }
}
