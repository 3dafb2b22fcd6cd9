//! Coverage scoring against the research outline.

use async_trait::async_trait;
use quarry_core::collaborators::fallback::heuristic_coverage;
use quarry_core::collaborators::parse::parse_or_default;
use quarry_core::{GapAnalyzer, GapReport, Outline, StageError, VerifiedFact};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::llm::{ChatRequest, LlmClient};

const STAGE: &str = "gap_analysis";
/// Facts listed in the prompt.
const MAX_PROMPT_FACTS: usize = 50;

const SYSTEM_PROMPT: &str = "You are a research quality analyst. Your job is to identify gaps in research coverage.

Analyze the research outline, key questions, and collected facts to find:
1. Topics that are not adequately covered
2. Questions that remain unanswered
3. Areas needing more depth
4. Missing perspectives or viewpoints

Respond in JSON format:
{
    \"coverage_score\": 75,
    \"gaps\": [
        {\"topic\": \"missing topic\", \"severity\": \"high\", \"description\": \"what's missing\"}
    ],
    \"additional_queries\": [\"search query 1\", \"search query 2\"],
    \"recommendations\": [\"recommendation 1\", \"recommendation 2\"]
}";

/// The reply shape, including the advisory recommendations the pipeline
/// only logs.
#[derive(Debug, Default, Deserialize)]
struct GapReply {
    #[serde(flatten)]
    report: GapReport,
    #[serde(default)]
    recommendations: Vec<String>,
}

pub struct LlmGapAnalyzer {
    llm: Arc<dyn LlmClient>,
}

impl LlmGapAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

fn render_prompt(outline: &Outline, facts: &[VerifiedFact], key_questions: &[String]) -> String {
    let outline_text = outline
        .sections()
        .iter()
        .map(|section| {
            let mut block = format!("## {}", section.title);
            for point in &section.points {
                block.push_str(&format!("\n- {point}"));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n");
    let questions_text = key_questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {q}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let facts_text = facts
        .iter()
        .take(MAX_PROMPT_FACTS)
        .map(|f| format!("- {} (confidence: {}%)", f.text, f.confidence_score))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Research Outline:\n{outline_text}\n\n\
         Key Questions:\n{questions_text}\n\n\
         Collected Facts ({} total):\n{facts_text}\n\n\
         Analyze the coverage and identify gaps. Suggest specific search queries to fill them.",
        facts.len()
    )
}

#[async_trait]
impl GapAnalyzer for LlmGapAnalyzer {
    async fn analyze(
        &self,
        outline: &Outline,
        facts: &[VerifiedFact],
        key_questions: &[String],
    ) -> Result<GapReport, StageError> {
        let user = render_prompt(outline, facts, key_questions);
        let raw = self
            .llm
            .complete(
                ChatRequest::new(SYSTEM_PROMPT, &user)
                    .temperature(0.5)
                    .max_tokens(2000),
            )
            .await
            .map_err(|e| StageError::backend(STAGE, e))?;

        let reply = parse_or_default(STAGE, &raw, || GapReply {
            report: GapReport {
                coverage_score: heuristic_coverage(facts.len(), key_questions.len()),
                gaps: Vec::new(),
                additional_queries: key_questions.iter().take(3).cloned().collect(),
            },
            recommendations: Vec::new(),
        });

        info!(
            coverage = reply.report.coverage_score,
            gaps = reply.report.gaps.len(),
            queries = reply.report.additional_queries.len(),
            recommendations = ?reply.recommendations,
            "Gap analysis complete"
        );
        Ok(reply.report)
    }
}
