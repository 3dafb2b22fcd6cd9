//! Section-by-section report drafting.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use futures::future::join_all;
use quarry_core::{ReportWriter, StageError, VerifiedFact, WriteRequest};
use std::sync::Arc;
use tracing::{info, warn};

use crate::llm::{ChatRequest, LlmClient};

const STAGE: &str = "write";
const SECTION_FAILED: &str = "[Content generation failed for this section]";
/// Lower bound for the per-section word target.
const MIN_SECTION_WORDS: usize = 80;

const SYSTEM_PROMPT: &str = "You are an expert research writer. Create clear, well-structured, \
academic-style content based on the provided information. Use proper paragraphs, transitions, \
and maintain a professional tone. Focus on facts and insights.";

/// Drafts a report section by section.
pub struct LlmWriter {
    llm: Arc<dyn LlmClient>,
}

impl LlmWriter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

fn is_bookend(title: &str) -> bool {
    title == "Introduction" || title == "Conclusion"
}

fn bullet_facts<'a>(facts: impl Iterator<Item = &'a VerifiedFact>, with_confidence: bool) -> String {
    facts
        .map(|f| {
            if with_confidence {
                format!("- {} (confidence: {}%)", f.text, f.confidence_score)
            } else {
                format!("- {}", f.text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Facts whose text mentions one of the section's points, or the first ten
/// facts when none do.
fn section_facts<'a>(points: &[String], facts: &'a [VerifiedFact]) -> Vec<&'a VerifiedFact> {
    let points: Vec<String> = points.iter().map(|p| p.to_lowercase()).collect();
    let relevant: Vec<&VerifiedFact> = facts
        .iter()
        .filter(|f| {
            let text = f.text.to_lowercase();
            points.iter().any(|p| !p.is_empty() && text.contains(p.as_str()))
        })
        .take(15)
        .collect();
    if relevant.is_empty() {
        facts.iter().take(10).collect()
    } else {
        relevant
    }
}

/// `(section name, prompt)` pairs in report order.
fn section_prompts(request: &WriteRequest<'_>) -> Vec<(String, String)> {
    let query = request.query;
    let body: Vec<_> = request
        .outline
        .sections()
        .iter()
        .filter(|s| !is_bookend(&s.title))
        .collect();
    let section_count = body.len() + 3;
    let target = (request.word_limit / section_count).max(MIN_SECTION_WORDS);

    let mut prompts = Vec::with_capacity(section_count);

    let mut ranked: Vec<&VerifiedFact> = request.facts.iter().collect();
    ranked.sort_by(|a, b| b.confidence_score.cmp(&a.confidence_score));
    prompts.push((
        "Executive Summary".to_string(),
        format!(
            "Write a concise executive summary (about {target} words) for a research report on:\n\
             \"{query}\"\n\nKey findings:\n{}\n\n\
             The summary should highlight the most important insights and findings.",
            bullet_facts(ranked.into_iter().take(10), false)
        ),
    ));

    let topics = request.outline.titles().collect::<Vec<_>>().join(", ");
    prompts.push((
        "Introduction".to_string(),
        format!(
            "Write an introduction (about {target} words) for a research report on:\n\
             \"{query}\"\n\nThe report covers the following topics: {topics}\n\
             It draws on {} sources.\n\n\
             The introduction should provide context, explain importance, and outline the report structure.",
            request.summaries.len()
        ),
    ));

    for section in body {
        let points = section
            .points
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        let facts = section_facts(&section.points, request.facts);
        prompts.push((
            section.title.clone(),
            format!(
                "Write a detailed section (about {target} words) for:\nSection: {}\n\n\
                 Key points to cover:\n{points}\n\nAvailable facts and data:\n{}\n\n\
                 Write in a professional, informative style with clear structure and data-driven insights.",
                section.title,
                bullet_facts(facts.into_iter(), true)
            ),
        ));
    }

    prompts.push((
        "Conclusion".to_string(),
        format!(
            "Write a conclusion (about {target} words) for a research report on:\n\
             \"{query}\"\n\nKey verified findings:\n{}\n\n\
             The conclusion should synthesize findings, highlight implications, and suggest future directions.",
            bullet_facts(
                request.facts.iter().filter(|f| f.confidence_score >= 80).take(8),
                false
            )
        ),
    ));

    prompts
}

/// Join titled sections into a Markdown report.
pub fn compile_report(title: &str, sections: &[(String, String)], date: NaiveDate) -> String {
    let mut parts = vec![
        format!("# {title}"),
        format!(
            "\n*Research Report Generated: {}*\n",
            date.format("%B %d, %Y")
        ),
        "---\n".to_string(),
    ];
    for (name, content) in sections {
        parts.push(format!("## {name}\n"));
        parts.push(format!("{content}\n"));
    }
    parts.join("\n")
}

#[async_trait]
impl ReportWriter for LlmWriter {
    async fn write(&self, request: WriteRequest<'_>) -> Result<String, StageError> {
        let prompts = section_prompts(&request);
        let drafts = join_all(prompts.iter().map(|(_, prompt)| {
            self.llm.complete(
                ChatRequest::new(SYSTEM_PROMPT, prompt)
                    .temperature(0.7)
                    .max_tokens(1500),
            )
        }))
        .await;

        let mut failed = 0usize;
        let mut last_error = None;
        let sections: Vec<(String, String)> = prompts
            .into_iter()
            .zip(drafts)
            .map(|((name, _), draft)| match draft {
                Ok(text) => (name, text.trim().to_string()),
                Err(e) => {
                    warn!(section = %name, error = %e, "Section generation failed");
                    failed += 1;
                    last_error = Some(e);
                    (name, SECTION_FAILED.to_string())
                }
            })
            .collect();

        if failed == sections.len() {
            return Err(match last_error {
                Some(e) => StageError::backend(STAGE, e),
                None => StageError::Empty {
                    stage: STAGE.to_string(),
                },
            });
        }

        let report = compile_report(request.query, &sections, Local::now().date_naive());
        info!(
            sections = sections.len(),
            failed_sections = failed,
            words = report.split_whitespace().count(),
            "Report drafted"
        );
        Ok(report)
    }
}
